//! 从一批已分析的图片中挖掘以标签为键的三种模式

use log::{debug, info};

use crate::artifact::{CategoryPatterns, DescriptionPattern, DescriptionPatterns, PatternEntry, SearchIndex, TagMap};
use crate::config::MiningOptions;
use crate::record::ImageRecord;
use crate::utils::{Counter, timestamp, tokenize};

/// 按标签分组的全部图片，不做截断
pub fn tag_buckets(records: &[ImageRecord]) -> TagMap<Vec<PatternEntry>> {
    let mut buckets: TagMap<Vec<PatternEntry>> = TagMap::new();
    for record in records {
        for tag in &record.tags {
            buckets.entry(tag.clone()).or_default().push(PatternEntry {
                description: record.description.clone(),
                other_tags: record.other_tags(tag),
            });
        }
    }
    buckets
}

/// 构建分类模式
///
/// 写出的每个标签只保留最先出现的 `max_pattern_entries` 条记录，`tag_counts` 仍是完整计数。
pub fn category_patterns(records: &[ImageRecord], opts: &MiningOptions) -> CategoryPatterns {
    let tag_counts: Counter = records.iter().flat_map(|r| r.tags.iter()).collect();
    let common_tags = tag_counts.most_common(opts.common_tag_count);

    info!("共发现 {} 个不同的标签", tag_counts.len());
    debug!("前 10 个标签: {:?}", &common_tags[..common_tags.len().min(10)]);

    let mut patterns = tag_buckets(records);
    for bucket in patterns.values_mut() {
        bucket.truncate(opts.max_pattern_entries);
    }

    CategoryPatterns {
        common_tags,
        tag_counts: tag_counts.iter().map(|(k, c)| (k.to_string(), c)).collect(),
        patterns,
    }
}

/// 按标签分组的详细描述，空描述不计入，但标签本身仍会出现
pub fn descriptions_by_tag(records: &[ImageRecord]) -> TagMap<Vec<&str>> {
    let mut grouped: TagMap<Vec<&str>> = TagMap::new();
    for record in records {
        for tag in &record.tags {
            let descriptions = grouped.entry(tag.clone()).or_default();
            if !record.detailed_description.is_empty() {
                descriptions.push(&record.detailed_description);
            }
        }
    }
    grouped
}

/// 构建描述模式
///
/// 样本数少于 `min_description_samples` 的标签视为噪声丢弃。先取出现次数最多的
/// `common_word_count` 个词，再过滤掉过短的词，所以结果可能少于 `common_word_count` 个。
pub fn description_patterns(records: &[ImageRecord], opts: &MiningOptions) -> DescriptionPatterns {
    let mut result = DescriptionPatterns::new();
    for (tag, descriptions) in descriptions_by_tag(records) {
        if descriptions.len() < opts.min_description_samples {
            continue;
        }

        let words: Counter = descriptions.iter().flat_map(|d| tokenize(d)).collect();
        let common_words = words
            .most_common(opts.common_word_count)
            .into_iter()
            .map(|(w, _)| w)
            .filter(|w| w.chars().count() > opts.min_word_len)
            .collect();

        let total_words: usize = descriptions.iter().map(|d| d.split_whitespace().count()).sum();
        result.insert(
            tag,
            DescriptionPattern {
                count: descriptions.len(),
                common_words,
                avg_length: total_words as f64 / descriptions.len() as f64,
            },
        );
    }

    info!("共生成 {} 个标签的描述模式", result.len());
    result
}

/// 根据标签共现关系构建同义词索引
///
/// 共现次数在完整的分组上统计，不受分类模式截断的影响。每个标签只考察共现次数最多的
/// `synonym_candidates` 个标签，再按 `min_cooccurrence` 过滤，所以即使更多的标签满足阈值，
/// 单个标签本身贡献的同义词也不会超过 `synonym_candidates` 个。边是双向的。
pub fn search_index(records: &[ImageRecord], opts: &MiningOptions) -> SearchIndex {
    let mut synonyms: TagMap<Vec<String>> = TagMap::new();

    let mut link = |from: &str, to: &str| {
        let list = synonyms.entry(from.to_string()).or_default();
        if !list.iter().any(|t| t == to) {
            list.push(to.to_string());
        }
    };

    for (tag, entries) in tag_buckets(records) {
        let co_occurring: Counter = entries.iter().flat_map(|e| e.other_tags.iter()).collect();
        for (related, count) in co_occurring.most_common(opts.synonym_candidates) {
            if count >= opts.min_cooccurrence && related != tag {
                link(&tag, &related);
                link(&related, &tag);
            }
        }
    }

    info!("共有 {} 个标签找到了相关标签", synonyms.len());
    SearchIndex { synonyms, timestamp: timestamp() }
}

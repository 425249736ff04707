use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::Result;
use chrono::Local;
use indexmap::IndexMap;
use indicatif::ProgressStyle;
use serde::Serialize;
use tempfile::NamedTempFile;

pub fn pb_style() -> ProgressStyle {
    ProgressStyle::with_template(
        "[{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} ({per_sec}, {eta}) {msg}",
    )
    .unwrap_or_else(|_| ProgressStyle::default_bar())
    .progress_chars("#>-")
}

/// 保持首次出现顺序的计数器
///
/// 计数相同时，先出现的元素排在前面，因此同样的输入总是得到同样的排序结果。
#[derive(Debug, Default, Clone)]
pub struct Counter(IndexMap<String, usize>);

impl Counter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, key: &str) {
        match self.0.get_mut(key) {
            Some(count) => *count += 1,
            None => {
                self.0.insert(key.to_owned(), 1);
            }
        }
    }

    pub fn get(&self, key: &str) -> usize {
        self.0.get(key).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// 按首次出现顺序遍历
    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.0.iter().map(|(k, c)| (k.as_str(), *c))
    }

    /// 返回出现次数最多的 n 个元素
    pub fn most_common(&self, n: usize) -> Vec<(String, usize)> {
        let mut sorted = self.0.iter().map(|(k, c)| (k.clone(), *c)).collect::<Vec<_>>();
        // sort_by 是稳定排序
        sorted.sort_by(|a, b| b.1.cmp(&a.1));
        sorted.truncate(n);
        sorted
    }
}

impl<S: AsRef<str>> FromIterator<S> for Counter {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        let mut counter = Counter::new();
        for key in iter {
            counter.add(key.as_ref());
        }
        counter
    }
}

/// 小写并按空白切分
pub fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split_whitespace().map(str::to_lowercase)
}

/// 当前本地时间的 ISO-8601 字符串
pub fn timestamp() -> String {
    Local::now().format("%Y-%m-%dT%H:%M:%S%.6f").to_string()
}

/// 先写入同目录下的临时文件再重命名，保证读取方不会看到写了一半的文件
pub fn write_atomic(path: impl AsRef<Path>, data: &[u8]) -> Result<()> {
    let path = path.as_ref();
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;
    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(data)?;
    tmp.persist(path)?;
    Ok(())
}

pub fn write_json<T: Serialize + ?Sized>(path: impl AsRef<Path>, value: &T) -> Result<()> {
    let data = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &data)
}

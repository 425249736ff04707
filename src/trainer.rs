use std::path::Path;

use anyhow::Result;
use log::{info, warn};

use crate::artifact::{CategoryPatterns, ImprovedDescription, TrainingReport};
use crate::config::{DataDir, FaceOptions, MiningOptions};
use crate::face::{FaceClusterIndex, FaceEncoder, extract_faces};
use crate::miner;
use crate::record::{ImageRecord, load_records};
use crate::utils::{timestamp, write_json};

/// 离线训练流程
///
/// 每次运行都从头构建所有产物并完整覆盖旧文件，因此可以安全地重复运行。
pub struct Trainer<'a> {
    data_dir: DataDir,
    mining: MiningOptions,
    face: FaceOptions,
    encoder: Option<&'a dyn FaceEncoder>,
}

impl<'a> Trainer<'a> {
    pub fn new(data_dir: DataDir) -> Self {
        Self { data_dir, mining: MiningOptions::default(), face: FaceOptions::default(), encoder: None }
    }

    pub fn mining(mut self, mining: MiningOptions) -> Self {
        self.mining = mining;
        self
    }

    pub fn face(mut self, face: FaceOptions) -> Self {
        self.face = face;
        self
    }

    /// 设置人脸编码原语，不设置时跳过人脸聚类
    pub fn encoder(mut self, encoder: Option<&'a dyn FaceEncoder>) -> Self {
        self.encoder = encoder;
        self
    }

    /// 读取训练数据
    pub fn collect(&self, metadata: impl AsRef<Path>, image_root: impl AsRef<Path>) -> Result<Vec<ImageRecord>> {
        load_records(metadata, image_root)
    }

    /// 依次执行所有阶段并写出产物，返回训练报告
    pub fn run(&self, records: &[ImageRecord]) -> Result<TrainingReport> {
        info!("阶段 1：分析分类模式");
        let category = miner::category_patterns(records, &self.mining);
        write_json(self.data_dir.category_patterns(), &category)?;
        info!("分类模式已保存: {}", self.data_dir.category_patterns().display());

        info!("阶段 2：分析描述模式");
        let descriptions = miner::description_patterns(records, &self.mining);
        write_json(self.data_dir.description_patterns(), &descriptions)?;
        info!("描述模式已保存: {}", self.data_dir.description_patterns().display());

        info!("阶段 3：人脸聚类");
        let clusters = self.cluster_faces(records);
        clusters.save(self.data_dir.face_clusters())?;
        info!("人脸聚类已保存: {}", self.data_dir.face_clusters().display());

        info!("阶段 4：构建同义词索引");
        let index = miner::search_index(records, &self.mining);
        write_json(self.data_dir.search_index(), &index)?;
        info!("同义词索引已保存: {}", self.data_dir.search_index().display());

        info!("阶段 5：生成描述改进建议");
        let improved = improved_descriptions(records);
        write_json(self.data_dir.improved_descriptions(), &improved)?;
        info!("共生成 {} 条描述改进建议", improved.len());

        let report = training_report(records, &category);
        write_json(self.data_dir.training_report(), &report)?;
        info!("训练完成，共 {} 张图片，{} 个标签", report.total_images, report.total_tags);

        Ok(report)
    }

    fn cluster_faces(&self, records: &[ImageRecord]) -> FaceClusterIndex {
        let Some(encoder) = self.encoder else {
            warn!("人脸编码不可用，跳过人脸聚类");
            return FaceClusterIndex::default();
        };
        let faces = extract_faces(records, encoder);
        if faces.is_empty() {
            info!("没有找到可用于聚类的人脸");
            return FaceClusterIndex::default();
        }
        FaceClusterIndex::build(faces, &self.face)
    }
}

/// 为每张图片列出其标签下已有的详细描述，供描述改写时参考
///
/// 每个标签取最先出现的 3 条详细描述，不受描述模式的样本数下限影响。
pub fn improved_descriptions(records: &[ImageRecord]) -> Vec<ImprovedDescription> {
    let grouped = miner::descriptions_by_tag(records);
    records
        .iter()
        .map(|record| {
            let enhancement_context = record
                .tags
                .iter()
                .filter_map(|tag| {
                    let descriptions = grouped.get(tag)?;
                    if descriptions.is_empty() {
                        return None;
                    }
                    let examples = &descriptions[..descriptions.len().min(3)];
                    Some(format!("Common {} descriptions include: {}", tag, examples.join(", ")))
                })
                .collect();
            ImprovedDescription {
                image: record.path.display().to_string(),
                original_description: record.description.clone(),
                suggested_tags: record.tags.clone(),
                enhancement_context,
            }
        })
        .collect()
}

pub fn training_report(records: &[ImageRecord], category: &CategoryPatterns) -> TrainingReport {
    TrainingReport {
        timestamp: timestamp(),
        total_images: records.len(),
        total_tags: category.patterns.len(),
        images_with_faces: records.iter().filter(|r| r.face_count > 0).count(),
        images_with_detailed_desc: records.iter().filter(|r| !r.detailed_description.is_empty()).count(),
        top_categories: category.patterns.keys().take(20).map(String::from).collect(),
        status: "completed".to_string(),
    }
}

//! 训练产物的数据结构与读写
//!
//! 训练端每次运行都会完整覆盖这些文件，服务端只读加载。任何一个文件缺失或损坏时，
//! 只有对应的那一份模式退化为空，其他模式照常使用。

use std::fs;
use std::io;
use std::path::Path;

use indexmap::IndexMap;
use log::{info, warn};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

use crate::config::DataDir;
use crate::face::FaceClusterIndex;

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("读取失败: {0}")]
    Io(#[from] io::Error),
    #[error("JSON 解析失败: {0}")]
    Json(#[from] serde_json::Error),
    #[error("二进制解析失败: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("数据不一致: {0}")]
    Inconsistent(String),
}

/// 以标签为键、保持首次出现顺序的映射，序列化为 JSON 对象
pub type TagMap<V> = IndexMap<String, V>;

/// 某个标签下的一张训练图片
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternEntry {
    pub description: String,
    pub other_tags: Vec<String>,
}

/// 分类模式，对应 `category_patterns.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryPatterns {
    /// 出现次数最多的标签，`[标签, 次数]`
    #[serde(default)]
    pub common_tags: Vec<(String, usize)>,
    #[serde(default)]
    pub tag_counts: TagMap<usize>,
    #[serde(default)]
    pub patterns: TagMap<Vec<PatternEntry>>,
}

/// 某个标签的描述用词统计
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescriptionPattern {
    pub count: usize,
    pub common_words: Vec<String>,
    pub avg_length: f64,
}

/// 描述模式，对应 `description_patterns.json`
pub type DescriptionPatterns = TagMap<DescriptionPattern>;

/// 同义词索引，对应 `search_index.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchIndex {
    #[serde(default)]
    pub synonyms: TagMap<Vec<String>>,
    #[serde(default)]
    pub timestamp: String,
}

/// 训练报告，对应 `training_report.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub timestamp: String,
    pub total_images: usize,
    pub total_tags: usize,
    pub images_with_faces: usize,
    pub images_with_detailed_desc: usize,
    pub top_categories: Vec<String>,
    pub status: String,
}

/// 单张图片的描述改进建议，对应 `improved_descriptions.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImprovedDescription {
    pub image: String,
    pub original_description: String,
    pub suggested_tags: Vec<String>,
    pub enhancement_context: Vec<String>,
}

pub fn read_json<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, ArtifactError> {
    let data = fs::read(path)?;
    Ok(serde_json::from_slice(&data)?)
}

pub fn read_bincode<T: DeserializeOwned>(path: impl AsRef<Path>) -> Result<T, ArtifactError> {
    let data = fs::read(path)?;
    Ok(bincode::deserialize(&data)?)
}

/// 单个产物的加载结果
#[derive(Debug, Clone, PartialEq)]
pub enum ArtifactLoad<T> {
    Loaded(T),
    NotFound,
    Invalid(String),
}

/// 加载结果的摘要，不含数据本身
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactState {
    Loaded,
    NotFound,
    Invalid,
}

impl<T> ArtifactLoad<T> {
    /// 读取一个产物文件，文件不存在与内容错误分开报告
    pub fn from_result(result: Result<T, ArtifactError>) -> Self {
        match result {
            Ok(value) => Self::Loaded(value),
            Err(ArtifactError::Io(e)) if e.kind() == io::ErrorKind::NotFound => Self::NotFound,
            Err(e) => Self::Invalid(e.to_string()),
        }
    }

    pub fn state(&self) -> ArtifactState {
        match self {
            Self::Loaded(_) => ArtifactState::Loaded,
            Self::NotFound => ArtifactState::NotFound,
            Self::Invalid(_) => ArtifactState::Invalid,
        }
    }

    /// 取出数据，加载失败时记录警告并返回空的默认值
    pub fn unwrap_or_warn(self, name: &str) -> T
    where
        T: Default,
    {
        match self {
            Self::Loaded(value) => value,
            Self::NotFound => {
                warn!("{} 不存在，将只使用基础模型的结果", name);
                T::default()
            }
            Self::Invalid(e) => {
                warn!("{} 无法加载，将只使用基础模型的结果: {}", name, e);
                T::default()
            }
        }
    }
}

/// 四份产物各自的加载状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ArtifactStatus {
    pub category_patterns: ArtifactState,
    pub description_patterns: ArtifactState,
    pub search_index: ArtifactState,
    pub face_clusters: ArtifactState,
}

impl ArtifactStatus {
    pub fn all(state: ArtifactState) -> Self {
        Self {
            category_patterns: state,
            description_patterns: state,
            search_index: state,
            face_clusters: state,
        }
    }

    fn states(&self) -> [ArtifactState; 4] {
        [self.category_patterns, self.description_patterns, self.search_index, self.face_clusters]
    }

    pub fn any_loaded(&self) -> bool {
        self.states().contains(&ArtifactState::Loaded)
    }

    pub fn all_loaded(&self) -> bool {
        self.states().iter().all(|s| *s == ArtifactState::Loaded)
    }
}

/// 服务端使用的全部已学习数据
#[derive(Debug, Clone, Default)]
pub struct Artifacts {
    pub category_patterns: CategoryPatterns,
    pub description_patterns: DescriptionPatterns,
    pub search_index: SearchIndex,
    pub face_clusters: FaceClusterIndex,
}

impl Artifacts {
    /// 从数据目录中逐个加载产物，失败的产物替换为空
    pub fn load(dir: &DataDir) -> (Self, ArtifactStatus) {
        let category = ArtifactLoad::from_result(read_json::<CategoryPatterns>(dir.category_patterns()));
        let description =
            ArtifactLoad::from_result(read_json::<DescriptionPatterns>(dir.description_patterns()));
        let search = ArtifactLoad::from_result(read_json::<SearchIndex>(dir.search_index()));
        let faces = ArtifactLoad::from_result(
            read_bincode::<FaceClusterIndex>(dir.face_clusters())
                .and_then(|index| index.validate().map(|_| index)),
        );

        let status = ArtifactStatus {
            category_patterns: category.state(),
            description_patterns: description.state(),
            search_index: search.state(),
            face_clusters: faces.state(),
        };

        let artifacts = Self {
            category_patterns: category.unwrap_or_warn("分类模式"),
            description_patterns: description.unwrap_or_warn("描述模式"),
            search_index: search.unwrap_or_warn("同义词索引"),
            face_clusters: faces.unwrap_or_warn("人脸聚类"),
        };

        info!("已加载 {} 个分类模式", artifacts.category_patterns.patterns.len());
        info!("已加载 {} 个标签的描述模式", artifacts.description_patterns.len());
        info!("已加载 {} 个标签的同义词", artifacts.search_index.synonyms.len());
        info!("已加载 {} 个人脸聚类", artifacts.face_clusters.clusters.len());

        (artifacts, status)
    }
}

//! 使用已学习的模式增强单条分析结果
//!
//! 所有操作都只读取加载好的产物，不修改任何状态，可以在多个请求间共享同一个 [`Enhancer`]。
//! 某份产物缺失时，依赖它的操作原样返回输入。

use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use log::debug;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::artifact::{ArtifactState, ArtifactStatus, Artifacts};
use crate::config::{DataDir, FaceOptions};

static GLOBAL: OnceLock<Arc<Enhancer>> = OnceLock::new();

const LANDSCAPE_TAGS: [&str; 3] = ["landscape", "nature", "outdoor"];
const FOOD_TAGS: [&str; 3] = ["food", "meal", "dish"];

/// 场景类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum SceneType {
    Portrait,
    Group,
    Landscape,
    Food,
    General,
}

impl SceneType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Portrait => "portrait",
            Self::Group => "group",
            Self::Landscape => "landscape",
            Self::Food => "food",
            Self::General => "general",
        }
    }
}

/// 图片上下文分析结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ImageContext {
    /// 样本最多的标签
    pub primary_category: Option<String>,
    /// 样本数量第 2 ~ 4 的标签
    pub secondary_categories: Vec<String>,
    pub scene_type: SceneType,
    /// `min(样本数 / 100, 1)`，只是一个饱和的启发值，不是概率
    pub confidence: f64,
}

/// 基础模型给出的分析结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct AnalysisResult {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub detailed_description: String,
    #[serde(default)]
    pub meta_tags: Vec<String>,
    #[serde(default, alias = "faces_detected")]
    pub face_count: u32,
    #[serde(default)]
    pub face_encodings: Vec<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

/// 增强后的分析结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct EnhancedAnalysis {
    pub description: String,
    pub detailed_description: String,
    pub enhanced_description: String,
    /// 扩展后的标签
    pub meta_tags: Vec<String>,
    pub suggested_categories: Vec<String>,
    pub context: ImageContext,
    pub face_count: u32,
    /// 每个人脸编码匹配到的聚类
    pub face_clusters: Vec<Option<usize>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

pub struct Enhancer {
    artifacts: Artifacts,
    status: ArtifactStatus,
    face: FaceOptions,
}

impl Enhancer {
    pub fn new(artifacts: Artifacts, status: ArtifactStatus, face: FaceOptions) -> Self {
        Self { artifacts, status, face }
    }

    /// 没有任何已学习数据的增强器，所有操作都原样返回
    pub fn empty() -> Self {
        Self::new(Artifacts::default(), ArtifactStatus::all(ArtifactState::NotFound), FaceOptions::default())
    }

    /// 从数据目录加载，缺失或损坏的产物会被替换为空
    pub fn load(dir: &DataDir, face: FaceOptions) -> Self {
        let (artifacts, status) = Artifacts::load(dir);
        Self::new(artifacts, status, face)
    }

    /// 进程内共享的实例，第一次调用时从 `dir` 加载，之后的调用忽略参数
    pub fn global(dir: &DataDir) -> Arc<Enhancer> {
        GLOBAL.get_or_init(|| Arc::new(Self::load(dir, FaceOptions::default()))).clone()
    }

    pub fn status(&self) -> ArtifactStatus {
        self.status
    }

    pub fn artifacts(&self) -> &Artifacts {
        &self.artifacts
    }

    /// 用描述模式补充基础描述
    ///
    /// 按顺序检查每个标签的前 5 个常见词，找到第一个有缺失词的标签后，追加其中前 3 个缺失词，
    /// 不会合并多个标签的结果。
    pub fn enhance_description(&self, base: &str, tags: &[String]) -> String {
        let patterns = &self.artifacts.description_patterns;
        if patterns.is_empty() || tags.is_empty() {
            return base.to_string();
        }

        let base_lower = base.to_lowercase();
        for tag in tags {
            let Some(pattern) = patterns.get(tag) else {
                continue;
            };
            let missing = pattern
                .common_words
                .iter()
                .take(5)
                .filter(|w| !base_lower.contains(&w.to_lowercase()))
                .take(3)
                .map(String::as_str)
                .collect::<Vec<_>>();
            if !missing.is_empty() {
                debug!("使用标签 {} 的描述模式补充描述", tag);
                return format!("{}. This image is commonly associated with {}", base, missing.join(", "));
            }
        }

        base.to_string()
    }

    /// 用同义词索引扩展标签，每个标签最多带入 2 个相关标签
    pub fn improve_tags(&self, tags: &[String]) -> Vec<String> {
        let synonyms = &self.artifacts.search_index.synonyms;
        if synonyms.is_empty() {
            return tags.to_vec();
        }

        let mut seen = HashSet::new();
        let mut improved = vec![];
        for tag in tags {
            if seen.insert(tag.as_str()) {
                improved.push(tag.clone());
            }
        }

        for tag in tags {
            for related in synonyms.get(tag).into_iter().flatten().take(2) {
                if seen.insert(related.as_str()) {
                    improved.push(related.clone());
                }
            }
        }
        improved
    }

    /// 根据描述推荐尚未标注的分类，最多 5 个
    ///
    /// 某个分类的前 10 条样本中，只要有一条样本描述是当前描述的子串（忽略大小写），就推荐该分类。
    pub fn get_category_suggestions(&self, description: &str, tags: &[String]) -> Vec<String> {
        let description = description.to_lowercase();
        self.artifacts
            .category_patterns
            .patterns
            .iter()
            .filter(|(category, _)| !tags.contains(*category))
            .filter(|(_, entries)| {
                entries.iter().take(10).any(|entry| {
                    let pattern = entry.description.to_lowercase();
                    !pattern.is_empty() && description.contains(&pattern)
                })
            })
            .map(|(category, _)| category.to_string())
            .take(5)
            .collect()
    }

    /// 分析主要分类和场景类型
    ///
    /// 人脸数量优先于标签决定场景：1 张为人像，2 张以上为合影。
    pub fn analyze_image_context(&self, tags: &[String], face_count: u32) -> ImageContext {
        let patterns = &self.artifacts.category_patterns.patterns;

        let mut ranked: Vec<(&str, usize)> = vec![];
        for tag in tags {
            if ranked.iter().any(|(t, _)| t == tag) {
                continue;
            }
            if let Some(entries) = patterns.get(tag) {
                ranked.push((tag.as_str(), entries.len()));
            }
        }
        // 稳定排序，数量相同时保持输入顺序
        ranked.sort_by(|a, b| b.1.cmp(&a.1));

        let (primary_category, confidence) = match ranked.first() {
            Some(&(tag, size)) => (Some(tag.to_string()), (size as f64 / 100.0).min(1.0)),
            None => (None, 0.0),
        };
        let secondary_categories = ranked.iter().skip(1).take(3).map(|(t, _)| t.to_string()).collect();

        let has_any = |candidates: &[&str]| tags.iter().any(|t| candidates.contains(&t.as_str()));
        let scene_type = match face_count {
            1 => SceneType::Portrait,
            n if n >= 2 => SceneType::Group,
            _ if has_any(&LANDSCAPE_TAGS) => SceneType::Landscape,
            _ if has_any(&FOOD_TAGS) => SceneType::Food,
            _ => SceneType::General,
        };

        ImageContext { primary_category, secondary_categories, scene_type, confidence }
    }

    /// 查找人脸编码所属的聚类
    pub fn identify_face_cluster(&self, encoding: &[f32]) -> Option<usize> {
        self.artifacts.face_clusters.identify(encoding, &self.face)
    }

    /// 对一条分析结果应用全部增强
    pub fn enhance_analysis(&self, result: AnalysisResult) -> EnhancedAnalysis {
        let enhanced_description = self.enhance_description(&result.description, &result.meta_tags);
        let meta_tags = self.improve_tags(&result.meta_tags);
        let suggested_categories = self.get_category_suggestions(&result.description, &meta_tags);
        let context = self.analyze_image_context(&meta_tags, result.face_count);
        let face_clusters = result.face_encodings.iter().map(|e| self.identify_face_cluster(e)).collect();

        let detailed_description = if result.detailed_description.is_empty() {
            enhanced_description.clone()
        } else {
            result.detailed_description
        };

        EnhancedAnalysis {
            description: result.description,
            detailed_description,
            enhanced_description,
            meta_tags,
            suggested_categories,
            context,
            face_count: result.face_count,
            face_clusters,
            embedding: result.embedding,
        }
    }
}

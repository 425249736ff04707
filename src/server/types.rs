use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::artifact::ArtifactStatus;

/// 人脸聚类查询参数
#[derive(Debug, Deserialize, ToSchema)]
pub struct FaceClusterRequest {
    /// 待查询的人脸编码，可以一次查询多个
    pub encodings: Vec<Vec<f32>>,
}

/// 人脸聚类查询结果
#[derive(Debug, Serialize, ToSchema)]
pub struct FaceClusterResponse {
    /// 与请求中的编码一一对应，没有匹配的聚类时为 null
    pub clusters: Vec<Option<usize>>,
}

/// 服务状态
#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    /// 所有产物都已加载时为 `ok`，否则为 `degraded`
    pub status: String,
    pub artifacts: ArtifactStatus,
    /// 已学习的标签数量
    pub categories: usize,
    pub synonyms: usize,
    pub face_clusters: usize,
}

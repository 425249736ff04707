use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::extract::State;
use log::info;

use super::error::{AppError, Result};
use super::state::AppState;
use super::types::*;
use crate::enhancer::{AnalysisResult, EnhancedAnalysis};
use crate::metrics;

/// 查看已学习模式的加载情况
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, body = HealthResponse),
    )
)]
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let status = state.enhancer.status();
    let artifacts = state.enhancer.artifacts();
    Json(HealthResponse {
        status: if status.all_loaded() { "ok" } else { "degraded" }.to_string(),
        artifacts: status,
        categories: artifacts.category_patterns.patterns.len(),
        synonyms: artifacts.search_index.synonyms.len(),
        face_clusters: artifacts.face_clusters.clusters.len(),
    })
}

/// 增强一条分析结果
#[utoipa::path(
    post,
    path = "/enhance",
    request_body = AnalysisResult,
    responses(
        (status = 200, body = EnhancedAnalysis),
    )
)]
pub async fn enhance_handler(
    State(state): State<Arc<AppState>>,
    Json(result): Json<AnalysisResult>,
) -> Json<EnhancedAnalysis> {
    let start = Instant::now();
    let enhanced = state.enhancer.enhance_analysis(result);
    let elapsed = start.elapsed();

    let scene_type = enhanced.context.scene_type.as_str();
    metrics::inc_enhance_count(scene_type);
    metrics::observe_enhance_duration(elapsed.as_secs_f32());
    for cluster in &enhanced.face_clusters {
        metrics::inc_face_lookup(cluster.is_some());
    }

    info!("增强完成，场景 {}，耗时 {:.2?}", scene_type, elapsed);
    Json(enhanced)
}

/// 查找人脸编码所属的聚类
#[utoipa::path(
    post,
    path = "/face_cluster",
    request_body = FaceClusterRequest,
    responses(
        (status = 200, body = FaceClusterResponse),
        (status = 400, description = "存在空的人脸编码"),
    )
)]
pub async fn face_cluster_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<FaceClusterRequest>,
) -> Result<Json<FaceClusterResponse>> {
    if req.encodings.iter().any(|e| e.is_empty()) {
        return Err(AppError::BadRequest("人脸编码不能为空".to_string()));
    }
    let clusters = req
        .encodings
        .iter()
        .map(|e| {
            let cluster = state.enhancer.identify_face_cluster(e);
            metrics::inc_face_lookup(cluster.is_some());
            cluster
        })
        .collect();
    Ok(Json(FaceClusterResponse { clusters }))
}

/// 以文本格式导出 prometheus 指标
#[utoipa::path(
    get,
    path = "/metrics",
    responses(
        (status = 200, body = String),
    )
)]
pub async fn metrics_handler() -> Result<String> {
    Ok(metrics::gather_text()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{ArtifactState, ArtifactStatus, Artifacts};
    use crate::config::FaceOptions;
    use crate::enhancer::{Enhancer, SceneType};
    use crate::face::{FaceClusterIndex, FaceMetadata};

    fn state() -> Arc<AppState> {
        let faces = [vec![0.0, 0.0], vec![0.1, 0.0], vec![5.0, 5.0], vec![5.1, 5.0]]
            .into_iter()
            .enumerate()
            .map(|(i, e)| (FaceMetadata { image: format!("{}.jpg", i), tags: vec![] }, e))
            .collect();
        let artifacts = Artifacts {
            face_clusters: FaceClusterIndex::build(faces, &FaceOptions::default()),
            ..Default::default()
        };
        let status = ArtifactStatus { face_clusters: ArtifactState::Loaded, ..ArtifactStatus::all(ArtifactState::NotFound) };
        AppState::new(Arc::new(Enhancer::new(artifacts, status, FaceOptions::default())))
    }

    #[tokio::test]
    async fn test_health_reports_degraded() {
        let Json(health) = health_handler(State(state())).await;
        assert_eq!(health.status, "degraded");
        assert_eq!(health.face_clusters, 2);
        assert_eq!(health.artifacts.category_patterns, ArtifactState::NotFound);
    }

    #[tokio::test]
    async fn test_enhance_passes_through_without_patterns() {
        let result = AnalysisResult {
            description: "two people".to_string(),
            meta_tags: vec!["people".to_string()],
            face_count: 2,
            face_encodings: vec![vec![5.05, 5.0], vec![20.0, 20.0]],
            ..Default::default()
        };
        let Json(enhanced) = enhance_handler(State(state()), Json(result)).await;
        assert_eq!(enhanced.enhanced_description, "two people");
        assert_eq!(enhanced.meta_tags, vec!["people"]);
        assert_eq!(enhanced.context.scene_type, SceneType::Group);
        assert_eq!(enhanced.face_clusters, vec![Some(1), None]);
    }

    #[tokio::test]
    async fn test_face_cluster_lookup() {
        let req = FaceClusterRequest { encodings: vec![vec![0.05, 0.0], vec![3.0, 3.0]] };
        let Json(resp) = face_cluster_handler(State(state()), Json(req)).await.unwrap();
        assert_eq!(resp.clusters, vec![Some(0), None]);
    }

    #[tokio::test]
    async fn test_face_cluster_rejects_empty_encoding() {
        let req = FaceClusterRequest { encodings: vec![vec![]] };
        let err = face_cluster_handler(State(state()), Json(req)).await.unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }
}

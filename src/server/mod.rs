mod api;
mod error;
mod state;
mod types;

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::routing::{get, post};
use tower_http::limit::RequestBodyLimitLayer;
use utoipa::OpenApi;

pub use self::state::*;

#[derive(OpenApi)]
#[openapi(
    paths(api::health_handler, api::enhance_handler, api::face_cluster_handler, api::metrics_handler),
    components(schemas(
        crate::enhancer::AnalysisResult,
        crate::enhancer::EnhancedAnalysis,
        crate::enhancer::ImageContext,
        crate::enhancer::SceneType,
        crate::artifact::ArtifactStatus,
        crate::artifact::ArtifactState,
        types::FaceClusterRequest,
        types::FaceClusterResponse,
        types::HealthResponse,
    ))
)]
pub struct ApiDoc;

/// 构建API服务器
pub fn create_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(api::health_handler))
        .route("/enhance", post(api::enhance_handler))
        .route("/face_cluster", post(api::face_cluster_handler))
        .route("/metrics", get(api::metrics_handler))
        .route("/api-docs/openapi.json", get(|| async { Json(ApiDoc::openapi()) }))
        // 请求体限制：10M，人脸编码和 embedding 都不大
        .layer(RequestBodyLimitLayer::new(1024 * 1024 * 10))
        .with_state(state)
}

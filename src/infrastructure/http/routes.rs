//! HTTP Routes
//!
//! API Endpoints:
//! - /ws/process-images     WS    多图流式处理
//! - /api/upload            POST  单图上传处理（multipart）
//! - /api/upload-batch      POST  多图上传处理（multipart，字段 images 可重复）
//! - /api/download          GET   下载处理结果（可转换格式）
//! - /api/health            GET   健康检查

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use super::handlers;
use super::state::AppState;

/// 创建所有路由
pub fn create_routes() -> Router<Arc<AppState>> {
    Router::new()
        .nest("/api", api_routes())
        .route("/ws/process-images", get(handlers::process_images_ws))
}

/// API 路由
fn api_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/upload", post(handlers::upload_image))
        .route("/upload-batch", post(handlers::upload_batch))
        .route("/download", get(handlers::download_image))
}

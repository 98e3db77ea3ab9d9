//! Health Handler

use axum::{extract::State, Json};
use std::sync::Arc;

use crate::infrastructure::http::dto::{HealthResponse, RemoverHealth};
use crate::infrastructure::http::state::AppState;

/// 健康检查，包含 Worker Pool 状态和抠图后端可达性
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let reachable = state.remover.health_check().await;

    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        workers: state.workers,
        in_flight: state.pool_stats.in_flight(),
        queue_depth: state.task_queue.depth(),
        active_sessions: state.session_manager.count(),
        stored_images: state.image_store.len(),
        remover: RemoverHealth {
            backend: state.remover.backend_name(),
            reachable,
        },
    })
}

//! Application State
//!
//! 连接处理器共享的端口与 Command/Query Handlers

use std::sync::Arc;

use crate::application::{
    // Command handlers
    ProcessBatchHandler, ProcessImageHandler,
    // Query handlers
    GetProcessedImageHandler,
    // Ports
    BackgroundRemoverPort, ImageProcessorPort, ImageStorePort, SessionManagerPort, TaskQueuePort,
    StreamLimits,
};
use crate::infrastructure::worker::{PoolStats, WorkerPoolHandle};

/// WebSocket 单帧默认上限（与 HTTP 请求体上限一致）
const DEFAULT_MAX_FRAME_SIZE: usize = 50 * 1024 * 1024;

/// 应用状态
pub struct AppState {
    // ========== Ports ==========
    pub session_manager: Arc<dyn SessionManagerPort>,
    pub task_queue: Arc<dyn TaskQueuePort>,
    pub image_store: Arc<dyn ImageStorePort>,
    pub remover: Arc<dyn BackgroundRemoverPort>,

    // ========== Worker Pool ==========
    pub pool_stats: Arc<PoolStats>,
    pub workers: usize,

    // ========== Streaming ==========
    pub limits: StreamLimits,
    pub max_frame_size: usize,

    // ========== Command Handlers ==========
    pub process_image_handler: ProcessImageHandler,
    pub process_batch_handler: ProcessBatchHandler,

    // ========== Query Handlers ==========
    pub get_processed_image_handler: GetProcessedImageHandler,
}

impl AppState {
    /// 创建应用状态
    pub fn new(
        session_manager: Arc<dyn SessionManagerPort>,
        task_queue: Arc<dyn TaskQueuePort>,
        image_store: Arc<dyn ImageStorePort>,
        image_processor: Arc<dyn ImageProcessorPort>,
        remover: Arc<dyn BackgroundRemoverPort>,
        pool: &WorkerPoolHandle,
        limits: StreamLimits,
    ) -> Self {
        Self {
            session_manager,
            task_queue: task_queue.clone(),
            image_store: image_store.clone(),
            remover,

            pool_stats: pool.stats(),
            workers: pool.workers(),

            limits,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,

            process_image_handler: ProcessImageHandler::new(
                task_queue.clone(),
                limits.max_queue_depth,
            ),
            process_batch_handler: ProcessBatchHandler::new(
                task_queue,
                limits.max_queue_depth,
                limits.max_batch_size,
            ),

            get_processed_image_handler: GetProcessedImageHandler::new(image_store, image_processor),
        }
    }

    /// 设置 WebSocket 单帧上限
    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }
}

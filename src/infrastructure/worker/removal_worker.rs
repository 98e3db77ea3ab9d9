//! Removal Worker Pool - 后台抠图任务处理
//!
//! W 个常驻 Worker 共享同一个任务队列，最多 W 张图片同时处理

use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;

use crate::application::ports::{
    ImageProcessorPort, ImageStorePort, ProcessedImageInfo, QueuedTask, TaskOutcome,
    TaskQueuePort, TaskState,
};
use crate::domain::image::ProcessingError;

/// Worker Pool 配置
#[derive(Debug, Clone)]
pub struct RemovalWorkerConfig {
    /// Worker 数量（最大并发处理数）
    pub workers: usize,
}

impl Default for RemovalWorkerConfig {
    fn default() -> Self {
        Self { workers: 2 }
    }
}

/// Worker Pool 统计
#[derive(Debug, Default)]
pub struct PoolStats {
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    processed: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
}

impl PoolStats {
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// 启动以来的最大同时处理数
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    /// 因会话取消而跳过的任务数
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    fn enter(&self) -> InFlightGuard<'_> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(current, Ordering::SeqCst);
        InFlightGuard { stats: self }
    }
}

/// 离开作用域时减少 in-flight 计数
struct InFlightGuard<'a> {
    stats: &'a PoolStats,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.stats.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// 抠图 Worker Pool
pub struct RemovalWorkerPool {
    config: RemovalWorkerConfig,
    task_queue: Arc<dyn TaskQueuePort>,
    processor: Arc<dyn ImageProcessorPort>,
    image_store: Arc<dyn ImageStorePort>,
    stats: Arc<PoolStats>,
}

impl RemovalWorkerPool {
    pub fn new(
        config: RemovalWorkerConfig,
        task_queue: Arc<dyn TaskQueuePort>,
        processor: Arc<dyn ImageProcessorPort>,
        image_store: Arc<dyn ImageStorePort>,
    ) -> Self {
        Self {
            config,
            task_queue,
            processor,
            image_store,
            stats: Arc::new(PoolStats::default()),
        }
    }

    pub fn stats(&self) -> Arc<PoolStats> {
        self.stats.clone()
    }

    /// 启动所有 Worker
    pub fn start(self) -> WorkerPoolHandle {
        let workers = self.config.workers.max(1);
        tracing::info!(workers = workers, "Removal worker pool started");

        let handles = (0..workers)
            .map(|worker_id| {
                let task_queue = self.task_queue.clone();
                let processor = self.processor.clone();
                let image_store = self.image_store.clone();
                let stats = self.stats.clone();
                tokio::spawn(run_worker(worker_id, task_queue, processor, image_store, stats))
            })
            .collect();

        WorkerPoolHandle {
            handles,
            stats: self.stats,
            task_queue: self.task_queue,
        }
    }
}

/// 运行中的 Worker Pool
pub struct WorkerPoolHandle {
    handles: Vec<JoinHandle<()>>,
    stats: Arc<PoolStats>,
    task_queue: Arc<dyn TaskQueuePort>,
}

impl WorkerPoolHandle {
    pub fn workers(&self) -> usize {
        self.handles.len()
    }

    pub fn stats(&self) -> Arc<PoolStats> {
        self.stats.clone()
    }

    /// 关闭队列并等待所有 Worker 退出
    ///
    /// 正在处理的任务会完成，排队中的任务被丢弃
    pub async fn shutdown(self) {
        self.task_queue.close();
        for handle in self.handles {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Worker terminated abnormally");
            }
        }
        tracing::info!(
            processed = self.stats.processed(),
            failed = self.stats.failed(),
            "Removal worker pool stopped"
        );
    }
}

async fn run_worker(
    worker_id: usize,
    task_queue: Arc<dyn TaskQueuePort>,
    processor: Arc<dyn ImageProcessorPort>,
    image_store: Arc<dyn ImageStorePort>,
    stats: Arc<PoolStats>,
) {
    tracing::debug!(worker_id = worker_id, "Worker started");

    while let Some(task) = task_queue.dequeue().await {
        process_task(worker_id, task, &*processor, &*image_store, &stats).await;
    }

    tracing::debug!(worker_id = worker_id, "Worker stopped");
}

/// 处理单个任务
///
/// 所有错误（包括 panic）都转换为失败结果，Worker 继续运行
async fn process_task(
    worker_id: usize,
    task: QueuedTask,
    processor: &dyn ImageProcessorPort,
    image_store: &dyn ImageStorePort,
    stats: &PoolStats,
) {
    let QueuedTask {
        mut unit,
        cancel,
        reply,
    } = task;

    // Check 1: 会话是否已取消
    if cancel.is_cancelled() {
        unit.state = TaskState::Cancelled;
        stats.skipped.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            worker_id = worker_id,
            session_id = %unit.session_id,
            task_id = unit.task_id,
            "Session cancelled, skipping task"
        );
        return;
    }

    unit.state = TaskState::Processing;
    tracing::debug!(
        worker_id = worker_id,
        session_id = %unit.session_id,
        task_id = unit.task_id,
        waited_ms = (chrono::Utc::now() - unit.created_at).num_milliseconds(),
        "Processing task"
    );

    let started = Instant::now();
    let payload = std::mem::take(&mut unit.payload);
    let result = {
        let _gauge = stats.enter();
        AssertUnwindSafe(processor.process(payload, &unit.filename, unit.options))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(ProcessingError::Internal(panic_message(&*panic))))
    };
    let elapsed_ms = started.elapsed().as_millis() as u64;

    // Check 2: 处理期间会话被关闭，丢弃结果
    if cancel.is_cancelled() {
        unit.state = TaskState::Cancelled;
        stats.skipped.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(
            worker_id = worker_id,
            session_id = %unit.session_id,
            task_id = unit.task_id,
            "Session cancelled during processing, dropping result"
        );
        return;
    }

    let result = result.map(|processed| {
        let image_id =
            image_store.put(processed.data, processed.filename.clone(), processed.format);
        ProcessedImageInfo {
            image_id,
            filename: processed.filename,
            format: processed.format,
        }
    });

    match &result {
        Ok(info) => {
            unit.state = TaskState::Completed;
            stats.processed.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(
                worker_id = worker_id,
                session_id = %unit.session_id,
                task_id = unit.task_id,
                image_id = %info.image_id,
                elapsed_ms = elapsed_ms,
                "Task completed"
            );
        }
        Err(e) => {
            unit.state = TaskState::Failed;
            stats.failed.fetch_add(1, Ordering::Relaxed);
            tracing::error!(
                worker_id = worker_id,
                session_id = %unit.session_id,
                task_id = unit.task_id,
                filename = %unit.filename,
                kind = e.kind(),
                error = %e,
                "Task failed"
            );
        }
    }

    // 会话可能已断开，发送失败直接忽略
    let _ = reply.send(TaskOutcome {
        session_id: unit.session_id,
        task_id: unit.task_id,
        batch_id: unit.batch_id,
        filename: unit.filename,
        result,
    });
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    let detail = panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("Worker panicked: {}", detail)
}

//! Image Command Handlers

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::application::commands::image_commands::*;
use crate::application::error::ApplicationError;
use crate::application::ports::{
    download_url, ProcessedImageInfo, QueueError, QueuedTask, TaskQueuePort, TaskUnit,
};
use crate::domain::batch::TaskId;
use crate::domain::image::ProcessingError;

/// ProcessImage Handler - REST 单图处理
///
/// 与 WebSocket 会话走同一个共享队列，不绕过 Worker Pool
pub struct ProcessImageHandler {
    task_queue: Arc<dyn TaskQueuePort>,
    max_queue_depth: usize,
    next_task_id: AtomicU64,
}

impl ProcessImageHandler {
    pub fn new(task_queue: Arc<dyn TaskQueuePort>, max_queue_depth: usize) -> Self {
        Self {
            task_queue,
            max_queue_depth,
            next_task_id: AtomicU64::new(1),
        }
    }

    pub async fn handle(
        &self,
        cmd: ProcessImageCommand,
    ) -> Result<ProcessImageResponse, ApplicationError> {
        if cmd.payload.is_empty() {
            return Err(ApplicationError::validation("Empty image payload"));
        }

        let depth = self.task_queue.depth();
        if depth >= self.max_queue_depth {
            return Err(QueueError::Overloaded {
                depth,
                limit: self.max_queue_depth,
            }
            .into());
        }

        let session_id = format!("upload-{}", Uuid::new_v4().simple());
        let task_id = self.next_task_id.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        // 请求被中断时取消任务
        let _guard = cancel.clone().drop_guard();
        let (reply_tx, mut reply_rx) = mpsc::unbounded_channel();

        let unit = TaskUnit::new(
            session_id.clone(),
            task_id,
            None,
            cmd.filename,
            cmd.payload,
            cmd.options,
        );
        self.task_queue
            .enqueue(QueuedTask::new(unit, cancel, reply_tx))?;

        tracing::debug!(session_id = %session_id, task_id = task_id, "Upload queued");

        let outcome = reply_rx
            .recv()
            .await
            .ok_or_else(|| ApplicationError::Unavailable("Task dropped before completion".into()))?;

        Ok(upload_response(outcome.result?))
    }
}

/// ProcessBatch Handler - REST 多图处理
///
/// 所有图片一次性进入共享队列，由 Worker Pool 并发处理；单张失败不影响其他图片
pub struct ProcessBatchHandler {
    task_queue: Arc<dyn TaskQueuePort>,
    max_queue_depth: usize,
    max_batch_size: usize,
}

impl ProcessBatchHandler {
    pub fn new(task_queue: Arc<dyn TaskQueuePort>, max_queue_depth: usize, max_batch_size: usize) -> Self {
        Self {
            task_queue,
            max_queue_depth,
            max_batch_size,
        }
    }

    pub async fn handle(
        &self,
        cmd: ProcessBatchCommand,
    ) -> Result<ProcessBatchResponse, ApplicationError> {
        let total = cmd.images.len();
        if total == 0 {
            return Err(ApplicationError::validation("At least one image file is required"));
        }
        if total > self.max_batch_size {
            return Err(ApplicationError::validation(format!(
                "Batch of {} images exceeds limit {}",
                total, self.max_batch_size
            )));
        }

        let depth = self.task_queue.depth();
        if depth >= self.max_queue_depth {
            return Err(QueueError::Overloaded {
                depth,
                limit: self.max_queue_depth,
            }
            .into());
        }

        let session_id = format!("upload-batch-{}", Uuid::new_v4().simple());
        let cancel = CancellationToken::new();
        // 请求被中断时取消剩余任务
        let _guard = cancel.clone().drop_guard();
        let (reply_tx, mut reply_rx) = mpsc::unbounded_channel();

        let mut filenames = Vec::with_capacity(total);
        let mut slots: Vec<Option<Result<ProcessImageResponse, ProcessingError>>> =
            Vec::with_capacity(total);
        let mut queued = 0usize;

        for (index, image) in cmd.images.into_iter().enumerate() {
            filenames.push(image.filename.clone());
            if image.payload.is_empty() {
                slots.push(Some(Err(ProcessingError::Decode(
                    "Empty image payload".to_string(),
                ))));
                continue;
            }

            let unit = TaskUnit::new(
                session_id.clone(),
                index as TaskId,
                None,
                image.filename,
                image.payload,
                cmd.options,
            );
            self.task_queue
                .enqueue(QueuedTask::new(unit, cancel.clone(), reply_tx.clone()))?;
            slots.push(None);
            queued += 1;
        }
        drop(reply_tx);

        tracing::debug!(session_id = %session_id, total = total, queued = queued, "Batch upload queued");

        for _ in 0..queued {
            let outcome = reply_rx.recv().await.ok_or_else(|| {
                ApplicationError::Unavailable("Task dropped before completion".into())
            })?;
            let slot = usize::try_from(outcome.task_id)
                .ok()
                .and_then(|index| slots.get_mut(index));
            if let Some(slot) = slot {
                *slot = Some(outcome.result.map(upload_response));
            }
        }

        let results: Vec<BatchItemResult> = filenames
            .into_iter()
            .zip(slots)
            .map(|(filename, slot)| BatchItemResult {
                filename,
                result: slot.unwrap_or_else(|| {
                    Err(ProcessingError::Internal("Missing task result".to_string()))
                }),
            })
            .collect();
        let response = ProcessBatchResponse { results };

        tracing::info!(
            session_id = %session_id,
            total = total,
            successful = response.successful(),
            failed = response.failed(),
            "Batch upload processed"
        );
        Ok(response)
    }
}

fn upload_response(info: ProcessedImageInfo) -> ProcessImageResponse {
    ProcessImageResponse {
        image_url: download_url(&info.image_id),
        image_id: info.image_id,
        filename: info.filename,
        format: info.format,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::{ProcessedImageInfo, TaskOutcome};
    use crate::domain::image::{OutputFormat, ProcessingError, ProcessingOptions};
    use crate::infrastructure::memory::InMemoryTaskQueue;

    fn command() -> ProcessImageCommand {
        ProcessImageCommand {
            filename: "cat.jpg".to_string(),
            payload: vec![1, 2, 3],
            options: ProcessingOptions::default(),
        }
    }

    /// 模拟 Worker：取出一个任务并回复
    fn answer_one(queue: Arc<InMemoryTaskQueue>, succeed: bool) {
        tokio::spawn(async move {
            let task = queue.dequeue().await.unwrap();
            let result = if succeed {
                Ok(ProcessedImageInfo {
                    image_id: "img_1".to_string(),
                    filename: "cat-no-bg.jpg".to_string(),
                    format: OutputFormat::Jpeg,
                })
            } else {
                Err(ProcessingError::Decode("bad bytes".to_string()))
            };
            let _ = task.reply.send(TaskOutcome {
                session_id: task.unit.session_id.clone(),
                task_id: task.unit.task_id,
                batch_id: task.unit.batch_id,
                filename: task.unit.filename.clone(),
                result,
            });
        });
    }

    #[tokio::test]
    async fn test_upload_goes_through_queue() {
        let queue = Arc::new(InMemoryTaskQueue::new());
        let handler = ProcessImageHandler::new(queue.clone(), 10);
        answer_one(queue, true);

        let response = handler.handle(command()).await.unwrap();
        assert_eq!(response.image_id, "img_1");
        assert_eq!(response.image_url, "/api/download?imageId=img_1");
        assert_eq!(response.format, OutputFormat::Jpeg);
    }

    #[tokio::test]
    async fn test_processing_failure_is_reported() {
        let queue = Arc::new(InMemoryTaskQueue::new());
        let handler = ProcessImageHandler::new(queue.clone(), 10);
        answer_one(queue, false);

        let err = handler.handle(command()).await.unwrap_err();
        assert!(matches!(err, ApplicationError::ProcessingFailed(ProcessingError::Decode(_))));
    }

    #[tokio::test]
    async fn test_overloaded_queue_rejects() {
        let queue = Arc::new(InMemoryTaskQueue::new());
        let handler = ProcessImageHandler::new(queue.clone(), 0);

        let err = handler.handle(command()).await.unwrap_err();
        assert!(matches!(err, ApplicationError::Unavailable(_)));
        assert_eq!(queue.depth(), 0);
    }

    fn batch(names: &[&str]) -> ProcessBatchCommand {
        ProcessBatchCommand {
            images: names
                .iter()
                .map(|name| BatchImage {
                    filename: name.to_string(),
                    payload: if name.is_empty() { Vec::new() } else { vec![7] },
                })
                .collect(),
            options: ProcessingOptions::default(),
        }
    }

    /// 模拟 Worker：取出全部任务后倒序回复，文件名以 bad 开头的失败
    fn answer_all_reversed(queue: Arc<InMemoryTaskQueue>, count: usize) {
        tokio::spawn(async move {
            let mut tasks = Vec::new();
            for _ in 0..count {
                tasks.push(queue.dequeue().await.unwrap());
            }
            for task in tasks.into_iter().rev() {
                let result = if task.unit.filename.starts_with("bad") {
                    Err(ProcessingError::Decode("corrupt".to_string()))
                } else {
                    Ok(ProcessedImageInfo {
                        image_id: format!("img_{}", task.unit.filename),
                        filename: format!("{}-no-bg.png", task.unit.filename),
                        format: OutputFormat::Png,
                    })
                };
                let _ = task.reply.send(TaskOutcome {
                    session_id: task.unit.session_id.clone(),
                    task_id: task.unit.task_id,
                    batch_id: task.unit.batch_id,
                    filename: task.unit.filename.clone(),
                    result,
                });
            }
        });
    }

    #[tokio::test]
    async fn test_batch_results_keep_upload_order() {
        let queue = Arc::new(InMemoryTaskQueue::new());
        let handler = ProcessBatchHandler::new(queue.clone(), 10, 5);
        answer_all_reversed(queue.clone(), 3);

        let response = handler.handle(batch(&["a", "bad", "c"])).await.unwrap();
        let names: Vec<_> = response.results.iter().map(|r| r.filename.as_str()).collect();
        assert_eq!(names, ["a", "bad", "c"]);
        assert_eq!(response.results[0].result.as_ref().unwrap().image_id, "img_a");
        assert!(matches!(
            response.results[1].result,
            Err(ProcessingError::Decode(_))
        ));
        assert_eq!(
            response.results[2].result.as_ref().unwrap().image_url,
            "/api/download?imageId=img_c"
        );
        assert_eq!(response.successful(), 2);
        assert_eq!(response.failed(), 1);
        assert_eq!(queue.depth(), 0);
    }

    #[tokio::test]
    async fn test_batch_empty_file_fails_without_queueing() {
        let queue = Arc::new(InMemoryTaskQueue::new());
        let handler = ProcessBatchHandler::new(queue.clone(), 10, 5);
        answer_all_reversed(queue.clone(), 1);

        let response = handler.handle(batch(&["", "b"])).await.unwrap();
        assert!(response.results[0].result.is_err());
        assert!(response.results[1].result.is_ok());
    }

    #[tokio::test]
    async fn test_batch_limits() {
        let queue = Arc::new(InMemoryTaskQueue::new());
        let handler = ProcessBatchHandler::new(queue.clone(), 10, 2);
        assert!(matches!(
            handler.handle(batch(&[])).await,
            Err(ApplicationError::ValidationError(_))
        ));
        assert!(matches!(
            handler.handle(batch(&["a", "b", "c"])).await,
            Err(ApplicationError::ValidationError(_))
        ));

        let handler = ProcessBatchHandler::new(queue.clone(), 0, 2);
        assert!(matches!(
            handler.handle(batch(&["a"])).await,
            Err(ApplicationError::Unavailable(_))
        ));
        assert_eq!(queue.depth(), 0);
    }

    #[tokio::test]
    async fn test_empty_payload_is_invalid() {
        let queue = Arc::new(InMemoryTaskQueue::new());
        let handler = ProcessImageHandler::new(queue, 10);

        let mut cmd = command();
        cmd.payload.clear();
        assert!(matches!(
            handler.handle(cmd).await,
            Err(ApplicationError::ValidationError(_))
        ));
    }
}

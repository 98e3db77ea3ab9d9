//! Task Queue Port - 跨会话共享的处理队列
//!
//! 所有会话的任务按入队顺序（FIFO）排队，由固定大小的 Worker Pool 消费

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::domain::batch::{BatchId, TaskId};
use crate::domain::image::{OutputFormat, ProcessingError, ProcessingOptions};

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Task queue is closed")]
    Closed,

    #[error("Task queue overloaded: depth {depth}, limit {limit}")]
    Overloaded { depth: usize, limit: usize },
}

/// 任务状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// 已创建，尚未入队
    Pending,
    /// 在共享队列中等待
    Queued,
    /// Worker 正在处理
    Processing,
    Completed,
    Failed,
    /// 会话关闭，未处理
    Cancelled,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Pending => "pending",
            TaskState::Queued => "queued",
            TaskState::Processing => "processing",
            TaskState::Completed => "completed",
            TaskState::Failed => "failed",
            TaskState::Cancelled => "cancelled",
        }
    }
}

/// 任务单元：一张图片及其处理选项
#[derive(Debug, Clone)]
pub struct TaskUnit {
    pub session_id: String,
    pub task_id: TaskId,
    /// REST 单图上传没有批次
    pub batch_id: Option<BatchId>,
    pub filename: String,
    pub payload: Vec<u8>,
    pub options: ProcessingOptions,
    pub state: TaskState,
    pub created_at: DateTime<Utc>,
}

impl TaskUnit {
    pub fn new(
        session_id: impl Into<String>,
        task_id: TaskId,
        batch_id: Option<BatchId>,
        filename: impl Into<String>,
        payload: Vec<u8>,
        options: ProcessingOptions,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            task_id,
            batch_id,
            filename: filename.into(),
            payload,
            options,
            state: TaskState::Pending,
            created_at: Utc::now(),
        }
    }
}

/// 处理成功后的结果信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedImageInfo {
    pub image_id: String,
    pub filename: String,
    pub format: OutputFormat,
}

/// 任务结束结果，由 Worker 发回所属会话
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub session_id: String,
    pub task_id: TaskId,
    pub batch_id: Option<BatchId>,
    pub filename: String,
    pub result: Result<ProcessedImageInfo, ProcessingError>,
}

impl TaskOutcome {
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// 队列中的任务：任务单元 + 会话取消令牌 + 结果回传通道
#[derive(Debug)]
pub struct QueuedTask {
    pub unit: TaskUnit,
    pub cancel: CancellationToken,
    pub reply: mpsc::UnboundedSender<TaskOutcome>,
}

impl QueuedTask {
    pub fn new(
        unit: TaskUnit,
        cancel: CancellationToken,
        reply: mpsc::UnboundedSender<TaskOutcome>,
    ) -> Self {
        Self {
            unit,
            cancel,
            reply,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.unit.session_id
    }
}

/// Task Queue Port
///
/// 入队从不阻塞（无界）；出队在队列为空时挂起
#[async_trait]
pub trait TaskQueuePort: Send + Sync {
    /// 入队
    fn enqueue(&self, task: QueuedTask) -> Result<(), QueueError>;

    /// 取出下一个任务，队列关闭后返回 None
    async fn dequeue(&self) -> Option<QueuedTask>;

    /// 移除会话所有尚未出队的任务，返回移除数量
    fn cancel_session(&self, session_id: &str) -> usize;

    /// 当前排队数量
    fn depth(&self) -> usize;

    /// 关闭队列（停机时调用）
    fn close(&self);

    fn is_closed(&self) -> bool;
}

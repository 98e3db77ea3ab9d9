//! Connection Session - 单个 WebSocket 连接的协议状态机
//!
//! 状态: AwaitingConfig → Accepting → Closed
//!
//! 图片帧没有批次字段，只绑定到当前的上传目标批次（最近开始、仍在接收图片的批次）。
//! 上传目标收满声明数量后自动关闭；batch_end 时未收满则启动宽限期，
//! 宽限期结束（或下一个 batch_start 到达）时批次的期望数量收缩为实际接收数量。

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::application::commands::handlers::CloseSessionHandler;
use crate::application::commands::CloseSessionCommand;
use crate::application::ports::{
    QueueError, QueuedTask, Session, SessionError, SessionManagerPort, TaskOutcome,
    TaskQueuePort, TaskUnit,
};
use crate::domain::batch::{BatchError, BatchId, TaskId};
use crate::domain::image::{OptionError, ProcessingError, ProcessingOptions};

use super::emitter::ResultEmitter;
use super::protocol::{
    parse_text, BatchEndMessage, BatchStartMessage, ConfigMessage, ImageMetadataMessage,
    InboundMessage, OutboundMessage, ProtocolError,
};

/// 最多记住的被拒绝批次数量
const MAX_REJECTED_BATCHES: usize = 64;

/// 流式会话限制
#[derive(Debug, Clone, Copy)]
pub struct StreamLimits {
    /// 客户端未给出 batchSize 时的建议批次大小
    pub default_batch_size: usize,
    /// batchSize 上限（建议值会被截断，声明值超出则违规）
    pub max_batch_size: usize,
    /// 共享队列深度达到此值时拒绝新批次
    pub max_queue_depth: usize,
    pub grace_base: Duration,
    pub grace_per_image: Duration,
    /// image_metadata 之后等待二进制帧的最长时间，超时按 MissingBinary 处理
    pub binary_timeout: Duration,
}

impl StreamLimits {
    /// batch_end 之后等待剩余图片的时长
    pub fn grace_for(&self, declared: usize) -> Duration {
        let images = u32::try_from(declared).unwrap_or(u32::MAX);
        self.grace_base
            .saturating_add(self.grace_per_image.saturating_mul(images))
    }
}

impl Default for StreamLimits {
    fn default() -> Self {
        Self {
            default_batch_size: 20,
            max_batch_size: 600,
            max_queue_depth: 2000,
            grace_base: Duration::from_secs(10),
            grace_per_image: Duration::from_millis(500),
            binary_timeout: Duration::from_secs(30),
        }
    }
}

/// 会话状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    AwaitingConfig,
    Accepting,
    Closed,
}

/// 会话配置，只影响之后入队的任务
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub options: ProcessingOptions,
    pub batch_size: usize,
}

/// 已收到元数据、等待二进制帧的图片
#[derive(Debug)]
struct PendingImage {
    task_id: TaskId,
    filename: String,
    /// 属于被拒绝的批次，读取后丢弃
    discard: bool,
    /// 二进制帧必须在此之前到达
    deadline: Instant,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UploadTarget {
    Open {
        batch_id: BatchId,
        /// batch_end 已到达但未收满时的宽限期截止时间
        deadline: Option<Instant>,
    },
    Rejected {
        batch_id: BatchId,
        remaining: usize,
    },
}

/// 连接会话
pub struct ConnectionSession {
    session_id: String,
    state: SessionState,
    config: SessionConfig,
    limits: StreamLimits,
    pending: Option<PendingImage>,
    upload_target: Option<UploadTarget>,
    /// 最近一个因收满而关闭上传的批次（用于识别溢出）
    filled: Option<(BatchId, usize)>,
    last_batch_id: Option<BatchId>,
    /// 被拒绝、尚未收到 batch_end 的批次
    rejected: VecDeque<BatchId>,
    /// 已入队、尚未收到结果的任务
    tasks: HashMap<TaskId, BatchId>,
    emitter: ResultEmitter,
    next_task_id: TaskId,
    next_batch_id: BatchId,
    cancel: CancellationToken,
    task_queue: Arc<dyn TaskQueuePort>,
    session_manager: Arc<dyn SessionManagerPort>,
    close_handler: CloseSessionHandler,
    outcome_tx: mpsc::UnboundedSender<TaskOutcome>,
}

impl ConnectionSession {
    /// 注册新会话，返回会话和它的结果接收端
    pub fn open(
        session_manager: Arc<dyn SessionManagerPort>,
        task_queue: Arc<dyn TaskQueuePort>,
        limits: StreamLimits,
    ) -> Result<(Self, mpsc::UnboundedReceiver<TaskOutcome>), SessionError> {
        let session = Session::new();
        let cancel = session.cancel.clone();
        let session_id = session_manager.create(session)?;
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();
        let close_handler = CloseSessionHandler::new(session_manager.clone(), task_queue.clone());

        let session = Self {
            session_id,
            state: SessionState::AwaitingConfig,
            config: SessionConfig {
                options: ProcessingOptions::default(),
                batch_size: limits.default_batch_size,
            },
            limits,
            pending: None,
            upload_target: None,
            filled: None,
            last_batch_id: None,
            rejected: VecDeque::new(),
            tasks: HashMap::new(),
            emitter: ResultEmitter::new(),
            next_task_id: 0,
            next_batch_id: 0,
            cancel,
            task_queue,
            session_manager,
            close_handler,
            outcome_tx,
        };
        Ok((session, outcome_rx))
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> SessionConfig {
        self.config
    }

    pub fn is_closed(&self) -> bool {
        self.state == SessionState::Closed
    }

    /// 已入队、尚未结束的任务数量
    pub fn outstanding(&self) -> usize {
        self.tasks.len()
    }

    /// 下一个定时点（连接循环据此定时）
    ///
    /// 等待二进制帧期间宽限期不生效，只返回二进制帧的截止时间
    pub fn next_deadline(&self) -> Option<Instant> {
        if let Some(pending) = &self.pending {
            return Some(pending.deadline);
        }
        match self.upload_target {
            Some(UploadTarget::Open {
                deadline: Some(deadline),
                ..
            }) => Some(deadline),
            _ => None,
        }
    }

    /// 处理一条文本帧
    pub fn handle_text(&mut self, text: &str) -> Vec<OutboundMessage> {
        if self.is_closed() {
            return Vec::new();
        }
        self.session_manager.touch(&self.session_id);

        let mut messages = self.expire_grace(Instant::now());
        let allow_untyped = self.state == SessionState::AwaitingConfig;
        match parse_text(text, allow_untyped).and_then(|msg| self.dispatch(msg)) {
            Ok(replies) => messages.extend(replies),
            Err(e) => messages.extend(self.violation(e)),
        }
        messages
    }

    /// 处理一条二进制帧（图片数据）
    pub fn handle_binary(&mut self, payload: Vec<u8>) -> Vec<OutboundMessage> {
        if self.is_closed() {
            return Vec::new();
        }
        self.session_manager.touch(&self.session_id);

        let mut messages = self.expire_grace(Instant::now());
        match self.accept_image(payload) {
            Ok(replies) => messages.extend(replies),
            Err(e) => messages.extend(self.violation(e)),
        }
        messages
    }

    /// 处理 Worker 发回的任务结果
    ///
    /// 会话关闭后的结果直接丢弃
    pub fn on_outcome(&mut self, outcome: TaskOutcome) -> Vec<OutboundMessage> {
        if self.is_closed() || self.cancel.is_cancelled() {
            tracing::debug!(
                session_id = %self.session_id,
                task_id = outcome.task_id,
                "Dropping outcome for closed session"
            );
            return Vec::new();
        }
        if self.tasks.remove(&outcome.task_id).is_none() {
            tracing::warn!(
                session_id = %self.session_id,
                task_id = outcome.task_id,
                "Dropping outcome for unknown task"
            );
            return Vec::new();
        }

        tracing::debug!(
            session_id = %self.session_id,
            task_id = outcome.task_id,
            success = outcome.is_success(),
            "Task resolved"
        );
        self.emitter.emit(outcome)
    }

    /// 定时点到达：二进制帧超时视为协议违规，否则检查宽限期
    pub fn on_timer(&mut self, now: Instant) -> Vec<OutboundMessage> {
        if self.is_closed() {
            return Vec::new();
        }
        match &self.pending {
            Some(pending) if pending.deadline <= now => {
                let task_id = pending.task_id;
                self.violation(ProtocolError::MissingBinary(task_id))
            }
            Some(_) => Vec::new(),
            None => self.expire_grace(now),
        }
    }

    /// 宽限期到期：收缩批次期望数量
    pub fn expire_grace(&mut self, now: Instant) -> Vec<OutboundMessage> {
        // 元数据和数据之间不收缩
        if self.pending.is_some() {
            return Vec::new();
        }
        let batch_id = match self.upload_target {
            Some(UploadTarget::Open {
                batch_id,
                deadline: Some(deadline),
            }) if deadline <= now => batch_id,
            _ => return Vec::new(),
        };
        self.upload_target = None;

        tracing::info!(
            session_id = %self.session_id,
            batch_id = batch_id,
            received = self.emitter.tracker(batch_id).map(|t| t.received()).unwrap_or(0),
            "Batch grace period expired"
        );
        self.emitter.shrink(batch_id).into_iter().collect()
    }

    /// 关闭会话：取消全部排队任务，丢弃进行中任务的结果。可重复调用
    pub fn close(&mut self) {
        if self.is_closed() {
            return;
        }
        self.state = SessionState::Closed;
        self.pending = None;
        self.upload_target = None;
        let outstanding = self.tasks.len();
        self.tasks.clear();

        let response = self.close_handler.handle(CloseSessionCommand {
            session_id: self.session_id.clone(),
        });

        tracing::info!(
            session_id = %self.session_id,
            outstanding = outstanding,
            dequeued_cancelled = response.cancelled_count,
            "Connection session closed"
        );
    }

    fn violation(&mut self, err: ProtocolError) -> Vec<OutboundMessage> {
        tracing::warn!(session_id = %self.session_id, error = %err, "Protocol violation");
        let message = OutboundMessage::error(&err);
        self.close();
        vec![message]
    }

    fn dispatch(&mut self, msg: InboundMessage) -> Result<Vec<OutboundMessage>, ProtocolError> {
        if let Some(pending) = &self.pending {
            if msg != InboundMessage::Close {
                return Err(ProtocolError::MissingBinary(pending.task_id));
            }
        }

        match (self.state, msg) {
            (_, InboundMessage::Close) => {
                self.close();
                Ok(Vec::new())
            }
            (SessionState::AwaitingConfig, InboundMessage::Config(config)) => {
                self.apply_config(config)?;
                self.state = SessionState::Accepting;
                tracing::info!(
                    session_id = %self.session_id,
                    background = %self.config.options.background,
                    format = %self.config.options.format,
                    watermark = %self.config.options.watermark,
                    batch_size = self.config.batch_size,
                    "Session configured"
                );
                Ok(Vec::new())
            }
            (SessionState::AwaitingConfig, other) => Err(ProtocolError::UnexpectedMessage(
                format!("{} before config", other.kind()),
            )),
            (_, InboundMessage::Config(config)) => {
                self.apply_config(config)?;
                Ok(vec![self.config_updated()])
            }
            (_, InboundMessage::BatchStart(msg)) => self.start_batch(msg),
            (_, InboundMessage::ImageMetadata(msg)) => self.accept_metadata(msg),
            (_, InboundMessage::BatchEnd(msg)) => self.end_batch(msg),
        }
    }

    fn apply_config(&mut self, msg: ConfigMessage) -> Result<(), ProtocolError> {
        let invalid = |e: OptionError| ProtocolError::InvalidConfig(e.to_string());
        let mut options = self.config.options;

        if let Some(value) = &msg.background_color {
            options.background = value.parse().map_err(invalid)?;
        }
        if let Some(value) = &msg.file_type {
            options.format = value.parse().map_err(invalid)?;
        }
        if let Some(value) = &msg.watermark {
            options.watermark = value.parse().map_err(invalid)?;
        }

        let max = self.limits.max_batch_size.max(1);
        let batch_size = match msg.batch_size {
            Some(size) => usize::try_from(size.max(1)).unwrap_or(max).min(max),
            None => self.config.batch_size,
        };

        self.config = SessionConfig {
            options,
            batch_size,
        };
        Ok(())
    }

    fn config_updated(&self) -> OutboundMessage {
        OutboundMessage::ConfigUpdated {
            background_color: self.config.options.background.as_str().to_string(),
            file_type: self.config.options.format.as_str().to_string(),
            watermark: self.config.options.watermark.as_str().to_string(),
            batch_size: self.config.batch_size,
        }
    }

    fn start_batch(&mut self, msg: BatchStartMessage) -> Result<Vec<OutboundMessage>, ProtocolError> {
        let mut messages = Vec::new();

        match self.upload_target.take() {
            Some(UploadTarget::Open {
                batch_id,
                deadline: None,
            }) => {
                return Err(ProtocolError::UnexpectedMessage(format!(
                    "batch_start while batch {} is still uploading",
                    batch_id
                )));
            }
            // 上一个批次在宽限期内：不再等待剩余图片
            Some(UploadTarget::Open {
                batch_id,
                deadline: Some(_),
            }) => {
                tracing::info!(
                    session_id = %self.session_id,
                    batch_id = batch_id,
                    "Next batch started, shrinking previous batch"
                );
                messages.extend(self.emitter.shrink(batch_id));
            }
            Some(UploadTarget::Rejected { .. }) | None => {}
        }
        self.filled = None;

        let declared = msg.batch_size.unwrap_or(self.config.batch_size);
        if declared > self.limits.max_batch_size {
            return Err(ProtocolError::BatchTooLarge {
                declared,
                limit: self.limits.max_batch_size,
            });
        }

        let batch_id = msg.batch_id.unwrap_or(self.next_batch_id);
        if self.emitter.is_active(batch_id) {
            return Err(ProtocolError::DuplicateBatch(batch_id));
        }
        self.next_batch_id = self.next_batch_id.max(batch_id.saturating_add(1));
        self.last_batch_id = Some(batch_id);
        // 重新使用的 id 不再属于被拒绝的批次
        self.forget_rejected(batch_id);

        let depth = self.task_queue.depth();
        if depth >= self.limits.max_queue_depth {
            let reason = QueueError::Overloaded {
                depth,
                limit: self.limits.max_queue_depth,
            };
            tracing::warn!(
                session_id = %self.session_id,
                batch_id = batch_id,
                depth = depth,
                "Batch rejected, queue overloaded"
            );
            self.remember_rejected(batch_id);
            if declared > 0 {
                self.upload_target = Some(UploadTarget::Rejected {
                    batch_id,
                    remaining: declared,
                });
            }
            messages.push(OutboundMessage::BatchRejected {
                batch_id,
                reason: reason.to_string(),
            });
            return Ok(messages);
        }

        self.emitter.open_batch(batch_id, declared);
        if declared > 0 {
            self.upload_target = Some(UploadTarget::Open {
                batch_id,
                deadline: None,
            });
        }

        tracing::info!(
            session_id = %self.session_id,
            batch_id = batch_id,
            declared = declared,
            "Batch upload started"
        );
        messages.push(OutboundMessage::BatchStarted {
            batch_id,
            batch_size: declared,
        });
        Ok(messages)
    }

    fn remember_rejected(&mut self, batch_id: BatchId) {
        if self.rejected.len() >= MAX_REJECTED_BATCHES {
            if let Some(oldest) = self.rejected.pop_front() {
                tracing::debug!(
                    session_id = %self.session_id,
                    batch_id = oldest,
                    "Forgetting rejected batch without batch_end"
                );
            }
        }
        self.rejected.push_back(batch_id);
    }

    fn forget_rejected(&mut self, batch_id: BatchId) -> bool {
        match self.rejected.iter().position(|id| *id == batch_id) {
            Some(index) => self.rejected.remove(index).is_some(),
            None => false,
        }
    }

    fn accept_metadata(&mut self, msg: ImageMetadataMessage) -> Result<Vec<OutboundMessage>, ProtocolError> {
        let discard = match self.upload_target {
            Some(UploadTarget::Open { .. }) => false,
            Some(UploadTarget::Rejected { .. }) => true,
            None => {
                return Err(match self.filled {
                    Some((batch_id, expected)) => ProtocolError::BatchOverflow { batch_id, expected },
                    None => ProtocolError::UnexpectedMessage(
                        "image_metadata outside of an open batch".to_string(),
                    ),
                });
            }
        };

        let task_id = msg.task_id.unwrap_or(self.next_task_id);
        if !discard && self.tasks.contains_key(&task_id) {
            return Err(ProtocolError::DuplicateTask(task_id));
        }
        self.next_task_id = self.next_task_id.max(task_id.saturating_add(1));

        let filename = msg
            .filename
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| format!("image_{}.jpg", task_id));

        self.pending = Some(PendingImage {
            task_id,
            filename,
            discard,
            deadline: Instant::now() + self.limits.binary_timeout,
        });
        Ok(Vec::new())
    }

    fn accept_image(&mut self, payload: Vec<u8>) -> Result<Vec<OutboundMessage>, ProtocolError> {
        let pending = self.pending.take().ok_or(ProtocolError::UnexpectedBinary)?;

        let batch_id = match &mut self.upload_target {
            Some(UploadTarget::Open { batch_id, .. }) => *batch_id,
            Some(UploadTarget::Rejected {
                batch_id,
                remaining,
            }) => {
                tracing::debug!(
                    session_id = %self.session_id,
                    batch_id = *batch_id,
                    task_id = pending.task_id,
                    "Discarding image of rejected batch"
                );
                *remaining = remaining.saturating_sub(1);
                if *remaining == 0 {
                    self.upload_target = None;
                }
                return Ok(Vec::new());
            }
            None => return Err(ProtocolError::UnexpectedBinary),
        };
        debug_assert!(!pending.discard);

        self.emitter
            .register_image(batch_id)
            .map_err(|e| match e {
                BatchError::Overflow { batch_id, expected } => {
                    ProtocolError::BatchOverflow { batch_id, expected }
                }
                _ => ProtocolError::UnknownBatch(batch_id),
            })?;

        let (full, declared) = self
            .emitter
            .tracker(batch_id)
            .map(|t| (t.is_full(), t.declared()))
            .unwrap_or((true, 0));
        if full {
            self.upload_target = None;
            self.filled = Some((batch_id, declared));
        }

        let PendingImage {
            task_id, filename, ..
        } = pending;
        let size = payload.len();
        let unit = TaskUnit::new(
            self.session_id.clone(),
            task_id,
            Some(batch_id),
            filename.clone(),
            payload,
            self.config.options,
        );
        self.tasks.insert(task_id, batch_id);

        let mut messages = vec![OutboundMessage::ImageReceived {
            task_id,
            filename: filename.clone(),
        }];

        let queued = QueuedTask::new(unit, self.cancel.clone(), self.outcome_tx.clone());
        match self.task_queue.enqueue(queued) {
            Ok(()) => {
                tracing::debug!(
                    session_id = %self.session_id,
                    batch_id = batch_id,
                    task_id = task_id,
                    size = size,
                    "Image queued"
                );
            }
            Err(e) => {
                // 停机中：直接以失败结束该任务
                tracing::warn!(session_id = %self.session_id, task_id = task_id, error = %e, "Enqueue failed");
                messages.extend(self.on_outcome(TaskOutcome {
                    session_id: self.session_id.clone(),
                    task_id,
                    batch_id: Some(batch_id),
                    filename,
                    result: Err(ProcessingError::Internal(e.to_string())),
                }));
            }
        }

        Ok(messages)
    }

    fn end_batch(&mut self, msg: BatchEndMessage) -> Result<Vec<OutboundMessage>, ProtocolError> {
        let batch_id = msg.batch_id.or(self.last_batch_id).ok_or_else(|| {
            ProtocolError::UnexpectedMessage("batch_end before batch_start".to_string())
        })?;

        if self.forget_rejected(batch_id) {
            if matches!(self.upload_target, Some(UploadTarget::Rejected { batch_id: id, .. }) if id == batch_id)
            {
                self.upload_target = None;
            }
            return Ok(Vec::new());
        }

        if let Some(summary) = self.emitter.finished_summary(batch_id) {
            return Ok(vec![OutboundMessage::BatchQueued {
                batch_id,
                received: summary.total,
            }]);
        }

        let (received, declared) = self
            .emitter
            .tracker(batch_id)
            .map(|t| (t.received(), t.declared()))
            .ok_or(ProtocolError::UnknownBatch(batch_id))?;

        if let Some(UploadTarget::Open {
            batch_id: target,
            deadline,
        }) = &mut self.upload_target
        {
            if *target == batch_id && deadline.is_none() {
                let grace = self.limits.grace_for(declared);
                *deadline = Some(Instant::now() + grace);
                tracing::info!(
                    session_id = %self.session_id,
                    batch_id = batch_id,
                    received = received,
                    declared = declared,
                    grace_ms = grace.as_millis() as u64,
                    "Batch ended early, waiting for remaining images"
                );
            }
        }

        let mut messages = vec![OutboundMessage::BatchQueued { batch_id, received }];
        messages.extend(self.emitter.mark_ended(batch_id));
        Ok(messages)
    }
}

impl Drop for ConnectionSession {
    fn drop(&mut self) {
        self.close();
    }
}

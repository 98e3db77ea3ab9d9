//! Result Emitter - 任务结果与批次完成事件
//!
//! 按完成顺序把任务结果转换为出站消息，批次的最后一个任务结束后紧跟一条 batch_complete

use std::collections::{HashMap, VecDeque};

use crate::application::ports::{download_url, TaskOutcome};
use crate::domain::batch::{BatchError, BatchId, BatchSummary, BatchTracker};

use super::protocol::{OutboundMessage, TaskResultMessage};

/// 最多保留的已完成批次摘要数量
const MAX_FINISHED_SUMMARIES: usize = 256;

/// 会话内的批次跟踪与结果转换
#[derive(Debug, Default)]
pub struct ResultEmitter {
    /// 尚未完成的批次
    batches: HashMap<BatchId, BatchTracker>,
    /// 已完成（已发送 batch_complete）的批次
    finished: HashMap<BatchId, BatchSummary>,
    /// 已完成批次的完成顺序，超出上限时淘汰最旧的摘要
    finished_order: VecDeque<BatchId>,
}

impl ResultEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 开始跟踪一个批次，返回 false 表示该批次正在进行中
    pub fn open_batch(&mut self, batch_id: BatchId, declared: usize) -> bool {
        if self.batches.contains_key(&batch_id) {
            return false;
        }
        self.forget_finished(batch_id);
        self.batches
            .insert(batch_id, BatchTracker::new(batch_id, declared));
        true
    }

    pub fn is_active(&self, batch_id: BatchId) -> bool {
        self.batches.contains_key(&batch_id)
    }

    pub fn is_known(&self, batch_id: BatchId) -> bool {
        self.is_active(batch_id) || self.finished.contains_key(&batch_id)
    }

    pub fn finished_summary(&self, batch_id: BatchId) -> Option<&BatchSummary> {
        self.finished.get(&batch_id)
    }

    pub fn tracker(&self, batch_id: BatchId) -> Option<&BatchTracker> {
        self.batches.get(&batch_id)
    }

    pub fn active_batches(&self) -> usize {
        self.batches.len()
    }

    /// 登记一张已接收的图片，返回登记后的接收数量
    pub fn register_image(&mut self, batch_id: BatchId) -> Result<usize, BatchError> {
        let tracker = self
            .batches
            .get_mut(&batch_id)
            .ok_or(BatchError::AlreadyComplete(batch_id))?;
        tracker.register_image()?;
        Ok(tracker.received())
    }

    /// batch_end 到达
    pub fn mark_ended(&mut self, batch_id: BatchId) -> Option<OutboundMessage> {
        let summary = self.batches.get_mut(&batch_id)?.mark_ended();
        summary.map(|s| self.finish(s))
    }

    /// 宽限期结束：未到达的图片不再等待
    pub fn shrink(&mut self, batch_id: BatchId) -> Option<OutboundMessage> {
        let summary = self.batches.get_mut(&batch_id)?.shrink_to_received();
        summary.map(|s| self.finish(s))
    }

    /// 转换一个任务结果；如果它是批次的最后一个任务，追加 batch_complete
    pub fn emit(&mut self, outcome: TaskOutcome) -> Vec<OutboundMessage> {
        let mut messages = Vec::with_capacity(2);
        let success = outcome.is_success();
        let task_id = outcome.task_id;
        let batch_id = outcome.batch_id;

        messages.push(OutboundMessage::TaskResult(task_result(outcome)));

        if let Some(batch_id) = batch_id {
            let recorded = match self.batches.get_mut(&batch_id) {
                Some(tracker) => tracker.record(task_id, success),
                None => Err(BatchError::AlreadyComplete(batch_id)),
            };
            match recorded {
                Ok(Some(summary)) => messages.push(self.finish(summary)),
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(batch_id = batch_id, task_id = task_id, error = %e, "Outcome not counted");
                }
            }
        }

        messages
    }

    fn finish(&mut self, summary: BatchSummary) -> OutboundMessage {
        self.batches.remove(&summary.batch_id);
        self.forget_finished(summary.batch_id);
        self.finished.insert(summary.batch_id, summary);
        self.finished_order.push_back(summary.batch_id);
        if self.finished_order.len() > MAX_FINISHED_SUMMARIES {
            if let Some(oldest) = self.finished_order.pop_front() {
                self.finished.remove(&oldest);
            }
        }
        tracing::info!(
            batch_id = summary.batch_id,
            total = summary.total,
            successful = summary.successful,
            failed = summary.failed,
            "Batch complete"
        );
        OutboundMessage::BatchComplete {
            batch_id: summary.batch_id,
            total: summary.total,
            successful: summary.successful,
            failed: summary.failed,
        }
    }

    fn forget_finished(&mut self, batch_id: BatchId) {
        if self.finished.remove(&batch_id).is_some() {
            self.finished_order.retain(|id| *id != batch_id);
        }
    }
}

fn task_result(outcome: TaskOutcome) -> TaskResultMessage {
    match outcome.result {
        Ok(info) => TaskResultMessage {
            task_id: outcome.task_id,
            batch_id: outcome.batch_id,
            success: true,
            download_url: Some(download_url(&info.image_id)),
            image_id: Some(info.image_id),
            filename: Some(info.filename),
            mime_type: Some(info.format.mime_type().to_string()),
            format: Some(info.format),
            error: None,
        },
        Err(e) => TaskResultMessage {
            task_id: outcome.task_id,
            batch_id: outcome.batch_id,
            success: false,
            image_id: None,
            download_url: None,
            filename: Some(outcome.filename),
            format: None,
            mime_type: None,
            error: Some(e.to_string()),
        },
    }
}

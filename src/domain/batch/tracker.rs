//! Batch Tracker

use thiserror::Error;

/// 批次 ID（会话内唯一）
pub type BatchId = u64;

/// 任务 ID（会话内唯一）
pub type TaskId = u64;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    #[error("Batch {batch_id} declared {expected} images but received more")]
    Overflow { batch_id: BatchId, expected: usize },

    #[error("Batch {0} is already complete")]
    AlreadyComplete(BatchId),

    #[error("Batch {0} recorded more outcomes than received images")]
    UnexpectedOutcome(BatchId),
}

/// 单个任务的结束记录
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskRecord {
    pub task_id: TaskId,
    pub success: bool,
}

/// 批次完成摘要
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchSummary {
    pub batch_id: BatchId,
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
}

/// 批次跟踪器
///
/// 不变量: completed <= received <= expected；`completed == expected` 时转为完成，且只转换一次
#[derive(Debug, Clone)]
pub struct BatchTracker {
    batch_id: BatchId,
    declared: usize,
    expected: usize,
    received: usize,
    ended: bool,
    complete: bool,
    records: Vec<TaskRecord>,
}

impl BatchTracker {
    pub fn new(batch_id: BatchId, declared: usize) -> Self {
        Self {
            batch_id,
            declared,
            expected: declared,
            received: 0,
            ended: false,
            complete: false,
            records: Vec::with_capacity(declared),
        }
    }

    pub fn batch_id(&self) -> BatchId {
        self.batch_id
    }

    pub fn declared(&self) -> usize {
        self.declared
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    pub fn received(&self) -> usize {
        self.received
    }

    pub fn completed_count(&self) -> usize {
        self.records.len()
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// 所有声明的图片都已到达
    pub fn is_full(&self) -> bool {
        self.received >= self.expected
    }

    /// 按完成顺序排列的任务记录
    pub fn records(&self) -> &[TaskRecord] {
        &self.records
    }

    /// 登记一张已接收的图片
    pub fn register_image(&mut self) -> Result<(), BatchError> {
        if self.complete {
            return Err(BatchError::AlreadyComplete(self.batch_id));
        }
        if self.received >= self.expected {
            return Err(BatchError::Overflow {
                batch_id: self.batch_id,
                expected: self.expected,
            });
        }
        self.received += 1;
        Ok(())
    }

    /// 标记收到 batch_end
    ///
    /// 声明数量为 0 的批次在此时完成
    pub fn mark_ended(&mut self) -> Option<BatchSummary> {
        self.ended = true;
        self.check_complete()
    }

    /// 记录一个任务结束（成功或失败），如果批次因此完成则返回摘要
    pub fn record(&mut self, task_id: TaskId, success: bool) -> Result<Option<BatchSummary>, BatchError> {
        if self.complete {
            return Err(BatchError::AlreadyComplete(self.batch_id));
        }
        if self.records.len() >= self.received {
            return Err(BatchError::UnexpectedOutcome(self.batch_id));
        }
        self.records.push(TaskRecord { task_id, success });
        Ok(self.check_complete())
    }

    /// 宽限期结束：期望数量收缩为实际接收数量
    ///
    /// 未到达的图片既不算成功也不算失败
    pub fn shrink_to_received(&mut self) -> Option<BatchSummary> {
        if self.complete {
            return None;
        }
        self.ended = true;
        self.expected = self.received;
        self.check_complete()
    }

    pub fn summary(&self) -> BatchSummary {
        let successful = self.records.iter().filter(|r| r.success).count();
        BatchSummary {
            batch_id: self.batch_id,
            total: self.expected,
            successful,
            failed: self.records.len() - successful,
        }
    }

    fn check_complete(&mut self) -> Option<BatchSummary> {
        if self.complete || self.records.len() != self.expected {
            return None;
        }
        // 声明 0 张的批次要等 batch_end 才算完成
        if self.expected == 0 && !self.ended {
            return None;
        }
        self.complete = true;
        Some(self.summary())
    }
}

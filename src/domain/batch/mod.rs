//! Batch Context - 批次完成跟踪
//!
//! 一个批次是客户端声明的一组图片，所有图片结束（成功或失败）后恰好触发一次完成事件

mod tracker;

pub use tracker::{BatchError, BatchId, BatchSummary, BatchTracker, TaskId, TaskRecord};

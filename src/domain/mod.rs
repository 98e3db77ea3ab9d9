//! Domain Layer - 领域层
//!
//! 包含两个限界上下文:
//! - Image Context: 处理选项与处理错误
//! - Batch Context: 批次完成跟踪

pub mod batch;
pub mod image;

//! Image Context - Errors

use thiserror::Error;

/// 处理选项解析错误
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OptionError {
    #[error("backgroundColor must be 'transparent', 'white', or 'black', got '{0}'")]
    InvalidBackgroundColor(String),

    #[error("fileType must be 'PNG' or 'JPEG', got '{0}'")]
    InvalidOutputFormat(String),

    #[error("watermark must be 'none' or 'applied', got '{0}'")]
    InvalidWatermark(String),
}

/// 单张图片处理错误
///
/// 只影响所属的任务，不会向批次或会话传播
#[derive(Debug, Clone, Error)]
pub enum ProcessingError {
    /// 无法解码的图片数据
    #[error("Failed to decode image: {0}")]
    Decode(String),

    /// 抠图模型调用失败
    #[error("Background removal failed: {0}")]
    Removal(String),

    /// 输出编码失败
    #[error("Failed to encode image: {0}")]
    Encode(String),

    #[error("Internal processing error: {0}")]
    Internal(String),
}

impl ProcessingError {
    pub fn kind(&self) -> &'static str {
        match self {
            ProcessingError::Decode(_) => "decode",
            ProcessingError::Removal(_) => "removal",
            ProcessingError::Encode(_) => "encode",
            ProcessingError::Internal(_) => "internal",
        }
    }
}

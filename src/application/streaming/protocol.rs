//! WebSocket 流式协议
//!
//! 入站/出站消息都以 `type` 字段区分；图片元数据之后必须紧跟一帧二进制数据

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::batch::{BatchId, TaskId};
use crate::domain::image::OutputFormat;

/// 协议违规：发送 error 消息后关闭会话
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Malformed message: {0}")]
    Malformed(String),

    #[error("Unexpected message: {0}")]
    UnexpectedMessage(String),

    #[error("Binary frame received without preceding image_metadata")]
    UnexpectedBinary,

    #[error("Expected binary image data for task {0}")]
    MissingBinary(TaskId),

    #[error("Unknown batch: {0}")]
    UnknownBatch(BatchId),

    #[error("Batch {0} is already active")]
    DuplicateBatch(BatchId),

    #[error("Task {0} is already active")]
    DuplicateTask(TaskId),

    #[error("Batch {batch_id} declared {expected} images but received more")]
    BatchOverflow { batch_id: BatchId, expected: usize },

    #[error("Declared batch size {declared} exceeds limit {limit}")]
    BatchTooLarge { declared: usize, limit: usize },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

/// 配置消息（连接后第一条消息，之后可重复发送以重新配置）
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigMessage {
    pub background_color: Option<String>,
    pub file_type: Option<String>,
    pub watermark: Option<String>,
    pub batch_size: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStartMessage {
    pub batch_id: Option<BatchId>,
    pub batch_size: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageMetadataMessage {
    pub filename: Option<String>,
    pub task_id: Option<TaskId>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchEndMessage {
    pub batch_id: Option<BatchId>,
}

/// 入站文本消息
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundMessage {
    Config(ConfigMessage),
    BatchStart(BatchStartMessage),
    ImageMetadata(ImageMetadataMessage),
    BatchEnd(BatchEndMessage),
    Close,
}

impl InboundMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            InboundMessage::Config(_) => "config",
            InboundMessage::BatchStart(_) => "batch_start",
            InboundMessage::ImageMetadata(_) => "image_metadata",
            InboundMessage::BatchEnd(_) => "batch_end",
            InboundMessage::Close => "close",
        }
    }
}

/// 解析入站文本帧
///
/// `allow_untyped` 为 true 时（第一条配置消息）缺少 `type` 字段按 config 处理
pub fn parse_text(text: &str, allow_untyped: bool) -> Result<InboundMessage, ProtocolError> {
    let mut value: serde_json::Value =
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

    let object = value
        .as_object_mut()
        .ok_or_else(|| ProtocolError::Malformed("expected a JSON object".to_string()))?;

    if allow_untyped && !object.contains_key("type") {
        object.insert("type".to_string(), serde_json::Value::from("config"));
    }

    serde_json::from_value(value).map_err(|e| ProtocolError::Malformed(e.to_string()))
}

/// 单个任务的结束事件
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResultMessage {
    pub task_id: TaskId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub batch_id: Option<BatchId>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<OutputFormat>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// 出站消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum OutboundMessage {
    ImageReceived {
        task_id: TaskId,
        filename: String,
    },
    BatchStarted {
        batch_id: BatchId,
        batch_size: usize,
    },
    BatchQueued {
        batch_id: BatchId,
        received: usize,
    },
    BatchRejected {
        batch_id: BatchId,
        reason: String,
    },
    TaskResult(TaskResultMessage),
    BatchComplete {
        batch_id: BatchId,
        total: usize,
        successful: usize,
        failed: usize,
    },
    ConfigUpdated {
        background_color: String,
        file_type: String,
        watermark: String,
        batch_size: usize,
    },
    Error {
        message: String,
    },
}

impl OutboundMessage {
    pub fn error(err: &ProtocolError) -> Self {
        OutboundMessage::Error {
            message: err.to_string(),
        }
    }

    pub fn to_json(&self) -> String {
        // 所有字段都是可序列化的基础类型
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"type":"error","message":"serialization failed: {}"}}"#, e)
        })
    }
}

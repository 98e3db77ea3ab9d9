//! 应用层 - 用例编排
//!
//! 包含：
//! - ports: 六边形架构端口定义（BackgroundRemover、ImageProcessor、ImageStore、TaskQueue、SessionManager）
//! - commands: CQRS 命令及处理器
//! - queries: CQRS 查询及处理器
//! - streaming: WebSocket 多图流式协议与会话状态机
//! - error: 应用层错误定义

pub mod commands;
pub mod error;
pub mod ports;
pub mod queries;
pub mod streaming;

// Re-exports
pub use commands::{
    handlers::{CloseSessionHandler, ProcessBatchHandler, ProcessImageHandler},
    BatchImage, BatchItemResult, CloseSessionCommand, CloseSessionResponse, ProcessBatchCommand,
    ProcessBatchResponse, ProcessImageCommand, ProcessImageResponse,
};

pub use error::ApplicationError;

pub use ports::{
    // Background remover
    BackgroundRemoverPort,
    RemoverError,
    // Image processor
    ImageProcessorPort,
    ProcessedImage,
    // Image store
    ImageStorePort,
    StoreError,
    StoredImage,
    // Session manager
    Session,
    SessionError,
    SessionManagerPort,
    // Task queue
    ProcessedImageInfo,
    QueueError,
    QueuedTask,
    TaskOutcome,
    TaskQueuePort,
    TaskState,
    TaskUnit,
};

pub use queries::{
    handlers::GetProcessedImageHandler, GetProcessedImageQuery, GetProcessedImageResponse,
};

pub use streaming::{ConnectionSession, OutboundMessage, ProtocolError, StreamLimits};

//! Streaming - 多图流式处理
//!
//! - protocol: 入站/出站消息
//! - session: 单连接协议状态机
//! - emitter: 任务结果与批次完成事件

mod emitter;
mod protocol;
mod session;

pub use emitter::ResultEmitter;
pub use protocol::{
    parse_text, BatchEndMessage, BatchStartMessage, ConfigMessage, ImageMetadataMessage,
    InboundMessage, OutboundMessage, ProtocolError, TaskResultMessage,
};
pub use session::{ConnectionSession, SessionConfig, SessionState, StreamLimits};

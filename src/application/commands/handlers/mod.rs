//! Command Handlers 实现
//!
//! 所有 CommandHandler 的具体实现

mod image_command_handlers;
mod session_command_handlers;

pub use image_command_handlers::*;
pub use session_command_handlers::*;

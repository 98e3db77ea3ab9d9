//! Image Context - 图像处理上下文
//!
//! 职责:
//! - 处理选项（背景色、输出格式、水印）
//! - 处理错误分类

mod errors;
mod value_objects;

pub use errors::{OptionError, ProcessingError};
pub use value_objects::{BackgroundColor, OutputFormat, ProcessingOptions, Watermark};

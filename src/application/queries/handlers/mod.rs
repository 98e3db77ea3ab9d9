//! Query Handlers 实现

mod image_handlers;

pub use image_handlers::*;

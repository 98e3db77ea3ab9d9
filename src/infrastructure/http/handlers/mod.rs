//! HTTP Handlers

mod health;
mod image;
mod websocket;

pub use health::*;
pub use image::*;
pub use websocket::*;

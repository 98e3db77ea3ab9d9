//! Imaging Adapter - 图片处理流程与水印

mod image_pipeline;
mod watermark;

pub use image_pipeline::{
    decode_and_fit, encode, fit_within, flatten, ImagePipelineConfig, RemovalImageProcessor,
};
pub use watermark::apply_watermark;

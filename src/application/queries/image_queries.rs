//! Image Queries - 处理结果查询

use crate::domain::image::OutputFormat;

/// 获取处理结果查询
///
/// `image_id` 为空或不存在时返回最近一张
#[derive(Debug, Clone, Default)]
pub struct GetProcessedImageQuery {
    pub image_id: Option<String>,
    pub file_type: Option<OutputFormat>,
}

/// 获取处理结果响应
#[derive(Debug, Clone)]
pub struct GetProcessedImageResponse {
    pub image_id: String,
    pub data: Vec<u8>,
    pub filename: String,
    pub format: OutputFormat,
}

impl GetProcessedImageResponse {
    pub fn content_type(&self) -> &'static str {
        self.format.mime_type()
    }
}

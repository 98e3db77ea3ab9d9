//! Image Store Port - 处理结果存储
//!
//! 仅在进程生命周期内保存，供下载接口读取

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::domain::image::OutputFormat;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Image not found: {0}")]
    NotFound(String),
}

/// 已存储的图片
#[derive(Debug, Clone)]
pub struct StoredImage {
    pub image_id: String,
    pub data: Vec<u8>,
    pub filename: String,
    pub format: OutputFormat,
    pub stored_at: DateTime<Utc>,
}

impl StoredImage {
    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }
}

/// Image Store Port
pub trait ImageStorePort: Send + Sync {
    /// 保存图片，返回生成的 image_id
    fn put(&self, data: Vec<u8>, filename: String, format: OutputFormat) -> String;

    fn get(&self, image_id: &str) -> Result<StoredImage, StoreError>;

    /// 最近保存的图片
    fn latest(&self) -> Option<StoredImage>;

    fn remove(&self, image_id: &str) -> bool;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 下载地址
pub fn download_url(image_id: &str) -> String {
    format!("/api/download?imageId={}", image_id)
}

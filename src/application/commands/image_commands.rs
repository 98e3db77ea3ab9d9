//! Image Commands - REST 上传处理命令（单图与多图）

use crate::domain::image::{OutputFormat, ProcessingError, ProcessingOptions};

/// 处理单张图片命令
#[derive(Debug, Clone)]
pub struct ProcessImageCommand {
    pub filename: String,
    pub payload: Vec<u8>,
    pub options: ProcessingOptions,
}

/// 处理单张图片响应
#[derive(Debug, Clone)]
pub struct ProcessImageResponse {
    pub image_id: String,
    pub image_url: String,
    pub filename: String,
    pub format: OutputFormat,
}

/// 待处理的一张图片
#[derive(Debug, Clone)]
pub struct BatchImage {
    pub filename: String,
    pub payload: Vec<u8>,
}

/// 一次请求处理多张图片
#[derive(Debug, Clone)]
pub struct ProcessBatchCommand {
    pub images: Vec<BatchImage>,
    pub options: ProcessingOptions,
}

/// 多图中单张图片的结果
#[derive(Debug, Clone)]
pub struct BatchItemResult {
    /// 上传时的文件名
    pub filename: String,
    pub result: Result<ProcessImageResponse, ProcessingError>,
}

/// 多图处理响应，结果顺序与上传顺序一致
#[derive(Debug, Clone)]
pub struct ProcessBatchResponse {
    pub results: Vec<BatchItemResult>,
}

impl ProcessBatchResponse {
    pub fn successful(&self) -> usize {
        self.results.iter().filter(|item| item.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.successful()
    }
}

//! Image Processor Port - 单张图片的完整处理流程
//!
//! 解码 → 缩放 → 抠图 → 背景合成 → 水印 → 编码

use async_trait::async_trait;

use crate::domain::image::{OutputFormat, ProcessingError, ProcessingOptions};

/// 处理结果
#[derive(Debug, Clone)]
pub struct ProcessedImage {
    /// 编码后的图片数据
    pub data: Vec<u8>,
    /// 输出文件名（`{stem}-no-bg.{ext}`）
    pub filename: String,
    pub format: OutputFormat,
}

impl ProcessedImage {
    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }
}

/// Image Processor Port
#[async_trait]
pub trait ImageProcessorPort: Send + Sync {
    async fn process(
        &self,
        payload: Vec<u8>,
        filename: &str,
        options: ProcessingOptions,
    ) -> Result<ProcessedImage, ProcessingError>;

    /// 转换已处理图片的输出格式（下载时使用）
    async fn convert(
        &self,
        data: Vec<u8>,
        target: OutputFormat,
    ) -> Result<Vec<u8>, ProcessingError>;
}

/// 生成输出文件名
pub fn output_filename(original: &str, format: OutputFormat) -> String {
    let stem = match original.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => original,
    };
    format!("{}-no-bg.{}", stem, format.extension())
}

/// 替换文件扩展名
pub fn replace_extension(filename: &str, format: OutputFormat) -> String {
    let stem = match filename.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => filename,
    };
    format!("{}.{}", stem, format.extension())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_filename() {
        assert_eq!(output_filename("cat.jpeg", OutputFormat::Png), "cat-no-bg.png");
        assert_eq!(output_filename("a.b.c.png", OutputFormat::Jpeg), "a.b.c-no-bg.jpg");
        assert_eq!(output_filename("noext", OutputFormat::Png), "noext-no-bg.png");
        assert_eq!(output_filename(".hidden", OutputFormat::Png), ".hidden-no-bg.png");
    }

    #[test]
    fn test_replace_extension() {
        assert_eq!(replace_extension("cat-no-bg.png", OutputFormat::Jpeg), "cat-no-bg.jpg");
        assert_eq!(replace_extension("raw", OutputFormat::Png), "raw.png");
    }
}

//! Image Pipeline - 单张图片处理流程
//!
//! 解码 → 缩放 → 抠图 → 背景合成 → 水印 → 编码。CPU 密集步骤在 blocking 线程执行

use async_trait::async_trait;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage, RgbaImage};
use std::io::Cursor;
use std::sync::Arc;

use crate::application::ports::{
    output_filename, BackgroundRemoverPort, ImageProcessorPort, ProcessedImage,
};
use crate::domain::image::{OutputFormat, ProcessingError, ProcessingOptions};

use super::watermark::apply_watermark;

const WHITE: [u8; 3] = [255, 255, 255];

/// 下载转换时的 JPEG 质量
const CONVERT_JPEG_QUALITY: u8 = 95;

/// 处理流程配置
#[derive(Debug, Clone, Copy)]
pub struct ImagePipelineConfig {
    /// 长边超过此值时缩放
    pub max_dimension: u32,
    pub jpeg_quality: u8,
}

impl Default for ImagePipelineConfig {
    fn default() -> Self {
        Self {
            max_dimension: 1024,
            jpeg_quality: 85,
        }
    }
}

/// 基于 `image` crate 的处理器
pub struct RemovalImageProcessor {
    remover: Arc<dyn BackgroundRemoverPort>,
    config: ImagePipelineConfig,
}

impl RemovalImageProcessor {
    pub fn new(remover: Arc<dyn BackgroundRemoverPort>, config: ImagePipelineConfig) -> Self {
        Self { remover, config }
    }
}

#[async_trait]
impl ImageProcessorPort for RemovalImageProcessor {
    async fn process(
        &self,
        payload: Vec<u8>,
        filename: &str,
        options: ProcessingOptions,
    ) -> Result<ProcessedImage, ProcessingError> {
        let max_dimension = self.config.max_dimension;
        let image = blocking(move || decode_and_fit(&payload, max_dimension)).await??;

        let cutout = self
            .remover
            .remove(image)
            .await
            .map_err(|e| ProcessingError::Removal(e.to_string()))?;

        let quality = self.config.jpeg_quality;
        let data = blocking(move || finish(cutout, options, quality)).await??;

        Ok(ProcessedImage {
            data,
            filename: output_filename(filename, options.format),
            format: options.format,
        })
    }

    async fn convert(
        &self,
        data: Vec<u8>,
        target: OutputFormat,
    ) -> Result<Vec<u8>, ProcessingError> {
        blocking(move || {
            let image = image::load_from_memory(&data)
                .map_err(|e| ProcessingError::Decode(e.to_string()))?;
            let image = match target {
                OutputFormat::Jpeg => DynamicImage::ImageRgb8(flatten(&image.to_rgba8(), WHITE)),
                OutputFormat::Png => image,
            };
            encode(&image, target, CONVERT_JPEG_QUALITY)
        })
        .await?
    }
}

async fn blocking<T, F>(f: F) -> Result<T, ProcessingError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ProcessingError::Internal(format!("Blocking task failed: {}", e)))
}

/// 解码并把长边限制在 `max_dimension` 内（保持宽高比）
pub fn decode_and_fit(payload: &[u8], max_dimension: u32) -> Result<DynamicImage, ProcessingError> {
    if payload.is_empty() {
        return Err(ProcessingError::Decode("empty payload".to_string()));
    }
    let image =
        image::load_from_memory(payload).map_err(|e| ProcessingError::Decode(e.to_string()))?;
    Ok(fit_within(image, max_dimension))
}

pub fn fit_within(image: DynamicImage, max_dimension: u32) -> DynamicImage {
    if image.width() <= max_dimension && image.height() <= max_dimension {
        return image;
    }
    // resize 保持宽高比
    image.resize(max_dimension, max_dimension, FilterType::Lanczos3)
}

/// 按 alpha 把图片合成到纯色背景
pub fn flatten(rgba: &RgbaImage, background: [u8; 3]) -> RgbImage {
    let mut rgb = RgbImage::new(rgba.width(), rgba.height());
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let alpha = u32::from(pixel[3]);
        let mut out = [0u8; 3];
        for (i, channel) in out.iter_mut().enumerate() {
            let blended =
                (u32::from(pixel[i]) * alpha + u32::from(background[i]) * (255 - alpha) + 127) / 255;
            *channel = blended as u8;
        }
        rgb.put_pixel(x, y, Rgb(out));
    }
    rgb
}

/// 背景合成、水印、编码
fn finish(
    cutout: RgbaImage,
    options: ProcessingOptions,
    jpeg_quality: u8,
) -> Result<Vec<u8>, ProcessingError> {
    let background = match options.background.rgb() {
        Some(rgb) => Some(rgb),
        // JPEG 没有 alpha 通道
        None if !options.format.supports_alpha() => Some(WHITE),
        None => None,
    };

    let mut image = match background {
        Some(rgb) => DynamicImage::ImageRgb8(flatten(&cutout, rgb)),
        None => DynamicImage::ImageRgba8(cutout),
    };

    if options.watermark.is_applied() {
        // 水印绘制在白底上
        let mut rgb = match image {
            DynamicImage::ImageRgb8(rgb) => rgb,
            other => flatten(&other.to_rgba8(), WHITE),
        };
        apply_watermark(&mut rgb);
        image = DynamicImage::ImageRgb8(rgb);
    }

    encode(&image, options.format, jpeg_quality)
}

pub fn encode(
    image: &DynamicImage,
    format: OutputFormat,
    jpeg_quality: u8,
) -> Result<Vec<u8>, ProcessingError> {
    let mut buffer = Vec::new();
    match format {
        OutputFormat::Png => {
            image
                .write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
                .map_err(|e| ProcessingError::Encode(format!("Failed to encode PNG: {}", e)))?;
        }
        OutputFormat::Jpeg => {
            let rgb = image.to_rgb8();
            let mut encoder = JpegEncoder::new_with_quality(&mut buffer, jpeg_quality);
            encoder
                .encode_image(&rgb)
                .map_err(|e| ProcessingError::Encode(format!("Failed to encode JPEG: {}", e)))?;
        }
    }
    Ok(buffer)
}

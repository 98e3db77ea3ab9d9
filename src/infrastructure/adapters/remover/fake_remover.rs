//! Fake Remover - 本地运行用的抠图替身
//!
//! 不调用模型：把与左上角颜色相近的像素设为透明

use async_trait::async_trait;
use image::{DynamicImage, Rgba, RgbaImage};
use std::time::Duration;

use crate::application::ports::{BackgroundRemoverPort, RemoverError};

/// Fake Remover 配置
#[derive(Debug, Clone)]
pub struct FakeRemoverConfig {
    /// 模拟推理延迟
    pub latency: Duration,
    /// 每个通道允许的颜色差
    pub tolerance: u8,
}

impl Default for FakeRemoverConfig {
    fn default() -> Self {
        Self {
            latency: Duration::from_millis(200),
            tolerance: 24,
        }
    }
}

/// Fake Remover
pub struct FakeRemover {
    config: FakeRemoverConfig,
}

impl FakeRemover {
    pub fn new(config: FakeRemoverConfig) -> Self {
        tracing::info!(
            latency_ms = config.latency.as_millis() as u64,
            tolerance = config.tolerance,
            "FakeRemover initialized"
        );
        Self { config }
    }
}

/// 按左上角颜色抠图
pub fn color_key(image: &DynamicImage, tolerance: u8) -> RgbaImage {
    let mut rgba = image.to_rgba8();
    let Some(key) = rgba.get_pixel_checked(0, 0).copied() else {
        return rgba;
    };

    for pixel in rgba.pixels_mut() {
        let close = pixel
            .0
            .iter()
            .zip(key.0.iter())
            .take(3)
            .all(|(a, b)| a.abs_diff(*b) <= tolerance);
        if close {
            *pixel = Rgba([pixel[0], pixel[1], pixel[2], 0]);
        }
    }
    rgba
}

#[async_trait]
impl BackgroundRemoverPort for FakeRemover {
    async fn remove(&self, image: DynamicImage) -> Result<RgbaImage, RemoverError> {
        tracing::debug!(
            width = image.width(),
            height = image.height(),
            "FakeRemover: keying out corner colour"
        );

        // 模拟推理延迟
        tokio::time::sleep(self.config.latency).await;

        let tolerance = self.config.tolerance;
        tokio::task::spawn_blocking(move || color_key(&image, tolerance))
            .await
            .map_err(|e| RemoverError::ServiceError(e.to_string()))
    }

    fn backend_name(&self) -> &'static str {
        "fake"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn framed() -> DynamicImage {
        // 4x4 白底，中间 2x2 红色
        let mut image = RgbaImage::from_pixel(4, 4, Rgba([250, 250, 250, 255]));
        for (x, y) in [(1, 1), (1, 2), (2, 1), (2, 2)] {
            image.put_pixel(x, y, Rgba([200, 10, 10, 255]));
        }
        DynamicImage::ImageRgba8(image)
    }

    #[test]
    fn test_color_key_clears_background_only() {
        let result = color_key(&framed(), 10);
        assert_eq!(result.get_pixel(0, 0)[3], 0);
        assert_eq!(result.get_pixel(3, 3)[3], 0);
        assert_eq!(result.get_pixel(1, 1)[3], 255);
        assert_eq!(result.get_pixel(1, 1)[0], 200);
    }

    #[test]
    fn test_color_key_on_empty_image() {
        let empty = DynamicImage::ImageRgba8(RgbaImage::new(0, 0));
        assert_eq!(color_key(&empty, 10).dimensions(), (0, 0));
    }

    #[tokio::test]
    async fn test_fake_remover_keeps_dimensions() {
        let remover = FakeRemover::new(FakeRemoverConfig {
            latency: Duration::from_millis(1),
            tolerance: 10,
        });
        let result = remover.remove(framed()).await.unwrap();
        assert_eq!(result.dimensions(), (4, 4));
        assert_eq!(remover.backend_name(), "fake");
        assert!(remover.health_check().await);
    }
}

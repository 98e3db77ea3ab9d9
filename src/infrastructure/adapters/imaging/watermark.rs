//! Watermark - 右下角半透明徽标
//!
//! 深色半透明底板 + 三个白色圆环（旋钮造型）

use image::{Rgb, RgbImage};

/// 底板不透明度 (0-255)
const BADGE_ALPHA: u16 = 150;
const RING_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

/// 徽标几何尺寸（像素）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BadgeLayout {
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    ring_radius: u32,
    ring_spacing: u32,
}

fn layout(image_width: u32, image_height: u32) -> Option<BadgeLayout> {
    let ring_radius = (image_width * 8 / 1000).max(4);
    let ring_spacing = ring_radius * 5 / 2;
    let inner = 8;
    let width = ring_radius * 6 + ring_spacing * 2 + inner * 2;
    let height = ring_radius * 2 + inner * 2;
    let margin = (image_width * 2 / 100).max(10);

    let x = image_width.checked_sub(width + margin)?;
    let y = image_height.checked_sub(height + margin)?;
    Some(BadgeLayout {
        x,
        y,
        width,
        height,
        ring_radius,
        ring_spacing,
    })
}

/// 在图片右下角绘制水印，图片过小时不绘制
pub fn apply_watermark(image: &mut RgbImage) {
    let Some(badge) = layout(image.width(), image.height()) else {
        tracing::debug!(
            width = image.width(),
            height = image.height(),
            "Image too small for watermark"
        );
        return;
    };

    // 底板：与黑色按 BADGE_ALPHA 混合
    for y in badge.y..badge.y + badge.height {
        for x in badge.x..badge.x + badge.width {
            let pixel = image.get_pixel_mut(x, y);
            for channel in pixel.0.iter_mut() {
                *channel = (u16::from(*channel) * (255 - BADGE_ALPHA) / 255) as u8;
            }
        }
    }

    // 三个圆环
    let r = badge.ring_radius as f32;
    let cy = (badge.y + badge.height / 2) as f32;
    let first_cx = (badge.x + 8 + badge.ring_radius) as f32;
    let step = (badge.ring_radius * 2 + badge.ring_spacing) as f32;

    for i in 0..3 {
        let cx = first_cx + step * i as f32;
        for y in badge.y..badge.y + badge.height {
            for x in badge.x..badge.x + badge.width {
                let dx = x as f32 + 0.5 - cx;
                let dy = y as f32 + 0.5 - cy;
                let distance = (dx * dx + dy * dy).sqrt();
                if (distance - r).abs() <= 0.75 {
                    image.put_pixel(x, y, RING_COLOR);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watermark_darkens_bottom_right_only() {
        let mut image = RgbImage::from_pixel(400, 300, Rgb([255, 255, 255]));
        apply_watermark(&mut image);

        assert_eq!(*image.get_pixel(0, 0), Rgb([255, 255, 255]));
        let badge = layout(400, 300).unwrap();
        // 底板左上角不在圆环上
        let corner = image.get_pixel(badge.x, badge.y);
        assert!(corner[0] < 255);
        // 页边距内不受影响
        assert_eq!(*image.get_pixel(399, 299), Rgb([255, 255, 255]));
    }

    #[test]
    fn test_watermark_draws_rings() {
        let mut image = RgbImage::from_pixel(400, 300, Rgb([0, 0, 0]));
        apply_watermark(&mut image);

        let white = image.pixels().filter(|p| **p == RING_COLOR).count();
        assert!(white > 0);
    }

    #[test]
    fn test_tiny_image_is_untouched() {
        let mut image = RgbImage::from_pixel(20, 20, Rgb([10, 20, 30]));
        apply_watermark(&mut image);
        assert!(image.pixels().all(|p| *p == Rgb([10, 20, 30])));
    }
}

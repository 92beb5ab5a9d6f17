//! Frame type and pixel conversion: YUYV → RGB, dark detection, downsampling.

use image::imageops::{self, FilterType};
use image::{Rgb, RgbImage};

/// Fraction of near-black pixels above which a frame counts as dark.
pub const DARK_FRAME_THRESHOLD: f32 = 0.95;

/// A captured RGB camera frame.
#[derive(Clone)]
pub struct Frame {
    pub image: RgbImage,
    pub sequence: u32,
}

impl Frame {
    pub fn new(image: RgbImage, sequence: u32) -> Self {
        Self { image, sequence }
    }

    /// Average luma (0.0 to 255.0).
    pub fn avg_brightness(&self) -> f32 {
        let n = pixel_count(&self.image);
        if n == 0 {
            return 0.0;
        }
        self.image.pixels().map(|p| luma(p) as f32).sum::<f32>() / n as f32
    }

    pub fn is_dark(&self) -> bool {
        is_dark_frame(&self.image, DARK_FRAME_THRESHOLD)
    }

    /// Shrink by an integer `factor` for faster detection. `factor <= 1` copies.
    pub fn downscaled(&self, factor: u32) -> RgbImage {
        downscale(&self.image, factor)
    }
}

/// Shrink an image by an integer factor with bilinear filtering.
pub fn downscale(image: &RgbImage, factor: u32) -> RgbImage {
    if factor <= 1 {
        return image.clone();
    }
    let w = (image.width() / factor).max(1);
    let h = (image.height() / factor).max(1);
    imageops::resize(image, w, h, FilterType::Triangle)
}

fn pixel_count(image: &RgbImage) -> usize {
    image.width() as usize * image.height() as usize
}

/// BT.601 luma of an RGB pixel.
fn luma(p: &Rgb<u8>) -> u8 {
    let [r, g, b] = p.0;
    ((299 * r as u32 + 587 * g as u32 + 114 * b as u32) / 1000) as u8
}

/// Convert packed YUYV (4:2:2) to RGB using BT.601 limited-range coefficients.
///
/// Two pixels per 4 bytes: [Y0, U, Y1, V], sharing chroma.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<RgbImage, FrameError> {
    let expected = (width * height * 2) as usize;
    if width % 2 != 0 {
        return Err(FrameError::OddWidth(width));
    }
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for chunk in yuyv[..expected].chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        rgb.extend_from_slice(&ycbcr_to_rgb(y0, u, v));
        rgb.extend_from_slice(&ycbcr_to_rgb(y1, u, v));
    }

    RgbImage::from_raw(width, height, rgb).ok_or(FrameError::InvalidLength {
        expected,
        actual: yuyv.len(),
    })
}

fn ycbcr_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = (y as i32 - 16) * 298;
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    let clamp = |x: i32| ((x + 128) >> 8).clamp(0, 255) as u8;
    [
        clamp(c + 409 * e),
        clamp(c - 100 * d - 208 * e),
        clamp(c + 516 * d),
    ]
}

/// Check whether more than `threshold_pct` of pixels are near black (luma < 32).
pub fn is_dark_frame(image: &RgbImage, threshold_pct: f32) -> bool {
    let total = pixel_count(image);
    if total == 0 {
        return true;
    }
    let dark = image.pixels().filter(|p| luma(p) < 32).count();
    (dark as f32 / total as f32) > threshold_pct
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid YUYV length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("YUYV frames need an even width, got {0}")]
    OddWidth(u32),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yuyv_to_rgb_grey_levels() {
        // Neutral chroma → grey output; Y=16 is black, Y=235 is white.
        let yuyv = vec![16, 128, 235, 128];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        assert_eq!(rgb.get_pixel(0, 0).0, [0, 0, 0]);
        assert_eq!(rgb.get_pixel(1, 0).0, [255, 255, 255]);
    }

    #[test]
    fn test_yuyv_to_rgb_red_chroma() {
        // High V pushes towards red.
        let yuyv = vec![81, 90, 81, 240];
        let rgb = yuyv_to_rgb(&yuyv, 2, 1).unwrap();
        let [r, g, b] = rgb.get_pixel(0, 0).0;
        assert!(r > 200 && g < 50 && b < 50, "got ({r}, {g}, {b})");
    }

    #[test]
    fn test_yuyv_invalid_length() {
        assert!(matches!(
            yuyv_to_rgb(&[100, 128], 2, 1),
            Err(FrameError::InvalidLength { expected: 4, actual: 2 })
        ));
    }

    #[test]
    fn test_yuyv_odd_width() {
        assert!(matches!(yuyv_to_rgb(&[0; 6], 3, 1), Err(FrameError::OddWidth(3))));
    }

    #[test]
    fn test_dark_frame_all_black() {
        assert!(is_dark_frame(&RgbImage::new(10, 10), 0.95));
    }

    #[test]
    fn test_dark_frame_normal() {
        let img = RgbImage::from_pixel(10, 10, Rgb([128, 128, 128]));
        assert!(!is_dark_frame(&img, 0.95));
    }

    #[test]
    fn test_dark_frame_empty() {
        assert!(is_dark_frame(&RgbImage::new(0, 0), 0.95));
    }

    #[test]
    fn test_dark_frame_borderline_bright() {
        // 94% dark, 6% bright → not dark.
        let mut img = RgbImage::from_pixel(100, 10, Rgb([10, 10, 10]));
        for x in 0..60 {
            img.put_pixel(x, 9, Rgb([128, 128, 128]));
        }
        assert!(!is_dark_frame(&img, 0.95));
    }

    #[test]
    fn test_downscale_quarter() {
        let frame = Frame::new(RgbImage::from_pixel(640, 480, Rgb([50, 60, 70])), 0);
        let small = frame.downscaled(4);
        assert_eq!(small.dimensions(), (160, 120));
        assert_eq!(small.get_pixel(80, 60).0, [50, 60, 70]);
    }

    #[test]
    fn test_downscale_factor_one_is_copy() {
        let frame = Frame::new(RgbImage::from_pixel(8, 6, Rgb([1, 2, 3])), 7);
        assert_eq!(frame.downscaled(1), frame.image);
        assert_eq!(frame.sequence, 7);
    }

    #[test]
    fn test_avg_brightness() {
        let frame = Frame::new(RgbImage::from_pixel(4, 4, Rgb([100, 100, 100])), 0);
        assert!((frame.avg_brightness() - 100.0).abs() < 1.0);
        assert!(!frame.is_dark());
    }
}

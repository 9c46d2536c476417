//! Tissue detection on downsampled slide thumbnails.
//!
//! A detector maps an RGB thumbnail to a boolean foreground mask of the same
//! shape. The indexing stage uses the mask to zero label cells that fall on
//! glass, so that background never produces patches.

use image::{GrayImage, Luma, RgbImage};
use imageproc::contrast::otsu_level;
use ndarray::Array2;

/// Classifies thumbnail pixels as tissue (`true`) or background (`false`).
pub trait TissueDetector: Send + Sync {
    /// Mask of shape `(height, width)`.
    fn detect(&self, image: &RgbImage) -> Array2<bool>;
}

/// Default detector: Otsu thresholds on hue and saturation.
///
/// The thumbnail is converted to HSV, an Otsu threshold is computed
/// independently for the hue and saturation channels, and a pixel is tissue
/// when either channel is above its threshold. Stained tissue is strongly
/// saturated while glass is close to white.
///
/// A channel with a single value everywhere carries no contrast and
/// contributes no foreground.
#[derive(Debug, Clone, Copy, Default)]
pub struct OtsuTissueDetector;

impl TissueDetector for OtsuTissueDetector {
    fn detect(&self, image: &RgbImage) -> Array2<bool> {
        let (width, height) = image.dimensions();
        let mut hue = GrayImage::new(width, height);
        let mut saturation = GrayImage::new(width, height);

        for (x, y, pixel) in image.enumerate_pixels() {
            let (h, s, _) = rgb_to_hsv(pixel.0);
            hue.put_pixel(x, y, Luma([quantize(h)]));
            saturation.put_pixel(x, y, Luma([quantize(s)]));
        }

        let hue_mask = threshold_mask(&hue);
        let saturation_mask = threshold_mask(&saturation);

        Array2::from_shape_fn((height as usize, width as usize), |(row, col)| {
            hue_mask[(row, col)] || saturation_mask[(row, col)]
        })
    }
}

/// Treats every pixel as tissue.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllTissue;

impl TissueDetector for AllTissue {
    fn detect(&self, image: &RgbImage) -> Array2<bool> {
        let (width, height) = image.dimensions();
        Array2::from_elem((height as usize, width as usize), true)
    }
}

fn threshold_mask(channel: &GrayImage) -> Array2<bool> {
    let (width, height) = channel.dimensions();
    let shape = (height as usize, width as usize);

    let mut values = channel.pixels().map(|p| p[0]);
    let first = values.next();
    if first.is_none() || values.all(|v| Some(v) == first) {
        return Array2::from_elem(shape, false);
    }

    let level = otsu_level(channel);
    Array2::from_shape_fn(shape, |(row, col)| {
        channel.get_pixel(col as u32, row as u32)[0] > level
    })
}

fn quantize(value: f32) -> u8 {
    (value.clamp(0.0, 1.0) * 255.0).round() as u8
}

/// RGB to HSV with all channels in `[0, 1]`.
fn rgb_to_hsv([r, g, b]: [u8; 3]) -> (f32, f32, f32) {
    let r = r as f32 / 255.0;
    let g = g as f32 / 255.0;
    let b = b as f32 / 255.0;

    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let saturation = if max == 0.0 { 0.0 } else { delta / max };

    let hue = if delta == 0.0 {
        0.0
    } else if max == r {
        ((g - b) / delta).rem_euclid(6.0) / 6.0
    } else if max == g {
        ((b - r) / delta + 2.0) / 6.0
    } else {
        ((r - g) / delta + 4.0) / 6.0
    };

    (hue, saturation, max)
}

//! Captured frames.
//!
//! - `Frame`: packed RGB24 pixels plus dimensions, as produced by an ingest source.
//! - `LumaStats`: coarse luminance statistics that backends use for face presence
//!   and feature extraction.
//!
//! Frames are handed from the source to exactly one backend call and dropped after
//! the tick. Nothing in the pipeline stores pixels.

use image::{imageops, GrayImage, RgbImage};

use crate::error::{MoodError, Result};

/// A single captured frame with packed RGB24 data (`width * height * 3` bytes).
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
        }
    }

    /// A frame with every pixel set to the same color.
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let pixels = (width as usize) * (height as usize);
        let mut data = Vec::with_capacity(pixels * 3);
        for _ in 0..pixels {
            data.extend_from_slice(&rgb);
        }
        Self::new(data, width, height)
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    /// Expected buffer length for the declared dimensions.
    pub fn expected_len(&self) -> Option<usize> {
        (self.width as usize)
            .checked_mul(self.height as usize)
            .and_then(|v| v.checked_mul(3))
    }

    /// Wrap the buffer as an `RgbImage`. Fails on corrupt frames (empty or length mismatch).
    pub fn to_rgb_image(&self) -> Result<RgbImage> {
        if self.width == 0 || self.height == 0 {
            return Err(MoodError::Inference(format!(
                "frame has empty dimensions {}x{}",
                self.width, self.height
            )));
        }
        let expected = self
            .expected_len()
            .ok_or_else(|| MoodError::Inference("frame dimensions overflow".into()))?;
        if self.data.len() != expected {
            return Err(MoodError::Inference(format!(
                "expected {} RGB bytes, received {}",
                expected,
                self.data.len()
            )));
        }
        RgbImage::from_raw(self.width, self.height, self.data.clone())
            .ok_or_else(|| MoodError::Inference("frame buffer rejected by image decoder".into()))
    }

    /// Grayscale view of the frame.
    pub fn to_luma(&self) -> Result<GrayImage> {
        let rgb = self.to_rgb_image()?;
        Ok(imageops::grayscale(&rgb))
    }

    /// Grayscale center square, resized to `side x side`. Used as the face crop.
    pub fn center_crop_luma(&self, side: u32) -> Result<GrayImage> {
        let luma = self.to_luma()?;
        let edge = luma.width().min(luma.height());
        let x = (luma.width() - edge) / 2;
        let y = (luma.height() - edge) / 2;
        let crop = imageops::crop_imm(&luma, x, y, edge, edge).to_image();
        Ok(imageops::resize(
            &crop,
            side,
            side,
            imageops::FilterType::Triangle,
        ))
    }
}

/// Coarse luminance statistics over a grayscale image, all in 0..=255 units.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LumaStats {
    pub mean: f32,
    pub std_dev: f32,
    /// Mean of the upper half minus mean of the lower half.
    pub vertical_gradient: f32,
    /// Mean absolute difference between mirrored left/right pixels.
    pub asymmetry: f32,
}

impl LumaStats {
    pub fn from_luma(image: &GrayImage) -> Self {
        let (w, h) = image.dimensions();
        let count = (w as usize) * (h as usize);
        if count == 0 {
            return Self::default();
        }

        let mut sum = 0f64;
        let mut sum_sq = 0f64;
        let mut upper = 0f64;
        let mut lower = 0f64;
        let mut upper_count = 0usize;
        let mut lower_count = 0usize;
        let mut asym = 0f64;

        for (x, y, pixel) in image.enumerate_pixels() {
            let v = pixel[0] as f64;
            sum += v;
            sum_sq += v * v;
            if y < h / 2 {
                upper += v;
                upper_count += 1;
            } else {
                lower += v;
                lower_count += 1;
            }
            if x < w / 2 {
                let mirrored = image.get_pixel(w - 1 - x, y)[0] as f64;
                asym += (v - mirrored).abs();
            }
        }

        let mean = sum / count as f64;
        let variance = (sum_sq / count as f64 - mean * mean).max(0.0);
        let upper_mean = if upper_count > 0 {
            upper / upper_count as f64
        } else {
            0.0
        };
        let lower_mean = if lower_count > 0 {
            lower / lower_count as f64
        } else {
            0.0
        };
        let half = ((w / 2) as usize * h as usize).max(1);

        Self {
            mean: mean as f32,
            std_dev: variance.sqrt() as f32,
            vertical_gradient: (upper_mean - lower_mean) as f32,
            asymmetry: (asym / half as f64) as f32,
        }
    }
}

/// Face presence gate shared by the backends.
///
/// A nearly uniform center region (covered lens, blank frame) is treated as "no face".
pub fn face_present(stats: &LumaStats, threshold: f32) -> bool {
    stats.std_dev >= threshold
}

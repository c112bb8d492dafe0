//! Synthetic camera.
//!
//! Generates deterministic frames for tests and demos. Most frames carry a
//! textured "scene"; every `BLANK_EVERY`th frame is uniform gray so the
//! no-face path is exercised.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::FrameSource;
use crate::error::{MoodError, Result};
use crate::frame::Frame;

/// Number of synthetic devices; valid indices are `0..SYNTHETIC_DEVICE_COUNT`.
pub const SYNTHETIC_DEVICE_COUNT: u32 = 1;

const BLANK_EVERY: u64 = 10;
const SCENE_EVERY: u64 = 25;

pub struct SyntheticCamera {
    device_index: u32,
    width: u32,
    height: u32,
    frame_count: u64,
    scene_state: u8,
    rng: StdRng,
    open: bool,
}

impl SyntheticCamera {
    pub fn open(device_index: u32, width: u32, height: u32) -> Result<Self> {
        if device_index >= SYNTHETIC_DEVICE_COUNT {
            return Err(MoodError::DeviceUnavailable {
                index: device_index,
                reason: format!(
                    "synthetic camera exposes {} device(s)",
                    SYNTHETIC_DEVICE_COUNT
                ),
            });
        }
        if width == 0 || height == 0 {
            return Err(MoodError::DeviceUnavailable {
                index: device_index,
                reason: format!("unsupported resolution {}x{}", width, height),
            });
        }
        log::info!(
            "SyntheticCamera: opened device {} ({}x{})",
            device_index,
            width,
            height
        );
        Ok(Self {
            device_index,
            width,
            height,
            frame_count: 0,
            scene_state: 0,
            rng: StdRng::seed_from_u64(device_index as u64),
            open: true,
        })
    }

    pub fn frames_captured(&self) -> u64 {
        self.frame_count
    }

    fn generate_pixels(&mut self) -> Vec<u8> {
        let pixel_count = (self.width as usize) * (self.height as usize);

        if self.frame_count % BLANK_EVERY == 0 {
            return vec![128u8; pixel_count * 3];
        }
        if self.frame_count % SCENE_EVERY == 0 {
            self.scene_state = self.scene_state.wrapping_add(37);
        }

        let mut pixels = Vec::with_capacity(pixel_count * 3);
        let w = self.width as u64;
        for i in 0..pixel_count as u64 {
            let (x, y) = (i % w, i / w);
            let base = (x * 3 + y * 5 + self.scene_state as u64) % 256;
            let noise: u8 = self.rng.gen_range(0..8);
            let v = (base as u8).wrapping_add(noise);
            pixels.extend_from_slice(&[v, v.wrapping_add(self.scene_state), v / 2]);
        }
        pixels
    }
}

impl FrameSource for SyntheticCamera {
    fn next_frame(&mut self) -> Result<Frame> {
        if !self.open {
            return Err(MoodError::Capture(format!(
                "synthetic camera {} is closed",
                self.device_index
            )));
        }
        self.frame_count += 1;
        let pixels = self.generate_pixels();
        Ok(Frame::new(pixels, self.width, self.height))
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn describe(&self) -> String {
        format!("synthetic:{}", self.device_index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{face_present, LumaStats};

    #[test]
    fn synthetic_camera_produces_frames() -> Result<()> {
        let mut camera = SyntheticCamera::open(0, 64, 48)?;
        let frame = camera.next_frame()?;
        assert_eq!(frame.width, 64);
        assert_eq!(frame.height, 48);
        assert_eq!(frame.pixels().len(), 64 * 48 * 3);
        Ok(())
    }

    #[test]
    fn every_tenth_frame_is_blank() -> Result<()> {
        let mut camera = SyntheticCamera::open(0, 32, 32)?;
        for n in 1..=BLANK_EVERY {
            let frame = camera.next_frame()?;
            let stats = LumaStats::from_luma(&frame.to_luma()?);
            assert_eq!(face_present(&stats, 12.0), n != BLANK_EVERY);
        }
        assert_eq!(camera.frames_captured(), BLANK_EVERY);
        Ok(())
    }

    #[test]
    fn closed_camera_reports_capture_error() -> Result<()> {
        let mut camera = SyntheticCamera::open(0, 8, 8)?;
        camera.close();
        assert!(matches!(camera.next_frame(), Err(MoodError::Capture(_))));
        Ok(())
    }
}

//! Frame ingestion sources.
//!
//! This module provides camera sources for the capture session:
//! - Synthetic camera (deterministic generated frames, testing and demos)
//! - USB/V4L2 devices (feature: ingest-v4l2)
//!
//! Sources are opened by device index through a `CameraOpener` and owned by a
//! `DeviceGuard`, which releases the device exactly once on every exit path.
//!
//! The ingestion layer MUST NOT:
//! - Store captured frames to disk
//! - Retain frames beyond handoff to the session tick

mod normalize;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

pub use synthetic::SyntheticCamera;
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::V4l2Camera;

use crate::config::{CameraDriver, CameraSettings};
use crate::error::{MoodError, Result};
use crate::frame::Frame;

/// An open camera producing frames on demand.
pub trait FrameSource: Send {
    /// Block until the next frame is available.
    ///
    /// Fails with `MoodError::Capture` on disconnect or read failure.
    fn next_frame(&mut self) -> Result<Frame>;

    /// Release device resources. Called once by `DeviceGuard`.
    fn close(&mut self);

    /// Human-readable device description for logs.
    fn describe(&self) -> String;
}

/// Opens camera devices by index.
pub trait CameraOpener: Send + Sync {
    /// Fails with `MoodError::DeviceUnavailable` if the index is not a usable device.
    fn open(&self, device_index: u32) -> Result<Box<dyn FrameSource>>;
}

/// Opener backed by the configured camera driver.
#[derive(Clone, Debug)]
pub struct DeviceOpener {
    settings: CameraSettings,
}

impl DeviceOpener {
    pub fn new(settings: CameraSettings) -> Self {
        Self { settings }
    }

    fn resolved_driver(&self) -> CameraDriver {
        match self.settings.driver {
            CameraDriver::Auto if cfg!(feature = "ingest-v4l2") => CameraDriver::V4l2,
            CameraDriver::Auto => CameraDriver::Synthetic,
            other => other,
        }
    }
}

impl CameraOpener for DeviceOpener {
    fn open(&self, device_index: u32) -> Result<Box<dyn FrameSource>> {
        match self.resolved_driver() {
            CameraDriver::Synthetic | CameraDriver::Auto => {
                let source = SyntheticCamera::open(
                    device_index,
                    self.settings.width,
                    self.settings.height,
                )?;
                Ok(Box::new(source))
            }
            CameraDriver::V4l2 => open_v4l2(device_index, &self.settings),
        }
    }
}

#[cfg(feature = "ingest-v4l2")]
fn open_v4l2(device_index: u32, settings: &CameraSettings) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(V4l2Camera::open(device_index, settings)?))
}

#[cfg(not(feature = "ingest-v4l2"))]
fn open_v4l2(device_index: u32, _settings: &CameraSettings) -> Result<Box<dyn FrameSource>> {
    Err(MoodError::DeviceUnavailable {
        index: device_index,
        reason: "v4l2 capture requires the ingest-v4l2 feature".into(),
    })
}

/// Scoped owner of an open frame source.
///
/// `release` closes the device at most once; dropping the guard releases it if
/// that has not happened yet.
pub struct DeviceGuard {
    source: Option<Box<dyn FrameSource>>,
    description: String,
}

impl DeviceGuard {
    pub fn new(source: Box<dyn FrameSource>) -> Self {
        let description = source.describe();
        Self {
            source: Some(source),
            description,
        }
    }

    pub fn next_frame(&mut self) -> Result<Frame> {
        match self.source.as_mut() {
            Some(source) => source.next_frame(),
            None => Err(MoodError::Capture(format!(
                "{} already released",
                self.description
            ))),
        }
    }

    pub fn is_released(&self) -> bool {
        self.source.is_none()
    }

    pub fn describe(&self) -> &str {
        &self.description
    }

    /// Close the device. Returns false when it was already released.
    pub fn release(&mut self) -> bool {
        match self.source.take() {
            Some(mut source) => {
                source.close();
                log::info!("released camera {}", self.description);
                true
            }
            None => false,
        }
    }
}

impl Drop for DeviceGuard {
    fn drop(&mut self) {
        self.release();
    }
}

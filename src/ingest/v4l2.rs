//! V4L2 camera source.
//!
//! Opens `/dev/video{index}`, negotiates a capture format and streams frames
//! through memory-mapped buffers. Buffers are converted to RGB24 before they
//! leave this module.

use ouroboros::self_referencing;

use super::normalize::{normalize_to_rgb, PixelFormat};
use super::FrameSource;
use crate::config::CameraSettings;
use crate::error::{MoodError, Result};
use crate::frame::Frame;

const STREAM_BUFFERS: u32 = 4;

pub struct V4l2Camera {
    device_index: u32,
    path: String,
    state: Option<V4l2StreamState>,
    format: PixelFormat,
    width: u32,
    height: u32,
    frame_count: u64,
}

#[self_referencing]
struct V4l2StreamState {
    device: v4l::Device,
    #[borrows(mut device)]
    #[covariant]
    stream: v4l::prelude::MmapStream<'this, v4l::Device>,
}

impl V4l2Camera {
    pub fn open(device_index: u32, settings: &CameraSettings) -> Result<Self> {
        use v4l::buffer::Type;
        use v4l::video::Capture;

        let path = format!("/dev/video{}", device_index);
        let unavailable = |reason: String| MoodError::DeviceUnavailable {
            index: device_index,
            reason,
        };

        let device = v4l::Device::with_path(&path)
            .map_err(|err| unavailable(format!("open {}: {}", path, err)))?;
        let mut requested = device
            .format()
            .map_err(|err| unavailable(format!("read format: {}", err)))?;
        requested.width = settings.width;
        requested.height = settings.height;
        requested.fourcc = v4l::FourCC::new(b"YUYV");

        let negotiated = match device.set_format(&requested) {
            Ok(format) => format,
            Err(err) => {
                log::warn!("V4l2Camera: failed to set format on {}: {}", path, err);
                device
                    .format()
                    .map_err(|err| unavailable(format!("read format after set failure: {}", err)))?
            }
        };

        let format = PixelFormat::from_fourcc(&negotiated.fourcc.repr).ok_or_else(|| {
            unavailable(format!("unsupported pixel format {}", negotiated.fourcc))
        })?;

        let state = V4l2StreamStateTryBuilder {
            device,
            stream_builder: |device| {
                v4l::prelude::MmapStream::with_buffers(device, Type::VideoCapture, STREAM_BUFFERS)
            },
        }
        .try_build()
        .map_err(|err| unavailable(format!("create buffer stream: {}", err)))?;

        log::info!(
            "V4l2Camera: opened {} ({}x{} {:?})",
            path,
            negotiated.width,
            negotiated.height,
            format
        );

        Ok(Self {
            device_index,
            path,
            state: Some(state),
            format,
            width: negotiated.width,
            height: negotiated.height,
            frame_count: 0,
        })
    }
}

impl FrameSource for V4l2Camera {
    fn next_frame(&mut self) -> Result<Frame> {
        use v4l::io::traits::CaptureStream;

        let state = self
            .state
            .as_mut()
            .ok_or_else(|| MoodError::Capture(format!("{} is closed", self.path)))?;
        let (width, height, format) = (self.width, self.height, self.format);
        let pixels = state.with_stream_mut(|stream| {
            let (buf, _meta) = stream
                .next()
                .map_err(|err| MoodError::Capture(format!("capture v4l2 frame: {}", err)))?;
            normalize_to_rgb(buf, width, height, format)
        })?;

        self.frame_count += 1;
        Ok(Frame::new(pixels, width, height))
    }

    fn close(&mut self) {
        if self.state.take().is_some() {
            log::debug!(
                "V4l2Camera: closed {} after {} frames",
                self.path,
                self.frame_count
            );
        }
    }

    fn describe(&self) -> String {
        format!("v4l2:{} ({})", self.device_index, self.path)
    }
}

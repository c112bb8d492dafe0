#![cfg_attr(not(feature = "ingest-v4l2"), allow(dead_code))]

use crate::error::{MoodError, Result};

/// Capture pixel layouts the camera drivers hand back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PixelFormat {
    Rgb24,
    Yuyv,
    Nv12,
}

impl PixelFormat {
    /// Map a V4L2 fourcc to a supported layout.
    pub(crate) fn from_fourcc(fourcc: &[u8; 4]) -> Option<Self> {
        match fourcc {
            b"RGB3" => Some(PixelFormat::Rgb24),
            b"YUYV" => Some(PixelFormat::Yuyv),
            b"NV12" => Some(PixelFormat::Nv12),
            _ => None,
        }
    }
}

/// Convert a captured buffer to packed RGB24.
pub(crate) fn normalize_to_rgb(
    pixels: &[u8],
    width: u32,
    height: u32,
    format: PixelFormat,
) -> Result<Vec<u8>> {
    let w = width as usize;
    let h = height as usize;
    let plane = w
        .checked_mul(h)
        .ok_or_else(|| capture_error("frame dimensions overflow"))?;
    match format {
        PixelFormat::Rgb24 => {
            let expected = plane * 3;
            check_len("RGB", pixels.len(), expected)?;
            Ok(pixels[..expected].to_vec())
        }
        PixelFormat::Yuyv => {
            check_len("YUYV", pixels.len(), plane * 2)?;
            Ok(yuyv_to_rgb(&pixels[..plane * 2]))
        }
        PixelFormat::Nv12 => {
            let (chroma_stride, chroma_rows) = nv12_chroma_layout(w, h);
            check_len("NV12", pixels.len(), plane + chroma_stride * chroma_rows)?;
            Ok(nv12_to_rgb(pixels, w, h))
        }
    }
}

fn check_len(kind: &str, actual: usize, expected: usize) -> Result<()> {
    if actual < expected {
        return Err(capture_error(&format!(
            "{} frame length mismatch: expected {}, got {}",
            kind, expected, actual
        )));
    }
    Ok(())
}

fn capture_error(message: &str) -> MoodError {
    MoodError::Capture(message.to_string())
}

/// Packed YUYV 4:2:2: each 4-byte group holds two pixels sharing U and V.
fn yuyv_to_rgb(pixels: &[u8]) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(pixels.len() / 2 * 3);
    for chunk in pixels.chunks_exact(4) {
        let u = chunk[1] as f32 - 128.0;
        let v = chunk[3] as f32 - 128.0;
        for y in [chunk[0], chunk[2]] {
            rgb.extend_from_slice(&yuv_to_rgb(y as f32, u, v));
        }
    }
    rgb
}

/// Interleaved UV plane: one U/V pair per 2x2 block, odd edges rounded up.
fn nv12_chroma_layout(w: usize, h: usize) -> (usize, usize) {
    (w.div_ceil(2) * 2, h.div_ceil(2))
}

fn nv12_to_rgb(pixels: &[u8], w: usize, h: usize) -> Vec<u8> {
    let y_plane = w * h;
    let (chroma_stride, _) = nv12_chroma_layout(w, h);
    let mut rgb = vec![0u8; y_plane * 3];
    for j in 0..h {
        for i in 0..w {
            let y = pixels[j * w + i] as f32;
            let uv_index = y_plane + (j / 2) * chroma_stride + (i / 2) * 2;
            let u = pixels[uv_index] as f32 - 128.0;
            let v = pixels[uv_index + 1] as f32 - 128.0;
            let offset = (j * w + i) * 3;
            rgb[offset..offset + 3].copy_from_slice(&yuv_to_rgb(y, u, v));
        }
    }
    rgb
}

fn yuv_to_rgb(y: f32, u: f32, v: f32) -> [u8; 3] {
    let r = y + 1.402_f32 * v;
    let g = y - 0.344_136_f32 * u - 0.714_136_f32 * v;
    let b = y + 1.772_f32 * u;
    [clamp_to_u8(r), clamp_to_u8(g), clamp_to_u8(b)]
}

fn clamp_to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}

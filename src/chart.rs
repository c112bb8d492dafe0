//! Daily mood bar chart.
//!
//! One slot per emotion in canonical order; bar height is the emotion's share
//! of the day's labelled records. The PNG is written to a sibling temporary
//! file and renamed over the destination.

use std::fs;
use std::path::{Path, PathBuf};

use image::{ImageFormat, Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;

use crate::detect::Emotion;
use crate::error::{MoodError, Result};
use crate::summary::DailyAggregate;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const AXIS: Rgb<u8> = Rgb([40, 40, 40]);
const GRID: Rgb<u8> = Rgb([225, 225, 225]);
const DOMINANT_OUTLINE: Rgb<u8> = Rgb([0, 0, 0]);

/// Fixed bar color for an emotion.
pub fn emotion_color(emotion: Emotion) -> Rgb<u8> {
    match emotion {
        Emotion::Happy => Rgb([246, 196, 50]),
        Emotion::Sad => Rgb([66, 114, 196]),
        Emotion::Angry => Rgb([214, 54, 48]),
        Emotion::Neutral => Rgb([150, 150, 150]),
        Emotion::Surprised => Rgb([240, 128, 40]),
        Emotion::Fearful => Rgb([128, 72, 168]),
        Emotion::Disgusted => Rgb([84, 150, 72]),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChartRenderer {
    pub width: u32,
    pub height: u32,
    pub margin: u32,
}

impl Default for ChartRenderer {
    fn default() -> Self {
        Self {
            width: 640,
            height: 360,
            margin: 32,
        }
    }
}

impl ChartRenderer {
    /// Draw the chart for `aggregate` into an image.
    ///
    /// An empty day yields the frame and axes without bars.
    pub fn draw(&self, aggregate: &DailyAggregate) -> Result<RgbImage> {
        let min_side = 2 * self.margin + Emotion::ALL.len() as u32 * 4;
        if self.width < min_side || self.height < 2 * self.margin + 8 {
            return Err(MoodError::Chart(format!(
                "canvas {}x{} too small for margin {}",
                self.width, self.height, self.margin
            )));
        }

        let mut img = RgbImage::from_pixel(self.width, self.height, BACKGROUND);
        let left = self.margin as i32;
        let top = self.margin as i32;
        let plot_w = self.width - 2 * self.margin;
        let plot_h = self.height - 2 * self.margin;
        let bottom = top + plot_h as i32;

        for quarter in 1..4 {
            let y = (bottom - (plot_h as i32 * quarter) / 4) as f32;
            draw_line_segment_mut(
                &mut img,
                (left as f32, y),
                ((left + plot_w as i32) as f32, y),
                GRID,
            );
        }
        draw_hollow_rect_mut(
            &mut img,
            Rect::at(left, top).of_size(plot_w, plot_h),
            AXIS,
        );

        let slot = plot_w / Emotion::ALL.len() as u32;
        let bar_w = (slot * 2 / 3).max(1);
        for (emotion, share) in aggregate.distribution() {
            let bar_h = (share.clamp(0.0, 1.0) * (plot_h - 1) as f32).round() as u32;
            if bar_h == 0 {
                continue;
            }
            let x = left + (emotion.index() as u32 * slot + (slot - bar_w) / 2) as i32;
            let y = bottom - bar_h as i32;
            let bar = Rect::at(x, y).of_size(bar_w, bar_h);
            draw_filled_rect_mut(&mut img, bar, emotion_color(emotion));
            if aggregate.dominant_emotion == Some(emotion) {
                draw_hollow_rect_mut(&mut img, bar, DOMINANT_OUTLINE);
            }
        }

        // Axis drawn last so bars never cover it.
        draw_line_segment_mut(
            &mut img,
            (left as f32, bottom as f32),
            ((left + plot_w as i32) as f32, bottom as f32),
            AXIS,
        );
        Ok(img)
    }

    /// Render `aggregate` as a PNG at `destination`, replacing any previous chart.
    pub fn render(&self, aggregate: &DailyAggregate, destination: &Path) -> Result<()> {
        let img = self.draw(aggregate)?;

        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|err| {
                MoodError::Chart(format!("create {}: {}", parent.display(), err))
            })?;
        }

        let staging = staging_path(destination)?;
        if let Err(err) = img.save_with_format(&staging, ImageFormat::Png) {
            let _ = fs::remove_file(&staging);
            return Err(err.into());
        }
        fs::rename(&staging, destination).map_err(|err| {
            let _ = fs::remove_file(&staging);
            MoodError::Chart(format!(
                "replace {}: {}",
                destination.display(),
                err
            ))
        })?;

        log::info!(
            "rendered chart for {} ({} scans) to {}",
            aggregate.date,
            aggregate.scan_count,
            destination.display()
        );
        Ok(())
    }
}

fn staging_path(destination: &Path) -> Result<PathBuf> {
    let name = destination
        .file_name()
        .ok_or_else(|| MoodError::Chart(format!("{} has no file name", destination.display())))?;
    let mut staged = std::ffi::OsString::from(".");
    staged.push(name);
    staged.push(".tmp");
    Ok(destination.with_file_name(staged))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::DetectionRecord;
    use crate::summary::summarize;
    use chrono::{NaiveDate, TimeZone, Utc};
    use tempfile::tempdir;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, 4).unwrap()
    }

    fn sample_aggregate() -> DailyAggregate {
        let records: Vec<DetectionRecord> = [Emotion::Happy, Emotion::Happy, Emotion::Sad]
            .iter()
            .enumerate()
            .map(|(i, &e)| {
                let ts = Utc.with_ymd_and_hms(2024, 7, 4, 10, i as u32, 0).unwrap();
                DetectionRecord::new(ts, Some(e), Some(0.8), "primary").unwrap()
            })
            .collect();
        summarize(&records, day())
    }

    #[test]
    fn rendering_is_byte_identical() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("charts/daily.png");
        let renderer = ChartRenderer::default();
        let aggregate = sample_aggregate();

        renderer.render(&aggregate, &path)?;
        let first = fs::read(&path)?;
        renderer.render(&aggregate, &path)?;
        let second = fs::read(&path)?;
        assert_eq!(first, second);
        assert!(!dir.path().join("charts/.daily.png.tmp").exists());
        Ok(())
    }

    #[test]
    fn bars_use_emotion_colors() -> Result<()> {
        let renderer = ChartRenderer::default();
        let img = renderer.draw(&sample_aggregate())?;
        let plot_w = renderer.width - 2 * renderer.margin;
        let slot = plot_w / 7;
        let happy_x = renderer.margin + slot / 2;
        let y = renderer.height - renderer.margin - 10;
        assert_eq!(*img.get_pixel(happy_x, y), emotion_color(Emotion::Happy));
        let angry_x = renderer.margin + 2 * slot + slot / 2;
        assert_eq!(*img.get_pixel(angry_x, y), BACKGROUND);
        Ok(())
    }

    #[test]
    fn empty_day_renders_placeholder() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("empty.png");
        let renderer = ChartRenderer::default();
        renderer.render(&DailyAggregate::empty(day()), &path)?;

        let img = image::open(&path)?.to_rgb8();
        assert_eq!(img.dimensions(), (renderer.width, renderer.height));
        let colored = img
            .pixels()
            .filter(|p| Emotion::ALL.iter().any(|&e| emotion_color(e) == **p))
            .count();
        assert_eq!(colored, 0);
        assert_eq!(*img.get_pixel(renderer.margin, renderer.margin), AXIS);
        Ok(())
    }

    #[test]
    fn rejects_tiny_canvas() {
        let renderer = ChartRenderer {
            width: 40,
            height: 40,
            margin: 32,
        };
        assert!(matches!(
            renderer.draw(&DailyAggregate::empty(day())),
            Err(MoodError::Chart(_))
        ));
    }
}

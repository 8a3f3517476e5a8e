//! Driver-station composite.
//!
//! All cameras' display frames are placed side by side and scaled down for
//! the operator view. The composite is display-only.

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::{self, FilterType};
use image::RgbImage;

use crate::frame::ColorFrame;

const JPEG_QUALITY: u8 = 80;

/// Horizontal concatenation scaled by `scale`.
///
/// Frames of differing heights are resized to the first frame's height
/// first, keeping their aspect ratio. Returns `None` for no frames.
pub fn composite(frames: &[&ColorFrame], scale: f64) -> Option<ColorFrame> {
    let first = frames.first()?;
    let height = first.height();
    if height == 0 {
        return None;
    }

    let parts: Vec<RgbImage> = frames
        .iter()
        .filter(|f| f.width() > 0 && f.height() > 0)
        .map(|f| {
            if f.height() == height {
                f.image().clone()
            } else {
                let width = (f.width() as f64 * height as f64 / f.height() as f64).round() as u32;
                imageops::resize(f.image(), width.max(1), height, FilterType::Triangle)
            }
        })
        .collect();
    let total_width: u32 = parts.iter().map(|p| p.width()).sum();

    let mut canvas = RgbImage::new(total_width, height);
    let mut x = 0i64;
    for part in &parts {
        imageops::replace(&mut canvas, part, x, 0);
        x += part.width() as i64;
    }

    let scaled_w = (total_width as f64 * scale) as u32;
    let scaled_h = (height as f64 * scale) as u32;
    if scaled_w == 0 || scaled_h == 0 {
        return None;
    }
    if (scaled_w, scaled_h) != (total_width, height) {
        canvas = imageops::resize(&canvas, scaled_w, scaled_h, FilterType::Triangle);
    }
    Some(ColorFrame::from_image(canvas))
}

/// Writes the composite to a JPEG file every `subsampling` updates.
pub struct SnapshotSink {
    path: PathBuf,
    scale: f64,
    subsampling: u32,
    updates: u64,
    written: u64,
}

impl SnapshotSink {
    pub fn new(path: impl Into<PathBuf>, scale: f64, subsampling: u32) -> Self {
        Self {
            path: path.into(),
            scale,
            subsampling: subsampling.max(1),
            updates: 0,
            written: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    /// Returns true when a snapshot was written.
    pub fn update(&mut self, frames: &[&ColorFrame]) -> Result<bool> {
        self.updates += 1;
        if (self.updates - 1) % self.subsampling as u64 != 0 {
            return Ok(false);
        }
        let Some(image) = composite(frames, self.scale) else {
            return Ok(false);
        };
        write_jpeg(&self.path, &image)?;
        self.written += 1;
        log::trace!("snapshot {} written to {}", self.written, self.path.display());
        Ok(true)
    }
}

/// Write via a sibling temp file and rename so readers never see a partial image.
pub fn write_jpeg(path: &Path, frame: &ColorFrame) -> Result<()> {
    let file_name = path
        .file_name()
        .ok_or_else(|| anyhow!("snapshot path {} has no file name", path.display()))?;
    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    let mut encoded = Vec::new();
    JpegEncoder::new_with_quality(&mut encoded, JPEG_QUALITY)
        .encode_image(&frame.to_rgb())
        .with_context(|| format!("failed to encode snapshot {}", path.display()))?;
    std::fs::write(&tmp, &encoded)
        .with_context(|| format!("failed to write snapshot {}", tmp.display()))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("failed to move snapshot into {}", path.display()))?;
    Ok(())
}

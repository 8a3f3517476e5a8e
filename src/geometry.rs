//! Coordinate spaces for detections.
//!
//! Three spaces are involved:
//! - normalized detector space (`0..1` relative to the NN input),
//! - NN-input pixel space (the preview the network consumes),
//! - display-frame pixel space (the ISP-scaled color frame).
//!
//! The mapping from NN input to display frame is a similarity transform:
//! translate to the center, scale by `nn_height / frame_height`, translate
//! back. It assumes the NN input and display frame share an aspect ratio after
//! ISP scaling. Out-of-frame boxes are never clipped here.

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Axis-aligned region of interest: top-left corner plus extent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Roi {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Roi {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Build from opposite corners (`xmin, ymin, xmax, ymax`).
    pub fn from_corners(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Self {
            x: xmin,
            y: ymin,
            width: xmax - xmin,
            height: ymax - ymin,
        }
    }

    pub fn top_left(&self) -> (f64, f64) {
        (self.x, self.y)
    }

    pub fn bottom_right(&self) -> (f64, f64) {
        (self.x + self.width, self.y + self.height)
    }

    /// Scale normalized coordinates into pixel coordinates of a `width`×`height` image.
    pub fn denormalize(&self, width: f64, height: f64) -> Self {
        Self {
            x: self.x * width,
            y: self.y * height,
            width: self.width * width,
            height: self.height * height,
        }
    }

    /// Inverse of [`Roi::denormalize`].
    pub fn normalize(&self, width: f64, height: f64) -> Result<Self> {
        if width == 0.0 || height == 0.0 {
            return Err(anyhow!(
                "cannot normalize against a {}x{} image",
                width,
                height
            ));
        }
        Ok(Self {
            x: self.x / width,
            y: self.y / height,
            width: self.width / width,
            height: self.height / height,
        })
    }

    /// Integer pixel corners, truncated toward zero.
    pub fn pixel_corners(&self) -> PixelBox {
        let (x1, y1) = self.top_left();
        let (x2, y2) = self.bottom_right();
        PixelBox {
            xmin: x1 as i32,
            ymin: y1 as i32,
            xmax: x2 as i32,
            ymax: y2 as i32,
        }
    }
}

/// Integer box in display-frame pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PixelBox {
    pub xmin: i32,
    pub ymin: i32,
    pub xmax: i32,
    pub ymax: i32,
}

impl PixelBox {
    pub fn width(&self) -> i32 {
        self.xmax - self.xmin
    }

    pub fn height(&self) -> i32 {
        self.ymax - self.ymin
    }

    pub fn center(&self) -> (f64, f64) {
        (
            (self.xmin + self.xmax) as f64 / 2.0,
            (self.ymin + self.ymax) as f64 / 2.0,
        )
    }

    /// Half of the larger side.
    pub fn radius(&self) -> f64 {
        self.width().max(self.height()) as f64 / 2.0
    }

    /// Inner box shrunk so that it covers `fraction` of each side, centered.
    pub fn shrink(&self, fraction: f64) -> PixelBox {
        let factor = 1.0 - fraction;
        let x_shift = self.width() as f64 * factor / 2.0;
        let y_shift = self.height() as f64 * factor / 2.0;
        PixelBox {
            xmin: (self.xmin as f64 + x_shift) as i32,
            ymin: (self.ymin as f64 + y_shift) as i32,
            xmax: (self.xmax as f64 - x_shift) as i32,
            ymax: (self.ymax as f64 - y_shift) as i32,
        }
    }
}

/// Resolution of the image the neural network consumes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NnInputSize {
    pub width: u32,
    pub height: u32,
}

impl NnInputSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

impl Default for NnInputSize {
    fn default() -> Self {
        Self::new(300, 300)
    }
}

impl FromStr for NnInputSize {
    type Err = anyhow::Error;

    /// Parses `"WxH"`, e.g. `"416x416"`.
    fn from_str(s: &str) -> Result<Self> {
        let (w, h) = s
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(|| anyhow!("input size '{}' must look like WIDTHxHEIGHT", s))?;
        let width: u32 = w
            .trim()
            .parse()
            .map_err(|_| anyhow!("invalid input width in '{}'", s))?;
        let height: u32 = h
            .trim()
            .parse()
            .map_err(|_| anyhow!("invalid input height in '{}'", s))?;
        Ok(Self { width, height })
    }
}

impl fmt::Display for NnInputSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Scale relationship between the NN input and one destination frame size.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameMapping {
    nn: NnInputSize,
    frame_width: f64,
    frame_height: f64,
    scale: f64,
}

impl FrameMapping {
    /// Fails when the scale would be zero or undefined.
    pub fn new(nn: NnInputSize, frame_width: u32, frame_height: u32) -> Result<Self> {
        if frame_height == 0 {
            return Err(anyhow!(
                "degenerate mapping scale: destination frame height is 0"
            ));
        }
        let scale = nn.height as f64 / frame_height as f64;
        if scale == 0.0 || !scale.is_finite() {
            return Err(anyhow!(
                "degenerate mapping scale {} (nn input {}, frame {}x{})",
                scale,
                nn,
                frame_width,
                frame_height
            ));
        }
        Ok(Self {
            nn,
            frame_width: frame_width as f64,
            frame_height: frame_height as f64,
            scale,
        })
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    pub fn nn_input(&self) -> NnInputSize {
        self.nn
    }

    /// Map a box in NN-input pixels into display-frame pixels.
    pub fn map_pixels(&self, roi: Roi) -> Roi {
        let nn_w = self.nn.width as f64;
        let nn_h = self.nn.height as f64;
        Roi {
            x: (roi.x - nn_w / 2.0) / self.scale + self.frame_width / 2.0,
            y: (roi.y - nn_h / 2.0) / self.scale + self.frame_height / 2.0,
            width: roi.width / self.scale,
            height: roi.height / self.scale,
        }
    }

    /// Inverse of [`FrameMapping::map_pixels`].
    pub fn unmap_pixels(&self, roi: Roi) -> Roi {
        let nn_w = self.nn.width as f64;
        let nn_h = self.nn.height as f64;
        Roi {
            x: (roi.x - self.frame_width / 2.0) * self.scale + nn_w / 2.0,
            y: (roi.y - self.frame_height / 2.0) * self.scale + nn_h / 2.0,
            width: roi.width * self.scale,
            height: roi.height * self.scale,
        }
    }

    /// Normalized detector box → display-frame pixels.
    pub fn map(&self, normalized: Roi) -> Roi {
        self.map_pixels(normalized.denormalize(self.nn.width as f64, self.nn.height as f64))
    }

    /// Display-frame pixels → normalized detector box.
    pub fn unmap(&self, mapped: Roi) -> Result<Roi> {
        self.unmap_pixels(mapped)
            .normalize(self.nn.width as f64, self.nn.height as f64)
    }
}

/// One-shot form of [`FrameMapping::map`].
pub fn map_detection_to_frame(
    normalized: Roi,
    nn: NnInputSize,
    frame_width: u32,
    frame_height: u32,
) -> Result<Roi> {
    Ok(FrameMapping::new(nn, frame_width, frame_height)?.map(normalized))
}

//! False-color rendering of depth frames for display.
//!
//! Pipeline: min-max normalize to 8 bits, histogram-equalize, then a fixed
//! rainbow color map (near = red, far = violet). Output is display-only.
//! Equalization maps each level to its cumulative share of the frame, so
//! the farthest level and any flat frame land on violet.

use image::{GrayImage, Rgb, RgbImage};
use imageproc::contrast::equalize_histogram;

use crate::frame::{Bgr, ColorFrame, DepthFrame};

/// Hue span of the rainbow map in degrees, red to violet.
const RAINBOW_HUE_SPAN: f64 = 270.0;

pub fn colorize_depth(depth: &DepthFrame) -> ColorFrame {
    let normalized = normalize_min_max(depth);
    let equalized = equalize_histogram(&normalized);
    apply_rainbow(&equalized)
}

/// Stretch the sample range linearly onto `0..=255`. A flat frame maps to 0.
pub fn normalize_min_max(depth: &DepthFrame) -> GrayImage {
    let samples = depth.millimeters();
    let min = samples.iter().copied().min().unwrap_or(0) as f64;
    let max = samples.iter().copied().max().unwrap_or(0) as f64;
    let range = max - min;
    let bytes = samples
        .iter()
        .map(|&s| {
            if range <= 0.0 {
                0
            } else {
                ((s as f64 - min) * 255.0 / range).round().clamp(0.0, 255.0) as u8
            }
        })
        .collect();
    GrayImage::from_raw(depth.width(), depth.height(), bytes)
        .unwrap_or_else(|| GrayImage::new(depth.width(), depth.height()))
}

pub fn apply_rainbow(gray: &GrayImage) -> ColorFrame {
    let mut lut = [[0u8; 3]; 256];
    for (value, entry) in lut.iter_mut().enumerate() {
        *entry = rainbow(value as u8);
    }
    let mut out = RgbImage::new(gray.width(), gray.height());
    for (dst, src) in out.pixels_mut().zip(gray.pixels()) {
        *dst = Rgb(lut[src.0[0] as usize]);
    }
    ColorFrame::from_image(out)
}

/// BGR color for one intensity.
fn rainbow(value: u8) -> Bgr {
    let hue = value as f64 / 255.0 * RAINBOW_HUE_SPAN;
    let sector = hue / 60.0;
    let fraction = sector - sector.floor();
    let rising = (fraction * 255.0).round() as u8;
    let falling = 255 - rising;
    let (r, g, b) = match sector.floor() as u32 {
        0 => (255, rising, 0),
        1 => (falling, 255, 0),
        2 => (0, 255, rising),
        3 => (0, falling, 255),
        _ => (rising, 0, 255),
    };
    [b, g, r]
}

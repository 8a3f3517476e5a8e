//! Frame buffers owned by a camera.
//!
//! - `ColorFrame`: 3-channel 8-bit buffer in the sensor's BGR channel order.
//! - `DepthFrame`: 16-bit buffer of millimeter distances, aligned to the color sensor.
//! - `SensorGeometry`: the scale parameters relating sensor, ISP and NN input sizes.

use anyhow::{anyhow, Result};
use image::{ImageBuffer, Luma, Rgb, RgbImage};

use crate::geometry::NnInputSize;

/// Blue, green, red.
pub type Bgr = [u8; 3];

/// Color frame in BGR channel order.
///
/// `image::Rgb` is used purely as a 3-channel container; channel 0 is blue.
#[derive(Clone, Debug, PartialEq)]
pub struct ColorFrame {
    pixels: RgbImage,
}

impl ColorFrame {
    /// Wrap raw BGR bytes (`width * height * 3`).
    pub fn from_bgr(width: u32, height: u32, bytes: Vec<u8>) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(3))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if bytes.len() != expected {
            return Err(anyhow!(
                "expected {} BGR bytes for {}x{}, received {}",
                expected,
                width,
                height,
                bytes.len()
            ));
        }
        let pixels = RgbImage::from_raw(width, height, bytes)
            .ok_or_else(|| anyhow!("invalid {}x{} frame buffer", width, height))?;
        Ok(Self { pixels })
    }

    /// Frame filled with a single color.
    pub fn filled(width: u32, height: u32, color: Bgr) -> Self {
        Self {
            pixels: RgbImage::from_pixel(width, height, Rgb(color)),
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<Bgr> {
        self.pixels.get_pixel_checked(x, y).map(|p| p.0)
    }

    pub fn as_bgr_bytes(&self) -> &[u8] {
        self.pixels.as_raw()
    }

    pub(crate) fn image(&self) -> &RgbImage {
        &self.pixels
    }

    pub(crate) fn image_mut(&mut self) -> &mut RgbImage {
        &mut self.pixels
    }

    pub(crate) fn from_image(pixels: RgbImage) -> Self {
        Self { pixels }
    }

    /// Copy with channels swapped into RGB order, for encoders.
    pub fn to_rgb(&self) -> RgbImage {
        let mut out = self.pixels.clone();
        for px in out.pixels_mut() {
            px.0.swap(0, 2);
        }
        out
    }
}

/// 16-bit depth image; each sample is a distance in millimeters (0 = invalid).
pub type DepthImage = ImageBuffer<Luma<u16>, Vec<u16>>;

#[derive(Clone, Debug, PartialEq)]
pub struct DepthFrame {
    samples: DepthImage,
}

impl DepthFrame {
    pub fn from_millimeters(width: u32, height: u32, samples: Vec<u16>) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .ok_or_else(|| anyhow!("depth dimensions overflow"))?;
        if samples.len() != expected {
            return Err(anyhow!(
                "expected {} depth samples for {}x{}, received {}",
                expected,
                width,
                height,
                samples.len()
            ));
        }
        let samples = DepthImage::from_raw(width, height, samples)
            .ok_or_else(|| anyhow!("invalid {}x{} depth buffer", width, height))?;
        Ok(Self { samples })
    }

    pub fn width(&self) -> u32 {
        self.samples.width()
    }

    pub fn height(&self) -> u32 {
        self.samples.height()
    }

    pub fn millimeters(&self) -> &[u16] {
        self.samples.as_raw()
    }
}

/// Sensor-space scale parameters of one camera.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SensorGeometry {
    /// Resolution the detector network consumes.
    pub nn_input: NnInputSize,
    /// Native color sensor resolution.
    pub rgb_width: u32,
    pub rgb_height: u32,
    /// ISP scale ratio (numerator, denominator) applied to the sensor output.
    pub isp_scale: (u32, u32),
}

impl Default for SensorGeometry {
    fn default() -> Self {
        Self {
            nn_input: NnInputSize::default(),
            rgb_width: 1920,
            rgb_height: 1080,
            isp_scale: (2, 3),
        }
    }
}

impl SensorGeometry {
    /// Display-frame size streamed by the ISP output.
    ///
    /// Matches the device rounding: `ceil(dim * num / den)`.
    pub fn isp_size(&self) -> (u32, u32) {
        let (num, den) = self.isp_scale;
        let scale = |dim: u32| -> u32 {
            if den == 0 {
                return 0;
            }
            let scaled = dim as u64 * num as u64;
            scaled.div_ceil(den as u64) as u32
        };
        (scale(self.rgb_width), scale(self.rgb_height))
    }

    pub fn isp_ratio(&self) -> f64 {
        let (num, den) = self.isp_scale;
        if den == 0 {
            0.0
        } else {
            num as f64 / den as f64
        }
    }

    pub fn validate(&self) -> Result<()> {
        let (num, den) = self.isp_scale;
        if num == 0 || den == 0 || num > den {
            return Err(anyhow!(
                "isp scale {}/{} must be a ratio in (0, 1]",
                num,
                den
            ));
        }
        if self.rgb_width == 0 || self.rgb_height == 0 {
            return Err(anyhow!("rgb resolution must be non-zero"));
        }
        if self.nn_input.width == 0 || self.nn_input.height == 0 {
            return Err(anyhow!("nn input size must be non-zero"));
        }
        Ok(())
    }
}

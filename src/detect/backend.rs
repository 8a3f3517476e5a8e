use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::detect::result::TagDetection;
use crate::frame::ColorFrame;

/// Detection kinds a camera session runs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Capability {
    ObjectDetection,
    TagDetection,
    Both,
    Neither,
}

impl Capability {
    pub fn from_flags(objects: bool, tags: bool) -> Self {
        match (objects, tags) {
            (true, true) => Self::Both,
            (true, false) => Self::ObjectDetection,
            (false, true) => Self::TagDetection,
            (false, false) => Self::Neither,
        }
    }

    pub fn detects_objects(self) -> bool {
        matches!(self, Self::ObjectDetection | Self::Both)
    }

    pub fn detects_tags(self) -> bool {
        matches!(self, Self::TagDetection | Self::Both)
    }
}

/// Pinhole intrinsics of the color sensor at the display-frame resolution.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
}

impl CameraIntrinsics {
    /// Finite values and non-zero focal lengths.
    pub fn is_valid(&self) -> bool {
        self.fx.is_finite()
            && self.fy.is_finite()
            && self.cx.is_finite()
            && self.cy.is_finite()
            && self.fx.abs() > 1e-12
            && self.fy.abs() > 1e-12
    }
}

/// Fiducial tag detector and pose estimator.
///
/// Implementations wrap an external tag library. They receive the full color
/// frame, must not retain it past the call, and attach a pose to each
/// detection only when they were configured with camera intrinsics.
pub trait TagDetector: Send {
    /// Detector identifier for logs.
    fn name(&self) -> &'static str;

    /// Tag family this detector matches, e.g. `tag36h11`.
    fn family(&self) -> &str;

    fn detect(&mut self, frame: &ColorFrame) -> Result<Vec<TagDetection>>;
}

use anyhow::Result;

use crate::detect::backend::{CameraIntrinsics, TagDetector};
use crate::detect::result::{TagDetection, TagPose};
use crate::frame::ColorFrame;

/// Stub tag detector for `stub://` cameras and tests.
///
/// Reports one square tag of side `tag_size_m` centered in the frame at a
/// fixed distance, with a pinhole pose when intrinsics are configured.
pub struct StubTagDetector {
    family: String,
    tag_id: i32,
    tag_size_m: f64,
    distance_m: f64,
    intrinsics: Option<CameraIntrinsics>,
}

impl StubTagDetector {
    pub fn new(family: impl Into<String>, tag_size_m: f64, intrinsics: Option<CameraIntrinsics>) -> Self {
        Self {
            family: family.into(),
            tag_id: 1,
            tag_size_m,
            distance_m: 2.0,
            intrinsics,
        }
    }

    pub fn with_tag(mut self, tag_id: i32, distance_m: f64) -> Self {
        self.tag_id = tag_id;
        self.distance_m = distance_m;
        self
    }
}

impl TagDetector for StubTagDetector {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn family(&self) -> &str {
        &self.family
    }

    fn detect(&mut self, frame: &ColorFrame) -> Result<Vec<TagDetection>> {
        let cx = frame.width() as f64 / 2.0;
        let cy = frame.height() as f64 / 2.0;
        // Apparent half-side in pixels under a pinhole model; a fixed guess without intrinsics.
        let half = match self.intrinsics {
            Some(k) if self.distance_m > 0.0 => k.fx * self.tag_size_m / self.distance_m / 2.0,
            _ => 20.0,
        };
        let pose = self.intrinsics.map(|k| TagPose {
            x: (cx - k.cx) * self.distance_m / k.fx,
            y: (cy - k.cy) * self.distance_m / k.fy,
            z: self.distance_m,
            ..TagPose::default()
        });
        Ok(vec![TagDetection {
            id: self.tag_id,
            corners: [
                (cx - half, cy - half),
                (cx + half, cy - half),
                (cx + half, cy + half),
                (cx - half, cy + half),
            ],
            center: (cx, cy),
            pose,
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_detector_reports_centered_tag() {
        let k = CameraIntrinsics {
            fx: 1000.0,
            fy: 1000.0,
            cx: 640.0,
            cy: 360.0,
        };
        let mut detector = StubTagDetector::new("tag36h11", 0.2, Some(k)).with_tag(5, 4.0);
        let frame = ColorFrame::filled(1280, 720, [0, 0, 0]);
        let tags = detector.detect(&frame).unwrap();
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].id, 5);
        assert_eq!(tags[0].center, (640.0, 360.0));
        assert_eq!(tags[0].corners[0], (615.0, 335.0));
        let pose = tags[0].pose.unwrap();
        assert_eq!((pose.x, pose.y, pose.z), (0.0, 0.0, 4.0));
    }

    #[test]
    fn stub_detector_without_intrinsics_has_no_pose() {
        let mut detector = StubTagDetector::new("tag36h11", 0.2, None);
        let frame = ColorFrame::filled(100, 100, [0, 0, 0]);
        let tags = detector.detect(&frame).unwrap();
        assert!(tags[0].pose.is_none());
        assert_eq!(detector.family(), "tag36h11");
    }
}

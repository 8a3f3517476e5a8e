use crate::detect::backend::CameraIntrinsics;
use crate::detect::record::{meters_to_inches, DetectionRecord, RecordRotation};
use crate::detect::result::TagDetection;
use crate::overlay::{Overlay, GREEN};

/// Converts fiducial tag detections into the shared record schema.
#[derive(Clone, Debug)]
pub struct TagRecordBuilder {
    family: String,
    intrinsics: Option<CameraIntrinsics>,
}

impl TagRecordBuilder {
    /// Without intrinsics there is no pose estimate and tags only reach the overlay.
    pub fn new(family: impl Into<String>, intrinsics: Option<CameraIntrinsics>) -> Self {
        Self {
            family: family.into(),
            intrinsics,
        }
    }

    pub fn family(&self) -> &str {
        &self.family
    }

    pub fn has_pose(&self) -> bool {
        self.intrinsics.is_some()
    }

    pub fn build(&self, tags: &[TagDetection]) -> Vec<DetectionRecord> {
        self.annotate(tags, &mut Overlay::disabled())
    }

    pub fn annotate(&self, tags: &[TagDetection], overlay: &mut Overlay) -> Vec<DetectionRecord> {
        let mut records = Vec::new();
        for tag in tags {
            if overlay.is_enabled() {
                let points: Vec<(i32, i32)> = tag
                    .corners
                    .iter()
                    .map(|(x, y)| (*x as i32, *y as i32))
                    .collect();
                let anchor = points[0];
                overlay.polyline(points, true, GREEN);
                overlay.text(anchor, tag.id.to_string(), GREEN);
                overlay.circle((tag.center.0 as i32, tag.center.1 as i32), 5, GREEN, true);
            }

            if !self.has_pose() {
                continue;
            }
            let Some(pose) = tag.pose else {
                log::debug!("tag {} arrived without a pose estimate; skipped", tag.id);
                continue;
            };
            records.push(DetectionRecord {
                label: format!("{}: {}", self.family, tag.id),
                x: meters_to_inches(pose.x),
                y: meters_to_inches(pose.y),
                z: meters_to_inches(pose.z),
                confidence: 1.0,
                rotation: Some(RecordRotation {
                    x: pose.rx.round_ties_even() as i32,
                    y: pose.ry.round_ties_even() as i32,
                    z: pose.rz.round_ties_even() as i32,
                }),
            });
        }
        records
    }
}

//! Detection records.
//!
//! Object detections and fiducial tags arrive from external collaborators in
//! their own coordinate spaces. This module maps both into `DetectionRecord`,
//! the single schema published per camera.

mod backend;
mod backends;
mod labels;
mod normalize;
mod record;
mod result;
mod tags;

pub use backend::{CameraIntrinsics, Capability, TagDetector};
pub use backends::StubTagDetector;
pub use labels::LabelTable;
pub use normalize::{DetectionNormalizer, SORT_CLASS_STRIDE};
pub use record::{
    meters_to_inches, mm_to_truncated_inches, round_to, DetectionRecord, RecordRotation,
    INCHES_PER_METER, INCHES_PER_MILLIMETER,
};
pub use result::{RawDetection, SpatialCoordinates, TagDetection, TagPose};
pub use tags::TagRecordBuilder;

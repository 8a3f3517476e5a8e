use serde::{Deserialize, Serialize};

/// 3-D position of a detection relative to the sensor origin, in millimeters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct SpatialCoordinates {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// One detection as produced by the on-device network.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    /// Class index into the label table.
    pub label: i32,
    /// Bounding box normalized to the NN input (0..1, may exceed the range).
    pub xmin: f32,
    pub ymin: f32,
    pub xmax: f32,
    pub ymax: f32,
    /// Only present on depth-capable detectors.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spatial: Option<SpatialCoordinates>,
    pub confidence: f32,
}

impl RawDetection {
    pub fn new(label: i32, bbox: [f32; 4], confidence: f32) -> Self {
        Self {
            label,
            xmin: bbox[0],
            ymin: bbox[1],
            xmax: bbox[2],
            ymax: bbox[3],
            spatial: None,
            confidence,
        }
    }

    pub fn with_spatial(mut self, x: f32, y: f32, z: f32) -> Self {
        self.spatial = Some(SpatialCoordinates { x, y, z });
        self
    }
}

/// Estimated 6-DoF pose of a fiducial tag relative to the camera.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TagPose {
    /// Translation in meters.
    pub x: f64,
    pub y: f64,
    pub z: f64,
    /// Rotation about each axis in degrees.
    pub rx: f64,
    pub ry: f64,
    pub rz: f64,
}

impl TagPose {
    /// Pose estimators commonly report rotations in radians.
    pub fn from_radians(translation: [f64; 3], rotation: [f64; 3]) -> Self {
        Self {
            x: translation[0],
            y: translation[1],
            z: translation[2],
            rx: rotation[0].to_degrees(),
            ry: rotation[1].to_degrees(),
            rz: rotation[2].to_degrees(),
        }
    }
}

/// One fiducial tag found in a full-resolution color frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TagDetection {
    pub id: i32,
    /// Corner points in frame pixels, in the detector's winding order.
    pub corners: [(f64, f64); 4],
    pub center: (f64, f64),
    /// Absent when the camera has no intrinsics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pose: Option<TagPose>,
}

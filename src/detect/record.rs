use serde::{Deserialize, Serialize};

pub const INCHES_PER_MILLIMETER: f64 = 0.0393701;
pub const INCHES_PER_METER: f64 = 39.3701;

/// Rotation of a record in whole degrees.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordRotation {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

/// Display-ready detection, shared by object and tag detections.
///
/// Units of `x`, `y`, `z` depend on the producer: inches for spatial and tag
/// records, pixels for 2-D object records.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionRecord {
    #[serde(rename = "objectLabel")]
    pub label: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation: Option<RecordRotation>,
}

/// Millimeters to whole inches: truncate toward zero, then round to one decimal.
///
/// Sub-inch precision is dropped; the decimal rounding is a no-op on whole values.
pub fn mm_to_truncated_inches(mm: f64) -> f64 {
    round_to((mm * INCHES_PER_MILLIMETER).trunc(), 1)
}

pub fn meters_to_inches(m: f64) -> f64 {
    round_to(m * INCHES_PER_METER, 1)
}

/// Rounds to `decimals` places; exact ties go to the even digit.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round_ties_even() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn millimeters_truncate_before_rounding() {
        assert_eq!(mm_to_truncated_inches(254.0), 10.0);
        assert_eq!(mm_to_truncated_inches(253.0), 9.0);
        assert_eq!(mm_to_truncated_inches(-300.0), -11.0);
        assert_eq!(mm_to_truncated_inches(0.0), 0.0);
    }

    #[test]
    fn meters_round_to_tenths() {
        assert_eq!(meters_to_inches(1.0), 39.4);
        assert_eq!(meters_to_inches(0.0254), 1.0);
    }

    #[test]
    fn exact_ties_round_to_even() {
        assert_eq!(round_to(0.125, 2), 0.12);
        assert_eq!(round_to(0.625, 2), 0.62);
        assert_eq!(round_to(0.375, 2), 0.38);
        assert_eq!(round_to(-0.125, 2), -0.12);
        assert_eq!(round_to(0.876, 2), 0.88);
    }

    #[test]
    fn record_serializes_with_wire_label_key() {
        let record = DetectionRecord {
            label: "cone".to_string(),
            x: 1.0,
            y: 2.0,
            z: 3.0,
            confidence: 0.91,
            rotation: None,
        };
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(
            json,
            r#"{"objectLabel":"cone","x":1.0,"y":2.0,"z":3.0,"confidence":0.91}"#
        );

        let tag = DetectionRecord {
            rotation: Some(RecordRotation { x: 1, y: -2, z: 3 }),
            ..record
        };
        let json = serde_json::to_string(&tag).unwrap();
        assert!(json.ends_with(r#""rotation":{"x":1,"y":-2,"z":3}}"#));
    }
}

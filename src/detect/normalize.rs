use anyhow::Result;

use crate::detect::labels::LabelTable;
use crate::detect::record::{mm_to_truncated_inches, round_to, DetectionRecord};
use crate::detect::result::{RawDetection, SpatialCoordinates};
use crate::frame::{Bgr, ColorFrame};
use crate::geometry::{FrameMapping, NnInputSize, PixelBox, Roi};
use crate::overlay::{Overlay, BLUE, RED, YELLOW};

/// Class spacing in the depth-mode sort key. Depths must stay below this many millimeters.
pub const SORT_CLASS_STRIDE: f64 = 100_000.0;

/// Turns a camera's raw detection batch into display-ready records.
#[derive(Clone, Debug)]
pub struct DetectionNormalizer {
    labels: LabelTable,
    nn_input: NnInputSize,
    bb_fraction: f64,
}

impl DetectionNormalizer {
    pub fn new(labels: LabelTable, nn_input: NnInputSize, bb_fraction: f64) -> Self {
        Self {
            labels,
            nn_input,
            bb_fraction,
        }
    }

    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    pub fn nn_input(&self) -> NnInputSize {
        self.nn_input
    }

    /// Records only; no overlay is produced.
    pub fn normalize(
        &self,
        detections: &[RawDetection],
        frame: Option<&ColorFrame>,
        has_depth: bool,
    ) -> Result<Vec<DetectionRecord>> {
        self.annotate(detections, frame, has_depth, &mut Overlay::disabled())
    }

    /// Records plus overlay commands for the display frame.
    ///
    /// Returns an empty list when there is no frame yet. Fails only when the
    /// NN input and frame sizes give a degenerate mapping scale.
    pub fn annotate(
        &self,
        detections: &[RawDetection],
        frame: Option<&ColorFrame>,
        has_depth: bool,
        overlay: &mut Overlay,
    ) -> Result<Vec<DetectionRecord>> {
        let Some(frame) = frame else {
            return Ok(Vec::new());
        };
        let mapping = FrameMapping::new(self.nn_input, frame.width(), frame.height())?;

        if has_depth {
            Ok(self.spatial_records(detections, &mapping, overlay))
        } else {
            Ok(self.planar_records(detections, &mapping, overlay))
        }
    }

    fn spatial_records(
        &self,
        detections: &[RawDetection],
        mapping: &FrameMapping,
        overlay: &mut Overlay,
    ) -> Vec<DetectionRecord> {
        let mut spatial: Vec<(&RawDetection, SpatialCoordinates)> = detections
            .iter()
            .filter_map(|det| match det.spatial {
                Some(coords) => Some((det, coords)),
                None => {
                    log::warn!(
                        "detection of class {} has no spatial coordinates; skipped",
                        det.label
                    );
                    None
                }
            })
            .collect();

        for (det, coords) in &spatial {
            if (coords.z as f64).abs() >= SORT_CLASS_STRIDE {
                log::warn!(
                    "detection of class {} at z={}mm exceeds sort key range",
                    det.label,
                    coords.z
                );
            }
        }
        spatial.sort_by(|(a, za), (b, zb)| sort_key(a.label, za).total_cmp(&sort_key(b.label, zb)));

        let mut records = Vec::with_capacity(spatial.len());
        for (det, coords) in spatial {
            let bbox = map_box(det, mapping);
            let label = self.labels.resolve(det.label);
            let x = mm_to_truncated_inches(coords.x as f64);
            let y = mm_to_truncated_inches(coords.y as f64);
            let z = mm_to_truncated_inches(coords.z as f64);

            if overlay.is_enabled() {
                let color = class_color(det.label);
                overlay.rect((bbox.xmin, bbox.ymin), (bbox.xmax, bbox.ymax), color, 1);
                let inner = bbox.shrink(self.bb_fraction);
                overlay.rect((inner.xmin, inner.ymin), (inner.xmax, inner.ymax), YELLOW, 1);
                annotate_text(
                    overlay,
                    &bbox,
                    color,
                    &label,
                    det.confidence,
                    [format!("X: {x} in"), format!("Y: {y} in"), format!("Z: {z} in")],
                );
            }

            records.push(DetectionRecord {
                label,
                x,
                y,
                z,
                confidence: round_to(det.confidence as f64, 2),
                rotation: None,
            });
        }
        records
    }

    fn planar_records(
        &self,
        detections: &[RawDetection],
        mapping: &FrameMapping,
        overlay: &mut Overlay,
    ) -> Vec<DetectionRecord> {
        detections
            .iter()
            .map(|det| {
                let bbox = map_box(det, mapping);
                let (cx, cy) = bbox.center();
                let radius = bbox.radius();
                let label = self.labels.resolve(det.label);

                if overlay.is_enabled() {
                    let color = class_color(det.label);
                    annotate_text(
                        overlay,
                        &bbox,
                        color,
                        &label,
                        det.confidence,
                        [
                            format!("X: {} px", round_to(cx, 3)),
                            format!("Y: {} px", round_to(cy, 3)),
                            format!("R: {} px", round_to(radius, 3)),
                        ],
                    );
                    let center = (cx as i32, cy as i32);
                    overlay.circle(center, 5, RED, true);
                    overlay.circle(center, radius as i32, BLUE, false);
                }

                DetectionRecord {
                    label,
                    x: cx,
                    y: cy,
                    z: radius,
                    confidence: round_to(det.confidence as f64, 2),
                    rotation: None,
                }
            })
            .collect()
    }
}

fn sort_key(label: i32, coords: &SpatialCoordinates) -> f64 {
    label as f64 * SORT_CLASS_STRIDE + coords.z as f64
}

fn map_box(det: &RawDetection, mapping: &FrameMapping) -> PixelBox {
    let normalized = Roi::from_corners(
        det.xmin as f64,
        det.ymin as f64,
        det.xmax as f64,
        det.ymax as f64,
    );
    mapping.map(normalized).pixel_corners()
}

fn class_color(label: i32) -> Bgr {
    if label == 1 {
        BLUE
    } else {
        RED
    }
}

fn annotate_text(
    overlay: &mut Overlay,
    bbox: &PixelBox,
    color: Bgr,
    label: &str,
    confidence: f32,
    lines: [String; 3],
) {
    let x = bbox.xmin + 10;
    overlay.text((x, bbox.ymin + 20), label, color);
    overlay.text(
        (x, bbox.ymin + 35),
        format!("{:.2}", confidence as f64 * 100.0),
        color,
    );
    for (i, line) in lines.into_iter().enumerate() {
        overlay.text((x, bbox.ymin + 50 + 15 * i as i32), line, color);
    }
}

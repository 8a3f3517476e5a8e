//! One camera's processing pipeline.
//!
//! A `CameraSession` bundles the camera state with whichever detection
//! capabilities the camera runs. `process` ticks the camera and, when new
//! inputs arrived, turns them into the camera's published record list.
//!
//! Object records are recomputed only on ticks that delivered a new
//! detection batch, and tag records only on ticks that delivered a new color
//! frame. Each record set therefore comes from inputs of a single tick; the
//! published list is the latest object set followed by the latest tag set.

use std::time::Instant;

use anyhow::Result;
use serde::Serialize;

use crate::camera::CameraState;
use crate::detect::{Capability, DetectionNormalizer, DetectionRecord, TagDetector, TagRecordBuilder};
use crate::frame::ColorFrame;
use crate::ingest::{DriverHandle, OpenedCamera};
use crate::overlay::Overlay;

/// Records produced by one camera on one tick.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Publication {
    pub camera: String,
    pub records: Vec<DetectionRecord>,
    pub fps: u32,
}

impl Publication {
    /// The wire payload: a JSON array of records.
    pub fn records_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.records)?)
    }
}

struct TagPipeline {
    detector: Box<dyn TagDetector>,
    builder: TagRecordBuilder,
}

pub struct CameraSession {
    state: CameraState,
    capability: Capability,
    normalizer: Option<DetectionNormalizer>,
    tags: Option<TagPipeline>,
    overlay_enabled: bool,
    object_records: Vec<DetectionRecord>,
    tag_records: Vec<DetectionRecord>,
    object_overlay: Overlay,
    tag_overlay: Overlay,
    annotated: Option<ColorFrame>,
    fault: Option<String>,
    driver: Option<DriverHandle>,
}

impl CameraSession {
    pub fn new(state: CameraState, capability: Capability) -> Self {
        Self {
            state,
            capability,
            normalizer: None,
            tags: None,
            overlay_enabled: false,
            object_records: Vec::new(),
            tag_records: Vec::new(),
            object_overlay: Overlay::disabled(),
            tag_overlay: Overlay::disabled(),
            annotated: None,
            fault: None,
            driver: None,
        }
    }

    /// Session over a freshly opened camera. Object detection needs a
    /// normalizer and tag detection needs both a detector and a builder;
    /// missing parts narrow the capability.
    pub fn from_opened(
        opened: OpenedCamera,
        normalizer: Option<DetectionNormalizer>,
        tag_builder: Option<TagRecordBuilder>,
    ) -> Self {
        let OpenedCamera {
            state,
            tag_detector,
            driver,
        } = opened;
        let has_objects = normalizer.is_some();
        let mut session = Self::new(state, Capability::Neither).with_driver(driver);
        if let Some(normalizer) = normalizer {
            session = session.with_normalizer(normalizer);
        }
        if let (Some(detector), Some(builder)) = (tag_detector, tag_builder) {
            session = session.with_tags(detector, builder);
        }
        session.capability = Capability::from_flags(has_objects, session.tags.is_some());
        session
    }

    pub fn with_normalizer(mut self, normalizer: DetectionNormalizer) -> Self {
        self.normalizer = Some(normalizer);
        self
    }

    pub fn with_tags(mut self, detector: Box<dyn TagDetector>, builder: TagRecordBuilder) -> Self {
        if detector.family() != builder.family() {
            log::warn!(
                "camera {}: tag detector family '{}' differs from record family '{}'",
                self.state.name(),
                detector.family(),
                builder.family()
            );
        }
        self.tags = Some(TagPipeline { detector, builder });
        self
    }

    pub fn with_driver(mut self, driver: DriverHandle) -> Self {
        self.driver = Some(driver);
        self
    }

    /// Keep an annotated copy of the color frame for display.
    pub fn with_overlay(mut self, enabled: bool) -> Self {
        self.overlay_enabled = enabled;
        let fresh = || if enabled { Overlay::new() } else { Overlay::disabled() };
        self.object_overlay = fresh();
        self.tag_overlay = fresh();
        self
    }

    /// Tick the camera and build its records.
    ///
    /// Returns `Ok(None)` when nothing new arrived or the session is
    /// faulted. A mapping failure faults this session and is returned once.
    pub fn process(&mut self, now: Instant) -> Result<Option<Publication>> {
        if self.fault.is_some() {
            return Ok(None);
        }
        if !self.state.tick(now) {
            return Ok(None);
        }
        let updates = self.state.last_updates();
        let mut refreshed = false;

        if updates.detections && self.capability.detects_objects() {
            if let Some(normalizer) = &self.normalizer {
                self.object_overlay.clear();
                let result = normalizer.annotate(
                    self.state.detections(),
                    self.state.color(),
                    self.state.has_depth_stream(),
                    &mut self.object_overlay,
                );
                match result {
                    Ok(records) => {
                        self.object_records = records;
                        refreshed = true;
                    }
                    Err(err) => {
                        let message = format!("camera {}: {}", self.state.name(), err);
                        log::error!("{}; session stopped", message);
                        self.fault = Some(message);
                        return Err(err.context(format!("camera {} faulted", self.state.name())));
                    }
                }
            }
        }

        if updates.color && self.capability.detects_tags() {
            if let (Some(pipeline), Some(frame)) = (self.tags.as_mut(), self.state.color()) {
                self.tag_overlay.clear();
                match pipeline.detector.detect(frame) {
                    Ok(detections) => {
                        self.tag_records = pipeline
                            .builder
                            .annotate(&detections, &mut self.tag_overlay);
                        refreshed = true;
                    }
                    Err(err) => {
                        log::warn!(
                            "camera {}: {} tag detector failed: {}",
                            self.state.name(),
                            pipeline.detector.name(),
                            err
                        );
                    }
                }
            }
        }

        if self.overlay_enabled && (updates.color || refreshed) {
            self.annotated = self.state.color().map(|frame| {
                let mut annotated = frame.clone();
                self.object_overlay.render(&mut annotated);
                self.tag_overlay.render(&mut annotated);
                annotated
            });
        }

        if !refreshed {
            return Ok(None);
        }
        let mut records = self.object_records.clone();
        records.extend(self.tag_records.iter().cloned());
        log::debug!(
            "camera {}: {} records at {} fps",
            self.state.name(),
            records.len(),
            self.state.fps()
        );
        Ok(Some(Publication {
            camera: self.state.name().to_string(),
            records,
            fps: self.state.fps(),
        }))
    }

    pub fn name(&self) -> &str {
        self.state.name()
    }

    pub fn state(&self) -> &CameraState {
        &self.state
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    pub fn is_faulted(&self) -> bool {
        self.fault.is_some()
    }

    pub fn fault(&self) -> Option<&str> {
        self.fault.as_deref()
    }

    /// Color frame with the current overlay rendered, when overlays are on.
    pub fn annotated_frame(&self) -> Option<&ColorFrame> {
        self.annotated.as_ref()
    }

    /// Frame for display: annotated when available, else the raw color frame.
    pub fn display_frame(&self) -> Option<&ColorFrame> {
        self.annotated.as_ref().or_else(|| self.state.color())
    }

    /// Stop the camera driver, if any.
    pub fn close(&mut self) {
        if let Some(mut driver) = self.driver.take() {
            driver.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{InputStream, StreamItem, StreamRole};
    use crate::detect::{CameraIntrinsics, LabelTable, RawDetection, StubTagDetector};
    use crate::frame::SensorGeometry;
    use crate::geometry::NnInputSize;
    use crate::ingest::{stream_channel, StreamFeed};
    use std::time::Duration;

    struct Rig {
        color: StreamFeed,
        nn: StreamFeed,
        session: CameraSession,
        t0: Instant,
    }

    fn rig(capability: Capability) -> Rig {
        let t0 = Instant::now();
        let (color, color_stream) = stream_channel(StreamRole::Color, "rgb", 4);
        let (nn, nn_stream) = stream_channel(StreamRole::Detections, "nn", 4);
        let state = CameraState::new("front", SensorGeometry::default(), t0)
            .with_stream(Box::new(color_stream) as Box<dyn InputStream>)
            .with_stream(Box::new(nn_stream));
        let normalizer =
            DetectionNormalizer::new(LabelTable::new(["cube", "cone"]), NnInputSize::new(300, 300), 0.2);
        let k = CameraIntrinsics {
            fx: 900.0,
            fy: 900.0,
            cx: 640.0,
            cy: 360.0,
        };
        let session = CameraSession::new(state, capability)
            .with_normalizer(normalizer)
            .with_tags(
                Box::new(StubTagDetector::new("tag36h11", 0.1651, Some(k)).with_tag(4, 1.0)),
                TagRecordBuilder::new("tag36h11", Some(k)),
            );
        Rig {
            color,
            nn,
            session,
            t0,
        }
    }

    fn frame(width: u32, height: u32) -> StreamItem {
        StreamItem::Color(ColorFrame::filled(width, height, [0, 0, 0]))
    }

    #[test]
    fn idle_tick_publishes_nothing() {
        let mut rig = rig(Capability::Both);
        assert!(rig.session.process(rig.t0 + Duration::from_millis(5)).unwrap().is_none());
    }

    #[test]
    fn publishes_objects_then_tags() {
        let mut rig = rig(Capability::Both);
        rig.color.push(frame(1280, 720)).unwrap();
        rig.nn
            .push(StreamItem::Detections(vec![RawDetection::new(
                1,
                [0.25, 0.25, 0.75, 0.75],
                0.5,
            )]))
            .unwrap();

        let publication = rig
            .session
            .process(rig.t0 + Duration::from_millis(40))
            .unwrap()
            .unwrap();
        assert_eq!(publication.camera, "front");
        assert_eq!(publication.fps, 25);
        let labels: Vec<&str> = publication.records.iter().map(|r| r.label.as_str()).collect();
        assert_eq!(labels, vec!["cone", "tag36h11: 4"]);
        assert!(publication.records_json().unwrap().starts_with("[{\"objectLabel\":\"cone\""));
    }

    #[test]
    fn capability_limits_pipelines() {
        let mut rig = rig(Capability::TagDetection);
        rig.color.push(frame(1280, 720)).unwrap();
        rig.nn
            .push(StreamItem::Detections(vec![RawDetection::new(0, [0.1, 0.1, 0.2, 0.2], 0.9)]))
            .unwrap();
        let publication = rig
            .session
            .process(rig.t0 + Duration::from_millis(10))
            .unwrap()
            .unwrap();
        assert_eq!(publication.records.len(), 1);
        assert_eq!(publication.records[0].label, "tag36h11: 4");
    }

    #[test]
    fn degenerate_frame_faults_the_session() {
        let mut rig = rig(Capability::ObjectDetection);
        rig.color.push(frame(16, 0)).unwrap();
        rig.nn
            .push(StreamItem::Detections(vec![RawDetection::new(0, [0.1, 0.1, 0.2, 0.2], 0.9)]))
            .unwrap();
        assert!(rig.session.process(rig.t0 + Duration::from_millis(10)).is_err());
        assert!(rig.session.is_faulted());

        rig.color.push(frame(1280, 720)).unwrap();
        assert!(rig.session.process(rig.t0 + Duration::from_millis(20)).unwrap().is_none());
    }

    #[test]
    fn overlay_produces_annotated_frame() {
        let mut rig = rig(Capability::Both);
        rig.session = rig.session.with_overlay(true);
        rig.color.push(frame(1280, 720)).unwrap();
        rig.session.process(rig.t0 + Duration::from_millis(10)).unwrap();
        let annotated = rig.session.annotated_frame().unwrap();
        // Stub tag center dot.
        assert_eq!(annotated.pixel(640, 360), Some(crate::overlay::GREEN));
    }
}

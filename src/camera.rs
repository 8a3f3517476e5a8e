//! Per-camera frame synchronization.
//!
//! A camera owns a set of named input streams (color, depth, detections).
//! Each `tick` polls every stream once without blocking, takes at most one
//! pending item per stream, and folds it into the camera's current state.
//! The tick reports whether anything changed so that callers never map or
//! publish a stale batch twice.

use std::time::Instant;

use crate::depth::colorize_depth;
use crate::detect::RawDetection;
use crate::frame::{ColorFrame, DepthFrame, SensorGeometry};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StreamRole {
    /// Preview or ISP color output.
    Color,
    /// Raw depth aligned to the color sensor.
    Depth,
    /// Detection batches from the on-device network.
    Detections,
}

#[derive(Clone, Debug)]
pub enum StreamItem {
    Color(ColorFrame),
    Depth(DepthFrame),
    Detections(Vec<RawDetection>),
}

impl StreamItem {
    pub fn role(&self) -> StreamRole {
        match self {
            Self::Color(_) => StreamRole::Color,
            Self::Depth(_) => StreamRole::Depth,
            Self::Detections(_) => StreamRole::Detections,
        }
    }
}

/// A device output queue as seen by the tick loop.
///
/// `has` and `take` must never block. `take` may return `None` even after
/// `has` returned true if the item was dropped in between.
pub trait InputStream: Send {
    fn name(&self) -> &str;
    fn role(&self) -> StreamRole;
    fn has(&self) -> bool;
    fn take(&mut self) -> Option<StreamItem>;
}

/// Which parts of the camera state the last tick replaced.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickUpdates {
    pub color: bool,
    pub depth: bool,
    pub detections: bool,
}

impl TickUpdates {
    pub fn any(&self) -> bool {
        self.color || self.depth || self.detections
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CameraStats {
    pub ticks: u64,
    pub changed_ticks: u64,
    pub dropped_items: u64,
    pub fps: u32,
}

pub struct CameraState {
    name: String,
    geometry: SensorGeometry,
    streams: Vec<Box<dyn InputStream>>,
    color: Option<ColorFrame>,
    depth: Option<DepthFrame>,
    depth_color: Option<ColorFrame>,
    detections: Vec<RawDetection>,
    fps: u32,
    last_frame_at: Instant,
    last_updates: TickUpdates,
    stats: CameraStats,
}

impl CameraState {
    /// `started_at` seeds the frame-rate clock.
    pub fn new(name: impl Into<String>, geometry: SensorGeometry, started_at: Instant) -> Self {
        Self {
            name: name.into(),
            geometry,
            streams: Vec::new(),
            color: None,
            depth: None,
            depth_color: None,
            detections: Vec::new(),
            fps: 0,
            last_frame_at: started_at,
            last_updates: TickUpdates::default(),
            stats: CameraStats::default(),
        }
    }

    pub fn with_stream(mut self, stream: Box<dyn InputStream>) -> Self {
        self.add_stream(stream);
        self
    }

    pub fn add_stream(&mut self, stream: Box<dyn InputStream>) {
        log::debug!(
            "camera {}: stream '{}' attached as {:?}",
            self.name,
            stream.name(),
            stream.role()
        );
        self.streams.push(stream);
    }

    /// One non-blocking pass over all streams. Returns true when any state changed.
    pub fn tick(&mut self, now: Instant) -> bool {
        let mut updates = TickUpdates::default();

        for stream in self.streams.iter_mut() {
            if !stream.has() {
                continue;
            }
            let Some(item) = stream.take() else {
                continue;
            };
            match (stream.role(), item) {
                (StreamRole::Color, StreamItem::Color(frame)) => {
                    self.color = Some(frame);
                    updates.color = true;
                }
                (StreamRole::Depth, StreamItem::Depth(frame)) => {
                    self.depth = Some(frame);
                    updates.depth = true;
                }
                (StreamRole::Detections, StreamItem::Detections(batch)) => {
                    self.detections = batch;
                    updates.detections = true;
                }
                (role, item) => {
                    self.stats.dropped_items += 1;
                    log::warn!(
                        "camera {}: stream '{}' ({:?}) yielded a {:?} item; dropped",
                        self.name,
                        stream.name(),
                        role,
                        item.role()
                    );
                }
            }
        }

        self.stats.ticks += 1;
        self.last_updates = updates;
        if !updates.any() {
            return false;
        }

        self.stats.changed_ticks += 1;
        let elapsed = now
            .saturating_duration_since(self.last_frame_at)
            .as_secs_f64();
        if elapsed > 0.0 {
            self.fps = (1.0 / elapsed) as u32;
        }
        self.last_frame_at = now;
        self.stats.fps = self.fps;

        if updates.depth {
            self.depth_color = self.depth.as_ref().map(colorize_depth);
        }
        true
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn geometry(&self) -> &SensorGeometry {
        &self.geometry
    }

    /// True when a depth stream is attached (stereo-capable camera).
    pub fn has_depth_stream(&self) -> bool {
        self.streams.iter().any(|s| s.role() == StreamRole::Depth)
    }

    pub fn color(&self) -> Option<&ColorFrame> {
        self.color.as_ref()
    }

    pub fn depth(&self) -> Option<&DepthFrame> {
        self.depth.as_ref()
    }

    pub fn depth_color(&self) -> Option<&ColorFrame> {
        self.depth_color.as_ref()
    }

    pub fn detections(&self) -> &[RawDetection] {
        &self.detections
    }

    pub fn fps(&self) -> u32 {
        self.fps
    }

    pub fn last_updates(&self) -> TickUpdates {
        self.last_updates
    }

    pub fn stats(&self) -> CameraStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::time::Duration;

    struct ScriptedStream {
        name: &'static str,
        role: StreamRole,
        items: VecDeque<StreamItem>,
    }

    impl ScriptedStream {
        fn boxed(name: &'static str, role: StreamRole, items: Vec<StreamItem>) -> Box<Self> {
            Box::new(Self {
                name,
                role,
                items: items.into(),
            })
        }
    }

    impl InputStream for ScriptedStream {
        fn name(&self) -> &str {
            self.name
        }
        fn role(&self) -> StreamRole {
            self.role
        }
        fn has(&self) -> bool {
            !self.items.is_empty()
        }
        fn take(&mut self) -> Option<StreamItem> {
            self.items.pop_front()
        }
    }

    fn color(v: u8) -> StreamItem {
        StreamItem::Color(ColorFrame::filled(4, 4, [v, v, v]))
    }

    #[test]
    fn takes_one_item_per_stream_per_tick() {
        let t0 = Instant::now();
        let mut cam = CameraState::new("front", SensorGeometry::default(), t0).with_stream(
            ScriptedStream::boxed("rgb", StreamRole::Color, vec![color(1), color(2)]),
        );

        assert!(cam.tick(t0 + Duration::from_millis(50)));
        assert_eq!(cam.color().unwrap().pixel(0, 0), Some([1, 1, 1]));
        assert!(cam.tick(t0 + Duration::from_millis(100)));
        assert_eq!(cam.color().unwrap().pixel(0, 0), Some([2, 2, 2]));
    }

    #[test]
    fn fps_is_truncated_reciprocal_of_interval() {
        let t0 = Instant::now();
        let mut cam = CameraState::new("front", SensorGeometry::default(), t0).with_stream(
            ScriptedStream::boxed("rgb", StreamRole::Color, vec![color(1), color(2)]),
        );
        cam.tick(t0 + Duration::from_millis(30));
        assert_eq!(cam.fps(), 33);
        cam.tick(t0 + Duration::from_millis(70));
        assert_eq!(cam.fps(), 25);
    }

    #[test]
    fn empty_tick_changes_nothing() {
        let t0 = Instant::now();
        let depth = DepthFrame::from_millimeters(2, 1, vec![300, 1800]).unwrap();
        let mut cam = CameraState::new("front", SensorGeometry::default(), t0)
            .with_stream(ScriptedStream::boxed("rgb", StreamRole::Color, vec![color(9)]))
            .with_stream(ScriptedStream::boxed(
                "depth",
                StreamRole::Depth,
                vec![StreamItem::Depth(depth.clone())],
            ));
        assert!(cam.tick(t0 + Duration::from_millis(100)));
        assert!(cam.last_updates().depth);
        let fps = cam.fps();
        let frame = cam.color().cloned();
        let depth_color = cam.depth_color().cloned();
        assert!(depth_color.is_some());

        assert!(!cam.tick(t0 + Duration::from_secs(5)));
        assert_eq!(cam.fps(), fps);
        assert_eq!(cam.color().cloned(), frame);
        assert_eq!(cam.depth(), Some(&depth));
        assert_eq!(cam.depth_color().cloned(), depth_color);
        assert!(!cam.last_updates().any());
        assert_eq!(cam.stats().ticks, 2);
        assert_eq!(cam.stats().changed_ticks, 1);
    }

    #[test]
    fn depth_updates_refresh_false_color() {
        let t0 = Instant::now();
        let depth = DepthFrame::from_millimeters(2, 1, vec![100, 900]).unwrap();
        let mut cam = CameraState::new("front", SensorGeometry::default(), t0).with_stream(
            ScriptedStream::boxed("depth", StreamRole::Depth, vec![StreamItem::Depth(depth)]),
        );
        assert!(cam.has_depth_stream());
        assert!(cam.depth_color().is_none());
        assert!(cam.tick(t0 + Duration::from_millis(10)));
        assert!(cam.last_updates().depth);
        assert_eq!(cam.depth_color().unwrap().width(), 2);
    }

    #[test]
    fn detections_replace_previous_batch() {
        let t0 = Instant::now();
        let first = vec![RawDetection::new(0, [0.1, 0.1, 0.2, 0.2], 0.9)];
        let mut cam = CameraState::new("front", SensorGeometry::default(), t0).with_stream(
            ScriptedStream::boxed(
                "nn",
                StreamRole::Detections,
                vec![StreamItem::Detections(first), StreamItem::Detections(Vec::new())],
            ),
        );
        cam.tick(t0 + Duration::from_millis(10));
        assert_eq!(cam.detections().len(), 1);
        cam.tick(t0 + Duration::from_millis(20));
        assert!(cam.detections().is_empty());
        assert!(cam.last_updates().detections);
    }

    #[test]
    fn mismatched_items_are_dropped() {
        let t0 = Instant::now();
        let mut cam = CameraState::new("front", SensorGeometry::default(), t0).with_stream(
            ScriptedStream::boxed("depth", StreamRole::Depth, vec![color(3)]),
        );
        assert!(!cam.tick(t0 + Duration::from_millis(10)));
        assert!(cam.color().is_none());
        assert_eq!(cam.stats().dropped_items, 1);
        assert_eq!(cam.fps(), 0);
    }
}

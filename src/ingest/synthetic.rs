//! Synthetic camera (`stub://`).
//!
//! Renders a flat scene with two targets sweeping across the view and
//! streams matching color, depth and detection outputs at the configured
//! rate. Target depth and confidence carry a little random jitter so that
//! consumers see changing values. Detections scoring below the configured
//! confidence threshold are dropped before they reach the stream, as the
//! on-device detection network does.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use rand::Rng;

use crate::camera::{CameraState, StreamItem, StreamRole};
use crate::detect::RawDetection;
use crate::frame::{Bgr, ColorFrame, DepthFrame};
use crate::geometry::{FrameMapping, PixelBox, Roi};
use crate::ingest::queue::{stream_channel, StreamFeed, DEFAULT_QUEUE_CAPACITY};
use crate::ingest::{DriverHandle, DriverSettings};

const BACKGROUND_MM: u16 = 4000;
const TARGET_HALF_SIZE: f64 = 0.08;

struct Target {
    label: i32,
    /// Sweep phase offset in radians.
    phase: f64,
    row: f64,
    depth_mm: f64,
    color: Bgr,
}

static TARGETS: [Target; 2] = [
    Target {
        label: 0,
        phase: 0.0,
        row: 0.35,
        depth_mm: 1500.0,
        color: [40, 40, 220],
    },
    Target {
        label: 1,
        phase: std::f64::consts::PI,
        row: 0.65,
        depth_mm: 2600.0,
        color: [220, 120, 40],
    },
];

struct SyntheticScene {
    mapping: FrameMapping,
    width: u32,
    height: u32,
    frame_count: u64,
    confidence_threshold: f32,
}

struct Feeds {
    color: StreamFeed,
    depth: Option<StreamFeed>,
    detections: Option<StreamFeed>,
}

pub(super) fn spawn(settings: &DriverSettings, state: &mut CameraState) -> Result<DriverHandle> {
    let (width, height) = settings.geometry.isp_size();
    let mapping = FrameMapping::new(settings.geometry.nn_input, width, height)?;

    let (color, color_stream) = stream_channel(
        StreamRole::Color,
        format!("{}/rgb", settings.name),
        DEFAULT_QUEUE_CAPACITY,
    );
    state.add_stream(Box::new(color_stream));

    let depth = settings.use_depth.then(|| {
        let (feed, stream) = stream_channel(
            StreamRole::Depth,
            format!("{}/depth", settings.name),
            DEFAULT_QUEUE_CAPACITY,
        );
        state.add_stream(Box::new(stream));
        feed
    });
    let detections = settings.detect_objects.then(|| {
        let (feed, stream) = stream_channel(
            StreamRole::Detections,
            format!("{}/nn", settings.name),
            DEFAULT_QUEUE_CAPACITY,
        );
        state.add_stream(Box::new(stream));
        feed
    });

    let feeds = Feeds {
        color,
        depth,
        detections,
    };
    let mut scene = SyntheticScene {
        mapping,
        width,
        height,
        frame_count: 0,
        confidence_threshold: settings.confidence_threshold as f32,
    };
    let period = Duration::from_secs_f64(1.0 / settings.fps as f64);
    let spatial = settings.use_depth;
    let invert = settings.invert;
    let name = settings.name.clone();
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_thread = shutdown.clone();

    let join = std::thread::Builder::new()
        .name(format!("camera-{}", name))
        .spawn(move || {
            let mut rng = rand::thread_rng();
            while !shutdown_thread.load(Ordering::SeqCst) {
                if let Err(err) = scene.emit(&feeds, spatial, invert, &mut rng) {
                    log::debug!("synthetic driver stopped: {}", err);
                    break;
                }
                std::thread::sleep(period);
            }
        })?;

    Ok(DriverHandle::new(name, shutdown, join))
}

impl SyntheticScene {
    fn emit(&mut self, feeds: &Feeds, spatial: bool, invert: bool, rng: &mut impl Rng) -> Result<()> {
        self.frame_count += 1;
        let t = self.frame_count as f64 * 0.05;

        let mut placed = Vec::with_capacity(TARGETS.len());
        for target in &TARGETS {
            let mut cx = 0.5 + 0.3 * (t + target.phase).sin();
            let mut row = target.row;
            if invert {
                // The device rotates its outputs, so the scene appears point-mirrored.
                cx = 1.0 - cx;
                row = 1.0 - row;
            }
            let roi = Roi::from_corners(
                cx - TARGET_HALF_SIZE,
                row - TARGET_HALF_SIZE,
                cx + TARGET_HALF_SIZE,
                row + TARGET_HALF_SIZE,
            );
            let depth_mm = target.depth_mm + rng.gen_range(-20.0..20.0);
            placed.push((target, roi, depth_mm));
        }

        let boxes: Vec<(PixelBox, Bgr, u16)> = placed
            .iter()
            .map(|(target, roi, depth)| {
                let bbox = self.clamp(self.mapping.map(*roi).pixel_corners());
                (bbox, target.color, *depth as u16)
            })
            .collect();

        feeds.color.push(StreamItem::Color(self.color_frame(&boxes)?))?;
        if let Some(feed) = &feeds.depth {
            feed.push(StreamItem::Depth(self.depth_frame(&boxes)?))?;
        }
        if let Some(feed) = &feeds.detections {
            let batch = placed
                .iter()
                .filter_map(|(target, roi, depth_mm)| {
                    let (xmin, ymin) = roi.top_left();
                    let (xmax, ymax) = roi.bottom_right();
                    let confidence = rng.gen_range(0.75..0.95);
                    if confidence < self.confidence_threshold {
                        return None;
                    }
                    let det = RawDetection::new(
                        target.label,
                        [xmin as f32, ymin as f32, xmax as f32, ymax as f32],
                        confidence,
                    );
                    if spatial {
                        let lateral = (xmin + xmax - 1.0) / 2.0 * depth_mm;
                        Some(det.with_spatial(lateral as f32, 0.0, *depth_mm as f32))
                    } else {
                        Some(det)
                    }
                })
                .collect();
            feed.push(StreamItem::Detections(batch))?;
        }
        Ok(())
    }

    fn clamp(&self, bbox: PixelBox) -> PixelBox {
        let w = self.width as i32;
        let h = self.height as i32;
        PixelBox {
            xmin: bbox.xmin.clamp(0, w),
            ymin: bbox.ymin.clamp(0, h),
            xmax: bbox.xmax.clamp(0, w),
            ymax: bbox.ymax.clamp(0, h),
        }
    }

    fn color_frame(&self, boxes: &[(PixelBox, Bgr, u16)]) -> Result<ColorFrame> {
        let shade = (self.frame_count % 64) as u8 + 32;
        let mut bytes = vec![shade; (self.width * self.height * 3) as usize];
        for (bbox, color, _) in boxes {
            for y in bbox.ymin..bbox.ymax {
                for x in bbox.xmin..bbox.xmax {
                    let offset = ((y as u32 * self.width + x as u32) * 3) as usize;
                    bytes[offset..offset + 3].copy_from_slice(color);
                }
            }
        }
        ColorFrame::from_bgr(self.width, self.height, bytes)
    }

    fn depth_frame(&self, boxes: &[(PixelBox, Bgr, u16)]) -> Result<DepthFrame> {
        let mut samples = vec![BACKGROUND_MM; (self.width * self.height) as usize];
        for (bbox, _, depth) in boxes {
            for y in bbox.ymin..bbox.ymax {
                for x in bbox.xmin..bbox.xmax {
                    samples[(y as u32 * self.width + x as u32) as usize] = *depth;
                }
            }
        }
        DepthFrame::from_millimeters(self.width, self.height, samples)
    }
}

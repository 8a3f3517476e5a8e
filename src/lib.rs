//! Vision Relay
//!
//! Runs on a vision coprocessor next to one or more depth cameras. Each
//! camera streams color frames, depth frames and on-device detections; the
//! relay folds them into per-camera state, maps detections into a single
//! record schema and publishes the record list over MQTT.
//!
//! # Architecture
//!
//! The pipeline keeps three guarantees:
//!
//! 1. **Non-blocking ticks**: one tick takes at most one pending item per
//!    stream and never waits for data.
//! 2. **No stale republish**: records are built and published only on ticks
//!    that delivered new inputs.
//! 3. **Cosmetic overlays**: drawing never changes the published records.
//!
//! # Module Structure
//!
//! - `geometry`: NN-input to display-frame coordinate mapping
//! - `detect`: detection records, label table, tag record builder
//! - `camera`: per-camera stream state and the tick
//! - `depth`: false-color depth rendering
//! - `ingest`: camera drivers and bounded stream queues
//! - `session`: one camera's pipeline
//! - `runtime`: sequential and per-camera schedulers
//! - `transport`: record sinks (MQTT, channel, log)
//! - `display`: driver-station composite and snapshots
//! - `config`: file and environment configuration

pub mod camera;
pub mod config;
pub mod depth;
pub mod detect;
pub mod display;
pub mod frame;
pub mod geometry;
pub mod ingest;
pub mod overlay;
pub mod runtime;
pub mod session;
pub mod transport;

pub use camera::{CameraState, CameraStats, InputStream, StreamItem, StreamRole, TickUpdates};
pub use config::{CameraSettings, RelayConfig, Scheduler};
pub use depth::colorize_depth;
pub use detect::{
    CameraIntrinsics, Capability, DetectionNormalizer, DetectionRecord, LabelTable, RawDetection,
    RecordRotation, SpatialCoordinates, TagDetection, TagDetector, TagPose, TagRecordBuilder,
};
pub use frame::{ColorFrame, DepthFrame, SensorGeometry};
pub use geometry::{map_detection_to_frame, FrameMapping, NnInputSize, PixelBox, Roi};
pub use ingest::{open_camera, DriverSettings, OpenedCamera};
pub use overlay::{DrawCommand, Overlay};
pub use runtime::{open_sessions, spawn_camera_workers, CameraWorkers, TickLoop};
pub use session::{CameraSession, Publication};
pub use transport::{ChannelSink, LogSink, MqttSink, RecordSink, Topics};

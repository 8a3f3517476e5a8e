//! Camera drivers.
//!
//! A driver owns a device and pushes its outputs (color frames, depth
//! frames, detection batches) into bounded stream queues. The tick loop sees
//! only the consumer halves, attached to a `CameraState`.
//!
//! Supported sources:
//! - `stub://<name>`: synthetic device for bench runs and tests
//!
//! Hardware sources are recognized by scheme but need a device driver that
//! is not built into this crate; opening one is a configuration error.
//!
//! Drivers MUST NOT:
//! - Block the tick loop
//! - Log raw frame content

pub mod queue;
mod synthetic;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use anyhow::{anyhow, Result};

use crate::camera::CameraState;
use crate::detect::{CameraIntrinsics, StubTagDetector, TagDetector};
use crate::frame::SensorGeometry;

pub use queue::{stream_channel, ChannelStream, StreamFeed, DEFAULT_QUEUE_CAPACITY};

/// Everything a driver needs to bring up one camera.
#[derive(Clone, Debug)]
pub struct DriverSettings {
    pub name: String,
    /// Device serial, when the camera is pinned to one.
    pub device_id: Option<String>,
    pub source: String,
    pub geometry: SensorGeometry,
    pub fps: u32,
    pub use_depth: bool,
    /// Camera mounted upside down; outputs are rotated 180 degrees.
    pub invert: bool,
    pub detect_objects: bool,
    /// Minimum score for a detection to leave the device.
    pub confidence_threshold: f64,
    pub detect_tags: bool,
    pub tag_family: String,
    pub tag_size_m: f64,
    pub intrinsics: Option<CameraIntrinsics>,
}

impl DriverSettings {
    /// Synthetic camera with default geometry.
    pub fn stub(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            source: format!("stub://{}", name),
            name,
            device_id: None,
            geometry: SensorGeometry::default(),
            fps: 25,
            use_depth: true,
            invert: false,
            detect_objects: true,
            confidence_threshold: 0.5,
            detect_tags: true,
            tag_family: "tag36h11".to_string(),
            tag_size_m: 0.1651,
            intrinsics: None,
        }
    }

    /// Camera name plus device serial, for logs and errors.
    pub fn label(&self) -> String {
        match &self.device_id {
            Some(id) => format!("{} ({})", self.name, id),
            None => self.name.clone(),
        }
    }
}

/// Stops the driver thread when dropped.
pub struct DriverHandle {
    name: String,
    shutdown: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl DriverHandle {
    pub(crate) fn new(name: String, shutdown: Arc<AtomicBool>, join: JoinHandle<()>) -> Self {
        Self {
            name,
            shutdown,
            join: Some(join),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        self.join.as_ref().is_some_and(|j| !j.is_finished())
    }

    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                log::warn!("camera {}: driver thread panicked", self.name);
            }
        }
    }
}

impl Drop for DriverHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

/// A camera ready for a session: state with streams attached, an optional
/// tag detector bound to its color output, and the running driver.
pub struct OpenedCamera {
    pub state: CameraState,
    pub tag_detector: Option<Box<dyn TagDetector>>,
    pub driver: DriverHandle,
}

pub fn open_camera(settings: &DriverSettings) -> Result<OpenedCamera> {
    settings.geometry.validate()?;
    if settings.fps == 0 {
        return Err(anyhow!("camera {}: fps must be non-zero", settings.name));
    }
    let (scheme, _) = settings
        .source
        .split_once("://")
        .ok_or_else(|| anyhow!("camera {}: source '{}' has no scheme", settings.name, settings.source))?;

    match scheme {
        "stub" => {
            let mut state = CameraState::new(&settings.name, settings.geometry, Instant::now());
            let driver = synthetic::spawn(settings, &mut state)?;
            let tag_detector = settings.detect_tags.then(|| {
                Box::new(StubTagDetector::new(
                    &settings.tag_family,
                    settings.tag_size_m,
                    settings.intrinsics,
                )) as Box<dyn TagDetector>
            });
            log::info!(
                "camera {}: connected to {} (synthetic, threshold {:.2})",
                settings.label(),
                settings.source,
                settings.confidence_threshold
            );
            Ok(OpenedCamera {
                state,
                tag_detector,
                driver,
            })
        }
        "oak" | "usb" | "mxid" => Err(anyhow!(
            "camera {}: source '{}' needs a device driver that is not built in",
            settings.label(),
            settings.source
        )),
        other => Err(anyhow!(
            "camera {}: unsupported source scheme '{}'",
            settings.name,
            other
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hardware_sources_are_rejected() {
        let mut settings = DriverSettings::stub("front");
        settings.source = "oak://14442C10D13EABCE00".to_string();
        settings.device_id = Some("14442C10D13EABCE00".to_string());
        let err = open_camera(&settings).err().unwrap().to_string();
        assert!(err.contains("device driver"));
        assert!(err.contains("front (14442C10D13EABCE00)"));

        settings.source = "front".to_string();
        assert!(open_camera(&settings).is_err());
    }

    #[test]
    fn zero_fps_is_rejected() {
        let mut settings = DriverSettings::stub("front");
        settings.fps = 0;
        assert!(open_camera(&settings).is_err());
    }
}

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::detect::{CameraIntrinsics, Capability, DetectionNormalizer, LabelTable};
use crate::frame::SensorGeometry;
use crate::geometry::NnInputSize;
use crate::ingest::DriverSettings;
use crate::transport::{parse_mqtt_endpoint, validate_loopback_addr, MqttEndpoint, MqttSettings, Topics};

const DEFAULT_BROKER: &str = "127.0.0.1:1883";
const DEFAULT_CLIENT_ID: &str = "vision_relay";
const DEFAULT_TOPIC_PREFIX: &str = "MonsterVision";
const DEFAULT_TAG_FAMILY: &str = "tag36h11";
const DEFAULT_TAG_SIZE_M: f64 = 0.1651;
const DEFAULT_CAMERA_FPS: u32 = 25;
const DEFAULT_PREVIEW_SIZE: u32 = 200;
const DEFAULT_DS_SCALE: f64 = 0.5;
const DEFAULT_DS_SUBSAMPLING: u32 = 4;
const DEFAULT_BB_FRACTION: f64 = 0.2;
const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.5;
const DEFAULT_CAMERA_SOURCE: &str = "stub://front";

#[derive(Debug, Deserialize, Default)]
struct RelayConfigFile {
    network: Option<NetworkConfigFile>,
    vision: Option<VisionConfigFile>,
    nn: Option<NnConfigFile>,
    cameras: Option<Vec<CameraConfigFile>>,
}

#[derive(Debug, Deserialize, Default)]
struct NetworkConfigFile {
    broker: Option<String>,
    client_id: Option<String>,
    topic_prefix: Option<String>,
    allow_remote: Option<bool>,
    username: Option<String>,
    password: Option<String>,
    team: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct VisionConfigFile {
    tag_family: Option<String>,
    tag_size_m: Option<f64>,
    camera_fps: Option<u32>,
    preview_width: Option<u32>,
    preview_height: Option<u32>,
    ds_scale: Option<f64>,
    ds_subsampling: Option<u32>,
    snapshot_path: Option<PathBuf>,
    scheduler: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct NnConfigFile {
    path: Option<PathBuf>,
    input_size: Option<String>,
    bb_fraction: Option<f64>,
    family: Option<String>,
    confidence_threshold: Option<f64>,
    labels: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    id: Option<String>,
    name: Option<String>,
    source: Option<String>,
    use_depth: Option<bool>,
    invert: Option<bool>,
    detect_objects: Option<bool>,
    detect_tags: Option<bool>,
    intrinsics: Option<CameraIntrinsics>,
    rgb_width: Option<u32>,
    rgb_height: Option<u32>,
    isp_scale: Option<[u32; 2]>,
}

/// Network description file in the depthai model-zoo layout.
#[derive(Debug, Deserialize)]
struct DepthaiNnFile {
    nn_config: DepthaiNnConfig,
    mappings: Option<DepthaiMappings>,
}

#[derive(Debug, Deserialize)]
struct DepthaiNnConfig {
    input_size: Option<String>,
    bb_fraction: Option<f64>,
    #[serde(rename = "NN_family")]
    nn_family: Option<String>,
    confidence_threshold: Option<f64>,
    #[serde(rename = "NN_specific_metadata")]
    nn_specific_metadata: Option<DepthaiNnMetadata>,
}

#[derive(Debug, Deserialize)]
struct DepthaiNnMetadata {
    confidence_threshold: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct DepthaiMappings {
    labels: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub network: NetworkSettings,
    pub vision: VisionSettings,
    pub nn: NnSettings,
    pub cameras: Vec<CameraSettings>,
}

#[derive(Debug, Clone)]
pub struct NetworkSettings {
    pub broker: String,
    pub client_id: String,
    pub topic_prefix: String,
    pub allow_remote: bool,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Informational only.
    pub team: u32,
}

#[derive(Debug, Clone)]
pub struct VisionSettings {
    pub tag_family: String,
    pub tag_size_m: f64,
    pub camera_fps: u32,
    pub preview_width: u32,
    pub preview_height: u32,
    pub ds_scale: f64,
    pub ds_subsampling: u32,
    pub snapshot_path: Option<PathBuf>,
    pub scheduler: Scheduler,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheduler {
    /// One loop ticks every camera in turn.
    Sequential,
    /// One worker thread per camera.
    PerCamera,
}

/// Decides where a depthai nn file keeps its confidence threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NnFamily {
    MobileNet,
    Yolo,
}

impl NnFamily {
    fn parse(value: &str) -> Result<Self> {
        match value {
            "mobilenet" => Ok(Self::MobileNet),
            "YOLO" | "yolo" => Ok(Self::Yolo),
            other => Err(anyhow!("unknown NN family '{}'", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NnSettings {
    pub input_size: NnInputSize,
    pub bb_fraction: f64,
    pub confidence_threshold: f64,
    pub labels: LabelTable,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub id: Option<String>,
    pub name: String,
    pub source: String,
    pub use_depth: bool,
    pub invert: bool,
    pub detect_objects: bool,
    pub detect_tags: bool,
    pub intrinsics: Option<CameraIntrinsics>,
    pub rgb_width: u32,
    pub rgb_height: u32,
    pub isp_scale: (u32, u32),
}

impl RelayConfig {
    /// Reads `VISION_CONFIG` if set, fills defaults, applies environment
    /// overrides, then validates.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("VISION_CONFIG").ok();
        Self::load_from(config_path.as_deref().map(Path::new))
    }

    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let file_cfg = match path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: RelayConfigFile) -> Result<Self> {
        let network_file = file.network.unwrap_or_default();
        let network = NetworkSettings {
            broker: network_file
                .broker
                .unwrap_or_else(|| DEFAULT_BROKER.to_string()),
            client_id: network_file
                .client_id
                .unwrap_or_else(|| DEFAULT_CLIENT_ID.to_string()),
            topic_prefix: network_file
                .topic_prefix
                .unwrap_or_else(|| DEFAULT_TOPIC_PREFIX.to_string()),
            allow_remote: network_file.allow_remote.unwrap_or(false),
            username: network_file.username,
            password: network_file.password,
            team: network_file.team.unwrap_or(0),
        };

        let vision_file = file.vision.unwrap_or_default();
        let scheduler = match vision_file.scheduler.as_deref() {
            None | Some("sequential") => Scheduler::Sequential,
            Some("per_camera") => Scheduler::PerCamera,
            Some(other) => return Err(anyhow!("unknown scheduler '{}'", other)),
        };
        let vision = VisionSettings {
            tag_family: vision_file
                .tag_family
                .unwrap_or_else(|| DEFAULT_TAG_FAMILY.to_string()),
            tag_size_m: vision_file.tag_size_m.unwrap_or(DEFAULT_TAG_SIZE_M),
            camera_fps: vision_file.camera_fps.unwrap_or(DEFAULT_CAMERA_FPS),
            preview_width: vision_file.preview_width.unwrap_or(DEFAULT_PREVIEW_SIZE),
            preview_height: vision_file.preview_height.unwrap_or(DEFAULT_PREVIEW_SIZE),
            ds_scale: vision_file.ds_scale.unwrap_or(DEFAULT_DS_SCALE),
            ds_subsampling: vision_file.ds_subsampling.unwrap_or(DEFAULT_DS_SUBSAMPLING),
            snapshot_path: vision_file.snapshot_path,
            scheduler,
        };

        let nn = nn_settings(file.nn.unwrap_or_default())?;

        let cameras = match file.cameras {
            Some(cameras) if !cameras.is_empty() => cameras
                .into_iter()
                .enumerate()
                .map(|(index, camera)| camera_settings(index, camera))
                .collect(),
            _ => vec![camera_settings(0, CameraConfigFile::default())],
        };

        Ok(Self {
            network,
            vision,
            nn,
            cameras,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(broker) = std::env::var("VISION_MQTT_BROKER") {
            if !broker.trim().is_empty() {
                self.network.broker = broker;
            }
        }
        if let Ok(prefix) = std::env::var("VISION_TOPIC_PREFIX") {
            if !prefix.trim().is_empty() {
                self.network.topic_prefix = prefix;
            }
        }
        if let Ok(family) = std::env::var("VISION_TAG_FAMILY") {
            if !family.trim().is_empty() {
                self.vision.tag_family = family;
            }
        }
        if let Ok(path) = std::env::var("VISION_SNAPSHOT_PATH") {
            if !path.trim().is_empty() {
                self.vision.snapshot_path = Some(PathBuf::from(path));
            }
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        let endpoint = self.mqtt_endpoint()?;
        if !self.network.allow_remote {
            validate_loopback_addr(&endpoint, &self.network.broker)?;
        } else if !endpoint.is_loopback() {
            log::warn!("remote MQTT enabled - ensure broker is in a trusted network");
        }
        if self.network.topic_prefix.trim().is_empty() {
            return Err(anyhow!("topic prefix must not be empty"));
        }
        self.network.topic_prefix = self.network.topic_prefix.trim_end_matches('/').to_string();

        if !(self.nn.bb_fraction > 0.0 && self.nn.bb_fraction <= 1.0) {
            return Err(anyhow!("bb_fraction must be in (0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.nn.confidence_threshold) {
            return Err(anyhow!("confidence_threshold must be in [0, 1]"));
        }
        if self.nn.input_size.width == 0 || self.nn.input_size.height == 0 {
            return Err(anyhow!("nn input size must be non-zero"));
        }
        if !(self.vision.tag_size_m > 0.0) {
            return Err(anyhow!("tag_size_m must be greater than zero"));
        }
        if !(self.vision.ds_scale > 0.0 && self.vision.ds_scale <= 1.0) {
            return Err(anyhow!("ds_scale must be in (0, 1]"));
        }
        if self.vision.camera_fps == 0 {
            return Err(anyhow!("camera_fps must be greater than zero"));
        }
        if self.vision.tag_family.trim().is_empty() {
            return Err(anyhow!("tag_family must not be empty"));
        }
        if self.vision.snapshot_path.is_some() && self.vision.scheduler == Scheduler::PerCamera {
            log::warn!("snapshot_path is ignored with the per_camera scheduler");
        }

        let mut names = HashSet::new();
        for camera in &self.cameras {
            if camera.name.trim().is_empty() {
                return Err(anyhow!("camera name must not be empty"));
            }
            if !names.insert(camera.name.as_str()) {
                return Err(anyhow!("duplicate camera name '{}'", camera.name));
            }
            if let Some(k) = &camera.intrinsics {
                if !k.is_valid() {
                    return Err(anyhow!("camera {}: invalid intrinsics", camera.name));
                }
            }
            self.geometry_for(camera).validate().map_err(|e| {
                anyhow!("camera {}: {}", camera.name, e)
            })?;
        }
        Ok(())
    }

    pub fn mqtt_endpoint(&self) -> Result<MqttEndpoint> {
        parse_mqtt_endpoint(&self.network.broker)
    }

    pub fn topics(&self) -> Topics {
        Topics::new(&self.network.topic_prefix)
    }

    pub fn mqtt_settings(&self) -> Result<MqttSettings> {
        Ok(MqttSettings {
            endpoint: self.mqtt_endpoint()?,
            client_id: self.network.client_id.clone(),
            username: self.network.username.clone(),
            password: self.network.password.clone(),
            topics: self.topics(),
        })
    }

    /// The preview stream is NN-sized when the camera runs the detector.
    pub fn geometry_for(&self, camera: &CameraSettings) -> SensorGeometry {
        let nn_input = if camera.detect_objects {
            self.nn.input_size
        } else {
            NnInputSize::new(self.vision.preview_width, self.vision.preview_height)
        };
        SensorGeometry {
            nn_input,
            rgb_width: camera.rgb_width,
            rgb_height: camera.rgb_height,
            isp_scale: camera.isp_scale,
        }
    }

    pub fn driver_settings(&self, camera: &CameraSettings) -> DriverSettings {
        DriverSettings {
            name: camera.name.clone(),
            device_id: camera.id.clone(),
            source: camera.source.clone(),
            geometry: self.geometry_for(camera),
            fps: self.vision.camera_fps,
            use_depth: camera.use_depth,
            invert: camera.invert,
            detect_objects: camera.detect_objects,
            confidence_threshold: self.nn.confidence_threshold,
            detect_tags: camera.detect_tags,
            tag_family: self.vision.tag_family.clone(),
            tag_size_m: self.vision.tag_size_m,
            intrinsics: camera.intrinsics,
        }
    }

    pub fn normalizer(&self) -> DetectionNormalizer {
        DetectionNormalizer::new(self.nn.labels.clone(), self.nn.input_size, self.nn.bb_fraction)
    }
}

impl CameraSettings {
    pub fn capability(&self) -> Capability {
        Capability::from_flags(self.detect_objects, self.detect_tags)
    }
}

fn nn_settings(file: NnConfigFile) -> Result<NnSettings> {
    let family_override = file.family.as_deref().map(NnFamily::parse).transpose()?;
    let mut settings = NnSettings {
        input_size: NnInputSize::default(),
        bb_fraction: DEFAULT_BB_FRACTION,
        confidence_threshold: DEFAULT_CONFIDENCE_THRESHOLD,
        labels: LabelTable::default(),
    };

    if let Some(path) = &file.path {
        let nn_file = read_nn_file(path)?;
        let nn = nn_file.nn_config;
        if let Some(size) = nn.input_size {
            settings.input_size = size
                .parse()
                .map_err(|e| anyhow!("invalid input_size in {}: {}", path.display(), e))?;
        }
        if let Some(fraction) = nn.bb_fraction {
            settings.bb_fraction = fraction;
        }
        let family = match family_override {
            Some(family) => family,
            None => nn
                .nn_family
                .as_deref()
                .map(NnFamily::parse)
                .transpose()?
                .unwrap_or(NnFamily::MobileNet),
        };
        let threshold = match family {
            NnFamily::Yolo => nn
                .nn_specific_metadata
                .and_then(|meta| meta.confidence_threshold),
            NnFamily::MobileNet => nn.confidence_threshold,
        };
        if let Some(threshold) = threshold {
            settings.confidence_threshold = threshold;
        }
        if let Some(mappings) = nn_file.mappings {
            settings.labels = LabelTable::new(mappings.labels);
        }
    }

    if let Some(size) = file.input_size {
        settings.input_size = size
            .parse()
            .map_err(|e| anyhow!("invalid nn.input_size: {}", e))?;
    }
    if let Some(fraction) = file.bb_fraction {
        settings.bb_fraction = fraction;
    }
    if let Some(threshold) = file.confidence_threshold {
        settings.confidence_threshold = threshold;
    }
    if let Some(labels) = file.labels {
        settings.labels = LabelTable::new(labels);
    }
    Ok(settings)
}

fn camera_settings(index: usize, file: CameraConfigFile) -> CameraSettings {
    let source = file
        .source
        .unwrap_or_else(|| DEFAULT_CAMERA_SOURCE.to_string());
    let name = file.name.unwrap_or_else(|| match source.split_once("://") {
        Some((_, rest)) if !rest.is_empty() => rest.to_string(),
        _ => format!("camera{}", index),
    });
    let [num, den] = file.isp_scale.unwrap_or([2, 3]);
    CameraSettings {
        id: file.id,
        name,
        source,
        use_depth: file.use_depth.unwrap_or(true),
        invert: file.invert.unwrap_or(false),
        detect_objects: file.detect_objects.unwrap_or(true),
        detect_tags: file.detect_tags.unwrap_or(true),
        intrinsics: file.intrinsics,
        rgb_width: file.rgb_width.unwrap_or(1920),
        rgb_height: file.rgb_height.unwrap_or(1080),
        isp_scale: (num, den),
    }
}

fn read_config_file(path: &Path) -> Result<RelayConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn read_nn_file(path: &Path) -> Result<DepthaiNnFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read nn config {}: {}", path.display(), e))?;
    serde_json::from_str(&raw).map_err(|e| anyhow!("invalid nn config {}: {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_a_file() {
        let cfg = RelayConfig::from_file(RelayConfigFile::default()).unwrap();
        assert_eq!(cfg.network.broker, DEFAULT_BROKER);
        assert_eq!(cfg.network.topic_prefix, "MonsterVision");
        assert_eq!(cfg.vision.tag_family, "tag36h11");
        assert_eq!(cfg.vision.camera_fps, 25);
        assert_eq!(cfg.nn.input_size, NnInputSize::new(300, 300));
        assert_eq!(cfg.cameras.len(), 1);
        assert_eq!(cfg.cameras[0].name, "front");
        assert_eq!(cfg.cameras[0].capability(), Capability::Both);
        assert_eq!(cfg.geometry_for(&cfg.cameras[0]).isp_size(), (1280, 720));
    }

    #[test]
    fn camera_without_detector_uses_preview_size() {
        let mut camera = camera_settings(0, CameraConfigFile::default());
        camera.detect_objects = false;
        let cfg = RelayConfig::from_file(RelayConfigFile::default()).unwrap();
        assert_eq!(cfg.geometry_for(&camera).nn_input, NnInputSize::new(200, 200));
    }

    #[test]
    fn unknown_scheduler_is_rejected() {
        let file = RelayConfigFile {
            vision: Some(VisionConfigFile {
                scheduler: Some("round_robin".to_string()),
                ..VisionConfigFile::default()
            }),
            ..RelayConfigFile::default()
        };
        assert!(RelayConfig::from_file(file).is_err());
    }

    #[test]
    fn validation_catches_bad_values() {
        let mut cfg = RelayConfig::from_file(RelayConfigFile::default()).unwrap();
        cfg.nn.bb_fraction = 0.0;
        assert!(cfg.validate().is_err());

        let mut cfg = RelayConfig::from_file(RelayConfigFile::default()).unwrap();
        cfg.cameras.push(cfg.cameras[0].clone());
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate camera"));

        let mut cfg = RelayConfig::from_file(RelayConfigFile::default()).unwrap();
        cfg.network.broker = "10.0.0.2:1883".to_string();
        assert!(cfg.validate().is_err());
        cfg.network.allow_remote = true;
        assert!(cfg.validate().is_ok());
    }
}

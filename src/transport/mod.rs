//! Publication transports.
//!
//! A `RecordSink` receives each camera's record list when it changes. The
//! MQTT sink is the production path; the channel sink hands publications
//! between threads; the log sink backs dry runs.

mod channel;
mod endpoint;
mod mqtt;

use anyhow::Result;

use crate::session::Publication;

pub use channel::{publication_channel, ChannelSink};
pub use endpoint::{parse_mqtt_endpoint, validate_loopback_addr, MqttEndpoint};
pub use mqtt::{MqttSettings, MqttSink};

pub const PAYLOAD_ONLINE: &str = "online";
pub const PAYLOAD_OFFLINE: &str = "offline";

pub trait RecordSink: Send {
    fn publish(&mut self, publication: &Publication) -> Result<()>;

    /// Flush and announce shutdown. Called once at exit.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Topic layout under a common prefix.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Topics {
    prefix: String,
}

impl Topics {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Retained JSON record list for one camera.
    pub fn records(&self, camera: &str) -> String {
        format!("{}/ObjectTracker-{}", self.prefix, camera)
    }

    pub fn fps(&self, camera: &str) -> String {
        format!("{}/{}/fps", self.prefix, camera)
    }

    pub fn status(&self) -> String {
        format!("{}/status", self.prefix)
    }
}

/// Logs publications instead of sending them.
#[derive(Default)]
pub struct LogSink {
    published: u64,
}

impl LogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> u64 {
        self.published
    }
}

impl RecordSink for LogSink {
    fn publish(&mut self, publication: &Publication) -> Result<()> {
        self.published += 1;
        log::info!(
            "[dry-run] {} ({} fps): {}",
            publication.camera,
            publication.fps,
            publication.records_json()?
        );
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        log::info!("[dry-run] {} publications", self.published);
        Ok(())
    }
}

/// Collects publications in memory.
#[derive(Default)]
pub struct MemorySink {
    pub publications: Vec<Publication>,
    pub closed: bool,
}

impl RecordSink for MemorySink {
    fn publish(&mut self, publication: &Publication) -> Result<()> {
        self.publications.push(publication.clone());
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_layout() {
        let topics = Topics::new("MonsterVision/");
        assert_eq!(topics.records("front"), "MonsterVision/ObjectTracker-front");
        assert_eq!(topics.fps("front"), "MonsterVision/front/fps");
        assert_eq!(topics.status(), "MonsterVision/status");
    }

    #[test]
    fn log_sink_counts() {
        let mut sink = LogSink::new();
        sink.publish(&Publication {
            camera: "front".to_string(),
            records: Vec::new(),
            fps: 30,
        })
        .unwrap();
        assert_eq!(sink.published(), 1);
        assert!(sink.close().is_ok());
    }
}

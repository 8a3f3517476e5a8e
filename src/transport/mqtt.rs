//! MQTT publisher.
//!
//! Record lists are published retained so late subscribers always see the
//! latest value for each camera. Availability uses a retained status topic
//! with a last will, so a crashed relay reads as `offline`.

use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::Result;
use rumqttc::v5::mqttbytes::v5::LastWill;
use rumqttc::v5::mqttbytes::QoS;
use rumqttc::v5::{Client, Connection, Event, MqttOptions};

use crate::session::Publication;
use crate::transport::endpoint::MqttEndpoint;
use crate::transport::{RecordSink, Topics, PAYLOAD_OFFLINE, PAYLOAD_ONLINE};

#[derive(Clone, Debug)]
pub struct MqttSettings {
    pub endpoint: MqttEndpoint,
    pub client_id: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub topics: Topics,
}

pub struct MqttSink {
    client: Client,
    connection_handle: Option<JoinHandle<()>>,
    topics: Topics,
    closed: bool,
}

impl MqttSink {
    pub fn connect(settings: &MqttSettings) -> Result<Self> {
        let endpoint = &settings.endpoint;
        let mut options = MqttOptions::new(&settings.client_id, &endpoint.host, endpoint.port);
        options.set_keep_alive(Duration::from_secs(60));
        options.set_clean_start(true);
        if let Some(user) = &settings.username {
            options.set_credentials(user, settings.password.clone().unwrap_or_default());
        }
        let will = LastWill::new(
            settings.topics.status(),
            PAYLOAD_OFFLINE.as_bytes().to_vec(),
            QoS::AtLeastOnce,
            true,
            None,
        );
        options.set_last_will(will);
        options.set_transport(endpoint.transport());

        let (client, connection) = Client::new(options, 10);
        let connection_handle = spawn_event_loop(connection);
        log::info!(
            "MqttSink: connected to {}:{} (TLS: {}, auth: {})",
            endpoint.host,
            endpoint.port,
            endpoint.use_tls,
            settings.username.is_some()
        );

        let sink = Self {
            client,
            connection_handle: Some(connection_handle),
            topics: settings.topics.clone(),
            closed: false,
        };
        sink.publish_qos1(&sink.topics.status(), PAYLOAD_ONLINE.as_bytes(), true)?;
        Ok(sink)
    }

    fn publish_qos1(&self, topic: &str, payload: &[u8], retain: bool) -> Result<()> {
        self.client
            .publish(topic, QoS::AtLeastOnce, retain, payload.to_vec())?;
        Ok(())
    }
}

fn spawn_event_loop(mut connection: Connection) -> JoinHandle<()> {
    std::thread::spawn(move || {
        for event in connection.iter() {
            match event {
                Ok(Event::Incoming(_)) | Ok(Event::Outgoing(_)) => {}
                Err(e) => {
                    log::warn!("MQTT connection error: {}", e);
                    break;
                }
            }
        }
    })
}

impl RecordSink for MqttSink {
    fn publish(&mut self, publication: &Publication) -> Result<()> {
        let payload = publication.records_json()?;
        self.publish_qos1(
            &self.topics.records(&publication.camera),
            payload.as_bytes(),
            true,
        )?;
        self.publish_qos1(
            &self.topics.fps(&publication.camera),
            publication.fps.to_string().as_bytes(),
            false,
        )
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.publish_qos1(&self.topics.status(), PAYLOAD_OFFLINE.as_bytes(), true)?;
        self.client.disconnect()?;
        if let Some(handle) = self.connection_handle.take() {
            let _ = handle.join();
        }
        log::info!("MqttSink: disconnected");
        Ok(())
    }
}

impl Drop for MqttSink {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            log::warn!("MqttSink: close failed: {}", err);
        }
    }
}

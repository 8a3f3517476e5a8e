//! Broker address parsing.

use anyhow::{anyhow, Context, Result};
use rumqttc::Transport;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MqttEndpoint {
    pub host: String,
    pub port: u16,
    pub use_tls: bool,
}

impl MqttEndpoint {
    pub fn is_loopback(&self) -> bool {
        let host = self.host.as_str();
        if host == "localhost" {
            return true;
        }
        host.parse::<std::net::IpAddr>()
            .map(|ip| ip.is_loopback())
            .unwrap_or(false)
    }

    pub fn transport(&self) -> Transport {
        if self.use_tls {
            Transport::tls_with_default_config()
        } else {
            Transport::tcp()
        }
    }
}

/// Accepts `host:port`, `[v6]:port`, and `mqtt://`/`mqtts://` prefixed forms.
pub fn parse_mqtt_endpoint(addr: &str) -> Result<MqttEndpoint> {
    let mut use_tls = false;
    let mut remainder = addr.trim();

    if let Some((scheme, rest)) = remainder.split_once("://") {
        match scheme {
            "mqtt" | "tcp" => {}
            "mqtts" | "ssl" => use_tls = true,
            other => return Err(anyhow!("unsupported MQTT scheme: {}", other)),
        }
        remainder = rest;
    }

    let (host, port) = split_host_port(remainder)?;
    if host.is_empty() {
        return Err(anyhow!("missing MQTT host in {}", addr));
    }
    Ok(MqttEndpoint {
        host,
        port,
        use_tls,
    })
}

fn split_host_port(addr: &str) -> Result<(String, u16)> {
    if let Some(rest) = addr.strip_prefix('[') {
        let (host, rest) = rest
            .split_once(']')
            .ok_or_else(|| anyhow!("invalid MQTT address: {}", addr))?;
        let port = rest
            .strip_prefix(':')
            .ok_or_else(|| anyhow!("missing MQTT port in {}", addr))?;
        let port: u16 = port.parse().context("invalid MQTT port")?;
        return Ok((host.to_string(), port));
    }

    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| anyhow!("missing MQTT port in {}", addr))?;
    let port: u16 = port.parse().context("invalid MQTT port")?;
    Ok((host.to_string(), port))
}

pub fn validate_loopback_addr(endpoint: &MqttEndpoint, original: &str) -> Result<()> {
    if endpoint.is_loopback() {
        return Ok(());
    }
    Err(anyhow!(
        "MQTT broker must be loopback: {} (set network.allow_remote to override)",
        original
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_schemes_and_ports() {
        let plain = parse_mqtt_endpoint("127.0.0.1:1883").unwrap();
        assert_eq!(plain.host, "127.0.0.1");
        assert_eq!(plain.port, 1883);
        assert!(!plain.use_tls);

        let tls = parse_mqtt_endpoint("mqtts://broker.local:8883").unwrap();
        assert!(tls.use_tls);
        assert_eq!(tls.host, "broker.local");

        let v6 = parse_mqtt_endpoint("mqtt://[::1]:1883").unwrap();
        assert_eq!(v6.host, "::1");
        assert!(v6.is_loopback());
    }

    #[test]
    fn rejects_bad_addresses() {
        assert!(parse_mqtt_endpoint("ws://host:1").is_err());
        assert!(parse_mqtt_endpoint("host").is_err());
        assert!(parse_mqtt_endpoint("host:port").is_err());
        assert!(parse_mqtt_endpoint(":1883").is_err());
    }

    #[test]
    fn loopback_validation() {
        let local = parse_mqtt_endpoint("localhost:1883").unwrap();
        assert!(validate_loopback_addr(&local, "localhost:1883").is_ok());
        let remote = parse_mqtt_endpoint("10.47.74.2:1883").unwrap();
        let err = validate_loopback_addr(&remote, "10.47.74.2:1883").unwrap_err();
        assert!(err.to_string().contains("allow_remote"));
    }
}

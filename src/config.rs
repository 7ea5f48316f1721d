//! Typed loading of the device registry and broker settings.
//!
//! Both files are JSON. Every entry is validated at load time; a single bad
//! entry fails the whole load with an error naming it.

use crate::device::{DeviceConfig, DeviceState};
use crate::mac_address::MacAddress;
use crate::registry::Registry;
use serde::{Deserialize, Deserializer};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("device #{index} ({name}): {reason}")]
    InvalidDevice {
        index: usize,
        name: String,
        reason: String,
    },
    #[error("device #{index}: MAC {mac} is already registered")]
    DuplicateDevice { index: usize, mac: MacAddress },
    #[error("no devices configured")]
    NoDevices,
    #[error("invalid broker settings: {0}")]
    InvalidBroker(String),
}

/// Broker connection settings, as loaded from `mqtt.json`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BrokerConfig {
    #[serde(rename = "client")]
    pub client_id: String,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Topic for the bridge's own diagnostics; omitted to disable them.
    #[serde(default)]
    pub board_telemetry_topic: Option<String>,
    /// Keep-alive interval in seconds.
    #[serde(default = "default_keep_alive")]
    pub keep_alive: u64,
}

fn default_keep_alive() -> u64 {
    60
}

/// Accept `true`/`false` as well as the `0`/`1` integers older files use.
pub(crate) fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
    }

    match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => Ok(b),
        Flag::Int(0) => Ok(false),
        Flag::Int(1) => Ok(true),
        Flag::Int(other) => Err(serde::de::Error::custom(format!(
            "expected a boolean or 0/1, got {other}"
        ))),
    }
}

fn read(path: &Path) -> Result<String, ConfigError> {
    fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn load_devices(path: &Path) -> Result<Registry, ConfigError> {
    parse_devices(&read(path)?)
}

/// Parse and validate a device list into a registry.
pub fn parse_devices(json: &str) -> Result<Registry, ConfigError> {
    let configs: Vec<DeviceConfig> = serde_json::from_str(json)?;
    if configs.is_empty() {
        return Err(ConfigError::NoDevices);
    }

    let mut seen = BTreeSet::new();
    let mut devices = Vec::with_capacity(configs.len());

    for (index, config) in configs.into_iter().enumerate() {
        let invalid = |reason: String| ConfigError::InvalidDevice {
            index,
            name: config.name.clone(),
            reason,
        };

        let mac: MacAddress = config.mac.parse().map_err(|e| invalid(format!("{e}")))?;
        if config.average == 0 {
            return Err(invalid("average must be at least 1".into()));
        }
        if config.sensor_topic.trim().is_empty() {
            return Err(invalid("sensor_topic is empty".into()));
        }
        if config.avail_topic.trim().is_empty() {
            return Err(invalid("avail_topic is empty".into()));
        }
        if !seen.insert(mac) {
            return Err(ConfigError::DuplicateDevice { index, mac });
        }

        log::info!("Registered device {} with MAC {}", config.name, mac);
        devices.push((mac, DeviceState::new(config)));
    }

    Ok(Registry::new(devices))
}

pub fn load_broker(path: &Path) -> Result<BrokerConfig, ConfigError> {
    parse_broker(&read(path)?)
}

pub fn parse_broker(json: &str) -> Result<BrokerConfig, ConfigError> {
    let config: BrokerConfig = serde_json::from_str(json)?;
    if config.host.trim().is_empty() {
        return Err(ConfigError::InvalidBroker("host is empty".into()));
    }
    if config.port == 0 {
        return Err(ConfigError::InvalidBroker("port must be non-zero".into()));
    }
    if matches!(&config.board_telemetry_topic, Some(t) if t.trim().is_empty()) {
        return Err(ConfigError::InvalidBroker(
            "board_telemetry_topic is empty".into(),
        ));
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEVICES: &str = r#"[
        {
            "name": "Living room",
            "mac": "a4c138010203",
            "sensor_topic": "home/living/sensor",
            "avail_topic": "home/living/status",
            "average": 3,
            "timeout": 300,
            "retain": 1
        },
        {
            "name": "Bedroom",
            "mac": "A4:C1:38:04:05:06",
            "sensor_topic": "home/bedroom/sensor",
            "avail_topic": "home/bedroom/status",
            "average": 2,
            "timeout": 300,
            "retain": false
        }
    ]"#;

    #[test]
    fn test_parse_devices() {
        let mut registry = parse_devices(DEVICES).unwrap();
        assert_eq!(registry.len(), 2);

        let living = registry
            .lookup(&"A4:C1:38:01:02:03".parse().unwrap())
            .unwrap();
        assert_eq!(living.name(), "Living room");
        assert_eq!(living.config.average, 3);
        assert_eq!(living.config.timeout, 300);
        assert!(living.config.retain);

        let bedroom = registry
            .lookup(&"A4:C1:38:04:05:06".parse().unwrap())
            .unwrap();
        assert!(!bedroom.config.retain);
    }

    fn one_device(field: &str, value: &str) -> String {
        let mut entry = serde_json::json!({
            "name": "x",
            "mac": "a4c138010203",
            "sensor_topic": "s",
            "avail_topic": "a",
            "average": 1,
            "timeout": 10,
            "retain": true
        });
        entry[field] = serde_json::from_str(value).unwrap();
        serde_json::Value::Array(vec![entry]).to_string()
    }

    #[test]
    fn test_rejects_invalid_entries() {
        assert!(matches!(
            parse_devices(&one_device("mac", r#""not-a-mac""#)),
            Err(ConfigError::InvalidDevice { index: 0, .. })
        ));
        assert!(matches!(
            parse_devices(&one_device("average", "0")),
            Err(ConfigError::InvalidDevice { .. })
        ));
        assert!(matches!(
            parse_devices(&one_device("sensor_topic", r#""""#)),
            Err(ConfigError::InvalidDevice { .. })
        ));
        assert!(matches!(
            parse_devices(&one_device("retain", "7")),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            parse_devices(&one_device("average", r#""3""#)),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_rejects_missing_field() {
        let json = r#"[{"name": "x", "mac": "a4c138010203"}]"#;
        assert!(matches!(parse_devices(json), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_rejects_duplicates_and_empty() {
        let entry = one_device("name", r#""x""#);
        let entry = entry.trim_start_matches('[').trim_end_matches(']');
        let twice = format!("[{entry},{entry}]");
        assert!(matches!(
            parse_devices(&twice),
            Err(ConfigError::DuplicateDevice { index: 1, .. })
        ));
        assert!(matches!(parse_devices("[]"), Err(ConfigError::NoDevices)));
    }

    #[test]
    fn test_parse_broker() {
        let json = r#"{
            "client": "bridge-1",
            "host": "192.168.1.10",
            "port": 1883,
            "user": "mqtt",
            "password": "secret",
            "board_telemetry_topic": "home/bridge/telemetry"
        }"#;
        let config = parse_broker(json).unwrap();
        assert_eq!(config.client_id, "bridge-1");
        assert_eq!(config.port, 1883);
        assert_eq!(config.user.as_deref(), Some("mqtt"));
        assert_eq!(
            config.board_telemetry_topic.as_deref(),
            Some("home/bridge/telemetry")
        );
        assert_eq!(config.keep_alive, 60);
    }

    #[test]
    fn test_parse_broker_minimal_and_invalid() {
        let config = parse_broker(r#"{"client": "c", "host": "h", "port": 1883}"#).unwrap();
        assert!(config.user.is_none());
        assert!(config.board_telemetry_topic.is_none());

        assert!(matches!(
            parse_broker(r#"{"client": "c", "host": "", "port": 1883}"#),
            Err(ConfigError::InvalidBroker(_))
        ));
        assert!(matches!(
            parse_broker(r#"{"client": "c", "host": "h", "port": 0}"#),
            Err(ConfigError::InvalidBroker(_))
        ));
    }

    #[test]
    fn test_missing_file() {
        let err = load_devices(Path::new("/nonexistent/devices.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("/nonexistent/devices.json"));
    }
}

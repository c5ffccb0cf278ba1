//! Daemon configuration
//!
//! TOML file covering the serial link, the adapter selection, the storage
//! paths and the settings consumed by the embedding daemon (event sink,
//! status LEDs).

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("unrecognized adapter type: {0}")]
    UnknownAdapter(String),
}

/// Which radio driver to load
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AdapterKind {
    Ezsp,
    #[default]
    Znp,
}

/// Serial port settings, handed to the driver
#[derive(Debug, Clone, Deserialize)]
pub struct SerialConfig {
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
}

fn default_baud_rate() -> u32 {
    115_200
}

/// Core coordinator settings
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ZigbeeConfig {
    #[serde(default)]
    pub adapter: AdapterKind,
    #[serde(default = "default_database")]
    pub database: PathBuf,
    #[serde(default = "default_properties")]
    pub properties: PathBuf,
    #[serde(default = "default_device_library")]
    pub device_library: PathBuf,
}

fn default_database() -> PathBuf {
    PathBuf::from("data/devices.json")
}

fn default_properties() -> PathBuf {
    PathBuf::from("data/properties.json")
}

fn default_device_library() -> PathBuf {
    PathBuf::from("data/library.json")
}

impl Default for ZigbeeConfig {
    fn default() -> Self {
        Self {
            adapter: AdapterKind::default(),
            database: default_database(),
            properties: default_properties(),
            device_library: default_device_library(),
        }
    }
}

/// Event sink settings; consumed by the publisher, not by the core
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MqttConfig {
    #[serde(default)]
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

fn default_mqtt_port() -> u16 {
    1883
}

/// Status LED pins; consumed by the GPIO driver, not by the core
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GpioConfig {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub blink: Option<String>,
}

/// Top-level daemon configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub serial: SerialConfig,
    #[serde(default)]
    pub zigbee: ZigbeeConfig,
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub gpio: GpioConfig,
}

impl Config {
    /// Load and parse a TOML configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&contents)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let config: Config = toml::from_str(
            r#"
            [serial]
            port = "/dev/ttyUSB0"
            "#,
        )
        .unwrap();

        assert_eq!(config.serial.port, "/dev/ttyUSB0");
        assert_eq!(config.serial.baud_rate, 115_200);
        assert_eq!(config.zigbee.adapter, AdapterKind::Znp);
        assert_eq!(config.zigbee.database, PathBuf::from("data/devices.json"));
    }

    #[test]
    fn test_parse_full_config() {
        let config: Config = toml::from_str(
            r#"
            [serial]
            port = "/dev/ttyACM0"
            baud_rate = 57600

            [zigbee]
            adapter = "ezsp"
            database = "/var/lib/hived/devices.json"

            [mqtt]
            host = "localhost"
            prefix = "hived"

            [gpio]
            status = "gpiochip0/17"
            "#,
        )
        .unwrap();

        assert_eq!(config.zigbee.adapter, AdapterKind::Ezsp);
        assert_eq!(config.mqtt.host, "localhost");
        assert_eq!(config.gpio.status.as_deref(), Some("gpiochip0/17"));
        assert!(config.gpio.blink.is_none());
    }
}

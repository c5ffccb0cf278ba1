//! Device library
//!
//! The library file maps (manufacturer name, model name) pairs onto the
//! properties, reporting configurations, actions and polls of a device. The
//! core does not hardcode device knowledge; everything model-specific comes
//! from this file, resolved once per device after identification.

use std::path::Path;
use std::time::{Duration, Instant};

use serde::Deserialize;
use serde_json::Value;
use zcl::clusters::id as cluster;
use zcl::frame_control as fc;
use zcl::{data_type, GlobalCommand, ZclHeader};

use crate::device::Device;
use crate::property::{self, PropertyContext};

/// Attribute reporting configuration for one cluster
#[derive(Debug, Clone)]
pub struct Reporting {
    pub name: &'static str,
    pub cluster_id: u16,
    pub attributes: Vec<u16>,
    pub data_type: u8,
    pub min_interval: u16,
    pub max_interval: u16,
    pub value_change: u64,
}

/// Resolve a reporting preset by name
#[must_use]
pub fn reporting(name: &str) -> Option<Reporting> {
    let preset = match name {
        "batteryVoltage" => Reporting {
            name: "batteryVoltage",
            cluster_id: cluster::POWER_CONFIG,
            attributes: vec![0x0020],
            data_type: data_type::UNSIGNED_8BIT,
            min_interval: 30,
            max_interval: 3600,
            value_change: 0,
        },
        "batteryPercentage" => Reporting {
            name: "batteryPercentage",
            cluster_id: cluster::POWER_CONFIG,
            attributes: vec![0x0021],
            data_type: data_type::UNSIGNED_8BIT,
            min_interval: 30,
            max_interval: 3600,
            value_change: 0,
        },
        "status" => Reporting {
            name: "status",
            cluster_id: cluster::ON_OFF,
            attributes: vec![0x0000],
            data_type: data_type::BOOLEAN,
            min_interval: 0,
            max_interval: 600,
            value_change: 0,
        },
        "level" => Reporting {
            name: "level",
            cluster_id: cluster::LEVEL_CONTROL,
            attributes: vec![0x0000],
            data_type: data_type::UNSIGNED_8BIT,
            min_interval: 0,
            max_interval: 600,
            value_change: 0,
        },
        "colorHS" => Reporting {
            name: "colorHS",
            cluster_id: cluster::COLOR_CONTROL,
            attributes: vec![0x0000, 0x0001],
            data_type: data_type::UNSIGNED_8BIT,
            min_interval: 0,
            max_interval: 600,
            value_change: 0,
        },
        "colorXY" => Reporting {
            name: "colorXY",
            cluster_id: cluster::COLOR_CONTROL,
            attributes: vec![0x0003, 0x0004],
            data_type: data_type::UNSIGNED_16BIT,
            min_interval: 0,
            max_interval: 600,
            value_change: 0,
        },
        "colorTemperature" => Reporting {
            name: "colorTemperature",
            cluster_id: cluster::COLOR_CONTROL,
            attributes: vec![0x0007],
            data_type: data_type::UNSIGNED_16BIT,
            min_interval: 0,
            max_interval: 600,
            value_change: 0,
        },
        "illuminance" => Reporting {
            name: "illuminance",
            cluster_id: cluster::ILLUMINANCE_MEASUREMENT,
            attributes: vec![0x0000],
            data_type: data_type::UNSIGNED_16BIT,
            min_interval: 10,
            max_interval: 3600,
            value_change: 10,
        },
        "temperature" => Reporting {
            name: "temperature",
            cluster_id: cluster::TEMPERATURE_MEASUREMENT,
            attributes: vec![0x0000],
            data_type: data_type::SIGNED_16BIT,
            min_interval: 10,
            max_interval: 3600,
            value_change: 10,
        },
        "humidity" => Reporting {
            name: "humidity",
            cluster_id: cluster::HUMIDITY_MEASUREMENT,
            attributes: vec![0x0000],
            data_type: data_type::UNSIGNED_16BIT,
            min_interval: 10,
            max_interval: 3600,
            value_change: 10,
        },
        "energy" => Reporting {
            name: "energy",
            cluster_id: cluster::METERING,
            attributes: vec![0x0000],
            data_type: data_type::UNSIGNED_48BIT,
            min_interval: 10,
            max_interval: 600,
            value_change: 1,
        },
        "power" => Reporting {
            name: "power",
            cluster_id: cluster::ELECTRICAL_MEASUREMENT,
            attributes: vec![0x050B],
            data_type: data_type::SIGNED_16BIT,
            min_interval: 10,
            max_interval: 600,
            value_change: 1,
        },
        _ => return None,
    };

    Some(preset)
}

/// A drivable device capability: turns an API value into a ZCL request
pub trait Action: Send {
    fn name(&self) -> &str;

    fn cluster_id(&self) -> u16;

    /// Attribute read back after the action when [`Action::poll`] is set
    fn attribute_id(&self) -> u16 {
        0x0000
    }

    fn manufacturer_code(&self) -> u16 {
        0
    }

    /// Whether to read the attribute back after sending
    fn poll(&self) -> bool {
        false
    }

    /// Build the ZCL frame for this action, or `None` if the value does
    /// not fit
    fn request(&self, transaction_id: u8, value: &Value) -> Option<Vec<u8>>;
}

/// On/off/toggle switching
pub struct StatusAction;

impl Action for StatusAction {
    fn name(&self) -> &str {
        "status"
    }

    fn cluster_id(&self) -> u16 {
        cluster::ON_OFF
    }

    fn poll(&self) -> bool {
        true
    }

    fn request(&self, transaction_id: u8, value: &Value) -> Option<Vec<u8>> {
        let command_id = match value.as_str()? {
            "off" => 0x00,
            "on" => 0x01,
            "toggle" => 0x02,
            _ => return None,
        };

        Some(ZclHeader::new(fc::CLUSTER_SPECIFIC, transaction_id, command_id).encode())
    }
}

/// Move-to-level dimming
pub struct LevelAction;

impl Action for LevelAction {
    fn name(&self) -> &str {
        "level"
    }

    fn cluster_id(&self) -> u16 {
        cluster::LEVEL_CONTROL
    }

    fn poll(&self) -> bool {
        true
    }

    fn request(&self, transaction_id: u8, value: &Value) -> Option<Vec<u8>> {
        let level = u8::try_from(value.as_u64()?).ok()?;

        let mut request = ZclHeader::new(fc::CLUSTER_SPECIFIC, transaction_id, 0x04).encode();
        request.push(level);
        request.extend_from_slice(&0u16.to_le_bytes()); // transition time
        Some(request)
    }
}

/// Move-to-color-temperature
pub struct ColorTemperatureAction;

impl Action for ColorTemperatureAction {
    fn name(&self) -> &str {
        "colorTemperature"
    }

    fn cluster_id(&self) -> u16 {
        cluster::COLOR_CONTROL
    }

    fn attribute_id(&self) -> u16 {
        0x0007
    }

    fn poll(&self) -> bool {
        true
    }

    fn request(&self, transaction_id: u8, value: &Value) -> Option<Vec<u8>> {
        let mireds = u16::try_from(value.as_u64()?).ok()?;

        let mut request = ZclHeader::new(fc::CLUSTER_SPECIFIC, transaction_id, 0x0A).encode();
        request.extend_from_slice(&mireds.to_le_bytes());
        request.extend_from_slice(&0u16.to_le_bytes());
        Some(request)
    }
}

/// Write the power-on behavior attribute
pub struct PowerOnStatusAction;

impl Action for PowerOnStatusAction {
    fn name(&self) -> &str {
        "powerOnStatus"
    }

    fn cluster_id(&self) -> u16 {
        cluster::ON_OFF
    }

    fn attribute_id(&self) -> u16 {
        0x4003
    }

    fn poll(&self) -> bool {
        true
    }

    fn request(&self, transaction_id: u8, value: &Value) -> Option<Vec<u8>> {
        let state: u8 = match value.as_str()? {
            "off" => 0x00,
            "on" => 0x01,
            "toggle" => 0x02,
            "previous" => 0xFF,
            _ => return None,
        };

        let mut request =
            ZclHeader::global(0x00, transaction_id, GlobalCommand::WriteAttributes).encode();
        request.extend_from_slice(&0x4003u16.to_le_bytes());
        request.push(data_type::ENUM_8BIT);
        request.push(state);
        Some(request)
    }
}

/// Resolve an action preset by name
#[must_use]
pub fn action(name: &str) -> Option<Box<dyn Action>> {
    let action: Box<dyn Action> = match name {
        "status" => Box::new(StatusAction),
        "level" => Box::new(LevelAction),
        "colorTemperature" => Box::new(ColorTemperatureAction),
        "powerOnStatus" => Box::new(PowerOnStatusAction),
        _ => return None,
    };

    Some(action)
}

/// Periodic attribute read for devices that do not report on their own
#[derive(Debug, Clone)]
pub struct Poll {
    pub name: &'static str,
    pub cluster_id: u16,
    pub attributes: Vec<u16>,
    pub period: Duration,
    pub last: Option<Instant>,
}

/// Resolve a poll preset by name
#[must_use]
pub fn poll(name: &str) -> Option<Poll> {
    let preset = match name {
        "status" => Poll {
            name: "status",
            cluster_id: cluster::ON_OFF,
            attributes: vec![0x0000],
            period: Duration::from_secs(30),
            last: None,
        },
        "level" => Poll {
            name: "level",
            cluster_id: cluster::LEVEL_CONTROL,
            attributes: vec![0x0000],
            period: Duration::from_secs(30),
            last: None,
        },
        "energy" => Poll {
            name: "energy",
            cluster_id: cluster::METERING,
            attributes: vec![0x0000, 0x0301, 0x0302],
            period: Duration::from_secs(60),
            last: None,
        },
        "power" => Poll {
            name: "power",
            cluster_id: cluster::ELECTRICAL_MEASUREMENT,
            attributes: vec![0x050B, 0x0604, 0x0605],
            period: Duration::from_secs(60),
            last: None,
        },
        _ => return None,
    };

    Some(preset)
}

/// One entry of the device library file
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LibraryEntry {
    #[serde(default)]
    pub description: String,
    pub manufacturer_names: Vec<String>,
    pub model_names: Vec<String>,
    /// Restrict the entry to one endpoint; applies to all when absent
    #[serde(default)]
    pub endpoint_id: Option<u8>,
    #[serde(default)]
    pub properties: Vec<String>,
    #[serde(default)]
    pub reportings: Vec<String>,
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default)]
    pub polls: Vec<String>,
    #[serde(default)]
    pub options: serde_json::Map<String, Value>,
}

/// The parsed device library
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DeviceLibrary {
    #[serde(default)]
    pub devices: Vec<LibraryEntry>,
}

impl DeviceLibrary {
    /// Load the library file; a missing or broken file yields an empty
    /// library so unsupported devices still interview and join
    #[must_use]
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<Self>(&contents) {
                Ok(library) => {
                    tracing::info!(
                        "Loaded {} device library entries from {:?}",
                        library.devices.len(),
                        path
                    );
                    library
                }
                Err(e) => {
                    tracing::warn!("Failed to parse device library {:?}: {}", path, e);
                    Self::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!("No device library found at {:?}", path);
                Self::default()
            }
            Err(e) => {
                tracing::warn!("Failed to read device library {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    fn matching<'a>(
        &'a self,
        manufacturer_name: &'a str,
        model_name: &'a str,
    ) -> impl Iterator<Item = &'a LibraryEntry> {
        self.devices.iter().filter(move |entry| {
            entry
                .manufacturer_names
                .iter()
                .any(|name| name == manufacturer_name)
                && entry.model_names.iter().any(|name| name == model_name)
        })
    }

    /// Resolve the device against the library: populate endpoint property,
    /// reporting, action and poll lists, the description and the options
    pub fn setup_device(&self, device: &mut Device) {
        for endpoint in device.endpoints.values_mut() {
            endpoint.properties.clear();
            endpoint.reportings.clear();
            endpoint.actions.clear();
            endpoint.polls.clear();
        }

        device.description.clear();
        device.options.clear();

        let manufacturer_name = device.manufacturer_name.clone();
        let model_name = device.model_name.clone();
        let entries: Vec<LibraryEntry> = self
            .matching(&manufacturer_name, &model_name)
            .cloned()
            .collect();

        if entries.is_empty() {
            tracing::warn!(
                "Device {} ({} / {}) not found in the device library",
                device.name,
                manufacturer_name,
                model_name
            );
            return;
        }

        for entry in entries {
            if !entry.description.is_empty() {
                device.description = entry.description.clone();
            }

            for (key, value) in &entry.options {
                device.options.insert(key.clone(), value.clone());
            }

            let context = PropertyContext {
                model_name: model_name.clone(),
                firmware_version: device.firmware_version,
                options: device.options.clone(),
            };

            for endpoint in device.endpoints.values_mut() {
                if entry.endpoint_id.is_some_and(|id| id != endpoint.id) {
                    continue;
                }

                for name in &entry.properties {
                    match property::create(name, &context) {
                        Some(property) => endpoint.properties.push(property),
                        None => tracing::warn!("Unknown property {name:?} in device library"),
                    }
                }

                for name in &entry.reportings {
                    match reporting(name) {
                        Some(reporting) => endpoint.reportings.push(reporting),
                        None => tracing::warn!("Unknown reporting {name:?} in device library"),
                    }
                }

                for name in &entry.actions {
                    match action(name) {
                        Some(action) => endpoint.actions.push(action),
                        None => tracing::warn!("Unknown action {name:?} in device library"),
                    }
                }

                for name in &entry.polls {
                    match poll(name) {
                        Some(poll) => endpoint.polls.push(poll),
                        None => tracing::warn!("Unknown poll {name:?} in device library"),
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{Device, Endpoint, IeeeAddress};

    fn library() -> DeviceLibrary {
        serde_json::from_str(
            r#"{
                "devices": [{
                    "description": "Test sensor",
                    "manufacturerNames": ["ACME"],
                    "modelNames": ["sensor-1"],
                    "properties": ["temperature", "batteryVoltage"],
                    "reportings": ["temperature", "batteryVoltage"],
                    "options": {"batteryUndivided": true}
                }]
            }"#,
        )
        .unwrap()
    }

    #[test]
    fn test_setup_resolves_endpoint_lists() {
        let mut device = Device::new(IeeeAddress([1, 2, 3, 4, 5, 6, 7, 8]), 0x1234);
        device.manufacturer_name = "ACME".into();
        device.model_name = "sensor-1".into();
        device.endpoints.insert(1, Endpoint::new(1));

        library().setup_device(&mut device);

        let endpoint = &device.endpoints[&1];
        assert_eq!(endpoint.properties.len(), 2);
        assert_eq!(endpoint.reportings.len(), 2);
        assert_eq!(device.description, "Test sensor");
        assert_eq!(device.options["batteryUndivided"], true);
    }

    #[test]
    fn test_unknown_device_leaves_lists_empty() {
        let mut device = Device::new(IeeeAddress([1, 2, 3, 4, 5, 6, 7, 8]), 0x1234);
        device.manufacturer_name = "Nobody".into();
        device.model_name = "nothing".into();
        device.endpoints.insert(1, Endpoint::new(1));

        library().setup_device(&mut device);

        assert!(device.endpoints[&1].properties.is_empty());
        assert!(device.description.is_empty());
    }

    #[test]
    fn test_status_action_builds_cluster_command() {
        let action = StatusAction;

        let frame = action
            .request(0x11, &serde_json::json!("toggle"))
            .unwrap();

        assert_eq!(frame, vec![fc::CLUSTER_SPECIFIC, 0x11, 0x02]);
        assert!(action.request(0x11, &serde_json::json!("dim")).is_none());
    }
}

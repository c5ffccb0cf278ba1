//! Device database persistence using JSON file storage

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::device::{Device, DeviceList, Endpoint, IeeeAddress, LogicalType, ZoneStatus};

/// Stored form of one endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredEndpoint {
    pub id: u8,
    #[serde(default)]
    pub profile_id: u16,
    #[serde(default)]
    pub device_id: u16,
    #[serde(default)]
    pub in_clusters: Vec<u16>,
    #[serde(default)]
    pub out_clusters: Vec<u16>,
    #[serde(default)]
    pub zone_status: ZoneStatus,
}

/// Stored form of one device
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredDevice {
    pub ieee_address: IeeeAddress,
    pub network_address: u16,
    pub name: String,
    pub logical_type: LogicalType,
    #[serde(default)]
    pub manufacturer_code: u16,
    #[serde(default)]
    pub manufacturer_name: String,
    #[serde(default)]
    pub model_name: String,
    #[serde(default)]
    pub power_source: u8,
    #[serde(default)]
    pub firmware_version: u8,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub last_seen: u64,
    #[serde(default)]
    pub interview_finished: bool,
    #[serde(default)]
    pub descriptor_received: bool,
    #[serde(default)]
    pub endpoints_received: bool,
    #[serde(default)]
    pub endpoints: Vec<StoredEndpoint>,
}

/// Stored form of the whole database
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredDatabase {
    #[serde(default)]
    pub permit_join: bool,
    #[serde(default)]
    pub adapter_kind: String,
    #[serde(default)]
    pub adapter_version: String,
    #[serde(default)]
    pub devices: Vec<StoredDevice>,
}

impl From<&Device> for StoredDevice {
    fn from(device: &Device) -> Self {
        Self {
            ieee_address: device.ieee,
            network_address: device.network_address,
            name: device.name.clone(),
            logical_type: device.logical_type,
            manufacturer_code: device.manufacturer_code,
            manufacturer_name: device.manufacturer_name.clone(),
            model_name: device.model_name.clone(),
            power_source: device.power_source,
            firmware_version: device.firmware_version,
            description: device.description.clone(),
            last_seen: device.last_seen,
            interview_finished: device.interview_finished,
            descriptor_received: device.descriptor_received,
            endpoints_received: device.endpoints_received,
            endpoints: device
                .endpoints
                .values()
                .map(|endpoint| StoredEndpoint {
                    id: endpoint.id,
                    profile_id: endpoint.profile_id,
                    device_id: endpoint.device_id,
                    in_clusters: endpoint.in_clusters.clone(),
                    out_clusters: endpoint.out_clusters.clone(),
                    zone_status: endpoint.zone_status,
                })
                .collect(),
        }
    }
}

impl StoredDevice {
    /// Rebuild a live device record; endpoint property lists are resolved
    /// separately by the device library
    #[must_use]
    pub fn restore(&self) -> Device {
        let mut device = Device::new(self.ieee_address, self.network_address);

        device.name = self.name.clone();
        device.logical_type = self.logical_type;
        device.manufacturer_code = self.manufacturer_code;
        device.manufacturer_name = self.manufacturer_name.clone();
        device.model_name = self.model_name.clone();
        device.power_source = self.power_source;
        device.firmware_version = self.firmware_version;
        device.description = self.description.clone();
        device.last_seen = self.last_seen;
        device.interview_finished = self.interview_finished;
        device.descriptor_received = self.descriptor_received;
        device.endpoints_received = self.endpoints_received;

        for stored in &self.endpoints {
            let mut endpoint = Endpoint::new(stored.id);
            endpoint.profile_id = stored.profile_id;
            endpoint.device_id = stored.device_id;
            endpoint.in_clusters = stored.in_clusters.clone();
            endpoint.out_clusters = stored.out_clusters.clone();
            endpoint.zone_status = stored.zone_status;
            endpoint.descriptor_received = true;
            device.endpoints.insert(stored.id, endpoint);
        }

        device
    }
}

/// Load the device database; a missing file starts fresh
#[must_use]
pub fn load_database(path: &Path) -> StoredDatabase {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str::<StoredDatabase>(&contents) {
            Ok(database) => {
                tracing::info!("Loaded {} devices from {:?}", database.devices.len(), path);
                database
            }
            Err(e) => {
                tracing::warn!("Failed to parse database {:?}: {}", path, e);
                StoredDatabase::default()
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No database found at {:?}, starting fresh", path);
            StoredDatabase::default()
        }
        Err(e) => {
            tracing::warn!("Failed to read database {:?}: {}", path, e);
            StoredDatabase::default()
        }
    }
}

/// Store the device database atomically: write a temp file, then rename
pub fn store_database(path: &Path, devices: &DeviceList) -> Result<(), std::io::Error> {
    let database = StoredDatabase {
        permit_join: devices.permit_join,
        adapter_kind: devices.adapter_kind.clone(),
        adapter_version: devices.adapter_version.clone(),
        devices: devices
            .iter()
            .filter(|device| !device.removed)
            .map(StoredDevice::from)
            .collect(),
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(&database)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, &json)?;
    std::fs::rename(&tmp_path, path)?;

    tracing::debug!("Stored {} devices to {:?}", database.devices.len(), path);
    Ok(())
}

/// Snapshot of the current property values, stored alongside the database
pub fn store_properties(path: &Path, devices: &DeviceList) -> Result<(), std::io::Error> {
    let mut snapshot = serde_json::Map::new();

    for device in devices.iter() {
        let mut endpoints = serde_json::Map::new();

        for endpoint in device.endpoints.values() {
            let mut values = serde_json::Map::new();

            for property in &endpoint.properties {
                if !property.value().is_null() {
                    values.insert(property.name().to_string(), property.value().clone());
                }
            }

            if !values.is_empty() {
                endpoints.insert(endpoint.id.to_string(), Value::Object(values));
            }
        }

        if !endpoints.is_empty() {
            snapshot.insert(device.name.clone(), Value::Object(endpoints));
        }
    }

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let json = serde_json::to_string_pretty(&Value::Object(snapshot))
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, &json)?;
    std::fs::rename(&tmp_path, path)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_roundtrip() {
        let mut device = Device::new(IeeeAddress([1, 2, 3, 4, 5, 6, 7, 8]), 0x1234);
        device.name = "kitchen sensor".into();
        device.manufacturer_name = "LUMI".into();
        device.model_name = "lumi.sensor_magnet".into();
        device.power_source = zcl::clusters::power_source::BATTERY;
        device.interview_finished = true;
        device.descriptor_received = true;
        device.endpoints_received = true;

        let mut endpoint = Endpoint::new(1);
        endpoint.profile_id = 0x0104;
        endpoint.in_clusters = vec![0x0000, 0x0006];
        endpoint.zone_status = ZoneStatus::Enrolled;
        device.endpoints.insert(1, endpoint);

        let stored = StoredDevice::from(&device);
        let json = serde_json::to_string(&stored).unwrap();
        let restored: StoredDevice = serde_json::from_str(&json).unwrap();
        let device = restored.restore();

        assert_eq!(device.ieee, IeeeAddress([1, 2, 3, 4, 5, 6, 7, 8]));
        assert_eq!(device.name, "kitchen sensor");
        assert_eq!(device.model_name, "lumi.sensor_magnet");
        assert!(device.interview_finished);
        assert_eq!(device.endpoints[&1].in_clusters, vec![0x0000, 0x0006]);
        assert_eq!(device.endpoints[&1].zone_status, ZoneStatus::Enrolled);
    }

    #[test]
    fn test_database_file_roundtrip() {
        let dir = std::env::temp_dir().join("zigbee-core-test-db");
        let path = dir.join("devices.json");
        let _ = std::fs::remove_dir_all(&dir);

        let mut list = DeviceList::new();
        list.permit_join = true;
        list.insert(Device::new(IeeeAddress([9, 9, 9, 9, 9, 9, 9, 9]), 0x0001));

        store_database(&path, &list).unwrap();
        let database = load_database(&path);

        assert!(database.permit_join);
        assert_eq!(database.devices.len(), 1);
        assert_eq!(
            database.devices[0].ieee_address,
            IeeeAddress([9, 9, 9, 9, 9, 9, 9, 9])
        );

        let _ = std::fs::remove_dir_all(&dir);
    }
}

//! Zigbee device representation

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::property::Property;
use crate::setup::{Action, Poll, Reporting};

/// IEEE address (EUI-64), stored in network byte order
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IeeeAddress(pub [u8; 8]);

impl IeeeAddress {
    /// Parse from a hex string, with or without colons
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let hex: String = value.chars().filter(|c| *c != ':').collect();

        if hex.len() != 16 {
            return None;
        }

        let mut bytes = [0u8; 8];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).ok()?;
        }

        Some(Self(bytes))
    }

    /// The address as a little-endian u64, the form the radio reports
    #[must_use]
    pub fn to_u64_le(self) -> u64 {
        u64::from_be_bytes(self.0)
    }
}

impl fmt::Display for IeeeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for byte in self.0 {
            if !first {
                write!(f, ":")?;
            }
            write!(f, "{byte:02x}")?;
            first = false;
        }
        Ok(())
    }
}

impl fmt::Debug for IeeeAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

impl Serialize for IeeeAddress {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for IeeeAddress {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Self::parse(&value)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid IEEE address: {value}")))
    }
}

/// Zigbee device types (network role)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogicalType {
    Coordinator,
    Router,
    #[default]
    EndDevice,
}

/// IAS Zone enroll progression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum ZoneStatus {
    #[default]
    Unknown,
    SetAddress,
    Enroll,
    Enrolled,
}

/// A device endpoint
pub struct Endpoint {
    /// Endpoint ID (1-240)
    pub id: u8,
    /// Profile ID (e.g., 0x0104 for Home Automation)
    pub profile_id: u16,
    /// Device ID within the profile
    pub device_id: u16,
    /// Input (server) clusters
    pub in_clusters: Vec<u16>,
    /// Output (client) clusters
    pub out_clusters: Vec<u16>,
    /// IAS Zone enroll state
    pub zone_status: ZoneStatus,
    /// Simple descriptor received during interview
    pub descriptor_received: bool,
    /// A property value changed since the last emit
    pub updated: bool,
    pub properties: Vec<Box<dyn Property>>,
    pub reportings: Vec<Reporting>,
    pub actions: Vec<Box<dyn Action>>,
    pub polls: Vec<Poll>,
}

impl Endpoint {
    #[must_use]
    pub fn new(id: u8) -> Self {
        Self {
            id,
            profile_id: 0,
            device_id: 0,
            in_clusters: Vec::new(),
            out_clusters: Vec::new(),
            zone_status: ZoneStatus::Unknown,
            descriptor_received: false,
            updated: false,
            properties: Vec::new(),
            reportings: Vec::new(),
            actions: Vec::new(),
            polls: Vec::new(),
        }
    }
}

/// A Zigbee device on the network
pub struct Device {
    /// IEEE address (stable primary key)
    pub ieee: IeeeAddress,
    /// Network short address (may change on rejoin)
    pub network_address: u16,
    /// User-visible name, defaults to the IEEE hex form
    pub name: String,
    pub logical_type: LogicalType,
    pub manufacturer_code: u16,
    /// Manufacturer name (Basic cluster attribute 0x0004)
    pub manufacturer_name: String,
    /// Model identifier (Basic cluster attribute 0x0005)
    pub model_name: String,
    /// Power source (Basic cluster attribute 0x0007)
    pub power_source: u8,
    /// Application version (Basic cluster attribute 0x0001)
    pub firmware_version: u8,
    /// Description from the device library, set after identification
    pub description: String,
    /// Unix seconds of the last frame from this device
    pub last_seen: u64,
    /// Last observed link quality
    pub link_quality: u8,
    pub removed: bool,
    pub interview_finished: bool,
    pub descriptor_received: bool,
    pub endpoints_received: bool,
    /// Endpoint currently being interrogated by the interview
    pub interview_endpoint_id: u8,
    /// Neighbor table: network address to link quality
    pub neighbors: HashMap<u16, u8>,
    pub endpoints: BTreeMap<u8, Endpoint>,
    /// Per-device options from the device library
    pub options: serde_json::Map<String, serde_json::Value>,
    /// Interview timer state; the generation invalidates stale timeouts
    pub timer_active: bool,
    pub timer_generation: u32,
}

impl Device {
    #[must_use]
    pub fn new(ieee: IeeeAddress, network_address: u16) -> Self {
        Self {
            ieee,
            network_address,
            name: ieee.to_string(),
            logical_type: LogicalType::EndDevice,
            manufacturer_code: 0,
            manufacturer_name: String::new(),
            model_name: String::new(),
            power_source: zcl::clusters::power_source::UNKNOWN,
            firmware_version: 0,
            description: String::new(),
            last_seen: 0,
            link_quality: 0,
            removed: false,
            interview_finished: false,
            descriptor_received: false,
            endpoints_received: false,
            interview_endpoint_id: 0,
            neighbors: HashMap::new(),
            endpoints: BTreeMap::new(),
            options: serde_json::Map::new(),
            timer_active: false,
            timer_generation: 0,
        }
    }

    pub fn update_last_seen(&mut self) {
        self.last_seen = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
    }

    /// Endpoint accessor that creates the endpoint on first sight
    pub fn endpoint(&mut self, endpoint_id: u8) -> &mut Endpoint {
        self.endpoints
            .entry(endpoint_id)
            .or_insert_with(|| Endpoint::new(endpoint_id))
    }
}

/// Registry of known devices, keyed by IEEE address
#[derive(Default)]
pub struct DeviceList {
    devices: HashMap<IeeeAddress, Device>,
    pub permit_join: bool,
    pub adapter_kind: String,
    pub adapter_version: String,
}

impl DeviceList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn insert(&mut self, device: Device) -> &mut Device {
        let ieee = device.ieee;
        self.devices.insert(ieee, device);
        self.devices.get_mut(&ieee).expect("just inserted")
    }

    pub fn remove(&mut self, ieee: IeeeAddress) -> Option<Device> {
        self.devices.remove(&ieee)
    }

    #[must_use]
    pub fn get(&self, ieee: IeeeAddress) -> Option<&Device> {
        self.devices.get(&ieee)
    }

    pub fn get_mut(&mut self, ieee: IeeeAddress) -> Option<&mut Device> {
        self.devices.get_mut(&ieee)
    }

    #[must_use]
    pub fn contains(&self, ieee: IeeeAddress) -> bool {
        self.devices.contains_key(&ieee)
    }

    /// Look up by user-visible name, falling back to the IEEE hex form
    #[must_use]
    pub fn by_name(&self, name: &str) -> Option<&Device> {
        self.devices
            .values()
            .find(|d| d.name == name || d.ieee.to_string() == name)
    }

    /// Resolve a network address to the device's IEEE key
    #[must_use]
    pub fn ieee_by_network(&self, network_address: u16) -> Option<IeeeAddress> {
        self.devices
            .values()
            .find(|d| d.network_address == network_address && !d.removed)
            .map(|d| d.ieee)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Device> {
        self.devices.values_mut()
    }

    /// Drop every record claiming to be the coordinator; called when the
    /// adapter reports its own address so exactly one coordinator entry
    /// survives
    pub fn evict_coordinator(&mut self, ieee: IeeeAddress) {
        self.devices
            .retain(|key, device| *key != ieee && device.logical_type != LogicalType::Coordinator);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ieee_address_roundtrip() {
        let address = IeeeAddress([0x00, 0x15, 0x8D, 0x00, 0x01, 0x02, 0x03, 0x04]);
        let text = address.to_string();

        assert_eq!(text, "00:15:8d:00:01:02:03:04");
        assert_eq!(IeeeAddress::parse(&text), Some(address));
        assert_eq!(IeeeAddress::parse("00158D0001020304"), Some(address));
        assert_eq!(IeeeAddress::parse("00:15"), None);
    }

    #[test]
    fn test_device_defaults_name_to_ieee() {
        let ieee = IeeeAddress([0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF, 0x00, 0x11]);
        let device = Device::new(ieee, 0x1234);

        assert_eq!(device.name, "aa:bb:cc:dd:ee:ff:00:11");
        assert_eq!(device.logical_type, LogicalType::EndDevice);
        assert!(!device.interview_finished);
    }

    #[test]
    fn test_coordinator_eviction() {
        let mut list = DeviceList::new();
        let ours = IeeeAddress([1, 1, 1, 1, 1, 1, 1, 1]);
        let stale = IeeeAddress([2, 2, 2, 2, 2, 2, 2, 2]);
        let other = IeeeAddress([3, 3, 3, 3, 3, 3, 3, 3]);

        list.insert(Device::new(ours, 0x0000));
        let mut old_coordinator = Device::new(stale, 0x0000);
        old_coordinator.logical_type = LogicalType::Coordinator;
        list.insert(old_coordinator);
        list.insert(Device::new(other, 0x4321));

        list.evict_coordinator(ours);

        assert!(!list.contains(ours));
        assert!(!list.contains(stale));
        assert!(list.contains(other));
    }
}

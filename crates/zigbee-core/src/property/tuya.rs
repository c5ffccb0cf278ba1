//! TUYA vendor properties
//!
//! TUYA devices tunnel everything through cluster 0xEF00 as data-point
//! commands. The header is {status, transactionId, dataPoint, dataType,
//! length:u16-BE}; 32-bit values are big-endian, unlike the rest of the
//! Zigbee wire format.

use serde_json::{json, Map, Value};
use zcl::clusters::id as cluster;
use zcl::data_type;

use super::Property;

/// Decoded data-point value
#[derive(Debug, Clone, Copy)]
enum DataPointValue {
    Bool(bool),
    U32(u32),
    U8(u8),
}

impl DataPointValue {
    fn parse(data_type: u8, length: u16, data: &[u8]) -> Option<Self> {
        match data_type {
            0x01 if length == 1 && !data.is_empty() => Some(Self::Bool(data[0] != 0)),
            0x02 if length == 4 && data.len() >= 4 => Some(Self::U32(u32::from_be_bytes([
                data[0], data[1], data[2], data[3],
            ]))),
            0x04 if length == 1 && !data.is_empty() => Some(Self::U8(data[0])),
            _ => None,
        }
    }

    fn as_u32(self) -> u32 {
        match self {
            Self::Bool(value) => u32::from(value),
            Self::U32(value) => value,
            Self::U8(value) => u32::from(value),
        }
    }

    fn as_bool(self) -> bool {
        match self {
            Self::Bool(value) => value,
            Self::U32(value) => value != 0,
            Self::U8(value) => value != 0,
        }
    }
}

/// Which per-model table routes the data points
#[derive(Debug, Clone, Copy)]
enum Model {
    NeoSiren,
    PresenceSensor,
}

/// Data-point router with a per-model field mapping
pub struct DataPoints {
    model: Model,
    value: Value,
}

impl DataPoints {
    #[must_use]
    pub fn neo_siren() -> Self {
        Self {
            model: Model::NeoSiren,
            value: Value::Null,
        }
    }

    #[must_use]
    pub fn presence_sensor() -> Self {
        Self {
            model: Model::PresenceSensor,
            value: Value::Null,
        }
    }

    fn update(&self, data_point: u8, data: DataPointValue, map: &mut Map<String, Value>) {
        match self.model {
            Model::NeoSiren => match data_point {
                0x05 => {
                    // Volume levels outside the table are dropped rather
                    // than reported as a bogus level
                    if let Some(volume) =
                        ["low", "medium", "high"].get(data.as_u32() as usize)
                    {
                        map.insert("volume".into(), json!(volume));
                    }
                }
                0x07 => {
                    map.insert("duration".into(), json!(data.as_u32()));
                }
                0x0D => {
                    map.insert("alarm".into(), json!(data.as_bool()));
                }
                0x0F => {
                    map.insert("battery".into(), json!(data.as_u32()));
                }
                0x15 => {
                    map.insert("melody".into(), json!(data.as_u32()));
                }
                _ => {}
            },

            Model::PresenceSensor => match data_point {
                0x01 => {
                    map.insert("occupancy".into(), json!(data.as_bool()));
                }
                0x02 => {
                    map.insert("sensitivity".into(), json!(data.as_u32()));
                }
                0x03 => {
                    map.insert("distanceMin".into(), json!(f64::from(data.as_u32()) / 100.0));
                }
                0x04 => {
                    map.insert("distanceMax".into(), json!(f64::from(data.as_u32()) / 100.0));
                }
                0x65 => {
                    map.insert("detectionDelay".into(), json!(data.as_u32()));
                }
                0x68 => {
                    map.insert("illuminance".into(), json!(data.as_u32()));
                }
                _ => {}
            },
        }
    }
}

impl Property for DataPoints {
    fn name(&self) -> &str {
        "data"
    }

    fn cluster_id(&self) -> u16 {
        cluster::TUYA_DATA
    }

    fn value(&self) -> &Value {
        &self.value
    }

    fn parse_command(&mut self, command_id: u8, payload: &[u8]) {
        if (command_id != 0x01 && command_id != 0x02) || payload.len() < 6 {
            return;
        }

        let data_point = payload[2];
        let data_type = payload[3];
        let length = u16::from_be_bytes([payload[4], payload[5]]);

        let Some(data) = DataPointValue::parse(data_type, length, &payload[6..]) else {
            return;
        };

        let mut map = self.value.as_object().cloned().unwrap_or_default();
        self.update(data_point, data, &mut map);

        if map.is_empty() {
            return;
        }

        self.value = Value::Object(map);
    }
}

/// Behavior after a power cycle, TUYA flavor (attribute 0x8002)
#[derive(Default)]
pub struct PowerOnStatus {
    value: Value,
}

impl Property for PowerOnStatus {
    fn name(&self) -> &str {
        "powerOnStatus"
    }

    fn cluster_id(&self) -> u16 {
        cluster::ON_OFF
    }

    fn value(&self) -> &Value {
        &self.value
    }

    fn parse_attribute(&mut self, attribute_id: u16, data_type: u8, data: &[u8]) {
        if attribute_id != 0x8002 || data_type != data_type::ENUM_8BIT || data.len() != 1 {
            return;
        }

        self.value = match data[0] {
            0x00 => json!("off"),
            0x01 => json!("on"),
            0x02 => json!("previous"),
            _ => return,
        };
    }
}

/// External switch wiring mode (attribute 0x0030)
#[derive(Default)]
pub struct SwitchType {
    value: Value,
}

impl Property for SwitchType {
    fn name(&self) -> &str {
        "switchType"
    }

    fn cluster_id(&self) -> u16 {
        cluster::ON_OFF
    }

    fn value(&self) -> &Value {
        &self.value
    }

    fn parse_attribute(&mut self, attribute_id: u16, data_type: u8, data: &[u8]) {
        if attribute_id != 0x0030 || data_type != data_type::ENUM_8BIT || data.len() != 1 {
            return;
        }

        self.value = match data[0] {
            0x00 => json!("toggle"),
            0x01 => json!("state"),
            0x02 => json!("momentary"),
            _ => return,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presence_sensor_distance() {
        let mut property = DataPoints::presence_sensor();

        // dp 4, u32-BE 750 -> distanceMax 7.5
        property.parse_command(
            0x01,
            &[0x00, 0x01, 0x04, 0x02, 0x00, 0x04, 0x00, 0x00, 0x02, 0xEE],
        );

        assert_eq!(*property.value(), json!({"distanceMax": 7.5}));
    }

    #[test]
    fn test_unmapped_data_point_is_ignored() {
        let mut property = DataPoints::presence_sensor();

        // dp 5 is not in the presence-sensor table
        property.parse_command(
            0x01,
            &[0x00, 0x01, 0x05, 0x02, 0x00, 0x04, 0x00, 0x00, 0x00, 0x64],
        );

        assert_eq!(*property.value(), Value::Null);
    }

    #[test]
    fn test_neo_siren_volume_range_guard() {
        let mut property = DataPoints::neo_siren();

        // Value 100 is outside the 0..=2 volume table: no mutation
        property.parse_command(
            0x01,
            &[0x00, 0x01, 0x05, 0x02, 0x00, 0x04, 0x00, 0x00, 0x00, 0x64],
        );
        assert_eq!(*property.value(), Value::Null);

        property.parse_command(
            0x01,
            &[0x00, 0x02, 0x05, 0x02, 0x00, 0x04, 0x00, 0x00, 0x00, 0x01],
        );
        assert_eq!(*property.value(), json!({"volume": "medium"}));
    }

    #[test]
    fn test_bool_data_point() {
        let mut property = DataPoints::neo_siren();

        property.parse_command(0x02, &[0x00, 0x03, 0x0D, 0x01, 0x00, 0x01, 0x01]);
        assert_eq!(*property.value(), json!({"alarm": true}));
    }
}

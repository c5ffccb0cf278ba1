//! LUMI (Xiaomi/Aqara) vendor properties

use serde_json::{json, Map, Value};
use zcl::clusters::id as cluster;
use zcl::data_type;

use super::{f32_le, percentage, u16_le, Property, PropertyContext};

/// LUMI vendor telemetry, either as direct manufacturer attributes or packed
/// into the 0xF7 container of (data point, type, value) triples
pub struct Data {
    value: Value,
    model_name: String,
    firmware_version: u8,
}

impl Data {
    #[must_use]
    pub fn new(context: &PropertyContext) -> Self {
        Self {
            value: Value::Null,
            model_name: context.model_name.clone(),
            firmware_version: context.firmware_version,
        }
    }

    fn parse_data(&self, data_point: u16, data_type: u8, data: &[u8], map: &mut Map<String, Value>) {
        match data_point {
            0x0003 => {
                if self.model_name != "lumi.remote.b686opcn01"
                    && self.model_name != "lumi.sen_ill.mgl01"
                {
                    if data_type != data_type::SIGNED_8BIT || data.len() != 1 {
                        return;
                    }

                    map.insert("temperature".into(), json!(data[0] as i8));
                }
            }

            0x0005 => {
                if data_type != data_type::UNSIGNED_16BIT || data.len() != 2 {
                    return;
                }

                map.insert("outageCount".into(), json!(u16_le(data).wrapping_sub(1)));
            }

            0x0009 => {
                if self.model_name == "lumi.remote.b686opcn01" {
                    if data_type != data_type::UNSIGNED_8BIT || data.len() != 1 {
                        return;
                    }

                    let mode = ["command", "event"]
                        .get(data[0] as usize)
                        .copied()
                        .unwrap_or("unknown");
                    map.insert("mode".into(), json!(mode));
                }
            }

            0x0064 => {
                if self.model_name == "lumi.sen_ill.mgl01" {
                    if data_type != data_type::UNSIGNED_32BIT || data.len() != 4 {
                        return;
                    }

                    let value = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
                    map.insert("illuminance".into(), json!(value));
                }
            }

            0x0065 | 0x0142 => {
                if self.model_name == "lumi.motion.ac01" {
                    if data_type != data_type::SIGNED_8BIT || data.len() != 1 {
                        return;
                    }

                    map.insert("occupancy".into(), json!(data[0] != 0));
                }
            }

            0x0066 | 0x010C | 0x0143 => {
                if self.model_name == "lumi.motion.ac01" {
                    if data_type != data_type::UNSIGNED_8BIT || data.len() != 1 {
                        return;
                    }

                    // Data point 0x0066 switched meaning with firmware 50:
                    // older firmware reports sensitivity there, newer reports
                    // the motion event
                    let sensitivity = match data_point {
                        0x0066 => self.firmware_version < 50,
                        0x010C => true,
                        _ => false,
                    };

                    if sensitivity {
                        let level = ["low", "medium", "high"]
                            .get((data[0] as usize).wrapping_sub(1))
                            .copied()
                            .unwrap_or("unknown");
                        map.insert("sensitivity".into(), json!(level));
                    } else {
                        let event = [
                            "enter",
                            "leave",
                            "enterLeft",
                            "leaveRight",
                            "enterRight",
                            "leaveLeft",
                            "approach",
                            "absent",
                        ]
                        .get(data[0] as usize)
                        .copied()
                        .unwrap_or("unknown");

                        map.insert("event".into(), json!(event));
                        map.insert("occupancy".into(), json!(data[0] != 0x01));
                    }
                }
            }

            0x0067 | 0x0144 => {
                if self.model_name == "lumi.motion.ac01" {
                    if data_type != data_type::UNSIGNED_8BIT || data.len() != 1 {
                        return;
                    }

                    let mode = ["undirected", "directed"]
                        .get(data[0] as usize)
                        .copied()
                        .unwrap_or("unknown");
                    map.insert("mode".into(), json!(mode));
                }
            }

            0x0069 | 0x0146 => {
                if self.model_name == "lumi.motion.ac01" {
                    if data_type != data_type::UNSIGNED_8BIT || data.len() != 1 {
                        return;
                    }

                    let distance = ["far", "middle", "near"]
                        .get(data[0] as usize)
                        .copied()
                        .unwrap_or("unknown");
                    map.insert("distance".into(), json!(distance));
                }
            }

            0x0095 => {
                if data_type != data_type::SINGLE_PRECISION || data.len() != 4 {
                    return;
                }

                map.insert(
                    "energy".into(),
                    json!((f64::from(f32_le(data)) * 100.0).round() / 100.0),
                );
            }

            0x0096 => {
                if data_type != data_type::SINGLE_PRECISION || data.len() != 4 {
                    return;
                }

                map.insert(
                    "voltage".into(),
                    json!(f64::from(f32_le(data)).round() / 10.0),
                );
            }

            0x0097 => {
                if data_type != data_type::SINGLE_PRECISION || data.len() != 4 {
                    return;
                }

                map.insert(
                    "current".into(),
                    json!(f64::from(f32_le(data)).round() / 1000.0),
                );
            }

            0x0098 => {
                if data_type != data_type::SINGLE_PRECISION || data.len() != 4 {
                    return;
                }

                map.insert(
                    "power".into(),
                    json!((f64::from(f32_le(data)) * 100.0).round() / 100.0),
                );
            }

            _ => {}
        }
    }
}

impl Property for Data {
    fn name(&self) -> &str {
        "data"
    }

    fn cluster_id(&self) -> u16 {
        cluster::LUMI
    }

    fn value(&self) -> &Value {
        &self.value
    }

    fn parse_attribute(&mut self, attribute_id: u16, data_type: u8, data: &[u8]) {
        let mut map = self.value.as_object().cloned().unwrap_or_default();

        if attribute_id == 0x00F7 {
            if data_type != data_type::OCTET_STRING {
                return;
            }

            let mut cursor = data;

            while cursor.len() >= 2 {
                let data_point = u16::from(cursor[0]);
                let item_type = cursor[1];

                let Ok(advance) = zcl::data_size(item_type, &cursor[2..]) else {
                    break;
                };

                self.parse_data(
                    data_point,
                    item_type,
                    &cursor[2 + advance.skip..2 + advance.total()],
                    &mut map,
                );

                cursor = &cursor[2 + advance.total()..];
            }
        } else {
            self.parse_data(attribute_id, data_type, data, &mut map);
        }

        if map.is_empty() {
            return;
        }

        self.value = Value::Object(map);
    }
}

/// Battery voltage packed into the proprietary 0xFF01/0xFF02 reports
#[derive(Default)]
pub struct BatteryVoltage {
    value: Value,
}

impl Property for BatteryVoltage {
    fn name(&self) -> &str {
        "battery"
    }

    fn cluster_id(&self) -> u16 {
        cluster::LUMI
    }

    fn value(&self) -> &Value {
        &self.value
    }

    fn parse_attribute(&mut self, attribute_id: u16, data_type: u8, data: &[u8]) {
        match attribute_id {
            // Tag-value string report, millivolts at offset 2
            0xFF01 => {
                if data_type != data_type::CHARACTER_STRING || data.len() < 4 {
                    return;
                }

                self.value = json!(percentage(2850.0, 3200.0, f64::from(u16_le(&data[2..]))));
            }

            // Structure report, millivolts at offset 5
            0xFF02 => {
                if data_type != data_type::STRUCTURE || data.len() < 7 {
                    return;
                }

                self.value = json!(percentage(2850.0, 3200.0, f64::from(u16_le(&data[5..]))));
            }

            _ => {}
        }
    }
}

/// Instant power via the AnalogInput present-value
#[derive(Default)]
pub struct Power {
    value: Value,
}

impl Property for Power {
    fn name(&self) -> &str {
        "power"
    }

    fn cluster_id(&self) -> u16 {
        cluster::ANALOG_INPUT
    }

    fn value(&self) -> &Value {
        &self.value
    }

    fn parse_attribute(&mut self, attribute_id: u16, data_type: u8, data: &[u8]) {
        if attribute_id != 0x0055 || data_type != data_type::SINGLE_PRECISION || data.len() != 4 {
            return;
        }

        self.value = json!((f64::from(f32_le(data)) * 100.0).round() / 100.0);
    }
}

/// Click detection on older LUMI buttons
#[derive(Default)]
pub struct ButtonAction {
    value: Value,
}

impl Property for ButtonAction {
    fn name(&self) -> &str {
        "action"
    }

    fn cluster_id(&self) -> u16 {
        cluster::ON_OFF
    }

    fn value(&self) -> &Value {
        &self.value
    }

    fn parse_attribute(&mut self, attribute_id: u16, data_type: u8, data: &[u8]) {
        let accepted = (attribute_id == 0x0000 && data_type == data_type::BOOLEAN)
            || (attribute_id == 0x8000 && data_type == data_type::UNSIGNED_8BIT);

        if !accepted || data.len() != 1 {
            return;
        }

        self.value = match data[0] {
            0x00 => json!("on"),
            0x01 => json!("off"),
            0x02 => json!("doubleClick"),
            0x03 => json!("tripleClick"),
            0x04 => json!("quadrupleClick"),
            0x80 => json!("multipleClick"),
            _ => return,
        };
    }
}

/// Click detection on LUMI wireless switches
#[derive(Default)]
pub struct SwitchAction {
    value: Value,
}

impl Property for SwitchAction {
    fn name(&self) -> &str {
        "action"
    }

    fn cluster_id(&self) -> u16 {
        cluster::MULTISTATE_INPUT
    }

    fn value(&self) -> &Value {
        &self.value
    }

    fn parse_attribute(&mut self, attribute_id: u16, data_type: u8, data: &[u8]) {
        if attribute_id != 0x0055 || data_type != data_type::UNSIGNED_16BIT || data.len() != 2 {
            return;
        }

        self.value = match u16_le(data) {
            0x0000 => json!("longClick"),
            0x0001 => json!("singleClick"),
            0x0002 => json!("doubleClick"),
            0x0003 => json!("tripleClick"),
            0x00FF => json!("release"),
            _ => return,
        };
    }
}

/// Rotation direction of the Aqara cube
#[derive(Default)]
pub struct CubeRotation {
    value: Value,
}

impl Property for CubeRotation {
    fn name(&self) -> &str {
        "action"
    }

    fn cluster_id(&self) -> u16 {
        cluster::ANALOG_INPUT
    }

    fn value(&self) -> &Value {
        &self.value
    }

    fn parse_attribute(&mut self, attribute_id: u16, data_type: u8, data: &[u8]) {
        if attribute_id != 0x0055 || data_type != data_type::SINGLE_PRECISION || data.len() != 4 {
            return;
        }

        self.value = json!(if f32_le(data) < 0.0 {
            "rotateLeft"
        } else {
            "rotateRight"
        });
    }
}

/// Movement gestures of the Aqara cube, encoded in value ranges
#[derive(Default)]
pub struct CubeMovement {
    value: Value,
}

impl Property for CubeMovement {
    fn name(&self) -> &str {
        "action"
    }

    fn cluster_id(&self) -> u16 {
        cluster::MULTISTATE_INPUT
    }

    fn value(&self) -> &Value {
        &self.value
    }

    fn parse_attribute(&mut self, attribute_id: u16, data_type: u8, data: &[u8]) {
        if attribute_id != 0x0055 || data_type != data_type::UNSIGNED_16BIT || data.len() != 2 {
            return;
        }

        let value = u16_le(data);

        self.value = if value == 0 {
            json!("shake")
        } else if value == 2 {
            json!("wake")
        } else if value == 3 {
            json!("fall")
        } else if value >= 512 {
            json!("tap")
        } else if value >= 256 {
            json!("slide")
        } else if value >= 128 {
            json!("flip")
        } else if value >= 64 {
            json!("drop")
        } else {
            return;
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn motion_sensor() -> PropertyContext {
        PropertyContext {
            model_name: "lumi.motion.ac01".into(),
            firmware_version: 55,
            ..PropertyContext::default()
        }
    }

    #[test]
    fn test_packed_container() {
        let mut property = Data::new(&PropertyContext::default());

        // dp 0x03 (i8 temperature) and dp 0x05 (u16 outage counter)
        let payload = [
            0x03,
            zcl::data_type::SIGNED_8BIT,
            0x19,
            0x05,
            zcl::data_type::UNSIGNED_16BIT,
            0x03,
            0x00,
        ];

        property.parse_attribute(0x00F7, zcl::data_type::OCTET_STRING, &payload);

        assert_eq!(
            *property.value(),
            json!({"temperature": 25, "outageCount": 2})
        );
    }

    #[test]
    fn test_motion_event_on_new_firmware() {
        let mut property = Data::new(&motion_sensor());

        property.parse_attribute(0x0066, zcl::data_type::UNSIGNED_8BIT, &[0x06]);

        assert_eq!(
            *property.value(),
            json!({"event": "approach", "occupancy": true})
        );
    }

    #[test]
    fn test_sensitivity_on_old_firmware() {
        let context = PropertyContext {
            firmware_version: 42,
            ..motion_sensor()
        };
        let mut property = Data::new(&context);

        property.parse_attribute(0x0066, zcl::data_type::UNSIGNED_8BIT, &[0x02]);

        assert_eq!(*property.value(), json!({"sensitivity": "medium"}));
    }

    #[test]
    fn test_battery_voltage_string_report() {
        let mut property = BatteryVoltage::default();

        // 3000 mV at offset 2
        let data = [0x01, 0x21, 0xB8, 0x0B, 0x00];
        property.parse_attribute(0xFF01, zcl::data_type::CHARACTER_STRING, &data);

        assert_eq!(*property.value(), json!(42));
    }

    #[test]
    fn test_cube_movement_ranges() {
        let mut property = CubeMovement::default();

        for (raw, expected) in [
            (0u16, "shake"),
            (2, "wake"),
            (3, "fall"),
            (600, "tap"),
            (300, "slide"),
            (130, "flip"),
            (70, "drop"),
        ] {
            property.parse_attribute(
                0x0055,
                zcl::data_type::UNSIGNED_16BIT,
                &raw.to_le_bytes(),
            );
            assert_eq!(*property.value(), json!(expected), "raw {raw}");
        }
    }
}

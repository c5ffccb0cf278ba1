//! Assorted vendor properties

use serde_json::{json, Value};
use zcl::clusters::id as cluster;
use zcl::data_type;

use super::{i16_le, u16_le, Property};

/// Konke button clicks, reported as magic values on the OnOff attribute
#[derive(Default)]
pub struct KonkeButtonAction {
    value: Value,
}

impl Property for KonkeButtonAction {
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
        if attribute_id != 0x0000 || data_type != data_type::BOOLEAN || data.is_empty() {
            return;
        }

        self.value = match data[0] {
            0x80 => json!("singleClick"),
            0x81 => json!("doubleClick"),
            0x82 => json!("longClick"),
            _ => return,
        };
    }
}

/// LifeControl air-quality sensor: four i16 measurements on sequential
/// attribute ids of the temperature cluster
#[derive(Default)]
pub struct LifeControlAirQuality {
    value: Value,
}

impl Property for LifeControlAirQuality {
    fn name(&self) -> &str {
        "airQuality"
    }

    fn cluster_id(&self) -> u16 {
        cluster::TEMPERATURE_MEASUREMENT
    }

    fn value(&self) -> &Value {
        &self.value
    }

    fn parse_attribute(&mut self, attribute_id: u16, data_type: u8, data: &[u8]) {
        if (data_type != data_type::UNSIGNED_16BIT && data_type != data_type::SIGNED_16BIT)
            || data.len() != 2
        {
            return;
        }

        let mut map = self.value.as_object().cloned().unwrap_or_default();
        let value = i16_le(data);

        match attribute_id {
            0x0000 => {
                map.insert("temperature".into(), json!(f64::from(value) / 100.0));
            }
            0x0001 => {
                map.insert("humidity".into(), json!(f64::from(value) / 100.0));
            }
            0x0002 => {
                map.insert("eco2".into(), json!(value));
            }
            0x0003 => {
                map.insert("voc".into(), json!(value));
            }
            _ => return,
        }

        self.value = Value::Object(map);
    }
}

/// Perenio smart plug: a grab bag of power metering attributes on the
/// vendor cluster, including a bitmapped alarm register
#[derive(Default)]
pub struct PerenioSmartPlug {
    value: Value,
}

impl Property for PerenioSmartPlug {
    fn name(&self) -> &str {
        "smartPlug"
    }

    fn cluster_id(&self) -> u16 {
        cluster::PERENIO
    }

    fn value(&self) -> &Value {
        &self.value
    }

    fn parse_attribute(&mut self, attribute_id: u16, data_type: u8, data: &[u8]) {
        let mut map = self.value.as_object().cloned().unwrap_or_default();

        match attribute_id {
            0x0000 => {
                if data_type != data_type::UNSIGNED_8BIT || data.len() != 1 {
                    return;
                }

                let state = match data[0] {
                    0x00 => "off",
                    0x01 => "on",
                    0x02 => "previous",
                    _ => return,
                };

                map.insert("powerOnStatus".into(), json!(state));
            }

            0x0001 => {
                if data_type != data_type::UNSIGNED_8BIT || data.len() != 1 {
                    return;
                }

                map.insert("alarmVoltageMin".into(), json!(data[0] & 0x01 != 0));
                map.insert("alarmVoltageMax".into(), json!(data[0] & 0x02 != 0));
                map.insert("alarmPowerMax".into(), json!(data[0] & 0x04 != 0));
                map.insert("alarmEnergyLimit".into(), json!(data[0] & 0x08 != 0));
            }

            0x000E => {
                if data_type != data_type::UNSIGNED_32BIT || data.len() != 4 {
                    return;
                }

                let value = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
                map.insert("energy".into(), json!(f64::from(value) / 1000.0));
            }

            _ => {
                if data_type != data_type::UNSIGNED_16BIT || data.len() != 2 {
                    return;
                }

                let value = u16_le(data);

                match attribute_id {
                    0x0003 => {
                        map.insert("voltage".into(), json!(value));
                    }
                    0x0004 => {
                        map.insert("voltageMin".into(), json!(value));
                    }
                    0x0005 => {
                        map.insert("voltageMax".into(), json!(value));
                    }
                    0x000A => {
                        map.insert("power".into(), json!(value));
                    }
                    0x000B => {
                        map.insert("powerMax".into(), json!(value));
                    }
                    0x000F => {
                        map.insert("energyLimit".into(), json!(value));
                    }
                    _ => return,
                }
            }
        }

        self.value = Value::Object(map);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_konke_clicks() {
        let mut property = KonkeButtonAction::default();

        property.parse_attribute(0x0000, data_type::BOOLEAN, &[0x81]);
        assert_eq!(*property.value(), json!("doubleClick"));
    }

    #[test]
    fn test_air_quality_accumulates() {
        let mut property = LifeControlAirQuality::default();

        property.parse_attribute(0x0000, data_type::SIGNED_16BIT, &2150i16.to_le_bytes());
        property.parse_attribute(0x0002, data_type::UNSIGNED_16BIT, &600i16.to_le_bytes());

        assert_eq!(
            *property.value(),
            json!({"temperature": 21.5, "eco2": 600})
        );
    }

    #[test]
    fn test_perenio_alarm_bits() {
        let mut property = PerenioSmartPlug::default();

        property.parse_attribute(0x0001, data_type::UNSIGNED_8BIT, &[0x05]);

        assert_eq!(
            *property.value(),
            json!({
                "alarmVoltageMin": true,
                "alarmVoltageMax": false,
                "alarmPowerMax": true,
                "alarmEnergyLimit": false,
            })
        );
    }
}

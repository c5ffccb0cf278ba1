//! PTVO firmware properties
//!
//! PTVO boards publish measurements through the AnalogInput cluster as a
//! float value plus a unit string; the unit string acts as the gate that
//! tells the kinds apart.

use serde_json::{json, Value};
use zcl::clusters::id as cluster;
use zcl::data_type;

use super::{f32_le, Property};

/// AnalogInput float measurement gated on the unit-string attribute
pub struct AnalogInput {
    name: &'static str,
    unit: &'static str,
    value: Value,
    buffer: Option<f32>,
}

impl AnalogInput {
    #[must_use]
    pub fn co2() -> Self {
        Self {
            name: "co2",
            unit: "ppm",
            value: Value::Null,
            buffer: None,
        }
    }

    #[must_use]
    pub fn temperature() -> Self {
        Self {
            name: "temperature",
            unit: "C",
            value: Value::Null,
            buffer: None,
        }
    }
}

impl Property for AnalogInput {
    fn name(&self) -> &str {
        self.name
    }

    fn cluster_id(&self) -> u16 {
        cluster::ANALOG_INPUT
    }

    fn value(&self) -> &Value {
        &self.value
    }

    fn parse_attribute(&mut self, attribute_id: u16, data_type: u8, data: &[u8]) {
        match attribute_id {
            0x0055 => {
                if data_type != data_type::SINGLE_PRECISION || data.len() != 4 {
                    return;
                }

                self.buffer = Some(f32_le(data));
            }

            0x001C => {
                if data_type != data_type::CHARACTER_STRING
                    || std::str::from_utf8(data) != Ok(self.unit)
                {
                    return;
                }

                if let Some(buffer) = self.buffer {
                    self.value = json!(buffer);
                }
            }

            _ => {}
        }
    }
}

/// On/off pattern state
#[derive(Default)]
pub struct ChangePattern {
    value: Value,
}

impl Property for ChangePattern {
    fn name(&self) -> &str {
        "changePattern"
    }

    fn cluster_id(&self) -> u16 {
        cluster::ON_OFF
    }

    fn value(&self) -> &Value {
        &self.value
    }

    fn parse_attribute(&mut self, attribute_id: u16, data_type: u8, data: &[u8]) {
        if attribute_id != 0x0000 || data_type != data_type::BOOLEAN || data.len() != 1 {
            return;
        }

        self.value = json!(if data[0] != 0 { "on" } else { "off" });
    }
}

/// Pattern number carried in the AnalogInput value
#[derive(Default)]
pub struct Pattern {
    value: Value,
}

impl Property for Pattern {
    fn name(&self) -> &str {
        "pattern"
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

        self.value = json!(f32_le(data) as u8);
    }
}

/// Switch state reported through the MultistateInput present-value
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
        if attribute_id != 0x0055 || data_type != data_type::UNSIGNED_8BIT || data.len() != 1 {
            return;
        }

        self.value = json!(if data[0] != 0 { "on" } else { "off" });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_co2_gated_on_unit_string() {
        let mut property = AnalogInput::co2();

        property.parse_attribute(0x0055, data_type::SINGLE_PRECISION, &450.0f32.to_le_bytes());
        assert_eq!(*property.value(), Value::Null);

        // Wrong unit leaves the buffer unpublished
        property.parse_attribute(0x001C, data_type::CHARACTER_STRING, b"C");
        assert_eq!(*property.value(), Value::Null);

        property.parse_attribute(0x001C, data_type::CHARACTER_STRING, b"ppm");
        assert_eq!(*property.value(), json!(450.0));
    }
}

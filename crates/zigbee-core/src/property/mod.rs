//! Property registry
//!
//! A property decodes attribute reports or cluster-specific commands from one
//! cluster into a semantic value. The set is closed: constructors are keyed
//! on the stable names used by the device library, and endpoints hold the
//! resolved trait objects.
//!
//! Decode contract: a property mutates its value only when every part of the
//! input (attribute id, data type, length) matches its expectations, and
//! silently ignores everything else. The dispatcher compares values before
//! and after to detect changes, and logs at its own level when no property
//! on an endpoint accepted a frame.

mod lumi;
mod other;
mod ptvo;
mod standard;
mod tuya;

use serde_json::Value;

/// Context available to property constructors
#[derive(Debug, Clone, Default)]
pub struct PropertyContext {
    pub model_name: String,
    pub firmware_version: u8,
    pub options: serde_json::Map<String, Value>,
}

/// One decoded semantic property of an endpoint
pub trait Property: Send {
    /// Stable name, also the key under which the value is published
    fn name(&self) -> &str;

    /// The single cluster this property listens on
    fn cluster_id(&self) -> u16;

    /// Current value; `Value::Null` until a report has been decoded
    fn value(&self) -> &Value;

    /// Decode an attribute report element
    fn parse_attribute(&mut self, attribute_id: u16, data_type: u8, data: &[u8]) {
        let _ = (attribute_id, data_type, data);
    }

    /// Decode a cluster-specific command
    fn parse_command(&mut self, command_id: u8, payload: &[u8]) {
        let _ = (command_id, payload);
    }
}

pub(crate) fn u16_le(data: &[u8]) -> u16 {
    u16::from_le_bytes([data[0], data[1]])
}

pub(crate) fn i16_le(data: &[u8]) -> i16 {
    i16::from_le_bytes([data[0], data[1]])
}

pub(crate) fn u24_le(data: &[u8]) -> u32 {
    u32::from_le_bytes([data[0], data[1], data[2], 0])
}

pub(crate) fn u48_le(data: &[u8]) -> u64 {
    u64::from_le_bytes([data[0], data[1], data[2], data[3], data[4], data[5], 0, 0])
}

pub(crate) fn f32_le(data: &[u8]) -> f32 {
    f32::from_le_bytes([data[0], data[1], data[2], data[3]])
}

/// Linear interpolation to a 0..=100 percentage, saturating at both ends
#[must_use]
pub fn percentage(min: f64, max: f64, value: f64) -> u8 {
    let value = value.clamp(min, max);
    ((value - min) / (max - min) * 100.0) as u8
}

/// Construct a property by its registry name
#[must_use]
pub fn create(name: &str, context: &PropertyContext) -> Option<Box<dyn Property>> {
    let property: Box<dyn Property> = match name {
        "batteryVoltage" => Box::new(standard::BatteryVoltage::default()),
        "batteryPercentage" => Box::new(standard::BatteryPercentage::new(context)),
        "status" => Box::new(standard::Status::default()),
        "contact" => Box::new(standard::Contact::default()),
        "powerOnStatus" => Box::new(standard::PowerOnStatus::default()),
        "level" => Box::new(standard::Level::default()),
        "colorHS" => Box::new(standard::ColorHS::default()),
        "colorXY" => Box::new(standard::ColorXY::default()),
        "colorTemperature" => Box::new(standard::ColorTemperature::default()),
        "illuminance" => Box::new(standard::Illuminance::default()),
        "temperature" => Box::new(standard::Temperature::default()),
        "humidity" => Box::new(standard::Humidity::default()),
        "occupancy" => Box::new(standard::Occupancy::default()),
        "energy" => Box::new(standard::Energy::default()),
        "power" => Box::new(standard::Power::default()),
        "scene" => Box::new(standard::Scene::new(context)),
        "identifyAction" => Box::new(standard::IdentifyAction::default()),
        "switchAction" => Box::new(standard::SwitchAction::default()),
        "levelAction" => Box::new(standard::LevelAction::default()),

        "iasContact" => Box::new(standard::IasZoneStatus::new("contact")),
        "iasGas" => Box::new(standard::IasZoneStatus::new("gas")),
        "iasOccupancy" => Box::new(standard::IasZoneStatus::new("occupancy")),
        "iasSmoke" => Box::new(standard::IasZoneStatus::new("smoke")),
        "iasWaterLeak" => Box::new(standard::IasZoneStatus::new("waterLeak")),

        "ptvoCO2" => Box::new(ptvo::AnalogInput::co2()),
        "ptvoTemperature" => Box::new(ptvo::AnalogInput::temperature()),
        "ptvoChangePattern" => Box::new(ptvo::ChangePattern::default()),
        "ptvoPattern" => Box::new(ptvo::Pattern::default()),
        "ptvoSwitchAction" => Box::new(ptvo::SwitchAction::default()),

        "lumiData" => Box::new(lumi::Data::new(context)),
        "lumiBatteryVoltage" => Box::new(lumi::BatteryVoltage::default()),
        "lumiPower" => Box::new(lumi::Power::default()),
        "lumiButtonAction" => Box::new(lumi::ButtonAction::default()),
        "lumiSwitchAction" => Box::new(lumi::SwitchAction::default()),
        "lumiCubeRotation" => Box::new(lumi::CubeRotation::default()),
        "lumiCubeMovement" => Box::new(lumi::CubeMovement::default()),

        "tuyaNeoSiren" => Box::new(tuya::DataPoints::neo_siren()),
        "tuyaPresenceSensor" => Box::new(tuya::DataPoints::presence_sensor()),
        "tuyaPowerOnStatus" => Box::new(tuya::PowerOnStatus::default()),
        "tuyaSwitchType" => Box::new(tuya::SwitchType::default()),

        "konkeButtonAction" => Box::new(other::KonkeButtonAction::default()),
        "lifeControlAirQuality" => Box::new(other::LifeControlAirQuality::default()),
        "perenioSmartPlug" => Box::new(other::PerenioSmartPlug::default()),

        _ => return None,
    };

    Some(property)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percentage_saturates() {
        assert_eq!(percentage(2850.0, 3200.0, 2700.0), 0);
        assert_eq!(percentage(2850.0, 3200.0, 2850.0), 0);
        assert_eq!(percentage(2850.0, 3200.0, 3200.0), 100);
        assert_eq!(percentage(2850.0, 3200.0, 4000.0), 100);
    }

    #[test]
    fn test_percentage_monotonic() {
        let mut last = 0;
        for mv in (2800..3300).step_by(10) {
            let value = percentage(2850.0, 3200.0, f64::from(mv));
            assert!(value >= last);
            last = value;
        }
    }

    #[test]
    fn test_registry_names() {
        let context = PropertyContext::default();

        for name in [
            "batteryVoltage",
            "status",
            "colorXY",
            "iasContact",
            "lumiData",
            "tuyaPresenceSensor",
            "perenioSmartPlug",
        ] {
            assert!(create(name, &context).is_some(), "missing {name}");
        }

        assert!(create("noSuchProperty", &context).is_none());
    }
}

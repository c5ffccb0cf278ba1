//! Standard-cluster properties

use serde_json::{json, Value};
use zcl::clusters::id as cluster;
use zcl::data_type;

use super::{i16_le, percentage, u16_le, u24_le, u48_le, Property, PropertyContext};

/// Battery level derived from the PowerConfiguration voltage attribute
#[derive(Default)]
pub struct BatteryVoltage {
    value: Value,
}

impl Property for BatteryVoltage {
    fn name(&self) -> &str {
        "battery"
    }

    fn cluster_id(&self) -> u16 {
        cluster::POWER_CONFIG
    }

    fn value(&self) -> &Value {
        &self.value
    }

    fn parse_attribute(&mut self, attribute_id: u16, data_type: u8, data: &[u8]) {
        if attribute_id != 0x0020 || data_type != data_type::UNSIGNED_8BIT || data.len() != 1 {
            return;
        }

        self.value = json!(percentage(2850.0, 3200.0, f64::from(data[0]) * 100.0));
    }
}

/// Battery level from the percentage attribute, reported in half-percent
/// steps unless the device carries the `batteryUndivided` option
pub struct BatteryPercentage {
    value: Value,
    undivided: bool,
}

impl BatteryPercentage {
    #[must_use]
    pub fn new(context: &PropertyContext) -> Self {
        Self {
            value: Value::Null,
            undivided: context
                .options
                .get("batteryUndivided")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        }
    }
}

impl Property for BatteryPercentage {
    fn name(&self) -> &str {
        "battery"
    }

    fn cluster_id(&self) -> u16 {
        cluster::POWER_CONFIG
    }

    fn value(&self) -> &Value {
        &self.value
    }

    fn parse_attribute(&mut self, attribute_id: u16, data_type: u8, data: &[u8]) {
        if attribute_id != 0x0021 || data_type != data_type::UNSIGNED_8BIT || data.len() != 1 {
            return;
        }

        self.value = json!(f64::from(data[0]) / if self.undivided { 1.0 } else { 2.0 });
    }
}

/// On/off state
#[derive(Default)]
pub struct Status {
    value: Value,
}

impl Property for Status {
    fn name(&self) -> &str {
        "status"
    }

    fn cluster_id(&self) -> u16 {
        cluster::ON_OFF
    }

    fn value(&self) -> &Value {
        &self.value
    }

    fn parse_attribute(&mut self, attribute_id: u16, data_type: u8, data: &[u8]) {
        if attribute_id != 0x0000
            || (data_type != data_type::BOOLEAN && data_type != data_type::UNSIGNED_8BIT)
            || data.len() != 1
        {
            return;
        }

        self.value = json!(if data[0] != 0 { "on" } else { "off" });
    }
}

/// Open/close contact reported as an OnOff attribute
#[derive(Default)]
pub struct Contact {
    value: Value,
}

impl Property for Contact {
    fn name(&self) -> &str {
        "contact"
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

        self.value = json!(data[0] != 0);
    }
}

/// Behavior after a power cycle (OnOff attribute 0x4003)
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
        if attribute_id != 0x4003 || data_type != data_type::ENUM_8BIT || data.len() != 1 {
            return;
        }

        self.value = match data[0] {
            0x00 => json!("off"),
            0x01 => json!("on"),
            0x02 => json!("toggle"),
            0xFF => json!("previous"),
            _ => return,
        };
    }
}

/// Current brightness level
#[derive(Default)]
pub struct Level {
    value: Value,
}

impl Property for Level {
    fn name(&self) -> &str {
        "level"
    }

    fn cluster_id(&self) -> u16 {
        cluster::LEVEL_CONTROL
    }

    fn value(&self) -> &Value {
        &self.value
    }

    fn parse_attribute(&mut self, attribute_id: u16, data_type: u8, data: &[u8]) {
        if attribute_id != 0x0000 || data_type != data_type::UNSIGNED_8BIT || data.len() != 1 {
            return;
        }

        self.value = json!(data[0]);
    }
}

/// Hue/saturation pair; exposed once both components have been seen
#[derive(Default)]
pub struct ColorHS {
    value: Value,
    hue: Option<u8>,
    saturation: Option<u8>,
}

impl Property for ColorHS {
    fn name(&self) -> &str {
        "color"
    }

    fn cluster_id(&self) -> u16 {
        cluster::COLOR_CONTROL
    }

    fn value(&self) -> &Value {
        &self.value
    }

    fn parse_attribute(&mut self, attribute_id: u16, data_type: u8, data: &[u8]) {
        if data_type != data_type::UNSIGNED_8BIT || data.len() != 1 {
            return;
        }

        match attribute_id {
            0x0000 => self.hue = Some(data[0]),
            0x0001 => self.saturation = Some(data[0]),
            _ => return,
        }

        if let (Some(hue), Some(saturation)) = (self.hue, self.saturation) {
            self.value = json!([hue, saturation]);
        }
    }
}

/// CIE xy pair scaled to [0, 1]; exposed once both components have been seen
#[derive(Default)]
pub struct ColorXY {
    value: Value,
    x: Option<f64>,
    y: Option<f64>,
}

impl Property for ColorXY {
    fn name(&self) -> &str {
        "color"
    }

    fn cluster_id(&self) -> u16 {
        cluster::COLOR_CONTROL
    }

    fn value(&self) -> &Value {
        &self.value
    }

    fn parse_attribute(&mut self, attribute_id: u16, data_type: u8, data: &[u8]) {
        if data_type != data_type::UNSIGNED_16BIT || data.len() != 2 {
            return;
        }

        let scaled = f64::from(u16_le(data)) / f64::from(0xFFFFu16);

        match attribute_id {
            0x0003 => self.x = Some(scaled),
            0x0004 => self.y = Some(scaled),
            _ => return,
        }

        if let (Some(x), Some(y)) = (self.x, self.y) {
            self.value = json!([x, y]);
        }
    }
}

/// Color temperature in mireds
#[derive(Default)]
pub struct ColorTemperature {
    value: Value,
}

impl Property for ColorTemperature {
    fn name(&self) -> &str {
        "colorTemperature"
    }

    fn cluster_id(&self) -> u16 {
        cluster::COLOR_CONTROL
    }

    fn value(&self) -> &Value {
        &self.value
    }

    fn parse_attribute(&mut self, attribute_id: u16, data_type: u8, data: &[u8]) {
        if attribute_id != 0x0007 || data_type != data_type::UNSIGNED_16BIT || data.len() != 2 {
            return;
        }

        self.value = json!(u16_le(data));
    }
}

/// Illuminance in lux, from the logarithmic measured value
#[derive(Default)]
pub struct Illuminance {
    value: Value,
}

impl Property for Illuminance {
    fn name(&self) -> &str {
        "illuminance"
    }

    fn cluster_id(&self) -> u16 {
        cluster::ILLUMINANCE_MEASUREMENT
    }

    fn value(&self) -> &Value {
        &self.value
    }

    fn parse_attribute(&mut self, attribute_id: u16, data_type: u8, data: &[u8]) {
        if attribute_id != 0x0000 || data_type != data_type::UNSIGNED_16BIT || data.len() != 2 {
            return;
        }

        let raw = u16_le(data);
        let lux = if raw == 0 {
            0
        } else {
            10f64.powf((f64::from(raw) - 1.0) / 10000.0).round() as u32
        };

        self.value = json!(lux);
    }
}

/// Temperature in hundredths of a degree
#[derive(Default)]
pub struct Temperature {
    value: Value,
}

impl Property for Temperature {
    fn name(&self) -> &str {
        "temperature"
    }

    fn cluster_id(&self) -> u16 {
        cluster::TEMPERATURE_MEASUREMENT
    }

    fn value(&self) -> &Value {
        &self.value
    }

    fn parse_attribute(&mut self, attribute_id: u16, data_type: u8, data: &[u8]) {
        if attribute_id != 0x0000 || data_type != data_type::SIGNED_16BIT || data.len() != 2 {
            return;
        }

        self.value = json!(f64::from(i16_le(data)) / 100.0);
    }
}

/// Relative humidity in hundredths of a percent
#[derive(Default)]
pub struct Humidity {
    value: Value,
}

impl Property for Humidity {
    fn name(&self) -> &str {
        "humidity"
    }

    fn cluster_id(&self) -> u16 {
        cluster::HUMIDITY_MEASUREMENT
    }

    fn value(&self) -> &Value {
        &self.value
    }

    fn parse_attribute(&mut self, attribute_id: u16, data_type: u8, data: &[u8]) {
        if attribute_id != 0x0000 || data_type != data_type::UNSIGNED_16BIT || data.len() != 2 {
            return;
        }

        self.value = json!(f64::from(u16_le(data)) / 100.0);
    }
}

/// Occupancy bitmap, bit 0
#[derive(Default)]
pub struct Occupancy {
    value: Value,
}

impl Property for Occupancy {
    fn name(&self) -> &str {
        "occupancy"
    }

    fn cluster_id(&self) -> u16 {
        cluster::OCCUPANCY_SENSING
    }

    fn value(&self) -> &Value {
        &self.value
    }

    fn parse_attribute(&mut self, attribute_id: u16, data_type: u8, data: &[u8]) {
        if attribute_id != 0x0000 || data_type != data_type::BITMAP_8BIT || data.len() != 1 {
            return;
        }

        self.value = json!(data[0] & 0x01 != 0);
    }
}

/// Metering summation; held back until multiplier and divisor are known
#[derive(Default)]
pub struct Energy {
    value: Value,
    multiplier: u32,
    divider: u32,
}

impl Property for Energy {
    fn name(&self) -> &str {
        "energy"
    }

    fn cluster_id(&self) -> u16 {
        cluster::METERING
    }

    fn value(&self) -> &Value {
        &self.value
    }

    fn parse_attribute(&mut self, attribute_id: u16, data_type: u8, data: &[u8]) {
        match attribute_id {
            0x0000 => {
                if data_type != data_type::UNSIGNED_48BIT
                    || data.len() != 6
                    || self.multiplier == 0
                    || self.divider == 0
                {
                    return;
                }

                let mut value = u48_le(data) as f64;

                if self.multiplier > 1 {
                    value *= f64::from(self.multiplier);
                }

                if self.divider > 1 {
                    value /= f64::from(self.divider);
                }

                self.value = json!(value);
            }

            0x0301 => {
                if data_type != data_type::UNSIGNED_24BIT || data.len() != 3 {
                    return;
                }

                self.multiplier = u24_le(data);
            }

            0x0302 => {
                if data_type != data_type::UNSIGNED_24BIT || data.len() != 3 {
                    return;
                }

                self.divider = u24_le(data);
            }

            _ => {}
        }
    }
}

/// Active power; held back until multiplier and divisor are known
#[derive(Default)]
pub struct Power {
    value: Value,
    multiplier: u16,
    divider: u16,
}

impl Property for Power {
    fn name(&self) -> &str {
        "power"
    }

    fn cluster_id(&self) -> u16 {
        cluster::ELECTRICAL_MEASUREMENT
    }

    fn value(&self) -> &Value {
        &self.value
    }

    fn parse_attribute(&mut self, attribute_id: u16, data_type: u8, data: &[u8]) {
        match attribute_id {
            0x050B => {
                if data_type != data_type::SIGNED_16BIT
                    || data.len() != 2
                    || self.multiplier == 0
                    || self.divider == 0
                {
                    return;
                }

                let mut value = f64::from(i16_le(data));

                if self.multiplier > 1 {
                    value *= f64::from(self.multiplier);
                }

                if self.divider > 1 {
                    value /= f64::from(self.divider);
                }

                self.value = json!(value);
            }

            0x0604 => {
                if data_type != data_type::UNSIGNED_16BIT || data.len() != 2 {
                    return;
                }

                self.multiplier = u16_le(data);
            }

            0x0605 => {
                if data_type != data_type::UNSIGNED_16BIT || data.len() != 2 {
                    return;
                }

                self.divider = u16_le(data);
            }

            _ => {}
        }
    }
}

/// Scene recall; resolves the scene id through the device's `scenes` option
pub struct Scene {
    value: Value,
    scenes: serde_json::Map<String, Value>,
}

impl Scene {
    #[must_use]
    pub fn new(context: &PropertyContext) -> Self {
        Self {
            value: Value::Null,
            scenes: context
                .options
                .get("scenes")
                .and_then(Value::as_object)
                .cloned()
                .unwrap_or_default(),
        }
    }
}

impl Property for Scene {
    fn name(&self) -> &str {
        "scene"
    }

    fn cluster_id(&self) -> u16 {
        cluster::SCENES
    }

    fn value(&self) -> &Value {
        &self.value
    }

    fn parse_command(&mut self, command_id: u8, payload: &[u8]) {
        if command_id != 0x05 || payload.len() < 3 {
            return;
        }

        let scene_id = payload[2];

        self.value = self
            .scenes
            .get(&scene_id.to_string())
            .cloned()
            .unwrap_or_else(|| json!(scene_id));
    }
}

/// Identify button press
#[derive(Default)]
pub struct IdentifyAction {
    value: Value,
}

impl Property for IdentifyAction {
    fn name(&self) -> &str {
        "action"
    }

    fn cluster_id(&self) -> u16 {
        cluster::IDENTIFY
    }

    fn value(&self) -> &Value {
        &self.value
    }

    fn parse_command(&mut self, command_id: u8, _payload: &[u8]) {
        if command_id != 0x01 {
            return;
        }

        self.value = json!("identify");
    }
}

/// OnOff commands sent by wall switches and remotes
#[derive(Default)]
pub struct SwitchAction {
    value: Value,
}

impl Property for SwitchAction {
    fn name(&self) -> &str {
        "action"
    }

    fn cluster_id(&self) -> u16 {
        cluster::ON_OFF
    }

    fn value(&self) -> &Value {
        &self.value
    }

    fn parse_command(&mut self, command_id: u8, _payload: &[u8]) {
        self.value = match command_id {
            0x00 => json!("off"),
            0x01 => json!("on"),
            0x02 => json!("toggle"),
            _ => return,
        };
    }
}

/// LevelControl commands sent by dimmer remotes
#[derive(Default)]
pub struct LevelAction {
    value: Value,
}

impl Property for LevelAction {
    fn name(&self) -> &str {
        "action"
    }

    fn cluster_id(&self) -> u16 {
        cluster::LEVEL_CONTROL
    }

    fn value(&self) -> &Value {
        &self.value
    }

    fn parse_command(&mut self, command_id: u8, _payload: &[u8]) {
        self.value = match command_id {
            0x01 => json!("moveDown"),
            0x05 => json!("moveUp"),
            0x07 => json!("moveStop"),
            _ => return,
        };
    }
}

/// IAS Zone status-change notification; the primary bit is published under
/// the zone-specific name, tamper and battery flags ride along
pub struct IasZoneStatus {
    name: &'static str,
    value: Value,
}

impl IasZoneStatus {
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            value: Value::Null,
        }
    }
}

impl Property for IasZoneStatus {
    fn name(&self) -> &str {
        self.name
    }

    fn cluster_id(&self) -> u16 {
        cluster::IAS_ZONE
    }

    fn value(&self) -> &Value {
        &self.value
    }

    fn parse_command(&mut self, command_id: u8, payload: &[u8]) {
        if command_id != 0x00 || payload.len() < 2 {
            return;
        }

        let status = u16_le(payload);
        let mut map = self
            .value
            .as_object()
            .cloned()
            .unwrap_or_default();

        map.insert(self.name.to_string(), json!(status & 0x0001 != 0));

        if status & 0x0004 != 0 {
            map.insert("tamper".to_string(), json!(true));
        }

        if status & 0x0008 != 0 {
            map.insert("batteryLow".to_string(), json!(true));
        }

        self.value = Value::Object(map);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_battery_voltage_to_percent() {
        let mut property = BatteryVoltage::default();

        // 30 -> 3000 mV -> 42%
        property.parse_attribute(0x0020, data_type::UNSIGNED_8BIT, &[0x1E]);
        assert_eq!(*property.value(), json!(42));
    }

    #[test]
    fn test_battery_voltage_rejects_mismatch() {
        let mut property = BatteryVoltage::default();

        property.parse_attribute(0x0021, data_type::UNSIGNED_8BIT, &[0x1E]);
        property.parse_attribute(0x0020, data_type::UNSIGNED_16BIT, &[0x1E]);
        property.parse_attribute(0x0020, data_type::UNSIGNED_8BIT, &[0x1E, 0x00]);

        assert_eq!(*property.value(), Value::Null);
    }

    #[test]
    fn test_battery_percentage_halved_by_default() {
        let mut divided = BatteryPercentage::new(&PropertyContext::default());
        divided.parse_attribute(0x0021, data_type::UNSIGNED_8BIT, &[200]);
        assert_eq!(*divided.value(), json!(100.0));

        let mut options = serde_json::Map::new();
        options.insert("batteryUndivided".into(), json!(true));
        let context = PropertyContext {
            options,
            ..PropertyContext::default()
        };

        let mut undivided = BatteryPercentage::new(&context);
        undivided.parse_attribute(0x0021, data_type::UNSIGNED_8BIT, &[100]);
        assert_eq!(*undivided.value(), json!(100.0));
    }

    #[test]
    fn test_illuminance_log_scale() {
        let mut property = Illuminance::default();

        // 14998 -> round(10 ^ 1.4997) = 31623 lux... the raw value is
        // little-endian 0x3A98
        property.parse_attribute(0x0000, data_type::UNSIGNED_16BIT, &[0x98, 0x3A]);
        let lux = property.value().as_u64().unwrap();
        assert!((31622..=31624).contains(&lux), "got {lux}");

        property.parse_attribute(0x0000, data_type::UNSIGNED_16BIT, &[0x00, 0x00]);
        assert_eq!(*property.value(), json!(0));
    }

    #[test]
    fn test_color_xy_waits_for_both_components() {
        let mut property = ColorXY::default();

        property.parse_attribute(0x0003, data_type::UNSIGNED_16BIT, &[0xFF, 0xFF]);
        assert_eq!(*property.value(), Value::Null);

        property.parse_attribute(0x0004, data_type::UNSIGNED_16BIT, &[0x00, 0x00]);
        assert_eq!(*property.value(), json!([1.0, 0.0]));
    }

    #[test]
    fn test_energy_gated_on_divisor_and_multiplier() {
        let mut property = Energy::default();

        property.parse_attribute(
            0x0000,
            data_type::UNSIGNED_48BIT,
            &[0x10, 0x27, 0x00, 0x00, 0x00, 0x00],
        );
        assert_eq!(*property.value(), Value::Null);

        property.parse_attribute(0x0301, data_type::UNSIGNED_24BIT, &[0x01, 0x00, 0x00]);
        property.parse_attribute(0x0302, data_type::UNSIGNED_24BIT, &[0xE8, 0x03, 0x00]);
        property.parse_attribute(
            0x0000,
            data_type::UNSIGNED_48BIT,
            &[0x10, 0x27, 0x00, 0x00, 0x00, 0x00],
        );

        assert_eq!(*property.value(), json!(10.0));
    }

    #[test]
    fn test_ias_zone_status_bits() {
        let mut property = IasZoneStatus::new("contact");

        property.parse_command(0x00, &[0x0D, 0x00]);

        assert_eq!(
            *property.value(),
            json!({"contact": true, "tamper": true, "batteryLow": true})
        );
    }

    #[test]
    fn test_switch_action_commands() {
        let mut property = SwitchAction::default();

        property.parse_command(0x02, &[]);
        assert_eq!(*property.value(), json!("toggle"));

        property.parse_command(0x55, &[]);
        assert_eq!(*property.value(), json!("toggle"));
    }

    #[test]
    fn test_scene_resolves_names_from_options() {
        let mut options = serde_json::Map::new();
        options.insert("scenes".into(), json!({"16": "evening"}));
        let context = PropertyContext {
            options,
            ..PropertyContext::default()
        };

        let mut property = Scene::new(&context);

        property.parse_command(0x05, &[0x00, 0x00, 0x10]);
        assert_eq!(*property.value(), json!("evening"));

        property.parse_command(0x05, &[0x00, 0x00, 0x11]);
        assert_eq!(*property.value(), json!(0x11));
    }
}

//! Parameter registry
//!
//! Static table mapping each (device, code, subcode) triple to its group,
//! payload length, access mode and codec. Lookup by triple is O(1).

use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;

use serde::Serialize;
use velocan_core::{DeviceTarget, Packet};

use crate::error::{DecodeResult, EncodeResult};
use crate::types::{ParameterGroup, ParameterValue};
use crate::{decode, encode};

/// Command codes used on the bus
pub mod codes {
    pub const SENSOR_REALTIME: u8 = 0x31;
    pub const CONTROLLER_REALTIME: u8 = 0x32;
    pub const IDENTITY: u8 = 0x60;
    pub const COMMAND: u8 = 0x62;
    pub const DISPLAY_REALTIME: u8 = 0x63;
    pub const BATTERY: u8 = 0x64;
}

pub type DecodeFn = fn(&Packet) -> DecodeResult<ParameterValue>;
pub type EncodeFn = fn(&ParameterValue) -> EncodeResult<Vec<u8>>;

/// Unique key of a parameter on the bus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ParameterId {
    pub target: DeviceTarget,
    pub code: u8,
    pub subcode: u8,
}

impl ParameterId {
    pub const fn new(target: DeviceTarget, code: u8, subcode: u8) -> Self {
        Self {
            target,
            code,
            subcode,
        }
    }
}

impl fmt::Display for ParameterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{:02X}/{:02X}", self.target, self.code, self.subcode)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl Access {
    pub fn is_readable(&self) -> bool {
        matches!(self, Access::ReadOnly | Access::ReadWrite)
    }

    pub fn is_writable(&self) -> bool {
        matches!(self, Access::WriteOnly | Access::ReadWrite)
    }
}

/// Payload length constraint checked before decoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadLength {
    Exact(usize),
    AtLeast(usize),
    AtMost(usize),
}

impl PayloadLength {
    pub fn accepts(&self, len: usize) -> bool {
        match *self {
            PayloadLength::Exact(n) => len == n,
            PayloadLength::AtLeast(n) => len >= n,
            PayloadLength::AtMost(n) => len <= n,
        }
    }
}

impl fmt::Display for PayloadLength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayloadLength::Exact(n) => write!(f, "exactly {}", n),
            PayloadLength::AtLeast(n) => write!(f, "at least {}", n),
            PayloadLength::AtMost(n) => write!(f, "at most {}", n),
        }
    }
}

/// One row of the registry.
///
/// `decode` is present iff the parameter is readable, `encode` iff writable.
#[derive(Debug, Clone, Copy)]
pub struct ParameterDescriptor {
    pub id: ParameterId,
    pub group: ParameterGroup,
    pub length: PayloadLength,
    pub access: Access,
    pub decode: Option<DecodeFn>,
    pub encode: Option<EncodeFn>,
}

impl ParameterDescriptor {
    pub fn read_only(id: ParameterId, group: ParameterGroup, length: PayloadLength, decode: DecodeFn) -> Self {
        Self {
            id,
            group,
            length,
            access: Access::ReadOnly,
            decode: Some(decode),
            encode: None,
        }
    }

    pub fn read_write(
        id: ParameterId,
        group: ParameterGroup,
        length: PayloadLength,
        decode: DecodeFn,
        encode: EncodeFn,
    ) -> Self {
        Self {
            id,
            group,
            length,
            access: Access::ReadWrite,
            decode: Some(decode),
            encode: Some(encode),
        }
    }

    pub fn write_only(id: ParameterId, group: ParameterGroup, length: PayloadLength, encode: EncodeFn) -> Self {
        Self {
            id,
            group,
            length,
            access: Access::WriteOnly,
            decode: None,
            encode: Some(encode),
        }
    }

    pub fn decode(&self, packet: &Packet) -> DecodeResult<ParameterValue> {
        decode::decode(self, packet)
    }

    pub fn encode(&self, value: &ParameterValue) -> EncodeResult<Packet> {
        encode::encode(self, value)
    }
}

/// Lookup table of all known parameters
#[derive(Debug, Default)]
pub struct Registry {
    descriptors: Vec<ParameterDescriptor>,
    index: HashMap<ParameterId, usize>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a descriptor, replacing any existing row for the same triple
    pub fn register(&mut self, descriptor: ParameterDescriptor) {
        match self.index.get(&descriptor.id) {
            Some(&slot) => self.descriptors[slot] = descriptor,
            None => {
                self.index.insert(descriptor.id, self.descriptors.len());
                self.descriptors.push(descriptor);
            }
        }
    }

    /// The built-in table for all supported devices
    pub fn standard() -> &'static Registry {
        static STANDARD: OnceLock<Registry> = OnceLock::new();
        STANDARD.get_or_init(|| {
            let mut registry = Registry::new();
            for descriptor in standard_descriptors() {
                registry.register(descriptor);
            }
            registry
        })
    }

    pub fn get(&self, id: &ParameterId) -> Option<&ParameterDescriptor> {
        self.index.get(id).map(|&slot| &self.descriptors[slot])
    }

    pub fn lookup(&self, target: DeviceTarget, code: u8, subcode: u8) -> Option<&ParameterDescriptor> {
        self.get(&ParameterId::new(target, code, subcode))
    }

    /// Rows for one device, in registration order
    pub fn for_target(&self, target: DeviceTarget) -> impl Iterator<Item = &ParameterDescriptor> {
        self.descriptors.iter().filter(move |d| d.id.target == target)
    }

    /// Rows for one device and group; cell voltages span several triples
    pub fn for_group(
        &self,
        target: DeviceTarget,
        group: ParameterGroup,
    ) -> impl Iterator<Item = &ParameterDescriptor> {
        self.for_target(target).filter(move |d| d.group == group)
    }

    pub fn readable(&self, target: DeviceTarget) -> impl Iterator<Item = &ParameterDescriptor> {
        self.for_target(target).filter(|d| d.access.is_readable())
    }

    pub fn writable(&self, target: DeviceTarget) -> impl Iterator<Item = &ParameterDescriptor> {
        self.for_target(target).filter(|d| d.access.is_writable())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParameterDescriptor> {
        self.descriptors.iter()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}

// =============================================================================
// Built-in table
// =============================================================================

fn standard_descriptors() -> Vec<ParameterDescriptor> {
    use codes::*;
    use DeviceTarget::*;
    use ParameterDescriptor as D;
    use ParameterGroup as G;
    use PayloadLength::*;

    let id = ParameterId::new;
    let text_len = AtMost(velocan_core::MAX_PACKET_DATA);

    let mut rows = Vec::new();

    // Identity strings shared by controller, display and battery
    for target in [Controller, Display, Battery] {
        rows.push(D::read_only(id(target, IDENTITY, 0x00), G::HardwareVersion, text_len, decode::text));
        rows.push(D::read_only(id(target, IDENTITY, 0x01), G::SoftwareVersion, text_len, decode::text));
        rows.push(D::read_only(id(target, IDENTITY, 0x02), G::ModelNumber, text_len, decode::text));
        rows.push(D::read_only(id(target, IDENTITY, 0x03), G::SerialNumber, text_len, decode::text));
        if target == Battery {
            rows.push(D::read_only(id(target, IDENTITY, 0x04), G::CustomerNumber, text_len, decode::text));
            rows.push(D::read_only(id(target, IDENTITY, 0x05), G::Manufacturer, text_len, decode::text));
        } else {
            rows.push(D::read_write(
                id(target, IDENTITY, 0x04),
                G::CustomerNumber,
                text_len,
                decode::text,
                encode::text,
            ));
            rows.push(D::read_write(
                id(target, IDENTITY, 0x05),
                G::Manufacturer,
                text_len,
                decode::text,
                encode::text,
            ));
        }
    }

    // Controller
    rows.extend([
        D::read_only(id(Controller, CONTROLLER_REALTIME, 0x00), G::ControllerRealtime0, Exact(8), decode::controller_realtime0),
        D::read_only(id(Controller, CONTROLLER_REALTIME, 0x01), G::ControllerRealtime1, Exact(8), decode::controller_realtime1),
        D::read_write(
            id(Controller, CONTROLLER_REALTIME, 0x03),
            G::ControllerSpeed,
            AtLeast(6),
            decode::controller_speed,
            encode::controller_speed,
        ),
        D::read_write(
            id(Controller, IDENTITY, 0x11),
            G::ControllerParameter1,
            AtLeast(decode::PARAMETER1_LEN),
            decode::controller_parameter1,
            encode::controller_parameter1,
        ),
        D::read_write(
            id(Controller, IDENTITY, 0x12),
            G::ControllerParameter2,
            AtLeast(decode::PARAMETER2_LEN),
            decode::controller_parameter2,
            encode::controller_parameter2,
        ),
        D::write_only(id(Controller, COMMAND, 0x00), G::PositionSensorCalibration, Exact(0), encode::trigger),
    ]);

    // Display
    rows.extend([
        D::read_only(id(Display, IDENTITY, 0x07), G::ErrorCodes, text_len, decode::error_codes),
        D::read_only(id(Display, IDENTITY, 0x08), G::BootloaderVersion, text_len, decode::text),
        D::read_only(id(Display, DISPLAY_REALTIME, 0x00), G::DisplayRealtime, AtLeast(3), decode::display_realtime),
        D::read_write(
            id(Display, DISPLAY_REALTIME, 0x01),
            G::DisplayMileage,
            Exact(8),
            decode::display_mileage,
            encode::display_mileage,
        ),
        D::read_only(id(Display, DISPLAY_REALTIME, 0x02), G::DisplayServiceData, AtLeast(5), decode::display_service_data),
        D::write_only(id(Display, COMMAND, 0x00), G::DisplayTime, Exact(3), encode::display_time),
        D::write_only(id(Display, COMMAND, 0x01), G::CleanServiceMileage, Exact(0), encode::trigger),
    ]);

    // Battery
    rows.push(D::read_only(id(Battery, BATTERY, 0x00), G::BatteryCapacity, AtLeast(7), decode::battery_capacity));
    rows.push(D::read_only(id(Battery, BATTERY, 0x01), G::BatteryState, AtLeast(5), decode::battery_state));
    for subcode in 0x02..=0x05 {
        rows.push(D::read_only(id(Battery, BATTERY, subcode), G::CellVoltages, AtMost(8), decode::cell_voltages));
    }

    // Sensor
    rows.push(D::read_only(id(Sensor, SENSOR_REALTIME, 0x00), G::SensorRealtime, AtLeast(3), decode::sensor_realtime));

    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tables::wheel_by_label;
    use crate::types::{
        AssistProfile, ClockTime, ControllerParameter1, ControllerParameter2, ControllerSpeedParameters,
        DisplayMileage, TorqueProfile,
    };
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use velocan_core::{CanOperation, Node};

    #[test]
    fn test_standard_lookup() {
        let registry = Registry::standard();
        let speed = registry.lookup(DeviceTarget::Controller, 0x32, 0x03).unwrap();
        assert_eq!(speed.group, ParameterGroup::ControllerSpeed);
        assert_eq!(speed.access, Access::ReadWrite);

        assert!(registry.lookup(DeviceTarget::Controller, 0x99, 0x00).is_none());
        assert!(registry.lookup(DeviceTarget::Sensor, 0x60, 0x00).is_none());
    }

    #[test]
    fn test_codec_presence_matches_access() {
        for d in Registry::standard().iter() {
            assert_eq!(d.decode.is_some(), d.access.is_readable(), "{}", d.id);
            assert_eq!(d.encode.is_some(), d.access.is_writable(), "{}", d.id);
        }
    }

    #[test]
    fn test_triples_are_unique() {
        let registry = Registry::standard();
        let mut seen = std::collections::HashSet::new();
        for d in registry.iter() {
            assert!(seen.insert(d.id), "duplicate {}", d.id);
        }
        assert_eq!(seen.len(), registry.len());
    }

    #[test]
    fn test_battery_identity_read_only() {
        let registry = Registry::standard();
        let manufacturer = registry.lookup(DeviceTarget::Battery, 0x60, 0x05).unwrap();
        assert_eq!(manufacturer.access, Access::ReadOnly);
        let manufacturer = registry.lookup(DeviceTarget::Display, 0x60, 0x05).unwrap();
        assert_eq!(manufacturer.access, Access::ReadWrite);
    }

    #[test]
    fn test_cell_voltage_rows() {
        let rows: Vec<_> = Registry::standard()
            .for_group(DeviceTarget::Battery, ParameterGroup::CellVoltages)
            .map(|d| d.id.subcode)
            .collect();
        assert_eq!(rows, vec![2, 3, 4, 5]);
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = Registry::new();
        let id = ParameterId::new(DeviceTarget::Sensor, 0x31, 0x00);
        registry.register(ParameterDescriptor::read_only(
            id,
            ParameterGroup::SensorRealtime,
            PayloadLength::AtLeast(3),
            decode::sensor_realtime,
        ));
        registry.register(ParameterDescriptor::read_only(
            id,
            ParameterGroup::SensorRealtime,
            PayloadLength::Exact(3),
            decode::sensor_realtime,
        ));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get(&id).unwrap().length, PayloadLength::Exact(3));
    }

    #[test]
    fn test_decode_checks_length() {
        let d = Registry::standard().lookup(DeviceTarget::Display, 0x63, 0x01).unwrap();
        let packet = Packet {
            source: Node::Device(DeviceTarget::Display),
            target: Node::Tool,
            operation: CanOperation::WriteCmd,
            code: 0x63,
            subcode: 0x01,
            data: vec![0; 7],
        };
        assert!(d.decode(&packet).is_err());
    }

    #[test]
    fn test_encode_through_descriptor() {
        let registry = Registry::standard();
        let clock = registry.lookup(DeviceTarget::Display, 0x62, 0x00).unwrap();
        let packet = clock
            .encode(&ParameterValue::DisplayTime(ClockTime {
                hour: 8,
                minute: 30,
                second: 0,
            }))
            .unwrap();
        assert_eq!(packet.target, Node::Device(DeviceTarget::Display));
        assert_eq!(packet.operation, CanOperation::WriteCmd);
        assert_eq!((packet.code, packet.subcode), (0x62, 0x00));
        assert_eq!(packet.data, vec![8, 30, 0]);

        // wrong value kind for the group
        let err = clock.encode(&ParameterValue::DisplayMileage(DisplayMileage::default()));
        assert!(matches!(err, Err(crate::EncodeError::TypeMismatch { .. })));

        // read-only parameter
        let realtime = registry.lookup(DeviceTarget::Display, 0x63, 0x00).unwrap();
        assert!(matches!(
            realtime.encode(&ParameterValue::Trigger),
            Err(crate::EncodeError::NotWritable(_))
        ));
    }

    #[test]
    fn test_write_only_not_decodable() {
        let d = Registry::standard().lookup(DeviceTarget::Display, 0x62, 0x01).unwrap();
        let packet = Packet::write(DeviceTarget::Display, 0x62, 0x01, vec![]);
        assert!(matches!(d.decode(&packet), Err(crate::DecodeError::NotReadable(_))));
    }

    fn round_trip(target: DeviceTarget, code: u8, subcode: u8, value: ParameterValue) {
        let d = Registry::standard().lookup(target, code, subcode).unwrap();
        let packet = d.encode(&value).unwrap();
        assert_eq!(d.decode(&packet).unwrap(), value);
    }

    fn parameter1() -> ParameterValue {
        let mut block = ControllerParameter1::default();
        block.system_voltage = 48;
        block.current_limit = 20;
        block.battery_capacity = 14_000;
        block.coaster_brake = true;
        block.deceleration_ratio = 36.5;
        block.throttle_start_voltage = 1.1;
        block.throttle_max_voltage = 3.5;
        block.current_loading_time = 0.8;
        block.assist_levels[1] = AssistProfile {
            current_limit: 50,
            speed_limit: 100,
        };
        block.lamps_always_on = true;
        ParameterValue::ControllerParameter1(Box::new(block))
    }

    fn parameter2() -> ParameterValue {
        let mut block = ControllerParameter2::default();
        block.torque_profiles[2] = TorqueProfile {
            start_torque_value: 10,
            max_torque_value: 80,
            return_torque_value: 5,
            max_current: 90,
            min_current: 10,
            start_pulse: 3,
            current_decay_time: 25,
            stop_delay: 10,
        };
        ParameterValue::ControllerParameter2(Box::new(block))
    }

    #[rstest]
    #[case::mileage(DeviceTarget::Display, 0x63, 0x01, ParameterValue::DisplayMileage(DisplayMileage {
        total_mileage: 1234,
        single_mileage: 12.3,
        max_speed: 25.0,
    }))]
    #[case::speed(DeviceTarget::Controller, 0x32, 0x03, ParameterValue::ControllerSpeed(ControllerSpeedParameters {
        speed_limit: 25.5,
        wheel_diameter: wheel_by_label("26"),
        wheel_code: [0xA0, 0x01],
        circumference: 2100,
    }))]
    #[case::text(DeviceTarget::Controller, 0x60, 0x05, ParameterValue::Text("ACME".into()))]
    #[case::parameter1(DeviceTarget::Controller, 0x60, 0x11, parameter1())]
    #[case::parameter2(DeviceTarget::Controller, 0x60, 0x12, parameter2())]
    fn test_read_write_round_trip(
        #[case] target: DeviceTarget,
        #[case] code: u8,
        #[case] subcode: u8,
        #[case] value: ParameterValue,
    ) {
        round_trip(target, code, subcode, value);
    }

    #[test]
    fn test_every_read_write_row_covered() {
        let mut rows: Vec<(ParameterGroup, DeviceTarget)> = Registry::standard()
            .iter()
            .filter(|d| d.access == Access::ReadWrite && !d.group.is_text())
            .map(|d| (d.group, d.id.target))
            .collect();
        rows.sort_by_key(|(group, _)| *group);
        assert_eq!(
            rows,
            vec![
                (ParameterGroup::ControllerSpeed, DeviceTarget::Controller),
                (ParameterGroup::ControllerParameter1, DeviceTarget::Controller),
                (ParameterGroup::ControllerParameter2, DeviceTarget::Controller),
                (ParameterGroup::DisplayMileage, DeviceTarget::Display),
            ]
        );
    }

    #[test]
    fn test_error_codes_keep_pairs_before_odd_digit() {
        let d = Registry::standard().lookup(DeviceTarget::Display, 0x60, 0x07).unwrap();
        let packet = Packet {
            source: Node::Device(DeviceTarget::Display),
            target: Node::Tool,
            operation: CanOperation::WriteCmd,
            code: 0x60,
            subcode: 0x07,
            data: b"07123".to_vec(),
        };
        assert_eq!(d.decode(&packet).unwrap(), ParameterValue::ErrorCodes(vec![7, 12]));
    }
}

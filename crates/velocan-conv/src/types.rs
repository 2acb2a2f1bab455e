//! Decoded parameter values
//!
//! Each parameter group decodes into its own typed record. Raw wire scaling
//! is already applied: speeds in km/h, voltages in V, distances in km.

use std::fmt;

use serde::Serialize;

use crate::tables::WheelDiameter;

/// Logical parameter group; identifies what a payload means independent of
/// which device carries it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParameterGroup {
    HardwareVersion,
    SoftwareVersion,
    ModelNumber,
    SerialNumber,
    CustomerNumber,
    Manufacturer,
    BootloaderVersion,
    ErrorCodes,
    ControllerRealtime0,
    ControllerRealtime1,
    ControllerSpeed,
    ControllerParameter1,
    ControllerParameter2,
    PositionSensorCalibration,
    DisplayRealtime,
    DisplayMileage,
    DisplayServiceData,
    DisplayTime,
    CleanServiceMileage,
    BatteryCapacity,
    BatteryState,
    CellVoltages,
    SensorRealtime,
}

impl ParameterGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParameterGroup::HardwareVersion => "hardware_version",
            ParameterGroup::SoftwareVersion => "software_version",
            ParameterGroup::ModelNumber => "model_number",
            ParameterGroup::SerialNumber => "serial_number",
            ParameterGroup::CustomerNumber => "customer_number",
            ParameterGroup::Manufacturer => "manufacturer",
            ParameterGroup::BootloaderVersion => "bootloader_version",
            ParameterGroup::ErrorCodes => "error_codes",
            ParameterGroup::ControllerRealtime0 => "controller_realtime_0",
            ParameterGroup::ControllerRealtime1 => "controller_realtime_1",
            ParameterGroup::ControllerSpeed => "controller_speed",
            ParameterGroup::ControllerParameter1 => "controller_parameter_1",
            ParameterGroup::ControllerParameter2 => "controller_parameter_2",
            ParameterGroup::PositionSensorCalibration => "position_sensor_calibration",
            ParameterGroup::DisplayRealtime => "display_realtime",
            ParameterGroup::DisplayMileage => "display_mileage",
            ParameterGroup::DisplayServiceData => "display_service_data",
            ParameterGroup::DisplayTime => "display_time",
            ParameterGroup::CleanServiceMileage => "clean_service_mileage",
            ParameterGroup::BatteryCapacity => "battery_capacity",
            ParameterGroup::BatteryState => "battery_state",
            ParameterGroup::CellVoltages => "cell_voltages",
            ParameterGroup::SensorRealtime => "sensor_realtime",
        }
    }

    /// Groups carried as free text
    pub fn is_text(&self) -> bool {
        matches!(
            self,
            ParameterGroup::HardwareVersion
                | ParameterGroup::SoftwareVersion
                | ParameterGroup::ModelNumber
                | ParameterGroup::SerialNumber
                | ParameterGroup::CustomerNumber
                | ParameterGroup::Manufacturer
                | ParameterGroup::BootloaderVersion
        )
    }
}

impl fmt::Display for ParameterGroup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A measurement the device may report as unavailable via a sentinel
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Reading<T> {
    Available(T),
    NotAvailable,
}

impl<T> Reading<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Reading::Available(v) => Some(v),
            Reading::NotAvailable => None,
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Reading::Available(_))
    }
}

impl<T> Default for Reading<T> {
    fn default() -> Self {
        Reading::NotAvailable
    }
}

/// Current pedal-assist setting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssistLevel {
    /// Numbered level; 0 means assist off
    Level(u8),
    /// Walk-assist mode
    Walk,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RideMode {
    #[default]
    Eco,
    Boost,
}

// =============================================================================
// Display
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DisplayRealtime {
    /// Number of assist levels the display is configured for
    pub assist_levels: u8,
    pub ride_mode: RideMode,
    pub boost: bool,
    /// `None` when the raw code is not in the table for `assist_levels`
    pub current_assist_level: Option<AssistLevel>,
    pub light: bool,
    pub button: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DisplayMileage {
    /// km
    pub total_mileage: u32,
    /// km
    pub single_mileage: f64,
    /// km/h
    pub max_speed: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DisplayServiceData {
    /// km/h
    pub average_speed: f64,
    /// km since last service reset
    pub service_mileage: f64,
}

/// Time of day pushed to the display clock
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClockTime {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
}

// =============================================================================
// Controller
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControllerRealtime0 {
    /// Percent
    pub remaining_capacity: u8,
    /// km
    pub single_trip: f64,
    /// rpm
    pub cadence: u8,
    /// mV reported by the torque sensor
    pub torque: u16,
    /// km
    pub remaining_distance: Reading<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ControllerRealtime1 {
    /// km/h
    pub speed: f64,
    /// A
    pub current: f64,
    /// V
    pub voltage: f64,
    /// °C
    pub temperature: i16,
    /// °C
    pub motor_temperature: Reading<i16>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ControllerSpeedParameters {
    /// km/h
    pub speed_limit: f64,
    /// Matched table entry; `None` for codes outside the table
    pub wheel_diameter: Option<&'static WheelDiameter>,
    /// Raw diameter code as sent by the controller
    pub wheel_code: [u8; 2],
    /// mm
    pub circumference: u16,
}

/// Per-level current and speed cap
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AssistProfile {
    /// Percent of the controller current limit
    pub current_limit: u8,
    /// Percent of the speed limit
    pub speed_limit: u8,
}

/// Controller parameter block 1 (system, battery and motor setup).
///
/// Encoding starts from the bytes this block was decoded from, so bytes
/// without a named field are written back untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ControllerParameter1 {
    pub system_voltage: u8,
    pub current_limit: u8,
    pub overvoltage: u8,
    pub undervoltage: u8,
    pub undervoltage_under_load: u8,
    pub battery_recovery_voltage: u8,
    /// Ah × 100
    pub battery_capacity: u16,
    pub max_current_on_low_charge: u8,
    pub full_capacity_range: u8,
    pub pedal_sensor_type: u8,
    pub coaster_brake: bool,
    pub pedal_sensor_signals_per_rotation: u8,
    pub speed_sensor_channel_number: u8,
    pub motor_type: u8,
    pub motor_pole_pair_number: u8,
    pub speedmeter_magnets_number: u8,
    pub temperature_sensor_type: u8,
    pub deceleration_ratio: f64,
    pub motor_max_rotor_rpm: u16,
    pub motor_d_axis_inductance: u16,
    pub motor_q_axis_inductance: u16,
    pub motor_phase_resistance: u16,
    pub motor_reverse_potential_coefficient: u16,
    /// V
    pub throttle_start_voltage: f64,
    /// V
    pub throttle_max_voltage: f64,
    pub start_current: u8,
    /// s
    pub current_loading_time: f64,
    /// s
    pub current_shedding_time: f64,
    pub assist_levels: [AssistProfile; 9],
    pub displayless_mode: bool,
    pub lamps_always_on: bool,
    #[serde(skip)]
    pub(crate) raw: RawBlock,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TorqueProfile {
    pub start_torque_value: u8,
    pub max_torque_value: u8,
    pub return_torque_value: u8,
    pub max_current: u8,
    pub min_current: u8,
    pub start_pulse: u8,
    /// ms, multiple of 5
    pub current_decay_time: u16,
    /// ms, multiple of 2
    pub stop_delay: u16,
}

/// Bytes of a parameter block as last read from the device.
///
/// Encoding starts from these so bytes without a named field are written
/// back unchanged. Never part of equality: two blocks are equal when their
/// named fields are.
#[derive(Debug, Clone, Default)]
pub(crate) struct RawBlock(pub(crate) Vec<u8>);

impl PartialEq for RawBlock {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

/// Controller parameter block 2 (torque profiles per assist level)
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ControllerParameter2 {
    pub torque_profiles: [TorqueProfile; 6],
    #[serde(skip)]
    pub(crate) raw: RawBlock,
}

// =============================================================================
// Battery and sensor
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatteryCapacity {
    /// mAh
    pub full_capacity: u16,
    /// mAh
    pub capacity_left: u16,
    /// Relative state of charge, percent
    pub rsoc: u8,
    /// Absolute state of charge, percent
    pub asoc: u8,
    /// State of health, percent
    pub soh: u8,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatteryState {
    /// mA, magnitude only
    pub current: u16,
    /// mV
    pub voltage: u32,
    /// °C
    pub temperature: i16,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SensorRealtime {
    /// mV
    pub torque: u16,
    /// rpm
    pub cadence: u8,
}

// =============================================================================
// ParameterValue
// =============================================================================

/// A decoded (or to-be-encoded) parameter value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ParameterValue {
    Text(String),
    /// Active error codes, in order reported
    ErrorCodes(Vec<u8>),
    ControllerRealtime0(ControllerRealtime0),
    ControllerRealtime1(ControllerRealtime1),
    ControllerSpeed(ControllerSpeedParameters),
    ControllerParameter1(Box<ControllerParameter1>),
    ControllerParameter2(Box<ControllerParameter2>),
    DisplayRealtime(DisplayRealtime),
    DisplayMileage(DisplayMileage),
    DisplayServiceData(DisplayServiceData),
    DisplayTime(ClockTime),
    BatteryCapacity(BatteryCapacity),
    BatteryState(BatteryState),
    /// Volts per cell; `None` for cells not yet reported
    CellVoltages(Vec<Option<f64>>),
    SensorRealtime(SensorRealtime),
    /// Command without payload
    Trigger,
}

impl ParameterValue {
    /// Short name of the variant, for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            ParameterValue::Text(_) => "text",
            ParameterValue::ErrorCodes(_) => "error_codes",
            ParameterValue::ControllerRealtime0(_) => "controller_realtime_0",
            ParameterValue::ControllerRealtime1(_) => "controller_realtime_1",
            ParameterValue::ControllerSpeed(_) => "controller_speed",
            ParameterValue::ControllerParameter1(_) => "controller_parameter_1",
            ParameterValue::ControllerParameter2(_) => "controller_parameter_2",
            ParameterValue::DisplayRealtime(_) => "display_realtime",
            ParameterValue::DisplayMileage(_) => "display_mileage",
            ParameterValue::DisplayServiceData(_) => "display_service_data",
            ParameterValue::DisplayTime(_) => "display_time",
            ParameterValue::BatteryCapacity(_) => "battery_capacity",
            ParameterValue::BatteryState(_) => "battery_state",
            ParameterValue::CellVoltages(_) => "cell_voltages",
            ParameterValue::SensorRealtime(_) => "sensor_realtime",
            ParameterValue::Trigger => "trigger",
        }
    }

    /// Whether this value can stand for the given group
    pub fn fits(&self, group: ParameterGroup) -> bool {
        match self {
            ParameterValue::Text(_) => group.is_text(),
            ParameterValue::ErrorCodes(_) => group == ParameterGroup::ErrorCodes,
            ParameterValue::ControllerRealtime0(_) => group == ParameterGroup::ControllerRealtime0,
            ParameterValue::ControllerRealtime1(_) => group == ParameterGroup::ControllerRealtime1,
            ParameterValue::ControllerSpeed(_) => group == ParameterGroup::ControllerSpeed,
            ParameterValue::ControllerParameter1(_) => group == ParameterGroup::ControllerParameter1,
            ParameterValue::ControllerParameter2(_) => group == ParameterGroup::ControllerParameter2,
            ParameterValue::DisplayRealtime(_) => group == ParameterGroup::DisplayRealtime,
            ParameterValue::DisplayMileage(_) => group == ParameterGroup::DisplayMileage,
            ParameterValue::DisplayServiceData(_) => group == ParameterGroup::DisplayServiceData,
            ParameterValue::DisplayTime(_) => group == ParameterGroup::DisplayTime,
            ParameterValue::BatteryCapacity(_) => group == ParameterGroup::BatteryCapacity,
            ParameterValue::BatteryState(_) => group == ParameterGroup::BatteryState,
            ParameterValue::CellVoltages(_) => group == ParameterGroup::CellVoltages,
            ParameterValue::SensorRealtime(_) => group == ParameterGroup::SensorRealtime,
            ParameterValue::Trigger => matches!(
                group,
                ParameterGroup::CleanServiceMileage | ParameterGroup::PositionSensorCalibration
            ),
        }
    }

    /// Combine a newly decoded value with the one already held.
    ///
    /// Cell voltages arrive in partial chunks; cells reported now overwrite
    /// their slots and the rest are kept. Every other value simply replaces
    /// the previous one.
    pub fn merge_into(self, previous: Option<&ParameterValue>) -> ParameterValue {
        match (self, previous) {
            (ParameterValue::CellVoltages(update), Some(ParameterValue::CellVoltages(held))) => {
                let mut cells = held.clone();
                if cells.len() < update.len() {
                    cells.resize(update.len(), None);
                }
                for (slot, cell) in cells.iter_mut().zip(update) {
                    if cell.is_some() {
                        *slot = cell;
                    }
                }
                ParameterValue::CellVoltages(cells)
            }
            (value, _) => value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_value_fits_group() {
        let text = ParameterValue::Text("ACME".into());
        assert!(text.fits(ParameterGroup::Manufacturer));
        assert!(text.fits(ParameterGroup::SerialNumber));
        assert!(!text.fits(ParameterGroup::DisplayMileage));
        assert!(ParameterValue::Trigger.fits(ParameterGroup::CleanServiceMileage));
        assert!(!ParameterValue::Trigger.fits(ParameterGroup::DisplayTime));
    }

    #[test]
    fn test_merge_cell_chunks() {
        let first = ParameterValue::CellVoltages(vec![Some(3.7), Some(3.71), None, None]);
        let second = ParameterValue::CellVoltages(vec![None, None, None, None, Some(3.69), Some(3.68)]);

        let merged = second.merge_into(Some(&first));
        assert_eq!(
            merged,
            ParameterValue::CellVoltages(vec![
                Some(3.7),
                Some(3.71),
                None,
                None,
                Some(3.69),
                Some(3.68)
            ])
        );
    }

    #[test]
    fn test_merge_replaces_other_values() {
        let old = ParameterValue::Text("old".into());
        let new = ParameterValue::Text("new".into());
        assert_eq!(new.clone().merge_into(Some(&old)), new);
    }

    #[test]
    fn test_reading_serializes_as_null() {
        let json = serde_json::to_value(Reading::<f64>::NotAvailable).unwrap();
        assert_eq!(json, serde_json::Value::Null);
        let json = serde_json::to_value(Reading::Available(12.5)).unwrap();
        assert_eq!(json, serde_json::json!(12.5));
    }
}

//! Decoding device payloads to typed parameter values
//!
//! Multi-byte integers are little-endian. Every decoder checks the payload
//! length first and reports [`DecodeError::Malformed`] rather than reading
//! past the end.

use velocan_core::Packet;

use crate::error::{DecodeError, DecodeResult};
use crate::registry::ParameterDescriptor;
use crate::scale::{descale, offset_temperature, sign_magnitude};
use crate::tables::{assist_level_for_code, wheel_by_code};
use crate::types::*;

/// Decode a packet with the descriptor registered for its triple
pub fn decode(descriptor: &ParameterDescriptor, packet: &Packet) -> DecodeResult<ParameterValue> {
    let decode_fn = descriptor
        .decode
        .ok_or(DecodeError::NotReadable(descriptor.group))?;
    if !descriptor.length.accepts(packet.data.len()) {
        return Err(DecodeError::Malformed {
            group: descriptor.group,
            detail: format!(
                "payload of {} bytes, expected {}",
                packet.data.len(),
                descriptor.length
            ),
        });
    }
    decode_fn(packet)
}

// =============================================================================
// Byte helpers
// =============================================================================

fn check_length(group: ParameterGroup, data: &[u8], required: usize) -> DecodeResult<()> {
    if data.len() < required {
        return Err(DecodeError::too_short(group, required, data.len()));
    }
    Ok(())
}

fn u16_le(data: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([data[offset], data[offset + 1]])
}

fn u24_le(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([data[offset], data[offset + 1], data[offset + 2], 0])
}

/// Device text: lossy UTF-8 with trailing NUL padding removed
pub fn decode_text_bytes(data: &[u8]) -> String {
    String::from_utf8_lossy(data)
        .trim_end_matches('\0')
        .to_string()
}

// =============================================================================
// Shared groups
// =============================================================================

pub(crate) fn text(packet: &Packet) -> DecodeResult<ParameterValue> {
    Ok(ParameterValue::Text(decode_text_bytes(&packet.data)))
}

/// Error codes are ASCII digits read in pairs: "0712" → [7, 12]. An odd
/// trailing digit is dropped.
pub(crate) fn error_codes(packet: &Packet) -> DecodeResult<ParameterValue> {
    let digits = decode_text_bytes(&packet.data);
    let mut codes = Vec::with_capacity(digits.len() / 2);
    for pair in digits.as_bytes().chunks_exact(2) {
        let code = std::str::from_utf8(pair)
            .ok()
            .filter(|s| s.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|s| s.parse::<u8>().ok())
            .ok_or_else(|| DecodeError::Malformed {
                group: ParameterGroup::ErrorCodes,
                detail: format!("not a two-digit code: {:?}", String::from_utf8_lossy(pair)),
            })?;
        codes.push(code);
    }
    Ok(ParameterValue::ErrorCodes(codes))
}

// =============================================================================
// Display
// =============================================================================

pub(crate) fn display_realtime(packet: &Packet) -> DecodeResult<ParameterValue> {
    let data = &packet.data;
    check_length(ParameterGroup::DisplayRealtime, data, 3)?;

    let assist_levels = data[0] & 0x0F;
    Ok(ParameterValue::DisplayRealtime(DisplayRealtime {
        assist_levels,
        ride_mode: if data[0] & 0x10 != 0 {
            RideMode::Boost
        } else {
            RideMode::Eco
        },
        boost: data[0] & 0x20 != 0,
        current_assist_level: assist_level_for_code(data[1], assist_levels),
        light: data[2] & 0x01 != 0,
        button: data[2] & 0x02 != 0,
    }))
}

pub(crate) fn display_mileage(packet: &Packet) -> DecodeResult<ParameterValue> {
    let data = &packet.data;
    check_length(ParameterGroup::DisplayMileage, data, 8)?;

    Ok(ParameterValue::DisplayMileage(DisplayMileage {
        total_mileage: u24_le(data, 0),
        single_mileage: descale(u24_le(data, 3), 10),
        max_speed: descale(u16_le(data, 6) as u32, 10),
    }))
}

pub(crate) fn display_service_data(packet: &Packet) -> DecodeResult<ParameterValue> {
    let data = &packet.data;
    check_length(ParameterGroup::DisplayServiceData, data, 5)?;

    Ok(ParameterValue::DisplayServiceData(DisplayServiceData {
        average_speed: descale(u16_le(data, 0) as u32, 10),
        service_mileage: descale(u24_le(data, 2), 10),
    }))
}

// =============================================================================
// Controller
// =============================================================================

pub(crate) fn controller_realtime0(packet: &Packet) -> DecodeResult<ParameterValue> {
    let data = &packet.data;
    check_length(ParameterGroup::ControllerRealtime0, data, 8)?;

    let remaining = u16_le(data, 6);
    Ok(ParameterValue::ControllerRealtime0(ControllerRealtime0 {
        remaining_capacity: data[0],
        single_trip: descale(u16_le(data, 1) as u32, 100),
        cadence: data[3],
        torque: u16_le(data, 4),
        remaining_distance: if remaining == u16::MAX {
            Reading::NotAvailable
        } else {
            Reading::Available(descale(remaining as u32, 100))
        },
    }))
}

pub(crate) fn controller_realtime1(packet: &Packet) -> DecodeResult<ParameterValue> {
    let data = &packet.data;
    check_length(ParameterGroup::ControllerRealtime1, data, 8)?;

    Ok(ParameterValue::ControllerRealtime1(ControllerRealtime1 {
        speed: descale(u16_le(data, 0) as u32, 100),
        current: descale(u16_le(data, 2) as u32, 100),
        voltage: descale(u16_le(data, 4) as u32, 100),
        temperature: offset_temperature(data[6]),
        motor_temperature: if data[7] == u8::MAX {
            Reading::NotAvailable
        } else {
            Reading::Available(offset_temperature(data[7]))
        },
    }))
}

pub(crate) fn controller_speed(packet: &Packet) -> DecodeResult<ParameterValue> {
    let data = &packet.data;
    check_length(ParameterGroup::ControllerSpeed, data, 6)?;

    let wheel_code = [data[2], data[3]];
    Ok(ParameterValue::ControllerSpeed(ControllerSpeedParameters {
        speed_limit: descale(u16_le(data, 0) as u32, 100),
        wheel_diameter: wheel_by_code(wheel_code),
        wheel_code,
        circumference: u16_le(data, 4),
    }))
}

pub(crate) const PARAMETER1_LEN: usize = 64;
pub(crate) const PARAMETER2_LEN: usize = 54;

pub(crate) fn controller_parameter1(packet: &Packet) -> DecodeResult<ParameterValue> {
    let d = &packet.data;
    check_length(ParameterGroup::ControllerParameter1, d, PARAMETER1_LEN)?;

    let mut assist_levels = [AssistProfile::default(); 9];
    for (i, profile) in assist_levels.iter_mut().enumerate() {
        profile.current_limit = d[40 + i];
        profile.speed_limit = d[49 + i];
    }

    Ok(ParameterValue::ControllerParameter1(Box::new(ControllerParameter1 {
        system_voltage: d[0],
        current_limit: d[1],
        overvoltage: d[2],
        undervoltage: d[3],
        undervoltage_under_load: d[4],
        battery_recovery_voltage: d[5],
        battery_capacity: u16_le(d, 7),
        max_current_on_low_charge: d[9],
        full_capacity_range: d[12],
        pedal_sensor_type: d[13],
        coaster_brake: d[14] == 1,
        pedal_sensor_signals_per_rotation: d[15],
        speed_sensor_channel_number: d[16],
        motor_type: d[18],
        motor_pole_pair_number: d[19],
        speedmeter_magnets_number: d[20],
        temperature_sensor_type: d[21],
        deceleration_ratio: descale(u16_le(d, 22) as u32, 100),
        motor_max_rotor_rpm: u16_le(d, 24),
        motor_d_axis_inductance: u16_le(d, 26),
        motor_q_axis_inductance: u16_le(d, 28),
        motor_phase_resistance: u16_le(d, 30),
        motor_reverse_potential_coefficient: u16_le(d, 32),
        throttle_start_voltage: descale(d[34] as u32, 10),
        throttle_max_voltage: descale(d[35] as u32, 10),
        start_current: d[37],
        current_loading_time: descale(d[38] as u32, 10),
        current_shedding_time: descale(d[39] as u32, 10),
        assist_levels,
        displayless_mode: d[58] == 1,
        lamps_always_on: d[59] == 1,
        raw: RawBlock(d.clone()),
    })))
}

pub(crate) fn controller_parameter2(packet: &Packet) -> DecodeResult<ParameterValue> {
    let d = &packet.data;
    check_length(ParameterGroup::ControllerParameter2, d, PARAMETER2_LEN)?;

    let mut torque_profiles = [TorqueProfile::default(); 6];
    for (i, profile) in torque_profiles.iter_mut().enumerate() {
        *profile = TorqueProfile {
            start_torque_value: d[i],
            max_torque_value: d[6 + i],
            return_torque_value: d[12 + i],
            max_current: d[18 + i],
            min_current: d[24 + i],
            start_pulse: d[36 + i],
            current_decay_time: d[42 + i] as u16 * 5,
            stop_delay: d[48 + i] as u16 * 2,
        };
    }

    Ok(ParameterValue::ControllerParameter2(Box::new(ControllerParameter2 {
        torque_profiles,
        raw: RawBlock(d.clone()),
    })))
}

// =============================================================================
// Battery and sensor
// =============================================================================

pub(crate) fn battery_capacity(packet: &Packet) -> DecodeResult<ParameterValue> {
    let data = &packet.data;
    check_length(ParameterGroup::BatteryCapacity, data, 7)?;

    Ok(ParameterValue::BatteryCapacity(BatteryCapacity {
        full_capacity: u16_le(data, 0),
        capacity_left: u16_le(data, 2),
        rsoc: data[4],
        asoc: data[5],
        soh: data[6],
    }))
}

pub(crate) fn battery_state(packet: &Packet) -> DecodeResult<ParameterValue> {
    let data = &packet.data;
    check_length(ParameterGroup::BatteryState, data, 5)?;

    Ok(ParameterValue::BatteryState(BatteryState {
        current: sign_magnitude(u16_le(data, 0)),
        voltage: u16_le(data, 2) as u32 * 10,
        temperature: offset_temperature(data[4]),
    }))
}

/// Cells arrive four per frame; subcode 2 carries cells 0..4, subcode 3
/// cells 4..8 and so on. Only the reported slots are filled.
pub(crate) fn cell_voltages(packet: &Packet) -> DecodeResult<ParameterValue> {
    if packet.subcode < 2 {
        return Err(DecodeError::Malformed {
            group: ParameterGroup::CellVoltages,
            detail: format!("subcode {:02X} does not carry cells", packet.subcode),
        });
    }
    let offset = (packet.subcode as usize - 2) * 4;
    let count = packet.data.len() / 2;

    let mut cells = vec![None; offset + count];
    for i in 0..count {
        let millivolts = u16_le(&packet.data, i * 2);
        cells[offset + i] = Some(descale(millivolts as u32, 1000));
    }
    Ok(ParameterValue::CellVoltages(cells))
}

pub(crate) fn sensor_realtime(packet: &Packet) -> DecodeResult<ParameterValue> {
    let data = &packet.data;
    check_length(ParameterGroup::SensorRealtime, data, 3)?;

    Ok(ParameterValue::SensorRealtime(SensorRealtime {
        torque: u16_le(data, 0),
        cadence: data[2],
    }))
}

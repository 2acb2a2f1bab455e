//! Encoding typed values into write payloads
//!
//! Encoders return the raw payload; [`encode`] wraps it into a write
//! [`Packet`] addressed by the descriptor.

use velocan_core::{CanFrame, Packet, MAX_PACKET_DATA};

use crate::decode::{PARAMETER1_LEN, PARAMETER2_LEN};
use crate::error::{EncodeError, EncodeResult};
use crate::registry::ParameterDescriptor;
use crate::scale::rescale;
use crate::types::*;

/// Build the write packet for `value` under `descriptor`
pub fn encode(descriptor: &ParameterDescriptor, value: &ParameterValue) -> EncodeResult<Packet> {
    let encode_fn = descriptor
        .encode
        .ok_or(EncodeError::NotWritable(descriptor.group))?;
    if !value.fits(descriptor.group) {
        return Err(EncodeError::TypeMismatch {
            group: descriptor.group,
            found: value.kind(),
        });
    }
    let data = encode_fn(value)?;
    Ok(Packet::write(
        descriptor.id.target,
        descriptor.id.code,
        descriptor.id.subcode,
        data,
    ))
}

/// Like [`encode`], split into wire frames
pub fn encode_frames(
    descriptor: &ParameterDescriptor,
    value: &ParameterValue,
) -> EncodeResult<Vec<CanFrame>> {
    Ok(encode(descriptor, value)?.into_frames()?)
}

fn mismatch(group: ParameterGroup, value: &ParameterValue) -> EncodeError {
    EncodeError::TypeMismatch {
        group,
        found: value.kind(),
    }
}

fn put_u16(buf: &mut [u8], offset: usize, value: u16) {
    buf[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u24(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 3].copy_from_slice(&value.to_le_bytes()[..3]);
}

fn check_max(field: &'static str, value: u32, max: u32) -> EncodeResult<()> {
    if value > max {
        return Err(EncodeError::ValueOutOfRange {
            field,
            value: value as f64,
            min: 0.0,
            max: max as f64,
        });
    }
    Ok(())
}

// =============================================================================
// Shared groups
// =============================================================================

pub(crate) fn text(value: &ParameterValue) -> EncodeResult<Vec<u8>> {
    let ParameterValue::Text(s) = value else {
        return Err(mismatch(ParameterGroup::CustomerNumber, value));
    };
    if !s.bytes().all(|b| b.is_ascii_graphic() || b == b' ') {
        return Err(EncodeError::InvalidText(s.clone()));
    }
    check_max("text length", s.len() as u32, MAX_PACKET_DATA as u32)?;
    Ok(s.as_bytes().to_vec())
}

pub(crate) fn trigger(value: &ParameterValue) -> EncodeResult<Vec<u8>> {
    match value {
        ParameterValue::Trigger => Ok(Vec::new()),
        other => Err(mismatch(ParameterGroup::CleanServiceMileage, other)),
    }
}

// =============================================================================
// Display
// =============================================================================

pub(crate) fn display_mileage(value: &ParameterValue) -> EncodeResult<Vec<u8>> {
    let ParameterValue::DisplayMileage(m) = value else {
        return Err(mismatch(ParameterGroup::DisplayMileage, value));
    };
    check_max("total_mileage", m.total_mileage, 0xFF_FFFF)?;
    let single = rescale("single_mileage", m.single_mileage, 10, 0xFF_FFFF)?;
    let max_speed = rescale("max_speed", m.max_speed, 10, u16::MAX as u32)?;

    let mut buf = vec![0u8; 8];
    put_u24(&mut buf, 0, m.total_mileage);
    put_u24(&mut buf, 3, single);
    put_u16(&mut buf, 6, max_speed as u16);
    Ok(buf)
}

pub(crate) fn display_time(value: &ParameterValue) -> EncodeResult<Vec<u8>> {
    let ParameterValue::DisplayTime(t) = value else {
        return Err(mismatch(ParameterGroup::DisplayTime, value));
    };
    check_max("hour", t.hour as u32, 23)?;
    check_max("minute", t.minute as u32, 59)?;
    check_max("second", t.second as u32, 59)?;
    Ok(vec![t.hour, t.minute, t.second])
}

// =============================================================================
// Controller
// =============================================================================

pub(crate) fn controller_speed(value: &ParameterValue) -> EncodeResult<Vec<u8>> {
    let ParameterValue::ControllerSpeed(s) = value else {
        return Err(mismatch(ParameterGroup::ControllerSpeed, value));
    };
    let speed_limit = rescale("speed_limit", s.speed_limit, 100, u16::MAX as u32)?;

    let code = s.wheel_diameter.map(|w| w.code).unwrap_or(s.wheel_code);
    if let Some(wheel) = s.wheel_diameter {
        if s.circumference < wheel.min_circumference || s.circumference > wheel.max_circumference {
            return Err(EncodeError::ValueOutOfRange {
                field: "circumference",
                value: s.circumference as f64,
                min: wheel.min_circumference as f64,
                max: wheel.max_circumference as f64,
            });
        }
    }

    let mut buf = vec![0u8; 6];
    put_u16(&mut buf, 0, speed_limit as u16);
    buf[2..4].copy_from_slice(&code);
    put_u16(&mut buf, 4, s.circumference);
    Ok(buf)
}

/// Start from the block's original bytes so unnamed bytes survive
fn base_block(raw: &[u8], len: usize) -> Vec<u8> {
    let mut buf = raw.to_vec();
    if buf.len() < len {
        buf.resize(len, 0);
    }
    buf
}

pub(crate) fn controller_parameter1(value: &ParameterValue) -> EncodeResult<Vec<u8>> {
    let ParameterValue::ControllerParameter1(p) = value else {
        return Err(mismatch(ParameterGroup::ControllerParameter1, value));
    };
    let mut d = base_block(&p.raw.0, PARAMETER1_LEN);

    d[0] = p.system_voltage;
    d[1] = p.current_limit;
    d[2] = p.overvoltage;
    d[3] = p.undervoltage;
    d[4] = p.undervoltage_under_load;
    d[5] = p.battery_recovery_voltage;
    put_u16(&mut d, 7, p.battery_capacity);
    d[9] = p.max_current_on_low_charge;
    d[12] = p.full_capacity_range;
    d[13] = p.pedal_sensor_type;
    d[14] = p.coaster_brake as u8;
    d[15] = p.pedal_sensor_signals_per_rotation;
    d[16] = p.speed_sensor_channel_number;
    d[18] = p.motor_type;
    d[19] = p.motor_pole_pair_number;
    d[20] = p.speedmeter_magnets_number;
    d[21] = p.temperature_sensor_type;
    let ratio = rescale("deceleration_ratio", p.deceleration_ratio, 100, u16::MAX as u32)?;
    put_u16(&mut d, 22, ratio as u16);
    put_u16(&mut d, 24, p.motor_max_rotor_rpm);
    put_u16(&mut d, 26, p.motor_d_axis_inductance);
    put_u16(&mut d, 28, p.motor_q_axis_inductance);
    put_u16(&mut d, 30, p.motor_phase_resistance);
    put_u16(&mut d, 32, p.motor_reverse_potential_coefficient);
    d[34] = rescale("throttle_start_voltage", p.throttle_start_voltage, 10, 255)? as u8;
    d[35] = rescale("throttle_max_voltage", p.throttle_max_voltage, 10, 255)? as u8;
    d[37] = p.start_current;
    d[38] = rescale("current_loading_time", p.current_loading_time, 10, 255)? as u8;
    d[39] = rescale("current_shedding_time", p.current_shedding_time, 10, 255)? as u8;
    for (i, profile) in p.assist_levels.iter().enumerate() {
        d[40 + i] = profile.current_limit;
        d[49 + i] = profile.speed_limit;
    }
    d[58] = p.displayless_mode as u8;
    d[59] = p.lamps_always_on as u8;
    Ok(d)
}

pub(crate) fn controller_parameter2(value: &ParameterValue) -> EncodeResult<Vec<u8>> {
    let ParameterValue::ControllerParameter2(p) = value else {
        return Err(mismatch(ParameterGroup::ControllerParameter2, value));
    };
    let mut d = base_block(&p.raw.0, PARAMETER2_LEN);

    for (i, profile) in p.torque_profiles.iter().enumerate() {
        check_max("current_decay_time", profile.current_decay_time as u32, 255 * 5)?;
        check_max("stop_delay", profile.stop_delay as u32, 255 * 2)?;
        d[i] = profile.start_torque_value;
        d[6 + i] = profile.max_torque_value;
        d[12 + i] = profile.return_torque_value;
        d[18 + i] = profile.max_current;
        d[24 + i] = profile.min_current;
        d[36 + i] = profile.start_pulse;
        d[42 + i] = (profile.current_decay_time / 5) as u8;
        d[48 + i] = (profile.stop_delay / 2) as u8;
    }
    Ok(d)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode;
    use crate::tables::wheel_by_label;
    use pretty_assertions::assert_eq;
    use velocan_core::{CanOperation, DeviceTarget, Node};

    fn reply(code: u8, subcode: u8, data: Vec<u8>) -> Packet {
        Packet {
            source: Node::Device(DeviceTarget::Controller),
            target: Node::Tool,
            operation: CanOperation::WriteCmd,
            code,
            subcode,
            data,
        }
    }

    #[test]
    fn test_encode_display_time() {
        let value = ParameterValue::DisplayTime(ClockTime {
            hour: 14,
            minute: 5,
            second: 59,
        });
        assert_eq!(display_time(&value).unwrap(), vec![14, 5, 59]);

        let bad = ParameterValue::DisplayTime(ClockTime {
            hour: 24,
            minute: 0,
            second: 0,
        });
        assert!(matches!(
            display_time(&bad),
            Err(EncodeError::ValueOutOfRange { field: "hour", .. })
        ));
    }

    #[test]
    fn test_encode_mileage() {
        let value = ParameterValue::DisplayMileage(DisplayMileage {
            total_mileage: 1234,
            single_mileage: 12.3,
            max_speed: 32.5,
        });
        assert_eq!(
            display_mileage(&value).unwrap(),
            vec![0xD2, 0x04, 0x00, 0x7B, 0x00, 0x00, 0x45, 0x01]
        );
    }

    #[test]
    fn test_encode_speed_validates_circumference() {
        let wheel = wheel_by_label("27.5");
        let mut params = ControllerSpeedParameters {
            speed_limit: 25.0,
            wheel_diameter: wheel,
            wheel_code: [0xB8, 0x01],
            circumference: 2144,
        };
        let bytes = controller_speed(&ParameterValue::ControllerSpeed(params.clone())).unwrap();
        assert_eq!(bytes, vec![0xC4, 0x09, 0xB8, 0x01, 0x60, 0x08]);

        params.circumference = 900;
        assert!(matches!(
            controller_speed(&ParameterValue::ControllerSpeed(params)),
            Err(EncodeError::ValueOutOfRange {
                field: "circumference",
                ..
            })
        ));
    }

    #[test]
    fn test_encode_speed_limit_out_of_range() {
        let params = ControllerSpeedParameters {
            speed_limit: 1000.0,
            ..Default::default()
        };
        assert!(controller_speed(&ParameterValue::ControllerSpeed(params)).is_err());
    }

    #[test]
    fn test_parameter1_preserves_unknown_bytes() {
        let mut data: Vec<u8> = (0..64).map(|i| i as u8).collect();
        data[14] = 1;
        data[58] = 0;
        data[59] = 1;
        let decoded = decode::controller_parameter1(&reply(0x60, 0x11, data.clone())).unwrap();
        assert_eq!(controller_parameter1(&decoded).unwrap(), data);

        let ParameterValue::ControllerParameter1(mut p1) = decoded else {
            panic!("wrong variant");
        };
        p1.current_limit = 20;
        p1.assist_levels[8].speed_limit = 90;
        let bytes = controller_parameter1(&ParameterValue::ControllerParameter1(p1)).unwrap();
        assert_eq!(bytes[1], 20);
        assert_eq!(bytes[57], 90);
        assert_eq!(bytes[6], 6);
        assert_eq!(bytes[63], 63);
    }

    #[test]
    fn test_parameter2_roundtrip() {
        let mut data = vec![0u8; 54];
        for (i, b) in data.iter_mut().enumerate() {
            *b = (i * 3) as u8;
        }
        let decoded = decode::controller_parameter2(&reply(0x60, 0x12, data.clone())).unwrap();
        assert_eq!(controller_parameter2(&decoded).unwrap(), data);
    }

    #[test]
    fn test_encode_text_rejects_non_ascii() {
        assert_eq!(
            text(&ParameterValue::Text("CUST-01".into())).unwrap(),
            b"CUST-01".to_vec()
        );
        assert!(matches!(
            text(&ParameterValue::Text("Grüße".into())),
            Err(EncodeError::InvalidText(_))
        ));
    }

    #[test]
    fn test_trigger_has_empty_payload() {
        assert_eq!(trigger(&ParameterValue::Trigger).unwrap(), Vec::<u8>::new());
    }
}

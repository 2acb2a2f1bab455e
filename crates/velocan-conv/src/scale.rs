//! Fixed-point scaling between raw wire integers and physical values
//!
//! Devices transmit most measurements as integers with an implied decimal
//! divisor (0.1 km/h, 0.01 A, 1 mV). Dividing in f64 leaves artifacts like
//! 13.000000001, so results are rounded to the divisor's precision.

use crate::error::{EncodeError, EncodeResult};

/// Decimal places implied by a power-of-ten divisor
///
/// - divisor 1 → 0 places
/// - divisor 10 → 1 place
/// - divisor 100 → 2 places
/// - divisor 1000 → 3 places
pub fn precision_from_divisor(divisor: u32) -> u8 {
    let mut remaining = divisor.max(1);
    let mut precision = 0u8;
    while remaining >= 10 && precision < 6 {
        remaining /= 10;
        precision += 1;
    }
    precision
}

/// Round a value to the specified number of decimal places
pub fn round_to_precision(value: f64, precision: u8) -> f64 {
    if precision == 0 {
        value.round()
    } else {
        let factor = 10_f64.powi(precision as i32);
        (value * factor).round() / factor
    }
}

/// Raw integer to physical value
pub fn descale(raw: u32, divisor: u32) -> f64 {
    let value = raw as f64 / divisor.max(1) as f64;
    round_to_precision(value, precision_from_divisor(divisor))
}

/// Physical value to raw integer, rejecting anything outside `0..=max_raw`
pub fn rescale(field: &'static str, value: f64, factor: u32, max_raw: u32) -> EncodeResult<u32> {
    let raw = (value * factor as f64).round();
    if !raw.is_finite() || raw < 0.0 || raw > max_raw as f64 {
        return Err(EncodeError::ValueOutOfRange {
            field,
            value,
            min: 0.0,
            max: max_raw as f64 / factor as f64,
        });
    }
    Ok(raw as u32)
}

/// Battery current is sent sign-magnitude style: with bit 15 set the
/// reported magnitude is `65536 - raw`
pub fn sign_magnitude(raw: u16) -> u16 {
    if raw & 0x8000 != 0 {
        (0x1_0000u32 - raw as u32) as u16
    } else {
        raw
    }
}

/// Temperatures are offset by 40 so that -40 °C encodes as 0
pub fn offset_temperature(raw: u8) -> i16 {
    raw as i16 - 40
}

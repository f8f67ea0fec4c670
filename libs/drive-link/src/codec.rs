//! Register word codec
//!
//! Pure transforms between raw 16-bit register words and signed, decimal
//! scaled engineering values. Composite 32-bit values are formed from two
//! consecutive registers, high word first.

use errors::{DriveError, DriveResult};

/// Decode a single 16-bit register word.
///
/// When `signed` is set and bit 15 is high the word is reinterpreted as
/// 16-bit two's-complement; otherwise it passes through unchanged.
pub fn decode_u16(raw: u16, signed: bool) -> i64 {
    if signed && raw & 0x8000 != 0 {
        i64::from(raw) - 0x1_0000
    } else {
        i64::from(raw)
    }
}

/// Decode a 32-bit value from two consecutive register words, high word
/// first. Always 32-bit two's-complement, regardless of the channel's
/// signed flag.
pub fn decode_u32(hi: u16, lo: u16) -> i64 {
    let combined = (u32::from(hi) << 16) | u32::from(lo);
    i64::from(combined as i32)
}

/// Move the decimal point left by `decimal_places`.
///
/// With `decimal_places == 0` the result is the integer value itself.
pub fn apply_scale(value: i64, decimal_places: u32) -> f64 {
    if decimal_places == 0 {
        value as f64
    } else {
        value as f64 / 10f64.powi(decimal_places as i32)
    }
}

/// Inverse of [`apply_scale`]: scale up and round to the nearest integer.
pub fn unscale(value: f64, decimal_places: u32) -> DriveResult<i32> {
    if !value.is_finite() {
        return Err(DriveError::conversion(format!("not a number: {value}")));
    }
    Ok((value * 10f64.powi(decimal_places as i32)).round() as i32)
}

/// Encode a signed integer as a 16-bit register write word, converting
/// negative values to their two's-complement representation.
pub fn to_write_word(value: i32) -> DriveResult<u16> {
    if !(-0x8000..=0xFFFF).contains(&value) {
        return Err(DriveError::out_of_range(value, -0x8000, 0xFFFF));
    }
    if value < 0 {
        Ok((0x1_0000 + value) as u16)
    } else {
        Ok(value as u16)
    }
}

/// Parse operator-entered text into a finite number.
pub fn parse_number(text: &str) -> DriveResult<f64> {
    let value: f64 = text
        .trim()
        .parse()
        .map_err(|_| DriveError::conversion(format!("not a number: {text:?}")))?;
    if !value.is_finite() {
        return Err(DriveError::conversion(format!("not a number: {text:?}")));
    }
    Ok(value)
}

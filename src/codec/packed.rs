// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-weather-station project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Packed 32-bit float
//!
//! Floats cross process and host boundaries as a sign/magnitude fixed-point
//! word instead of IEEE-754 bits:
//!
//! | bits   | content                               |
//! |--------|---------------------------------------|
//! | 31     | sign (1 = negative)                   |
//! | 30..16 | whole part of the magnitude, 15 bits  |
//! | 15..0  | fractional part × 65536               |
//!
//! The representable range is therefore ±32767.99998 with a resolution of
//! 1/65536. Larger magnitudes wrap in the whole part.

const SIGN_BIT: u32 = 0x8000_0000;
const WHOLE_MASK: u32 = 0x7FFF;
const FRACTION_SCALE: f64 = 65536.0;

/// Encode a float into its packed representation (host order).
pub fn encode_packed(value: f32) -> u32 {
    let (sign, magnitude) = if value < 0.0 {
        (SIGN_BIT, -(value as f64))
    } else {
        (0, value as f64)
    };

    let whole = magnitude.trunc();
    let fraction = ((magnitude - whole) * FRACTION_SCALE) as u32 & 0xFFFF;
    sign | (((whole as u32) & WHOLE_MASK) << 16) | fraction
}

/// Decode a packed word (host order) into a float.
pub fn decode_packed(word: u32) -> f32 {
    let whole = ((word >> 16) & WHOLE_MASK) as f64;
    let fraction = (word & 0xFFFF) as f64 / FRACTION_SCALE;
    let magnitude = whole + fraction;
    if word & SIGN_BIT != 0 {
        -magnitude as f32
    } else {
        magnitude as f32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_known_words() {
        assert_eq!(encode_packed(0.0), 0);
        assert_eq!(encode_packed(1.5), 0x0001_8000);
        assert_eq!(encode_packed(-1.5), 0x8001_8000);
        assert_eq!(encode_packed(-32767.0), 0xFFFF_0000);
        assert_eq!(decode_packed(0xFFFF_0000), -32767.0);
    }

    #[test]
    fn test_typical_weather_values_survive() {
        for value in [29.921_f32, 72.4, -12.25, 0.01, 359.0, 1013.25] {
            assert_abs_diff_eq!(decode_packed(encode_packed(value)), value, epsilon = 2.0 / 65536.0);
        }
    }

    #[test]
    fn test_whole_part_is_15_bits() {
        // 40000 does not fit: the whole part wraps
        let decoded = decode_packed(encode_packed(40000.0));
        assert_abs_diff_eq!(decoded, (40000 & 0x7FFF) as f32);
    }
}

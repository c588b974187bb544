//! This file contains the arithmetic used on numeric fields (length and
//! offset metas). Only 1, 2 and 4 byte wide fields are treated as numbers,
//! anything else is left untouched.
//!
//! SPDX-License-Identifier: MIT

use crate::misc::Rng;

/// Largest delta tried by the arithmetic mutations
pub const ARITH_MAX: usize = 35;

/// Interesting 8-bit values, straight out of AFL
pub const INTERESTING_8: [i8; 9] = [-128, -1, 0, 1, 16, 32, 64, 100, 127];

/// Interesting 16-bit values, the 8-bit ones are added on top
pub const INTERESTING_16: [i16; 10] = [-32768, -129, 128, 255, 256, 512, 1000, 1024, 4096, 32767];

/// Interesting 32-bit values, the 8 and 16-bit ones are added on top
pub const INTERESTING_32: [i32; 8] = [
    -2147483648,
    -100663046,
    -32769,
    32768,
    65535,
    65536,
    100663045,
    2147483647,
];

/// Byte order used to interpret a numeric field
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Endian {
    Little,
    Big,
}

impl Endian {
    pub fn random(rng: &mut Rng) -> Self {
        if rng.coin() {
            Endian::Little
        } else {
            Endian::Big
        }
    }
}

/// Can a field of this width be treated as a number
#[inline]
pub fn is_numeric_width(width: usize) -> bool {
    matches!(width, 1 | 2 | 4)
}

#[inline]
fn width_mask(width: usize) -> u64 {
    (1u64 << (width * 8)) - 1
}

/// Read a 1/2/4 byte field
pub fn read_number(buf: &[u8], start: usize, width: usize, endian: Endian) -> Option<u64> {
    if !is_numeric_width(width) {
        return None;
    }

    let bytes = buf.get(start..start + width)?;
    let value = match endian {
        Endian::Little => bytes
            .iter()
            .rev()
            .fold(0u64, |acc, &b| (acc << 8) | b as u64),
        Endian::Big => bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64),
    };

    Some(value)
}

/// Write a 1/2/4 byte field, the value is truncated to the width
pub fn write_number(buf: &mut [u8], start: usize, width: usize, value: u64, endian: Endian) -> bool {
    if !is_numeric_width(width) {
        return false;
    }

    let Some(bytes) = buf.get_mut(start..start + width) else {
        return false;
    };

    let value = value & width_mask(width);
    for (i, byte) in bytes.iter_mut().enumerate() {
        let shift = match endian {
            Endian::Little => i * 8,
            Endian::Big => (width - 1 - i) * 8,
        };
        *byte = (value >> shift) as u8;
    }

    true
}

/// Add a signed delta to a numeric field, wrapping at the field width
pub fn number_add(buf: &mut [u8], start: usize, width: usize, delta: i64, endian: Endian) -> bool {
    let Some(value) = read_number(buf, start, width, endian) else {
        return false;
    };

    let updated = value.wrapping_add(delta as u64);
    write_number(buf, start, width, updated, endian)
}

/// Subtract from a numeric field, wrapping at the field width
pub fn number_subtract(buf: &mut [u8], start: usize, width: usize, amount: u64, endian: Endian) -> bool {
    let Some(value) = read_number(buf, start, width, endian) else {
        return false;
    };

    write_number(buf, start, width, value.wrapping_sub(amount), endian)
}

/// Byte order a meta field is stored in, guessed from which order reads back
/// `expected` (usually the payload length). Little endian unless only big
/// endian matches
pub fn infer_endian(buf: &[u8], start: usize, width: usize, expected: u64) -> Endian {
    let little = read_number(buf, start, width, Endian::Little);
    let big = read_number(buf, start, width, Endian::Big);

    if big == Some(expected) && little != Some(expected) {
        Endian::Big
    } else {
        Endian::Little
    }
}

/// Every interesting value for a field width, smaller widths included
pub fn interesting_values(width: usize) -> Vec<u64> {
    let mut values: Vec<u64> = INTERESTING_8.iter().map(|&v| v as i64 as u64).collect();

    if width >= 2 {
        values.extend(INTERESTING_16.iter().map(|&v| v as i64 as u64));
    }

    if width >= 4 {
        values.extend(INTERESTING_32.iter().map(|&v| v as i64 as u64));
    }

    values
}

/// Overwrite a numeric field with a random interesting value in a random byte
/// order
pub fn number_set_interesting(buf: &mut [u8], start: usize, width: usize, rng: &mut Rng) -> bool {
    if !is_numeric_width(width) {
        return false;
    }

    let values = interesting_values(width);
    let value = values[rng.below(values.len())];
    let endian = Endian::random(rng);
    write_number(buf, start, width, value, endian)
}

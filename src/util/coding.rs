//! Encoding utilities for variable-length integers and order-preserving floats.

use bytes::{Buf, BufMut};

/// Maximum bytes needed to encode a varint64.
pub const MAX_VARINT64_LEN: usize = 10;

/// Maximum bytes needed to encode a varint32.
pub const MAX_VARINT32_LEN: usize = 5;

/// Encode a 64-bit unsigned integer as a varint.
///
/// Returns the number of bytes written.
pub fn put_varint(buf: &mut impl BufMut, mut value: u64) -> usize {
    let mut count = 0;
    while value >= 0x80 {
        buf.put_u8((value as u8) | 0x80);
        value >>= 7;
        count += 1;
    }
    buf.put_u8(value as u8);
    count + 1
}

/// Decode a 64-bit varint from a buffer, advancing it.
///
/// Returns None if the buffer is too short or the varint is malformed.
pub fn get_varint(buf: &mut &[u8]) -> Option<u64> {
    let mut result = 0u64;
    let mut shift = 0;

    for _ in 0..MAX_VARINT64_LEN {
        if buf.is_empty() {
            return None;
        }

        let byte = buf.get_u8();
        result |= ((byte & 0x7F) as u64) << shift;

        if byte & 0x80 == 0 {
            return Some(result);
        }

        shift += 7;
    }

    None // Varint too long
}

/// Decode a varint that must fit in 32 bits.
pub fn get_varint32(buf: &mut &[u8]) -> Option<u32> {
    let start = *buf;
    let value = get_varint(buf)?;
    if start.len() - buf.len() > MAX_VARINT32_LEN {
        return None;
    }
    u32::try_from(value).ok()
}

/// Get the number of bytes needed to encode a varint.
pub fn varint_length(value: u64) -> usize {
    let mut len = 1;
    let mut v = value;
    while v >= 0x80 {
        v >>= 7;
        len += 1;
    }
    len
}

/// Encode an f64 so that byte-wise comparison matches numeric order.
pub fn encode_f64_ordered(f: f64) -> [u8; 8] {
    let bits = f.to_bits();
    // Negative: flip every bit. Positive: flip only the sign bit.
    let ordered = if bits >> 63 == 1 { !bits } else { bits ^ (1u64 << 63) };
    ordered.to_be_bytes()
}

/// Inverse of [`encode_f64_ordered`].
pub fn decode_f64_ordered(bytes: [u8; 8]) -> f64 {
    let ordered = u64::from_be_bytes(bytes);
    let bits = if ordered >> 63 == 1 { ordered ^ (1u64 << 63) } else { !ordered };
    f64::from_bits(bits)
}

//! Unsigned LEB128 length prefixes.

use crate::error::{CarError, CarResult};

/// Append `value` as a varint.
pub fn encode(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value > 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if value == 0 {
            break;
        }
    }
}

/// Decode a varint at the start of `data`. Returns (value, bytes_consumed).
///
/// `offset` is only used to report where a bad varint sits.
pub fn decode(data: &[u8], offset: usize) -> CarResult<(u64, usize)> {
    let mut value: u64 = 0;
    let mut shift = 0;
    for (i, &byte) in data.iter().enumerate() {
        if shift >= 64 || (shift == 63 && byte > 1) {
            return Err(CarError::CorruptEntry {
                offset,
                reason: "varint overflow".into(),
            });
        }
        value |= ((byte & 0x7F) as u64) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    Err(CarError::CorruptEntry {
        offset,
        reason: "truncated varint".into(),
    })
}

//! Base-128 varint reader.

use super::error::DecodeError;

/// Longest varint accepted: 10 bytes covers a full u64.
pub const MAX_VARINT_BYTES: usize = 10;

/// Continuation bit of a varint byte.
const CONTINUATION: u8 = 0x80;

/// Read a varint starting at `offset`.
///
/// Returns the value and the number of bytes consumed. Running off the end
/// of the buffer before a terminating byte is `TruncatedVarint`; an 11th
/// byte, or a 10th byte carrying bits beyond 64, is `MalformedVarint`.
pub fn read_varint(buf: &[u8], offset: usize) -> Result<(u64, usize), DecodeError> {
    let mut value = 0u64;

    for index in 0..MAX_VARINT_BYTES {
        let Some(&byte) = buf.get(offset.saturating_add(index)) else {
            return Err(DecodeError::TruncatedVarint { offset });
        };

        let payload = (byte & !CONTINUATION) as u64;
        // The 10th byte only has room for the top bit of a u64.
        if index == MAX_VARINT_BYTES - 1 && payload > 1 {
            return Err(DecodeError::MalformedVarint { offset });
        }
        value |= payload << (7 * index);

        if byte & CONTINUATION == 0 {
            return Ok((value, index + 1));
        }
    }

    Err(DecodeError::MalformedVarint { offset })
}

/// Encode `value` as a varint. Used to build payloads in tests and tools.
pub fn write_varint(buf: &mut Vec<u8>, mut value: u64) {
    while value >= CONTINUATION as u64 {
        buf.push((value as u8 & !CONTINUATION) | CONTINUATION);
        value >>= 7;
    }
    buf.push(value as u8);
}

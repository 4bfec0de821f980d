//! Field keys and the skipper that steps over fields we don't decode.

use super::error::DecodeError;
use super::varint::read_varint;

/// Physical encoding of a field value (low 3 bits of the key).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireType {
    Varint,
    Fixed64,
    LengthDelimited,
    Fixed32,
    /// 3, 4 (groups), 6 and 7. Not supported by this format.
    Unknown(u8),
}

impl WireType {
    pub fn from_u8(v: u8) -> Self {
        match v & 0x07 {
            0 => Self::Varint,
            1 => Self::Fixed64,
            2 => Self::LengthDelimited,
            5 => Self::Fixed32,
            other => Self::Unknown(other),
        }
    }

    pub fn as_u8(&self) -> u8 {
        match *self {
            Self::Varint => 0,
            Self::Fixed64 => 1,
            Self::LengthDelimited => 2,
            Self::Fixed32 => 5,
            Self::Unknown(v) => v,
        }
    }
}

/// A decoded field key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag {
    pub field_number: u64,
    pub wire_type: WireType,
}

impl Tag {
    pub fn new(field_number: u64, wire_type: WireType) -> Self {
        Self {
            field_number,
            wire_type,
        }
    }

    /// Key value as it appears on the wire.
    pub fn key(&self) -> u64 {
        (self.field_number << 3) | self.wire_type.as_u8() as u64
    }
}

/// Read the field key at `offset`. Returns the tag and the bytes consumed.
///
/// Keys for field numbers up to 15 fit in a single byte; larger numbers
/// spill into a multi-byte varint, so the key is always read as a varint.
pub fn read_tag(buf: &[u8], offset: usize) -> Result<(Tag, usize), DecodeError> {
    let (key, consumed) = read_varint(buf, offset)?;
    let tag = Tag {
        field_number: key >> 3,
        wire_type: WireType::from_u8((key & 0x07) as u8),
    };
    Ok((tag, consumed))
}

/// Offset just past the value of a field whose key ended at `offset`.
///
/// Unknown wire types advance by exactly one byte. That keeps the decoder
/// moving, but the real value length is unknowable so the following bytes
/// are almost always misread; callers surface it as `UnknownWireType`.
pub fn skip_field(buf: &[u8], offset: usize, wire_type: WireType) -> Result<usize, DecodeError> {
    match wire_type {
        WireType::Varint => {
            let rest = buf.get(offset..).unwrap_or(&[]);
            match rest.iter().position(|b| b & 0x80 == 0) {
                Some(pos) => Ok(offset + pos + 1),
                None => Err(DecodeError::OutOfBounds {
                    offset,
                    needed: rest.len() + 1,
                    len: buf.len(),
                }),
            }
        }
        WireType::Fixed64 => advance(buf, offset, 8),
        WireType::LengthDelimited => length_delimited(buf, offset).map(|(_, end)| end),
        WireType::Fixed32 => advance(buf, offset, 4),
        WireType::Unknown(_) => advance(buf, offset, 1),
    }
}

/// Bounds of a length-prefixed value whose length varint starts at `offset`.
///
/// Returns `(start, end)` of the payload, both within `buf`.
pub fn length_delimited(buf: &[u8], offset: usize) -> Result<(usize, usize), DecodeError> {
    let (len, consumed) = read_varint(buf, offset)?;
    let start = offset + consumed;
    let len = usize::try_from(len).map_err(|_| DecodeError::OutOfBounds {
        offset: start,
        needed: usize::MAX,
        len: buf.len(),
    })?;
    let end = advance(buf, start, len)?;
    Ok((start, end))
}

/// `offset + n`, provided it does not run past the end of `buf`.
pub(crate) fn advance(buf: &[u8], offset: usize, n: usize) -> Result<usize, DecodeError> {
    match offset.checked_add(n) {
        Some(end) if end <= buf.len() => Ok(end),
        _ => Err(DecodeError::OutOfBounds {
            offset,
            needed: n,
            len: buf.len(),
        }),
    }
}

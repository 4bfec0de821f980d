//! Decoder for a single danmaku element message.

use serde::{Deserialize, Serialize};

use super::error::{DecodeError, DecodeStatus, Decoded};
use super::field::{length_delimited, read_tag, skip_field, WireType};
use super::varint::read_varint;

/// Field numbers of the element message.
#[allow(non_snake_case)]
pub mod ElemField {
    pub const ID: u64 = 1;
    /// Milliseconds into the video
    pub const PROGRESS: u64 = 2;
    pub const MODE: u64 = 3;
    pub const FONTSIZE: u64 = 4;
    pub const COLOR: u64 = 5;
    /// Hashed sender id
    pub const MID_HASH: u64 = 6;
    pub const CONTENT: u64 = 7;
    /// Unix seconds the comment was posted
    pub const CTIME: u64 = 8;
    pub const POOL: u64 = 11;
}

/// Which pool a comment was posted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DanmakuPool {
    Normal,
    Subtitle,
    /// Scripted/advanced comments; not plain text overlays
    Special,
    Other(u64),
}

impl DanmakuPool {
    pub fn from_u64(v: u64) -> Self {
        match v {
            0 => Self::Normal,
            1 => Self::Subtitle,
            2 => Self::Special,
            other => Self::Other(other),
        }
    }
}

/// One decoded comment. Fields absent from the payload stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DanmakuElement {
    pub id: Option<u64>,
    pub progress: Option<u64>,
    pub mode: Option<u64>,
    pub fontsize: Option<u64>,
    pub color: Option<u64>,
    pub mid_hash: Option<String>,
    pub content: Option<String>,
    pub ctime: Option<u64>,
    pub pool: Option<DanmakuPool>,
}

impl DanmakuElement {
    /// True when the element carries non-empty text.
    #[inline]
    pub fn has_content(&self) -> bool {
        self.content.as_deref().is_some_and(|c| !c.is_empty())
    }

    /// Playback offset in seconds.
    #[inline]
    pub fn time_secs(&self) -> Option<f64> {
        self.progress.map(|p| p as f64 / 1000.0)
    }

    #[inline]
    pub fn is_special(&self) -> bool {
        self.pool == Some(DanmakuPool::Special)
    }
}

/// Decode one element message.
///
/// Never fails: decoding stops at the first field that cannot be read or
/// skipped, and whatever was decoded up to that point is returned along
/// with the status describing why it stopped.
pub fn decode_element(buf: &[u8]) -> Decoded<DanmakuElement> {
    let mut elem = DanmakuElement::default();
    let mut status = DecodeStatus::Complete;
    let mut offset = 0;

    while offset < buf.len() {
        let (tag, consumed) = match read_tag(buf, offset) {
            Ok(t) => t,
            Err(e) => {
                status.keep_first(DecodeStatus::from_error(e));
                break;
            }
        };
        let at = offset + consumed;

        let next = match (tag.field_number, tag.wire_type) {
            (ElemField::ID, WireType::Varint) => read_u64(buf, at, &mut elem.id),
            (ElemField::PROGRESS, WireType::Varint) => read_u64(buf, at, &mut elem.progress),
            (ElemField::MODE, WireType::Varint) => read_u64(buf, at, &mut elem.mode),
            (ElemField::FONTSIZE, WireType::Varint) => read_u64(buf, at, &mut elem.fontsize),
            (ElemField::COLOR, WireType::Varint) => read_u64(buf, at, &mut elem.color),
            (ElemField::CTIME, WireType::Varint) => read_u64(buf, at, &mut elem.ctime),
            (ElemField::POOL, WireType::Varint) => read_varint(buf, at).map(|(v, n)| {
                elem.pool = Some(DanmakuPool::from_u64(v));
                at + n
            }),
            (ElemField::MID_HASH, WireType::LengthDelimited) => {
                read_text(buf, at, &mut elem.mid_hash)
            }
            (ElemField::CONTENT, WireType::LengthDelimited) => {
                read_text(buf, at, &mut elem.content)
            }
            (_, wire_type) => {
                if let WireType::Unknown(raw) = wire_type {
                    status.keep_first(DecodeStatus::Invalid(DecodeError::UnknownWireType {
                        offset,
                        wire_type: raw,
                    }));
                }
                skip_field(buf, at, wire_type)
            }
        };

        match next {
            Ok(n) => offset = n,
            Err(e) => {
                status.keep_first(DecodeStatus::from_error(e));
                break;
            }
        }
    }

    Decoded {
        value: elem,
        status,
    }
}

fn read_u64(buf: &[u8], at: usize, slot: &mut Option<u64>) -> Result<usize, DecodeError> {
    let (v, n) = read_varint(buf, at)?;
    *slot = Some(v);
    Ok(at + n)
}

/// Length-prefixed text. Invalid UTF-8 is replaced, never rejected; an empty
/// value leaves `slot` untouched.
fn read_text(buf: &[u8], at: usize, slot: &mut Option<String>) -> Result<usize, DecodeError> {
    let (start, end) = length_delimited(buf, at)?;
    if end > start {
        *slot = Some(String::from_utf8_lossy(&buf[start..end]).into_owned());
    }
    Ok(end)
}

//! Decoder for the top-level segment reply: a flat repeated list of elements.

use super::element::{decode_element, DanmakuElement};
use super::error::{DecodeError, DecodeStatus, Decoded};
use super::field::{length_delimited, read_tag, skip_field, WireType};

/// Field number of the repeated element list.
pub const ELEMS_FIELD: u64 = 1;

/// Decode a segment reply into the elements that carry text.
///
/// Elements without content are dropped. Any other top-level field is
/// skipped; the first field that cannot be skipped ends the pass and the
/// elements collected so far are returned. A problem inside an element that
/// was itself framed correctly is reported as `Invalid` with the offset
/// rebased onto this buffer; the element's partial fields are still kept.
pub fn decode_envelope(buf: &[u8]) -> Decoded<Vec<DanmakuElement>> {
    let mut elems = Vec::new();
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
            (ELEMS_FIELD, WireType::LengthDelimited) => {
                length_delimited(buf, at).map(|(start, end)| {
                    let decoded = decode_element(&buf[start..end]);
                    if let Some(err) = decoded.status.error() {
                        status.keep_first(DecodeStatus::Invalid(err.shifted(start)));
                    }
                    if decoded.value.has_content() {
                        elems.push(decoded.value);
                    }
                    end
                })
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
        value: elems,
        status,
    }
}

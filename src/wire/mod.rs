//! Danmaku Wire Decoder
//!
//! Minimal Protocol Buffers reader for segment replies served by the comment
//! history endpoint. Only the element list and the element fields we use are
//! decoded; everything else is skipped by wire type.
//!
//! The decoders never panic on wire data. They return a [`Decoded`] value
//! whose [`DecodeStatus`] says whether the pass was complete, cut short by a
//! truncated buffer, or stopped by structurally invalid bytes.

pub mod element;
pub mod envelope;
pub mod error;
pub mod field;
pub mod varint;

pub use element::{decode_element, DanmakuElement, DanmakuPool, ElemField};
pub use envelope::{decode_envelope, ELEMS_FIELD};
pub use error::{DecodeError, DecodeStatus, Decoded};
pub use field::{read_tag, skip_field, Tag, WireType};
pub use varint::{read_varint, write_varint, MAX_VARINT_BYTES};

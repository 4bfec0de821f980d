//! Decode errors and the partial-result envelope returned by the decoders.

/// Errors raised while walking a danmaku payload.
///
/// None of these are fatal to the caller: the element and envelope decoders
/// stop at the first one and hand back whatever they had already decoded.
/// Offsets are relative to the buffer being decoded at the point of failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// A read or skip would run past the end of the buffer.
    OutOfBounds { offset: usize, needed: usize, len: usize },
    /// The buffer ended before a varint's terminating byte.
    TruncatedVarint { offset: usize },
    /// A varint longer than 10 bytes, or one that overflows 64 bits.
    MalformedVarint { offset: usize },
    /// Wire type outside {0, 1, 2, 5}; skipped as a single byte.
    UnknownWireType { offset: usize, wire_type: u8 },
}

impl DecodeError {
    /// Byte offset where the problem was detected.
    pub fn offset(&self) -> usize {
        match *self {
            Self::OutOfBounds { offset, .. }
            | Self::TruncatedVarint { offset }
            | Self::MalformedVarint { offset }
            | Self::UnknownWireType { offset, .. } => offset,
        }
    }

    /// True when the input simply ended too early.
    pub fn is_truncation(&self) -> bool {
        matches!(self, Self::OutOfBounds { .. } | Self::TruncatedVarint { .. })
    }

    /// Re-base the offset onto an enclosing buffer.
    pub(crate) fn shifted(self, base: usize) -> Self {
        match self {
            Self::OutOfBounds { offset, needed, len } => Self::OutOfBounds {
                offset: offset.saturating_add(base),
                needed,
                len,
            },
            Self::TruncatedVarint { offset } => Self::TruncatedVarint {
                offset: offset.saturating_add(base),
            },
            Self::MalformedVarint { offset } => Self::MalformedVarint {
                offset: offset.saturating_add(base),
            },
            Self::UnknownWireType { offset, wire_type } => Self::UnknownWireType {
                offset: offset.saturating_add(base),
                wire_type,
            },
        }
    }
}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OutOfBounds { offset, needed, len } => write!(
                f,
                "out of bounds: {} bytes needed at offset {} (buffer length {})",
                needed, offset, len
            ),
            Self::TruncatedVarint { offset } => {
                write!(f, "truncated varint at offset {}", offset)
            }
            Self::MalformedVarint { offset } => {
                write!(f, "malformed varint at offset {}", offset)
            }
            Self::UnknownWireType { offset, wire_type } => {
                write!(f, "unknown wire type {} at offset {}", wire_type, offset)
            }
        }
    }
}

impl std::error::Error for DecodeError {}

/// How far a decode pass got.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeStatus {
    /// Every byte was accounted for.
    Complete,
    /// The buffer ended mid-field; the value holds everything before that point.
    Truncated(DecodeError),
    /// The bytes were structurally wrong (bad varint, unknown wire type,
    /// or a broken nested message).
    Invalid(DecodeError),
}

impl DecodeStatus {
    pub(crate) fn from_error(err: DecodeError) -> Self {
        if err.is_truncation() {
            Self::Truncated(err)
        } else {
            Self::Invalid(err)
        }
    }

    /// Record `next` unless an earlier problem is already on file; the first
    /// anomaly is the root cause of anything that follows it.
    pub(crate) fn keep_first(&mut self, next: DecodeStatus) {
        if self.is_complete() {
            *self = next;
        }
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }

    pub fn error(&self) -> Option<DecodeError> {
        match *self {
            Self::Complete => None,
            Self::Truncated(e) | Self::Invalid(e) => Some(e),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Truncated(_) => "truncated",
            Self::Invalid(_) => "invalid",
        }
    }
}

/// A decoded value plus the status of the pass that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded<T> {
    pub value: T,
    pub status: DecodeStatus,
}

impl<T> Decoded<T> {
    pub fn complete(value: T) -> Self {
        Self {
            value,
            status: DecodeStatus::Complete,
        }
    }

    pub fn into_value(self) -> T {
        self.value
    }
}

// Typed failure modes shared by every patch decoder.
//
// Decoders fail fast: on any error no partial target is returned.

use thiserror::Error;

/// Error returned by every patch decoder and by the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PatchError {
    /// Missing or incorrect magic bytes / header fields.
    #[error("malformed header: {0}")]
    MalformedHeader(String),

    /// A format feature this crate deliberately does not implement.
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),

    /// A source checksum disagrees with the one recorded in the patch.
    #[error("source checksum mismatch: expected {expected:#010X}, got {actual:#010X}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    /// A write would land outside the target buffer's capacity.
    #[error("write of {len} bytes at offset {offset:#X} exceeds target capacity {capacity:#X}")]
    BoundsViolation {
        offset: u64,
        len: u64,
        capacity: u64,
    },

    /// A read ran past the end of a buffer.
    #[error("truncated input: needed {needed} bytes at offset {offset:#X}, {available} available")]
    TruncatedInput {
        offset: u64,
        needed: u64,
        available: u64,
    },

    /// No decoder is registered for the given extension or name.
    #[error("unsupported patch format: {0:?}")]
    UnsupportedFormat(String),

    /// Structurally impossible content (bad address, length disagreement, overflow).
    #[error("invalid patch data: {0}")]
    InvalidData(String),
}

impl PatchError {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedHeader(msg.into())
    }

    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidData(msg.into())
    }

    pub(crate) fn truncated(offset: usize, needed: usize, available: usize) -> Self {
        Self::TruncatedInput {
            offset: offset as u64,
            needed: needed as u64,
            available: available as u64,
        }
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = PatchError> = std::result::Result<T, E>;

//! Error types for the message codec.

use thiserror::Error;

/// Errors raised while encoding or decoding a message body.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// The body is shorter than the two-byte header.
    #[error("message body truncated: {0} bytes")]
    Truncated(usize),

    /// The body exceeds the protocol's size limit.
    #[error("message body too large: {size} bytes (max {max})")]
    TooLarge {
        /// Actual size.
        size: usize,
        /// Allowed maximum.
        max: usize,
    },

    /// The peer speaks a different wire version.
    #[error("unsupported wire version {0}")]
    UnsupportedVersion(u8),

    /// The kind byte is `unknown` (0) or out of range.
    #[error("unknown message kind {0}")]
    UnknownKind(u8),

    /// The payload does not match the layout of its kind.
    #[error("malformed {kind} payload: {reason}")]
    MalformedPayload {
        /// Kind named in the header.
        kind: &'static str,
        /// What went wrong.
        reason: String,
    },
}

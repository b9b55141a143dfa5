//! Wire protocol errors.

use thiserror::Error;

/// Result type for wire operations.
pub type WireResult<T> = Result<T, WireError>;

/// Errors raised while framing or decoding messages.
#[derive(Debug, Error)]
pub enum WireError {
    /// The peer speaks a different protocol version.
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// Declared frame length exceeds the allowed maximum.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// Payload could not be (de)serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] postcard::Error),
}

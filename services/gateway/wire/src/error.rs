//! Wire protocol error types.

use thiserror::Error;

/// Wire protocol errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WireError {
    /// Frame layout violation (length or field out of range)
    #[error("malformed frame: {0}")]
    Malformed(&'static str),

    /// Payload does not fit into a single frame
    #[error("payload too large: {0} bytes")]
    PayloadTooLarge(usize),

    /// Unknown message kind
    #[error("unknown message kind {0}")]
    UnknownKind(u8),

    /// Invalid radio address
    #[error("invalid radio address: {0}")]
    Address(String),
}

//! Payload codecs between compact sensor payloads and structured bus messages.
//!
//! Every channel a node declares names a transform id. The transform turns the
//! bytes a node sends into a JSON message for the bus and turns bus messages
//! back into bytes for the node.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod registry;
pub mod transform;

pub use registry::TransformRegistry;
pub use transform::{Climate, SwitchState, Transform, TransformId};

use thiserror::Error;

/// Transform errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    /// No transform registered under this id
    #[error("unknown transform {0}")]
    UnknownTransform(TransformId),
    /// Payload too short for the codec
    #[error("{transform} payload needs {expected} bytes, got {actual}")]
    Payload {
        /// Transform name
        transform: &'static str,
        /// Bytes required
        expected: usize,
        /// Bytes received
        actual: usize,
    },
    /// Structured message does not fit the codec
    #[error("message does not fit transform: {0}")]
    Message(String),
}

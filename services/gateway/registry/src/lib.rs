//! Node identity, addressing and replay-window counters for the radio gateway.
//!
//! The registry maps 5-byte radio addresses to small gateway-assigned node
//! ids in `1..=254` and tracks, per node, the last accepted inbound sequence
//! counter and the next outbound one. Inbound frames are only accepted when
//! their counter lies in the ten values directly ahead of the last accepted
//! one, with modulo-65536 wraparound.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod registry;

pub use client::{Client, NodeId, MAX_NODE_ID, MIN_NODE_ID, REPLAY_WINDOW};
pub use registry::{ClientRegistry, Registration};

use thiserror::Error;

/// Registry errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// No live record for this node id
    #[error("unknown node {0}")]
    UnknownNode(NodeId),
    /// Counter outside the replay window
    #[error("replay rejected for node {node_id}: counter {counter}, last accepted {last}")]
    ReplayRejected {
        /// Node id
        node_id: NodeId,
        /// Received counter
        counter: u16,
        /// Last accepted counter
        last: u16,
    },
    /// Every node id in `1..=254` is taken
    #[error("registry exhausted: no free node id")]
    Exhausted,
}

//! Routing errors and their drop-reason labels

use crate::channel::ChannelId;
use gateway_bus::BusError;
use gateway_registry::{NodeId, RegistryError};
use gateway_transform::TransformError;
use gateway_wire::{MessageKind, WireError};
use thiserror::Error;

/// Why a frame or bus message was not routed
#[derive(Error, Debug)]
pub enum RouteError {
    /// Frame could not be decoded
    #[error(transparent)]
    Wire(#[from] WireError),
    /// Registry lookup or replay check failed
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// Transform lookup or conversion failed
    #[error(transparent)]
    Transform(#[from] TransformError),
    /// Bus operation failed
    #[error(transparent)]
    Bus(#[from] BusError),
    /// PUB on a channel the node never declared
    #[error("node {node_id} has no publish channel {channel_id}")]
    NoChannel {
        /// Node id
        node_id: NodeId,
        /// Channel id
        channel_id: ChannelId,
    },
    /// PUB from a node without any publish channel
    #[error("node {0} has no publish channels")]
    NoChannels(NodeId),
    /// Node sent a kind only the gateway may send
    #[error("unexpected {} frame from node {node_id}", .kind.as_str())]
    UnexpectedKind {
        /// Node id field of the frame
        node_id: NodeId,
        /// Message kind
        kind: MessageKind,
    },
}

impl RouteError {
    /// Stable label for statistics
    pub fn reason(&self) -> &'static str {
        match self {
            RouteError::Wire(WireError::Malformed(_)) => "malformed_frame",
            RouteError::Wire(WireError::PayloadTooLarge(_)) => "payload_too_large",
            RouteError::Wire(WireError::UnknownKind(_)) => "unknown_kind",
            RouteError::Wire(WireError::Address(_)) => "bad_address",
            RouteError::Registry(RegistryError::UnknownNode(_)) => "unknown_node",
            RouteError::Registry(RegistryError::ReplayRejected { .. }) => "replay_rejected",
            RouteError::Registry(RegistryError::Exhausted) => "registry_exhausted",
            RouteError::Transform(TransformError::UnknownTransform(_)) => "unknown_transform",
            RouteError::Transform(TransformError::Payload { .. }) => "transform_payload",
            RouteError::Transform(TransformError::Message(_)) => "transform_message",
            RouteError::Bus(BusError::Unavailable(_)) => "bus_unavailable",
            RouteError::Bus(BusError::UnknownQueue(_)) => "bus_unknown_queue",
            RouteError::Bus(BusError::UnknownExchange(_)) => "bus_unknown_exchange",
            RouteError::Bus(BusError::Serialization(_)) => "bus_serialization",
            RouteError::NoChannel { .. } => "no_channel",
            RouteError::NoChannels(_) => "no_channels",
            RouteError::UnexpectedKind { .. } => "unexpected_kind",
        }
    }

    /// Drops that look like ordinary packet loss and are only logged at debug
    pub fn is_silent(&self) -> bool {
        matches!(
            self,
            RouteError::Wire(WireError::Malformed(_))
                | RouteError::Wire(WireError::UnknownKind(_))
                | RouteError::Registry(RegistryError::UnknownNode(_))
                | RouteError::Registry(RegistryError::ReplayRejected { .. })
        )
    }

    /// Drops that mean the gateway cannot do its job
    pub fn is_fatal(&self) -> bool {
        matches!(self, RouteError::Registry(RegistryError::Exhausted))
    }
}

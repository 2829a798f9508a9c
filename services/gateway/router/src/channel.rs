//! Per-node publish and subscription channel tables

use crate::error::RouteError;
use gateway_bus::topic_matches;
use gateway_registry::NodeId;
use gateway_transform::{Transform, TransformId};
use gateway_wire::WireError;
use smallvec::SmallVec;
use std::collections::HashMap;

/// Node-local channel number
pub type ChannelId = u8;

/// Body of a PUB_CHANNEL or SUB_CHANNEL frame:
/// `channel_id(1) | transform_id(1) | routing_key(ascii, rest)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelDeclaration {
    /// Node-local channel number
    pub channel_id: ChannelId,
    /// Transform for the channel's payloads
    pub transform_id: TransformId,
    /// Bus routing key (or pattern, for subscriptions)
    pub routing_key: String,
}

impl ChannelDeclaration {
    /// Parse a declaration payload
    pub fn parse(payload: &[u8]) -> Result<Self, WireError> {
        let (header, key) = match payload {
            [channel_id, transform_id, key @ ..] => ((*channel_id, *transform_id), key),
            _ => return Err(WireError::Malformed("channel declaration shorter than header")),
        };
        if key.is_empty() {
            return Err(WireError::Malformed("channel declaration without routing key"));
        }
        if !key.is_ascii() {
            return Err(WireError::Malformed("routing key is not ascii"));
        }

        Ok(Self {
            channel_id: header.0,
            transform_id: header.1,
            routing_key: String::from_utf8_lossy(key).into_owned(),
        })
    }

    /// Encode the way a node sends it
    pub fn to_payload(&self) -> Vec<u8> {
        let mut payload = Vec::with_capacity(2 + self.routing_key.len());
        payload.push(self.channel_id);
        payload.push(self.transform_id);
        payload.extend_from_slice(self.routing_key.as_bytes());
        payload
    }
}

/// Where a node's publish channel goes on the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishBinding {
    /// Routing key to publish under
    pub routing_key: String,
    /// Payload codec
    pub transform: Transform,
}

/// Node channel fed by a bus routing key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionBinding {
    /// Receiving node
    pub node_id: NodeId,
    /// Channel on that node
    pub channel_id: ChannelId,
    /// Payload codec
    pub transform: Transform,
}

type Subscribers = SmallVec<[SubscriptionBinding; 4]>;

/// Publish and subscription bindings of all nodes
#[derive(Debug, Default)]
pub struct ChannelTable {
    publish: HashMap<NodeId, HashMap<ChannelId, PublishBinding>>,
    subscriptions: HashMap<String, Subscribers>,
}

impl ChannelTable {
    /// Create empty tables
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a publish channel, returning the binding it replaced
    pub fn bind_publish(
        &mut self,
        node_id: NodeId,
        channel_id: ChannelId,
        binding: PublishBinding,
    ) -> Option<PublishBinding> {
        self.publish
            .entry(node_id)
            .or_default()
            .insert(channel_id, binding)
    }

    /// Publish binding for a node's channel
    pub fn publish_binding(
        &self,
        node_id: NodeId,
        channel_id: ChannelId,
    ) -> Result<&PublishBinding, RouteError> {
        let channels = self
            .publish
            .get(&node_id)
            .filter(|channels| !channels.is_empty())
            .ok_or(RouteError::NoChannels(node_id))?;
        channels
            .get(&channel_id)
            .ok_or(RouteError::NoChannel {
                node_id,
                channel_id,
            })
    }

    /// Subscribe a node channel to a routing key.
    ///
    /// An existing subscription of the same node channel under the same key
    /// is replaced. Returns whether the key had no subscribers before.
    pub fn bind_subscription(&mut self, routing_key: &str, binding: SubscriptionBinding) -> bool {
        let subscribers = self.subscriptions.entry(routing_key.to_string()).or_default();
        let first = subscribers.is_empty();
        match subscribers
            .iter_mut()
            .find(|s| s.node_id == binding.node_id && s.channel_id == binding.channel_id)
        {
            Some(existing) => *existing = binding,
            None => subscribers.push(binding),
        }
        first
    }

    /// Subscriptions whose key pattern matches a delivered routing key
    pub fn subscribers_for(&self, routing_key: &str) -> Vec<SubscriptionBinding> {
        self.subscriptions
            .iter()
            .filter(|(pattern, _)| topic_matches(pattern, routing_key))
            .flat_map(|(_, subscribers)| subscribers.iter().copied())
            .collect()
    }

    /// Drop every binding owned by a node.
    ///
    /// Returns the number of publish and subscription bindings removed.
    pub fn clear_node(&mut self, node_id: NodeId) -> (usize, usize) {
        let published = self
            .publish
            .remove(&node_id)
            .map(|channels| channels.len())
            .unwrap_or(0);

        let mut subscribed = 0;
        self.subscriptions.retain(|_, subscribers| {
            let before = subscribers.len();
            subscribers.retain(|s| s.node_id != node_id);
            subscribed += before - subscribers.len();
            !subscribers.is_empty()
        });

        (published, subscribed)
    }

    /// Publish bindings of a node
    pub fn publish_count(&self, node_id: NodeId) -> usize {
        self.publish.get(&node_id).map(HashMap::len).unwrap_or(0)
    }

    /// Subscription bindings of a node
    pub fn subscription_count(&self, node_id: NodeId) -> usize {
        self.subscriptions
            .values()
            .flat_map(|subscribers| subscribers.iter())
            .filter(|s| s.node_id == node_id)
            .count()
    }
}

//! Topic-routed message bus for the radio gateway.
//!
//! The gateway talks to the rest of the automation system through a topic
//! exchange: it publishes sensor messages under routing keys and consumes a
//! queue bound to the keys its nodes subscribed to. Routing keys are
//! dot-separated words; binding patterns accept `*` (exactly one word) and
//! `#` (zero or more words).

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod backend;
pub mod topic;

pub use backend::mem::MemoryBus;
#[cfg(feature = "redis-bus")]
pub use backend::redis::RedisBus;
pub use topic::topic_matches;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::mpsc;

/// Bus errors
#[derive(Error, Debug)]
pub enum BusError {
    /// Broker unreachable or command failed
    #[error("bus unavailable: {0}")]
    Unavailable(String),
    /// Queue was never declared
    #[error("unknown queue: {0}")]
    UnknownQueue(String),
    /// Exchange was never declared
    #[error("unknown exchange: {0}")]
    UnknownExchange(String),
    /// Message body could not be (de)serialized
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Message handed to a queue consumer
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// Exchange the message was published to
    pub exchange: String,
    /// Routing key the message was published under
    pub routing_key: String,
    /// Message body
    pub message: Value,
}

/// Broker connection settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusConnection {
    /// Broker host
    pub host: String,
    /// Broker port
    pub port: u16,
    /// User name
    pub username: String,
    /// Password
    pub password: String,
    /// Virtual host (namespace for exchanges and queues)
    pub virtual_host: String,
}

impl Default for BusConnection {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5672,
            username: "gateway".to_string(),
            password: "gateway".to_string(),
            virtual_host: "/home-automation".to_string(),
        }
    }
}

/// Topic-routed publish/subscribe transport
#[async_trait]
pub trait Bus: Send + Sync {
    /// Declare a topic exchange (idempotent)
    async fn declare_topic_exchange(&self, name: &str) -> Result<(), BusError>;

    /// Declare a queue (idempotent)
    async fn declare_queue(&self, name: &str, auto_delete: bool) -> Result<(), BusError>;

    /// Bind a queue to an exchange under a routing key pattern (idempotent)
    async fn bind(&self, queue: &str, exchange: &str, routing_key: &str) -> Result<(), BusError>;

    /// Start delivering the queue's messages to `sink`
    async fn consume(
        &self,
        queue: &str,
        sink: mpsc::UnboundedSender<Delivery>,
    ) -> Result<(), BusError>;

    /// Publish a message. Unroutable messages are logged and dropped.
    async fn publish(&self, exchange: &str, routing_key: &str, message: &Value)
        -> Result<(), BusError>;
}

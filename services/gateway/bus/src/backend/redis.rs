//! Redis pub/sub bus backend.
//!
//! Redis has no exchanges or queues, so both are bookkeeping on the gateway
//! side. A publish goes to the channel `<virtual_host>:<exchange>:<routing_key>`
//! with a JSON body; a consumer pattern-subscribes to the virtual host and
//! filters deliveries against the queue's bindings locally.

use crate::{topic_matches, Bus, BusConnection, BusError, Delivery};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use futures::StreamExt;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

impl From<redis::RedisError> for BusError {
    fn from(e: redis::RedisError) -> Self {
        BusError::Unavailable(e.to_string())
    }
}

/// Redis pub/sub bus
#[derive(Clone)]
pub struct RedisBus {
    client: redis::Client,
    conn: ConnectionManager,
    namespace: String,
    exchanges: Arc<DashSet<String>>,
    /// queue -> (exchange, routing key pattern)
    bindings: Arc<DashMap<String, Vec<(String, String)>>>,
}

impl RedisBus {
    /// Connect to the broker
    pub async fn connect(settings: &BusConnection) -> Result<Self, BusError> {
        let url = connection_url(settings);
        let client = redis::Client::open(url.as_str())?;
        let conn = client.get_connection_manager().await?;

        info!(
            "Connected to redis bus at {}:{} (namespace {})",
            settings.host, settings.port, settings.virtual_host
        );

        Ok(Self {
            client,
            conn,
            namespace: settings.virtual_host.clone(),
            exchanges: Arc::new(DashSet::new()),
            bindings: Arc::new(DashMap::new()),
        })
    }

    fn channel(&self, exchange: &str, routing_key: &str) -> String {
        format!("{}:{}:{}", self.namespace, exchange, routing_key)
    }
}

fn connection_url(settings: &BusConnection) -> String {
    if settings.password.is_empty() {
        format!("redis://{}:{}/", settings.host, settings.port)
    } else {
        format!(
            "redis://{}:{}@{}:{}/",
            settings.username, settings.password, settings.host, settings.port
        )
    }
}

/// Split `<namespace>:<exchange>:<routing_key>` back into its parts
fn split_channel<'a>(namespace: &str, channel: &'a str) -> Option<(&'a str, &'a str)> {
    channel
        .strip_prefix(namespace)?
        .strip_prefix(':')?
        .split_once(':')
}

#[async_trait]
impl Bus for RedisBus {
    async fn declare_topic_exchange(&self, name: &str) -> Result<(), BusError> {
        self.exchanges.insert(name.to_string());
        Ok(())
    }

    async fn declare_queue(&self, name: &str, _auto_delete: bool) -> Result<(), BusError> {
        self.bindings.entry(name.to_string()).or_default();
        Ok(())
    }

    async fn bind(&self, queue: &str, exchange: &str, routing_key: &str) -> Result<(), BusError> {
        if !self.exchanges.contains(exchange) {
            return Err(BusError::UnknownExchange(exchange.to_string()));
        }
        let mut bindings = self
            .bindings
            .get_mut(queue)
            .ok_or_else(|| BusError::UnknownQueue(queue.to_string()))?;

        let binding = (exchange.to_string(), routing_key.to_string());
        if !bindings.contains(&binding) {
            debug!("Bound queue {} to {} with {}", queue, exchange, routing_key);
            bindings.push(binding);
        }
        Ok(())
    }

    async fn consume(
        &self,
        queue: &str,
        sink: mpsc::UnboundedSender<Delivery>,
    ) -> Result<(), BusError> {
        if !self.bindings.contains_key(queue) {
            return Err(BusError::UnknownQueue(queue.to_string()));
        }

        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.psubscribe(format!("{}:*", self.namespace)).await?;

        let namespace = self.namespace.clone();
        let bindings = self.bindings.clone();
        let queue = queue.to_string();

        tokio::spawn(async move {
            let mut messages = pubsub.into_on_message();
            while let Some(msg) = messages.next().await {
                let channel = msg.get_channel_name().to_string();
                let Some((exchange, routing_key)) = split_channel(&namespace, &channel) else {
                    continue;
                };

                let routed = bindings
                    .get(&queue)
                    .map(|b| {
                        b.iter()
                            .any(|(ex, pattern)| ex == exchange && topic_matches(pattern, routing_key))
                    })
                    .unwrap_or(false);
                if !routed {
                    continue;
                }

                let message = match msg
                    .get_payload::<String>()
                    .map_err(BusError::from)
                    .and_then(|body| serde_json::from_str::<Value>(&body).map_err(BusError::from))
                {
                    Ok(message) => message,
                    Err(e) => {
                        warn!("Dropping undecodable message on {}: {}", channel, e);
                        continue;
                    }
                };

                let delivery = Delivery {
                    exchange: exchange.to_string(),
                    routing_key: routing_key.to_string(),
                    message,
                };
                if sink.send(delivery).is_err() {
                    debug!("Consumer for queue {} closed", queue);
                    break;
                }
            }
        });

        Ok(())
    }

    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        message: &Value,
    ) -> Result<(), BusError> {
        if !self.exchanges.contains(exchange) {
            return Err(BusError::UnknownExchange(exchange.to_string()));
        }
        let body = serde_json::to_string(message)?;
        let mut conn = self.conn.clone();
        let receivers: i64 = conn.publish(self.channel(exchange, routing_key), body).await?;
        if receivers == 0 {
            debug!("Unroutable message on {} with key {}", exchange, routing_key);
        }
        Ok(())
    }
}

//! In-memory topic exchange for standalone runs and testing

use crate::{topic_matches, Bus, BusError, Delivery};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// Queue state
#[derive(Debug, Default)]
struct Queue {
    /// Remove the queue once its last consumer is gone
    auto_delete: bool,
    /// (exchange, routing key pattern)
    bindings: Vec<(String, String)>,
    /// Live consumers, served round-robin
    consumers: VecDeque<mpsc::UnboundedSender<Delivery>>,
    /// Messages routed before anyone consumed
    pending: VecDeque<Delivery>,
    /// Whether a consumer was ever attached
    consumed: bool,
}

impl Queue {
    /// Hand a delivery to the next live consumer, or keep it pending
    fn deliver(&mut self, mut delivery: Delivery) {
        while let Some(consumer) = self.consumers.pop_front() {
            match consumer.send(delivery) {
                Ok(()) => {
                    self.consumers.push_back(consumer);
                    return;
                }
                Err(mpsc::error::SendError(returned)) => delivery = returned,
            }
        }
        self.pending.push_back(delivery);
    }

    fn orphaned(&self) -> bool {
        self.auto_delete && self.consumed && self.consumers.iter().all(|c| c.is_closed())
    }
}

/// In-memory topic exchange
#[derive(Clone, Default)]
pub struct MemoryBus {
    exchanges: Arc<DashSet<String>>,
    queues: Arc<DashMap<String, Queue>>,
}

impl MemoryBus {
    /// Create an empty bus
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of messages waiting in a queue without a consumer
    pub fn pending(&self, queue: &str) -> usize {
        self.queues.get(queue).map(|q| q.pending.len()).unwrap_or(0)
    }

    /// Routing key patterns bound on a queue
    pub fn bindings(&self, queue: &str) -> Vec<(String, String)> {
        self.queues
            .get(queue)
            .map(|q| q.bindings.clone())
            .unwrap_or_default()
    }

    /// Whether a queue exists
    pub fn has_queue(&self, queue: &str) -> bool {
        self.queues.contains_key(queue)
    }
}

#[async_trait]
impl Bus for MemoryBus {
    async fn declare_topic_exchange(&self, name: &str) -> Result<(), BusError> {
        if self.exchanges.insert(name.to_string()) {
            debug!("Declared topic exchange {}", name);
        }
        Ok(())
    }

    async fn declare_queue(&self, name: &str, auto_delete: bool) -> Result<(), BusError> {
        self.queues.entry(name.to_string()).or_insert_with(|| {
            debug!("Declared queue {} (auto_delete={})", name, auto_delete);
            Queue {
                auto_delete,
                ..Queue::default()
            }
        });
        Ok(())
    }

    async fn bind(&self, queue: &str, exchange: &str, routing_key: &str) -> Result<(), BusError> {
        if !self.exchanges.contains(exchange) {
            return Err(BusError::UnknownExchange(exchange.to_string()));
        }
        let mut state = self
            .queues
            .get_mut(queue)
            .ok_or_else(|| BusError::UnknownQueue(queue.to_string()))?;

        let binding = (exchange.to_string(), routing_key.to_string());
        if !state.bindings.contains(&binding) {
            debug!("Bound queue {} to {} with {}", queue, exchange, routing_key);
            state.bindings.push(binding);
        }
        Ok(())
    }

    async fn consume(
        &self,
        queue: &str,
        sink: mpsc::UnboundedSender<Delivery>,
    ) -> Result<(), BusError> {
        let mut state = self
            .queues
            .get_mut(queue)
            .ok_or_else(|| BusError::UnknownQueue(queue.to_string()))?;

        state.consumed = true;
        state.consumers.push_back(sink);
        while let Some(delivery) = state.pending.pop_front() {
            if state.consumers.is_empty() {
                state.pending.push_front(delivery);
                break;
            }
            state.deliver(delivery);
        }
        debug!("Consumer attached to queue {}", queue);
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

        let mut routed = 0usize;
        let mut orphaned = Vec::new();

        for mut entry in self.queues.iter_mut() {
            let matched = entry
                .bindings
                .iter()
                .any(|(ex, pattern)| ex == exchange && topic_matches(pattern, routing_key));
            if !matched {
                continue;
            }

            entry.deliver(Delivery {
                exchange: exchange.to_string(),
                routing_key: routing_key.to_string(),
                message: message.clone(),
            });
            routed += 1;

            if entry.orphaned() {
                orphaned.push(entry.key().clone());
            }
        }

        for name in orphaned {
            debug!("Deleting auto-delete queue {} without consumers", name);
            self.queues.remove(&name);
        }

        if routed == 0 {
            debug!("Unroutable message on {} with key {}", exchange, routing_key);
        }
        Ok(())
    }
}

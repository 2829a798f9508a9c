//! Router statistics

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Router counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterStats {
    /// Raw frames handed to the router
    pub frames_received: u64,
    /// Frames handled without error
    pub frames_dispatched: u64,
    /// Registrations accepted (new and returning nodes)
    pub registrations: u64,
    /// Messages published on the bus
    pub messages_published: u64,
    /// Bus deliveries received
    pub deliveries_received: u64,
    /// Frames queued for the radio transmitter
    pub frames_queued: u64,
    /// Frames or deliveries dropped
    pub dropped: u64,
    /// Breakdown of drop reasons
    pub drop_reasons: HashMap<String, u64>,
}

impl RouterStats {
    /// Create zeroed statistics
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one drop under `reason`
    pub fn record_drop(&mut self, reason: &str) {
        self.dropped += 1;
        *self.drop_reasons.entry(reason.to_string()).or_insert(0) += 1;
    }

    /// Drops recorded under `reason`
    pub fn drops(&self, reason: &str) -> u64 {
        self.drop_reasons.get(reason).copied().unwrap_or(0)
    }
}

//! Per-node record kept by the registry

use gateway_wire::RadioAddress;
use serde::{Deserialize, Serialize};

/// Gateway-assigned node id
pub type NodeId = u8;

/// Lowest assignable node id (0 means unassigned)
pub const MIN_NODE_ID: NodeId = 1;

/// Highest assignable node id (255 is reserved)
pub const MAX_NODE_ID: NodeId = 254;

/// Number of sequence values accepted ahead of the last accepted counter
pub const REPLAY_WINDOW: u16 = 10;

/// Identity and counter state of one radio node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    /// Assigned node id
    pub node_id: NodeId,
    /// Radio address the node listens on
    pub address: RadioAddress,
    /// Last accepted counter from the node
    pub inbound_counter: u16,
    /// Next counter the gateway sends to the node
    pub outbound_counter: u16,
}

impl Client {
    /// Create a record for a node whose first frame carries `counter`.
    ///
    /// The baseline is set one below `counter` so that frame is in window.
    pub fn new(node_id: NodeId, address: RadioAddress, counter: u16, outbound_counter: u16) -> Self {
        Self {
            node_id,
            address,
            inbound_counter: counter.wrapping_sub(1),
            outbound_counter,
        }
    }

    /// Whether `counter` is one of the next [`REPLAY_WINDOW`] values
    pub fn in_window(&self, counter: u16) -> bool {
        let ahead = counter.wrapping_sub(self.inbound_counter);
        (1..=REPLAY_WINDOW).contains(&ahead)
    }

    /// Return the next outbound counter and advance it
    pub fn take_outbound_counter(&mut self) -> u16 {
        let counter = self.outbound_counter;
        self.outbound_counter = self.outbound_counter.wrapping_add(1);
        counter
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(inbound: u16) -> Client {
        let mut c = Client::new(1, RadioAddress::new([1, 2, 3, 4, 5]), 0, 0);
        c.inbound_counter = inbound;
        c
    }

    #[test]
    fn test_window_bounds() {
        let c = client(100);
        assert!(!c.in_window(100));
        assert!(c.in_window(101));
        assert!(c.in_window(110));
        assert!(!c.in_window(111));
        assert!(!c.in_window(99));
    }

    #[test]
    fn test_window_wraps() {
        let c = client(65533);
        for counter in [65534, 65535, 0, 1, 2, 3, 4, 5, 6, 7] {
            assert!(c.in_window(counter), "counter {counter}");
        }
        for counter in [65533, 8, 9, 10, 100] {
            assert!(!c.in_window(counter), "counter {counter}");
        }
    }

    #[test]
    fn test_baseline_wraps_below_zero() {
        let c = Client::new(1, RadioAddress::new([0; 5]), 0, 0);
        assert_eq!(c.inbound_counter, 65535);
        assert!(c.in_window(0));
    }

    #[test]
    fn test_outbound_counter_wraps() {
        let mut c = Client::new(1, RadioAddress::new([0; 5]), 0, 65535);
        assert_eq!(c.take_outbound_counter(), 65535);
        assert_eq!(c.take_outbound_counter(), 0);
        assert_eq!(c.outbound_counter, 1);
    }
}

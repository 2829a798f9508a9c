//! Client registry with lowest-free id allocation and replay checks

use crate::client::{Client, NodeId, MAX_NODE_ID, MIN_NODE_ID};
use crate::RegistryError;
use gateway_wire::RadioAddress;
use rand::Rng;
use std::collections::HashMap;
use tracing::{debug, info};

/// Outcome of a registration lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    /// Node id owned by the address
    pub node_id: NodeId,
    /// Whether a new record was created
    pub created: bool,
}

/// Registry of live radio nodes.
///
/// Records are stored densely by node id; a second index maps addresses back
/// to ids so both lookups are O(1).
#[derive(Debug, Clone)]
pub struct ClientRegistry {
    /// Records indexed by node id (slot 0 and 255 stay empty)
    clients: Vec<Option<Client>>,
    /// Address -> node id
    by_address: HashMap<RadioAddress, NodeId>,
}

impl ClientRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            clients: vec![None; NodeId::MAX as usize + 1],
            by_address: HashMap::new(),
        }
    }

    /// Resolve the node id owned by `address`, registering it if needed.
    ///
    /// A known address keeps its id and counters untouched. A new address
    /// gets the lowest free id, an inbound baseline of `counter - 1` and a
    /// random outbound counter.
    pub fn resolve_or_register(
        &mut self,
        address: RadioAddress,
        counter: u16,
    ) -> Result<Registration, RegistryError> {
        if let Some(&node_id) = self.by_address.get(&address) {
            debug!("Address {} already registered as node {}", address, node_id);
            return Ok(Registration {
                node_id,
                created: false,
            });
        }

        let node_id = self.lowest_free_id().ok_or(RegistryError::Exhausted)?;
        let outbound = rand::thread_rng().gen::<u16>();
        self.insert(Client::new(node_id, address, counter, outbound));

        info!(
            "Registered node {} for address {} (baseline counter {})",
            node_id,
            address,
            counter.wrapping_sub(1)
        );

        Ok(Registration {
            node_id,
            created: true,
        })
    }

    /// Start a fresh session for a known node.
    ///
    /// The inbound baseline becomes `counter - 1` and the outbound counter is
    /// re-randomized; id and address are kept. Any REGISTER that decrypts
    /// under the preshared key is trusted to do this, replayed ones included.
    pub fn restart_session(&mut self, node_id: NodeId, counter: u16) -> Result<(), RegistryError> {
        let client = self
            .get_mut(node_id)
            .ok_or(RegistryError::UnknownNode(node_id))?;
        client.inbound_counter = counter.wrapping_sub(1);
        client.outbound_counter = rand::thread_rng().gen::<u16>();
        debug!("Restarted session for node {} at counter {}", node_id, counter);
        Ok(())
    }

    /// Validate `counter` against the node's replay window and advance it
    pub fn check(&mut self, node_id: NodeId, counter: u16) -> Result<(), RegistryError> {
        let client = self
            .get_mut(node_id)
            .ok_or(RegistryError::UnknownNode(node_id))?;

        if !client.in_window(counter) {
            return Err(RegistryError::ReplayRejected {
                node_id,
                counter,
                last: client.inbound_counter,
            });
        }

        client.inbound_counter = counter;
        Ok(())
    }

    /// Accept `counter` for `node_id` if it is new and within the window
    pub fn accept(&mut self, node_id: NodeId, counter: u16) -> bool {
        self.check(node_id, counter).is_ok()
    }

    /// Return the node's next outbound counter and advance it
    pub fn next_outbound_counter(&mut self, node_id: NodeId) -> Result<u16, RegistryError> {
        self.get_mut(node_id)
            .map(Client::take_outbound_counter)
            .ok_or(RegistryError::UnknownNode(node_id))
    }

    /// Look up a node record
    pub fn get(&self, node_id: NodeId) -> Option<&Client> {
        self.clients.get(node_id as usize).and_then(Option::as_ref)
    }

    /// Radio address of a node
    pub fn address_of(&self, node_id: NodeId) -> Option<RadioAddress> {
        self.get(node_id).map(|client| client.address)
    }

    /// Node id owned by an address
    pub fn node_for_address(&self, address: &RadioAddress) -> Option<NodeId> {
        self.by_address.get(address).copied()
    }

    /// Number of live nodes
    pub fn len(&self) -> usize {
        self.by_address.len()
    }

    /// Whether no node is registered
    pub fn is_empty(&self) -> bool {
        self.by_address.is_empty()
    }

    /// Iterate over live nodes in id order
    pub fn iter(&self) -> impl Iterator<Item = &Client> {
        self.clients.iter().filter_map(Option::as_ref)
    }

    /// Store a record, evicting whatever previously held its id
    fn insert(&mut self, client: Client) {
        let slot = client.node_id as usize;
        if let Some(previous) = self.clients[slot].take() {
            debug!(
                "Evicting node {} (address {}) for address {}",
                previous.node_id, previous.address, client.address
            );
            self.by_address.remove(&previous.address);
        }
        self.by_address.insert(client.address, client.node_id);
        self.clients[slot] = Some(client);
    }

    fn get_mut(&mut self, node_id: NodeId) -> Option<&mut Client> {
        self.clients.get_mut(node_id as usize).and_then(Option::as_mut)
    }

    fn lowest_free_id(&self) -> Option<NodeId> {
        (MIN_NODE_ID..=MAX_NODE_ID).find(|&id| self.clients[id as usize].is_none())
    }
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

//! Radio addresses and outbound frame envelopes.

use crate::error::WireError;
use crate::frame::{MessageKind, RawFrame};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Radio address size in bytes
pub const ADDRESS_SIZE: usize = 5;

/// 5-byte radio pipe address, most significant byte first
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RadioAddress(pub [u8; ADDRESS_SIZE]);

impl RadioAddress {
    /// Create an address from its bytes
    pub const fn new(bytes: [u8; ADDRESS_SIZE]) -> Self {
        Self(bytes)
    }

    /// Parse the address carried in a REGISTER payload.
    ///
    /// Nodes send their 64-bit pipe address little-endian, so the five
    /// significant bytes arrive lowest first and are reversed here.
    pub fn from_registration(payload: &[u8]) -> Result<Self, WireError> {
        if payload.len() < ADDRESS_SIZE {
            return Err(WireError::Malformed("registration payload shorter than address"));
        }
        let mut bytes = [0u8; ADDRESS_SIZE];
        for (dst, src) in bytes.iter_mut().zip(payload[..ADDRESS_SIZE].iter().rev()) {
            *dst = *src;
        }
        Ok(Self(bytes))
    }

    /// Encode the address the way a node puts it into a REGISTER payload
    pub fn to_registration(self) -> [u8; ADDRESS_SIZE] {
        let mut bytes = self.0;
        bytes.reverse();
        bytes
    }

    /// Address bytes
    pub fn as_bytes(&self) -> &[u8; ADDRESS_SIZE] {
        &self.0
    }
}

impl fmt::Display for RadioAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl FromStr for RadioAddress {
    type Err = WireError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim().trim_start_matches("0x");
        let decoded = hex::decode(raw).map_err(|e| WireError::Address(e.to_string()))?;
        let bytes: [u8; ADDRESS_SIZE] = decoded
            .try_into()
            .map_err(|_| WireError::Address(format!("expected {} bytes: {}", ADDRESS_SIZE, s)))?;
        Ok(Self(bytes))
    }
}

/// Encrypted frame queued for transmission to a node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundFrame {
    /// Destination node id (for logging; not written on the wire)
    pub node_id: u8,
    /// Destination radio address
    pub address: RadioAddress,
    /// Message kind carried by the frame
    pub kind: MessageKind,
    /// Ciphertext ready for the radio
    pub frame: RawFrame,
}

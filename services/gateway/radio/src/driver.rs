//! Radio driver interface and peripheral configuration

use crate::RadioError;
use async_trait::async_trait;
use bitflags::bitflags;
use bytes::BufMut;
use gateway_wire::{RadioAddress, RawFrame, FRAME_SIZE};
use serde::{Deserialize, Serialize};

/// Reading pipe the gateway listens on
pub const GATEWAY_PIPE: u8 = 1;

/// Air data rate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataRate {
    /// 250 kbit/s
    #[serde(rename = "250kbps")]
    Kbps250,
    /// 1 Mbit/s
    #[serde(rename = "1mbps")]
    Mbps1,
    /// 2 Mbit/s
    #[serde(rename = "2mbps")]
    Mbps2,
}

/// Power amplifier level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerLevel {
    /// -18 dBm
    Min,
    /// -12 dBm
    Low,
    /// -6 dBm
    High,
    /// 0 dBm
    Max,
}

/// CRC length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrcLength {
    /// No CRC
    Disabled,
    /// 8-bit CRC
    Crc8,
    /// 16-bit CRC
    Crc16,
}

bitflags! {
    /// Optional link-layer features
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct RadioFeatures: u8 {
        /// Hardware auto-acknowledgement
        const AUTO_ACK = 0b0000_0001;
        /// Custom payloads on acknowledgements
        const ACK_PAYLOAD = 0b0000_0010;
    }
}

/// Automatic retransmission settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Retries {
    /// Delay between retries in steps of 250 us (0..=15)
    pub delay: u8,
    /// Number of retries (0..=15)
    pub count: u8,
}

impl Default for Retries {
    fn default() -> Self {
        Self {
            delay: 15,
            count: 15,
        }
    }
}

/// Peripheral configuration applied at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RadioConfig {
    /// Gateway pipe address
    pub address: RadioAddress,
    /// RF channel
    pub channel: u8,
    /// Air data rate
    pub data_rate: DataRate,
    /// Power amplifier level
    pub power: PowerLevel,
    /// CRC length
    pub crc: CrcLength,
    /// Link-layer features
    pub features: RadioFeatures,
    /// Retransmission settings
    pub retries: Retries,
    /// Static payload size
    pub payload_size: u8,
}

impl Default for RadioConfig {
    fn default() -> Self {
        Self {
            address: RadioAddress::new([0xf0, 0xf0, 0xf0, 0xf0, 0xe1]),
            channel: 0x4c,
            data_rate: DataRate::Mbps1,
            power: PowerLevel::High,
            crc: CrcLength::Crc16,
            features: RadioFeatures::AUTO_ACK | RadioFeatures::ACK_PAYLOAD,
            retries: Retries::default(),
            payload_size: FRAME_SIZE as u8,
        }
    }
}

impl RadioConfig {
    /// Size of [`RadioConfig::encode`] output
    pub const ENCODED_SIZE: usize = 12;

    /// Compact encoding for radio bridges:
    /// `address(5) | channel | rate | power | crc | features | retries | payload_size`
    /// with retries packed as `delay << 4 | count`.
    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_slice(self.address.as_bytes());
        buf.put_u8(self.channel);
        buf.put_u8(self.data_rate as u8);
        buf.put_u8(self.power as u8);
        buf.put_u8(self.crc as u8);
        buf.put_u8(self.features.bits());
        buf.put_u8(((self.retries.delay & 0x0F) << 4) | (self.retries.count & 0x0F));
        buf.put_u8(self.payload_size);
    }
}

/// Radio peripheral.
///
/// Mirrors the primitives of an nRF24-class transceiver. Implementations are
/// driven from a single task at a time (see [`RadioLink`](crate::RadioLink)).
#[async_trait]
pub trait RadioDriver: Send + 'static {
    /// Apply channel, address, rate, power and link settings
    async fn configure(&mut self, config: &RadioConfig) -> Result<(), RadioError>;

    /// Whether a received frame is waiting
    async fn available(&mut self) -> Result<bool, RadioError>;

    /// Take the next received frame
    async fn read(&mut self) -> Result<RawFrame, RadioError>;

    /// Send a frame to the writing pipe; `Ok(false)` when not acknowledged
    async fn write(&mut self, frame: &RawFrame) -> Result<bool, RadioError>;

    /// Load the payload returned with the next acknowledgement on `pipe`
    async fn write_ack_payload(&mut self, pipe: u8, payload: &[u8]) -> Result<(), RadioError>;

    /// Open a reading pipe on `address`
    async fn open_reading_pipe(&mut self, pipe: u8, address: RadioAddress)
        -> Result<(), RadioError>;

    /// Direct subsequent writes at `address`
    async fn open_writing_pipe(&mut self, address: RadioAddress) -> Result<(), RadioError>;

    /// Enter receive mode
    async fn start_listening(&mut self) -> Result<(), RadioError>;

    /// Leave receive mode
    async fn stop_listening(&mut self) -> Result<(), RadioError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_matches_deployment() {
        let config = RadioConfig::default();
        assert_eq!(config.address.to_string(), "f0f0f0f0e1");
        assert_eq!(config.channel, 0x4c);
        assert!(config.features.contains(RadioFeatures::AUTO_ACK));
        assert!(config.features.contains(RadioFeatures::ACK_PAYLOAD));
        assert_eq!(config.payload_size, 32);
    }

    #[test]
    fn test_encode() {
        let mut buf = Vec::new();
        RadioConfig::default().encode(&mut buf);
        assert_eq!(buf.len(), RadioConfig::ENCODED_SIZE);
        assert_eq!(
            buf,
            vec![0xf0, 0xf0, 0xf0, 0xf0, 0xe1, 0x4c, 1, 2, 2, 0b11, 0xFF, 32]
        );
    }

    #[test]
    fn test_serde_names() {
        assert_eq!(
            serde_json::from_str::<DataRate>("\"1mbps\"").unwrap(),
            DataRate::Mbps1
        );
        assert_eq!(
            serde_json::from_str::<PowerLevel>("\"high\"").unwrap(),
            PowerLevel::High
        );
        assert_eq!(
            serde_json::from_str::<CrcLength>("\"crc16\"").unwrap(),
            CrcLength::Crc16
        );
    }
}

//! Configuration handling for the gateway.
//!
//! Settings come from a YAML file, then from `GATEWAY_*` environment
//! variables, then from command-line flags (applied in `main`).

use anyhow::{bail, Context, Result};
use gateway_bus::BusConnection;
use gateway_radio::{CrcLength, DataRate, PowerLevel, RadioConfig, RadioFeatures, Retries};
use gateway_router::IDENTITY_SIZE;
use gateway_wire::{RadioAddress, FRAME_SIZE, KEY_SIZE};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Gateway configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Keys, identity and timing
    pub gateway: GatewaySection,
    /// Radio peripheral and bridge
    pub radio: RadioSection,
    /// Message bus
    pub bus: BusSection,
}

/// Keys, identity and timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewaySection {
    /// 16-byte preshared key, hex encoded
    pub preshared_key: String,
    /// 7-byte gateway identity, hex encoded; random when unset
    pub identity: Option<String>,
    /// Idle time between radio polls
    pub poll_interval_ms: u64,
    /// Wait before answering a registration
    pub register_ack_delay_ms: u64,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            preshared_key: String::new(),
            identity: None,
            poll_interval_ms: 40,
            register_ack_delay_ms: 20,
        }
    }
}

/// Radio peripheral and bridge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RadioSection {
    /// Gateway pipe address, hex encoded
    pub address: String,
    /// RF channel
    pub channel: u8,
    /// Air data rate
    pub data_rate: DataRate,
    /// Power amplifier level
    pub power: PowerLevel,
    /// CRC length
    pub crc: CrcLength,
    /// Hardware auto-acknowledgement
    pub auto_ack: bool,
    /// Retransmission settings
    pub retries: Retries,
    /// Radio bridge address
    pub bridge: SocketAddr,
    /// Local address for the bridge socket
    pub bind: SocketAddr,
    /// How long to wait for the bridge to report a transmit result
    pub reply_timeout_ms: u64,
}

impl Default for RadioSection {
    fn default() -> Self {
        Self {
            address: "f0f0f0f0e1".to_string(),
            channel: 0x4c,
            data_rate: DataRate::Mbps1,
            power: PowerLevel::High,
            crc: CrcLength::Crc16,
            auto_ack: true,
            retries: Retries::default(),
            bridge: SocketAddr::from(([127, 0, 0, 1], 7400)),
            bind: SocketAddr::from(([0, 0, 0, 0], 7401)),
            reply_timeout_ms: 200,
        }
    }
}

/// Bus backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BusBackend {
    /// In-process topic exchange
    Memory,
    /// Redis pub/sub (requires the `redis-bus` feature)
    Redis,
}

impl std::str::FromStr for BusBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "memory" => Ok(BusBackend::Memory),
            "redis" => Ok(BusBackend::Redis),
            other => bail!("unknown bus backend: {}", other),
        }
    }
}

/// Message bus
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BusSection {
    /// Backend to use
    pub backend: BusBackend,
    /// Broker connection
    #[serde(flatten)]
    pub connection: BusConnection,
    /// Topic exchange for sensor messages
    pub exchange: String,
    /// Queue receiving messages for subscribed channels
    pub queue: String,
}

impl Default for BusSection {
    fn default() -> Self {
        Self {
            backend: BusBackend::Memory,
            connection: BusConnection::default(),
            exchange: "gateway.exchange".to_string(),
            queue: "gateway.queue".to_string(),
        }
    }
}

impl GatewayConfig {
    /// Load configuration from file and environment variables
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let path = config_path.as_ref();
        let mut config = match std::fs::read_to_string(path) {
            Ok(content) => match serde_yaml::from_str::<GatewayConfig>(&content) {
                Ok(config) => {
                    info!("Loaded configuration from {:?}", path);
                    config
                }
                Err(e) => {
                    warn!("Failed to parse config file {:?} ({}), using defaults", path, e);
                    Self::default()
                }
            },
            Err(_) => {
                warn!("Config file {:?} not found, using defaults", path);
                Self::default()
            }
        };

        config.apply_overrides(|name| std::env::var(name).ok());

        info!(
            "Final gateway configuration: radio={} channel={:#04x} bridge={} bus={:?} {}:{}",
            config.radio.address,
            config.radio.channel,
            config.radio.bridge,
            config.bus.backend,
            config.bus.connection.host,
            config.bus.connection.port
        );

        Ok(config)
    }

    /// Apply `GATEWAY_*` overrides looked up through `var`
    pub fn apply_overrides<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = var("GATEWAY_PRESHARED_KEY") {
            self.gateway.preshared_key = key;
            info!("Preshared key overridden by environment");
        }

        if let Some(bridge) = var("GATEWAY_RADIO_BRIDGE") {
            match bridge.parse() {
                Ok(addr) => {
                    self.radio.bridge = addr;
                    info!("Radio bridge overridden by environment: {}", addr);
                }
                Err(e) => warn!("Ignoring GATEWAY_RADIO_BRIDGE={}: {}", bridge, e),
            }
        }

        if let Some(host) = var("GATEWAY_BUS_HOST") {
            info!("Bus host overridden by environment: {}", host);
            self.bus.connection.host = host;
        }

        if let Some(port) = var("GATEWAY_BUS_PORT") {
            match port.parse::<u16>() {
                Ok(port) => {
                    self.bus.connection.port = port;
                    info!("Bus port overridden by environment: {}", port);
                }
                Err(e) => warn!("Ignoring GATEWAY_BUS_PORT={}: {}", port, e),
            }
        }

        if let Some(backend) = var("GATEWAY_BUS_BACKEND") {
            match backend.parse::<BusBackend>() {
                Ok(backend) => {
                    self.bus.backend = backend;
                    info!("Bus backend overridden by environment: {:?}", backend);
                }
                Err(e) => warn!("Ignoring GATEWAY_BUS_BACKEND: {}", e),
            }
        }
    }

    /// Decoded preshared key
    pub fn preshared_key(&self) -> Result<[u8; KEY_SIZE]> {
        if self.gateway.preshared_key.is_empty() {
            bail!("no preshared key configured (gateway.preshared_key or GATEWAY_PRESHARED_KEY)");
        }
        decode_hex(&self.gateway.preshared_key).context("invalid preshared key")
    }

    /// Gateway identity, generated randomly when not configured
    pub fn identity(&self) -> Result<[u8; IDENTITY_SIZE]> {
        match &self.gateway.identity {
            Some(hex) => decode_hex(hex).context("invalid gateway identity"),
            None => {
                let mut identity = [0u8; IDENTITY_SIZE];
                rand::thread_rng().fill_bytes(&mut identity);
                Ok(identity)
            }
        }
    }

    /// Peripheral configuration
    pub fn radio_config(&self) -> Result<RadioConfig> {
        let address: RadioAddress = self
            .radio
            .address
            .parse()
            .context("invalid radio address")?;

        let mut features = RadioFeatures::ACK_PAYLOAD;
        if self.radio.auto_ack {
            features |= RadioFeatures::AUTO_ACK;
        }

        Ok(RadioConfig {
            address,
            channel: self.radio.channel,
            data_rate: self.radio.data_rate,
            power: self.radio.power,
            crc: self.radio.crc,
            features,
            retries: self.radio.retries,
            payload_size: FRAME_SIZE as u8,
        })
    }

    /// Idle time between radio polls
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.gateway.poll_interval_ms)
    }

    /// Wait before answering a registration
    pub fn register_ack_delay(&self) -> Duration {
        Duration::from_millis(self.gateway.register_ack_delay_ms)
    }

    /// Bridge transmit-result timeout
    pub fn reply_timeout(&self) -> Duration {
        Duration::from_millis(self.radio.reply_timeout_ms)
    }
}

fn decode_hex<const N: usize>(value: &str) -> Result<[u8; N]> {
    let bytes = hex::decode(value.trim()).context("not hex")?;
    let len = bytes.len();
    bytes
        .try_into()
        .map_err(|_| anyhow::anyhow!("expected {} bytes, got {}", N, len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = GatewayConfig::default();
        assert_eq!(config.gateway.poll_interval_ms, 40);
        assert_eq!(config.gateway.register_ack_delay_ms, 20);
        assert_eq!(config.radio.channel, 0x4c);
        assert_eq!(config.bus.connection.virtual_host, "/home-automation");
        assert_eq!(config.bus.exchange, "gateway.exchange");
        assert_eq!(config.bus.queue, "gateway.queue");

        let radio = config.radio_config().unwrap();
        assert_eq!(radio, RadioConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let yaml_content = r#"
gateway:
  preshared_key: "197b5aaec6912821625a5a6f4e41b8bc"
  identity: "01020304050607"
  poll_interval_ms: 25

radio:
  address: "f0f0f0f0d2"
  channel: 100
  data_rate: 250kbps
  power: max
  auto_ack: false
  bridge: "10.0.0.5:7400"

bus:
  backend: redis
  host: broker.local
  port: 6379
  exchange: sensors
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(yaml_content.as_bytes()).unwrap();

        let config = GatewayConfig::load_from_file(temp_file.path()).unwrap();

        assert_eq!(
            config.preshared_key().unwrap(),
            [25, 123, 90, 174, 198, 145, 40, 33, 98, 90, 90, 111, 78, 65, 184, 188]
        );
        assert_eq!(config.identity().unwrap(), [1, 2, 3, 4, 5, 6, 7]);
        assert_eq!(config.poll_interval(), Duration::from_millis(25));
        assert_eq!(config.register_ack_delay(), Duration::from_millis(20));

        let radio = config.radio_config().unwrap();
        assert_eq!(radio.address, RadioAddress::new([0xf0, 0xf0, 0xf0, 0xf0, 0xd2]));
        assert_eq!(radio.channel, 100);
        assert_eq!(radio.data_rate, DataRate::Kbps250);
        assert_eq!(radio.power, PowerLevel::Max);
        assert!(!radio.features.contains(RadioFeatures::AUTO_ACK));
        assert_eq!(config.radio.bridge, "10.0.0.5:7400".parse().unwrap());

        assert_eq!(config.bus.backend, BusBackend::Redis);
        assert_eq!(config.bus.connection.host, "broker.local");
        assert_eq!(config.bus.connection.port, 6379);
        assert_eq!(config.bus.connection.username, "gateway");
        assert_eq!(config.bus.exchange, "sensors");
        assert_eq!(config.bus.queue, "gateway.queue");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = GatewayConfig::load_from_file(dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config.gateway.poll_interval_ms, 40);
        assert_eq!(config.radio.channel, 0x4c);
    }

    #[test]
    fn test_environment_overrides() {
        let env: HashMap<&str, &str> = [
            ("GATEWAY_PRESHARED_KEY", "00112233445566778899aabbccddeeff"),
            ("GATEWAY_RADIO_BRIDGE", "192.168.1.20:9000"),
            ("GATEWAY_BUS_HOST", "mq"),
            ("GATEWAY_BUS_PORT", "not-a-port"),
            ("GATEWAY_BUS_BACKEND", "Redis"),
        ]
        .into_iter()
        .collect();

        let mut config = GatewayConfig::default();
        config.apply_overrides(|name| env.get(name).map(|v| v.to_string()));

        assert_eq!(config.preshared_key().unwrap()[15], 0xff);
        assert_eq!(config.radio.bridge, "192.168.1.20:9000".parse().unwrap());
        assert_eq!(config.bus.connection.host, "mq");
        assert_eq!(config.bus.connection.port, 5672);
        assert_eq!(config.bus.backend, BusBackend::Redis);
    }

    #[test]
    fn test_invalid_values() {
        let mut config = GatewayConfig::default();
        config.gateway.preshared_key = "0011".to_string();
        assert!(config.preshared_key().is_err());
        config.gateway.identity = Some("zz".to_string());
        assert!(config.identity().is_err());
        config.radio.address = "f0f0".to_string();
        assert!(config.radio_config().is_err());
    }

    #[test]
    fn test_random_identity() {
        let config = GatewayConfig::default();
        assert_eq!(config.identity().unwrap().len(), IDENTITY_SIZE);
    }
}

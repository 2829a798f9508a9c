//! Poll loop and serialized transmitter over one radio driver

use crate::driver::{RadioConfig, RadioDriver, GATEWAY_PIPE};
use crate::RadioError;
use gateway_wire::{MessageKind, OutboundFrame, RadioAddress, RawFrame};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, info, warn};

/// Link timing and identity
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Gateway pipe address
    pub gateway_address: RadioAddress,
    /// Idle time between polls when no frame is pending
    pub poll_interval: Duration,
    /// Wait before sending a registration reply
    pub register_ack_delay: Duration,
    /// Payload returned with every hardware acknowledgement
    pub ack_payload: Vec<u8>,
}

/// Link counters
#[derive(Debug, Default)]
pub struct LinkStats {
    /// Frames read from the radio
    pub frames_received: AtomicU64,
    /// Frames written and acknowledged
    pub frames_sent: AtomicU64,
    /// Writes the node did not acknowledge
    pub transport_failures: AtomicU64,
    /// Other driver errors
    pub driver_errors: AtomicU64,
}

impl LinkStats {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// One-line summary for logs
    pub fn summary(&self) -> String {
        format!(
            "received={} sent={} transport_failures={} driver_errors={}",
            self.frames_received.load(Ordering::Relaxed),
            self.frames_sent.load(Ordering::Relaxed),
            self.transport_failures.load(Ordering::Relaxed),
            self.driver_errors.load(Ordering::Relaxed),
        )
    }
}

/// Radio link shared by the poll loop and the transmitter
pub struct RadioLink<D> {
    driver: Arc<Mutex<D>>,
    config: Arc<LinkConfig>,
    stats: Arc<LinkStats>,
}

impl<D> Clone for RadioLink<D> {
    fn clone(&self) -> Self {
        Self {
            driver: self.driver.clone(),
            config: self.config.clone(),
            stats: self.stats.clone(),
        }
    }
}

impl<D: RadioDriver> RadioLink<D> {
    /// Wrap a driver
    pub fn new(driver: D, config: LinkConfig) -> Self {
        Self {
            driver: Arc::new(Mutex::new(driver)),
            config: Arc::new(config),
            stats: Arc::new(LinkStats::default()),
        }
    }

    /// Link counters
    pub fn stats(&self) -> Arc<LinkStats> {
        self.stats.clone()
    }

    /// Configure the peripheral and start listening on the gateway pipe
    pub async fn start(&self, radio: &RadioConfig) -> Result<(), RadioError> {
        let mut driver = self.driver.lock().await;
        driver.configure(radio).await?;
        driver
            .open_reading_pipe(GATEWAY_PIPE, self.config.gateway_address)
            .await?;
        driver.open_writing_pipe(self.config.gateway_address).await?;
        driver.start_listening().await?;
        info!(
            "Radio listening on {} (channel {:#04x})",
            self.config.gateway_address, radio.channel
        );
        Ok(())
    }

    /// Read one pending frame, or load the keep-alive ack payload.
    ///
    /// Returns the frame if one was waiting.
    pub async fn poll_once(&self) -> Result<Option<RawFrame>, RadioError> {
        let mut driver = self.driver.lock().await;
        if driver.available().await? {
            let frame = driver.read().await?;
            LinkStats::bump(&self.stats.frames_received);
            Ok(Some(frame))
        } else {
            driver
                .write_ack_payload(GATEWAY_PIPE, &self.config.ack_payload)
                .await?;
            Ok(None)
        }
    }

    /// Poll until shutdown, forwarding received frames to `frames`
    pub async fn run_poll(
        self,
        frames: mpsc::Sender<RawFrame>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!(
            "Radio poll loop started (interval {:?})",
            self.config.poll_interval
        );

        loop {
            if *shutdown.borrow() || frames.is_closed() {
                break;
            }

            match self.poll_once().await {
                Ok(Some(frame)) => {
                    if frames.send(frame).await.is_err() {
                        break;
                    }
                    continue;
                }
                Ok(None) => {}
                Err(e) => {
                    LinkStats::bump(&self.stats.driver_errors);
                    warn!("Radio poll failed: {}", e);
                }
            }

            tokio::select! {
                _ = tokio::time::sleep(self.config.poll_interval) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!("Radio poll loop stopped");
    }

    /// Send one frame: leave receive mode, write, listen again.
    ///
    /// The radio is put back into receive mode even when a step fails; the
    /// first error is returned.
    pub async fn transmit(&self, outbound: &OutboundFrame) -> Result<(), RadioError> {
        let mut driver = self.driver.lock().await;
        let written = async {
            driver.stop_listening().await?;
            driver
                .open_reading_pipe(GATEWAY_PIPE, self.config.gateway_address)
                .await?;
            driver.open_writing_pipe(outbound.address).await?;
            driver.write(&outbound.frame).await
        }
        .await;

        // Receive mode is restored whatever happened above
        let listening = driver.start_listening().await;
        let written = written?;
        listening?;

        if written {
            LinkStats::bump(&self.stats.frames_sent);
            debug!(
                "Sent {} to node {} at {}",
                outbound.kind.as_str(),
                outbound.node_id,
                outbound.address
            );
            Ok(())
        } else {
            LinkStats::bump(&self.stats.transport_failures);
            Err(RadioError::TransportFailure(outbound.address))
        }
    }

    /// Transmit queued frames one at a time until shutdown
    pub async fn run_transmit(
        self,
        mut outbound: mpsc::Receiver<OutboundFrame>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        info!("Radio transmitter started");

        loop {
            let frame = tokio::select! {
                frame = outbound.recv() => match frame {
                    Some(frame) => frame,
                    None => break,
                },
                _ = shutdown.changed() => break,
            };

            // Nodes need a moment to switch back to receive after registering
            if frame.kind == MessageKind::RegisterServerAck {
                tokio::time::sleep(self.config.register_ack_delay).await;
            }

            match self.transmit(&frame).await {
                Ok(()) => {}
                Err(e @ RadioError::TransportFailure(_)) => {
                    warn!(
                        "Failed sending {} to node {}: {}",
                        frame.kind.as_str(),
                        frame.node_id,
                        e
                    );
                }
                Err(e) => {
                    LinkStats::bump(&self.stats.driver_errors);
                    warn!("Radio transmit failed: {}", e);
                }
            }
        }

        info!("Radio transmitter stopped");
    }
}

//! Radio bridge over UDP.
//!
//! The transceiver is driven by a separate bridge process (typically on the
//! board that carries the SPI bus). Datagrams between gateway and bridge:
//!
//! | direction        | datagram                                  | meaning              |
//! |------------------|-------------------------------------------|----------------------|
//! | bridge → gateway | `frame(32)`                               | frame received       |
//! | gateway → bridge | `0x01 \| address(5) \| frame(32)`         | transmit             |
//! | bridge → gateway | `0x81 \| ok(1)`                           | transmit result      |
//! | gateway → bridge | `0x02 \| pipe(1) \| payload`              | load ack payload     |
//! | gateway → bridge | `0x03 \| config(12)`                      | configure            |
//! | gateway → bridge | `0x04 \| pipe(1) \| address(5)`           | open reading pipe    |
//! | gateway → bridge | `0x05 \| listening(1)`                    | start/stop listening |

use crate::driver::{RadioConfig, RadioDriver};
use crate::RadioError;
use async_trait::async_trait;
use bytes::BufMut;
use gateway_wire::{RadioAddress, RawFrame, FRAME_SIZE};
use std::collections::VecDeque;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

const CMD_TRANSMIT: u8 = 0x01;
const CMD_ACK_PAYLOAD: u8 = 0x02;
const CMD_CONFIGURE: u8 = 0x03;
const CMD_READING_PIPE: u8 = 0x04;
const CMD_LISTEN: u8 = 0x05;
const REPLY_TRANSMIT: u8 = 0x81;

/// Largest datagram the bridge sends
const MAX_DATAGRAM: usize = 64;

/// Radio driver talking to a UDP radio bridge
#[derive(Debug)]
pub struct UdpRadio {
    socket: UdpSocket,
    inbox: VecDeque<RawFrame>,
    writing: Option<RadioAddress>,
    reply_timeout: Duration,
}

impl UdpRadio {
    /// Bind `local` and exchange datagrams with the bridge at `bridge`
    pub async fn connect(
        local: SocketAddr,
        bridge: SocketAddr,
        reply_timeout: Duration,
    ) -> Result<Self, RadioError> {
        let socket = UdpSocket::bind(local).await?;
        socket.connect(bridge).await?;
        info!(
            "Radio bridge socket {} connected to {}",
            socket.local_addr()?,
            bridge
        );
        Ok(Self {
            socket,
            inbox: VecDeque::new(),
            writing: None,
            reply_timeout,
        })
    }

    async fn send(&self, datagram: &[u8]) -> Result<(), RadioError> {
        self.socket.send(datagram).await?;
        Ok(())
    }

    /// Sort one datagram from the bridge; returns a transmit result if it was one
    fn accept_datagram(&mut self, datagram: &[u8]) -> Option<bool> {
        match datagram {
            [REPLY_TRANSMIT, ok] => Some(*ok != 0),
            frame if frame.len() == FRAME_SIZE => {
                let mut raw = [0u8; FRAME_SIZE];
                raw.copy_from_slice(frame);
                self.inbox.push_back(raw);
                None
            }
            other => {
                warn!("Ignoring {}-byte datagram from radio bridge", other.len());
                None
            }
        }
    }

    /// Drain datagrams already waiting on the socket
    fn drain_socket(&mut self) -> Result<(), RadioError> {
        let mut buf = [0u8; MAX_DATAGRAM];
        loop {
            match self.socket.try_recv(&mut buf) {
                Ok(n) => {
                    if self.accept_datagram(&buf[..n]).is_some() {
                        debug!("Discarding late transmit result from radio bridge");
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => return Ok(()),
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[async_trait]
impl RadioDriver for UdpRadio {
    async fn configure(&mut self, config: &RadioConfig) -> Result<(), RadioError> {
        let mut datagram = Vec::with_capacity(1 + RadioConfig::ENCODED_SIZE);
        datagram.put_u8(CMD_CONFIGURE);
        config.encode(&mut datagram);
        self.send(&datagram).await
    }

    async fn available(&mut self) -> Result<bool, RadioError> {
        self.drain_socket()?;
        Ok(!self.inbox.is_empty())
    }

    async fn read(&mut self) -> Result<RawFrame, RadioError> {
        self.drain_socket()?;
        self.inbox.pop_front().ok_or(RadioError::NoFrame)
    }

    async fn write(&mut self, frame: &RawFrame) -> Result<bool, RadioError> {
        let address = self
            .writing
            .ok_or_else(|| RadioError::Bridge("no writing pipe open".to_string()))?;

        // A result that missed an earlier deadline must not answer this write
        self.drain_socket()?;

        let mut datagram = Vec::with_capacity(1 + address.as_bytes().len() + FRAME_SIZE);
        datagram.put_u8(CMD_TRANSMIT);
        datagram.put_slice(address.as_bytes());
        datagram.put_slice(frame);
        self.send(&datagram).await?;

        // Frames that arrive while waiting for the result are kept for read()
        let deadline = tokio::time::Instant::now() + self.reply_timeout;
        let mut buf = [0u8; MAX_DATAGRAM];
        loop {
            let n = tokio::time::timeout_at(deadline, self.socket.recv(&mut buf))
                .await
                .map_err(|_| RadioError::Bridge("transmit result timed out".to_string()))??;
            if let Some(ok) = self.accept_datagram(&buf[..n]) {
                return Ok(ok);
            }
        }
    }

    async fn write_ack_payload(&mut self, pipe: u8, payload: &[u8]) -> Result<(), RadioError> {
        let mut datagram = Vec::with_capacity(2 + payload.len());
        datagram.put_u8(CMD_ACK_PAYLOAD);
        datagram.put_u8(pipe);
        datagram.put_slice(payload);
        self.send(&datagram).await
    }

    async fn open_reading_pipe(
        &mut self,
        pipe: u8,
        address: RadioAddress,
    ) -> Result<(), RadioError> {
        let mut datagram = Vec::with_capacity(7);
        datagram.put_u8(CMD_READING_PIPE);
        datagram.put_u8(pipe);
        datagram.put_slice(address.as_bytes());
        self.send(&datagram).await
    }

    async fn open_writing_pipe(&mut self, address: RadioAddress) -> Result<(), RadioError> {
        self.writing = Some(address);
        Ok(())
    }

    async fn start_listening(&mut self) -> Result<(), RadioError> {
        self.send(&[CMD_LISTEN, 1]).await
    }

    async fn stop_listening(&mut self) -> Result<(), RadioError> {
        self.send(&[CMD_LISTEN, 0]).await
    }
}

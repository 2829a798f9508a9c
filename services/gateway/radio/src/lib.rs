//! Radio side of the gateway: driver abstraction, poll loop and transmitter.
//!
//! The peripheral itself sits behind [`RadioDriver`]. [`RadioLink`] owns one
//! driver and runs the two loops that touch it:
//!
//! - **poll**: every tick, read a pending frame and hand it on, or load the
//!   keep-alive ack payload when nothing arrived;
//! - **transmit**: drain queued [`OutboundFrame`]s one at a time, switching
//!   the radio out of receive mode and back around each write.
//!
//! Both loops lock the same driver, so a transmit never interleaves with a
//! read or another transmit.
//!
//! [`OutboundFrame`]: gateway_wire::OutboundFrame

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod driver;
pub mod link;
pub mod mem;
pub mod udp;

pub use driver::{
    CrcLength, DataRate, PowerLevel, RadioConfig, RadioDriver, RadioFeatures, Retries,
    GATEWAY_PIPE,
};
pub use link::{LinkConfig, LinkStats, RadioLink};
pub use mem::{MemoryRadio, RadioOp};
pub use udp::UdpRadio;

use gateway_wire::RadioAddress;
use thiserror::Error;

/// Radio errors
#[derive(Error, Debug)]
pub enum RadioError {
    /// Write was not acknowledged by the node
    #[error("transmission to {0} not acknowledged")]
    TransportFailure(RadioAddress),
    /// Read with no frame pending
    #[error("no frame available")]
    NoFrame,
    /// Socket error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Radio bridge protocol violation
    #[error("radio bridge error: {0}")]
    Bridge(String),
}

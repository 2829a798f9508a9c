//! Packet cipher, identity checksum and frame codec for the radio link.
//!
//! This crate provides the low-level wire format spoken between the gateway
//! and the battery powered nodes: a fixed 32-byte frame, encrypted with a
//! preshared AES-128 key in a two-block chain, carrying a split 16-bit
//! sequence counter, the node id, the message kind and up to 27 payload bytes.
//!
//! ## Wire Format
//!
//! ```text
//! +-----------+---------+--------------+-------------+--------------+------------+
//! | ctr_hi(1) | node(1) | msg_kind(1)  | pay_len(1)  | payload(27)  | ctr_lo(1)  |
//! +-----------+---------+--------------+-------------+--------------+------------+
//! |<---------------- block 1 (16B) ---------------->|<------- block 2 (16B) ---->|
//! ```
//!
//! The high counter byte lives in the first cipher block so that the first
//! ciphertext block differs from frame to frame.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod address;
pub mod checksum;
pub mod cipher;
pub mod error;
pub mod frame;

// Re-export main types
pub use address::{OutboundFrame, RadioAddress, ADDRESS_SIZE};
pub use checksum::xor_checksum;
pub use cipher::{PacketCipher, BLOCK_SIZE, KEY_SIZE};
pub use error::WireError;
pub use frame::{
    Frame, FrameCodec, MessageKind, RawFrame, FRAME_SIZE, MAX_PAYLOAD_SIZE, PLACEHOLDER_NODE_ID,
};

//! Frame layout and codec for the radio link.
//!
//! This module packs and unpacks the 32-byte plaintext frame and runs it
//! through the [`PacketCipher`].

use crate::cipher::{PacketCipher, KEY_SIZE};
use crate::error::WireError;
use bytes::{Buf, BufMut};
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Frame size in bytes, before and after the cipher
pub const FRAME_SIZE: usize = 32;

/// Maximum payload bytes carried by one frame
pub const MAX_PAYLOAD_SIZE: usize = 27;

/// Node id written into every gateway-originated frame
pub const PLACEHOLDER_NODE_ID: u8 = 0;

/// One encrypted frame as it travels over the air
pub type RawFrame = [u8; FRAME_SIZE];

/// Message kinds exchanged between nodes and the gateway
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    /// Node announces itself with its radio address
    Register = 0,
    /// Gateway acknowledges a registration with the assigned node id
    RegisterServerAck = 1,
    /// Node declares a channel it will publish on
    PubChannel = 2,
    /// Node declares a channel it wants to receive on
    SubChannel = 3,
    /// Channel payload (node to gateway, or gateway fan-out to node)
    Pub = 4,
}

impl MessageKind {
    /// Stable lowercase name for logs
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Register => "register",
            MessageKind::RegisterServerAck => "register_server_ack",
            MessageKind::PubChannel => "pub_channel",
            MessageKind::SubChannel => "sub_channel",
            MessageKind::Pub => "pub",
        }
    }
}

impl TryFrom<u8> for MessageKind {
    type Error = WireError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(MessageKind::Register),
            1 => Ok(MessageKind::RegisterServerAck),
            2 => Ok(MessageKind::PubChannel),
            3 => Ok(MessageKind::SubChannel),
            4 => Ok(MessageKind::Pub),
            _ => Err(WireError::UnknownKind(value)),
        }
    }
}

/// Decoded frame contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// 16-bit sequence counter
    pub counter: u16,
    /// Sender node id (0 while unregistered, placeholder from the gateway)
    pub node_id: u8,
    /// Message kind
    pub kind: MessageKind,
    /// Payload bytes (at most [`MAX_PAYLOAD_SIZE`])
    pub payload: Vec<u8>,
}

impl Frame {
    /// Create a new frame
    pub fn new(counter: u16, node_id: u8, kind: MessageKind, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            counter,
            node_id,
            kind,
            payload: payload.into(),
        }
    }

    /// Pack the frame into its 32-byte plaintext layout.
    ///
    /// Unused payload bytes are filled with random data.
    pub fn to_plaintext(&self) -> Result<RawFrame, WireError> {
        if self.payload.len() > MAX_PAYLOAD_SIZE {
            return Err(WireError::PayloadTooLarge(self.payload.len()));
        }

        let mut padding = [0u8; MAX_PAYLOAD_SIZE];
        rand::thread_rng().fill_bytes(&mut padding[self.payload.len()..]);

        let mut out = [0u8; FRAME_SIZE];
        let mut buf = &mut out[..];
        buf.put_u8((self.counter >> 8) as u8);
        buf.put_u8(self.node_id);
        buf.put_u8(self.kind as u8);
        buf.put_u8(self.payload.len() as u8);
        buf.put_slice(&self.payload);
        buf.put_slice(&padding[self.payload.len()..]);
        buf.put_u8((self.counter & 0xFF) as u8);

        Ok(out)
    }

    /// Unpack a 32-byte plaintext
    pub fn from_plaintext(plain: &RawFrame) -> Result<Self, WireError> {
        let mut buf = &plain[..];
        let counter_hi = buf.get_u8();
        let node_id = buf.get_u8();
        let kind_raw = buf.get_u8();
        let payload_len = buf.get_u8() as usize;

        if payload_len > MAX_PAYLOAD_SIZE {
            return Err(WireError::Malformed("payload length exceeds 27 bytes"));
        }
        let kind = MessageKind::try_from(kind_raw)?;

        let payload = buf[..payload_len].to_vec();
        let counter_lo = plain[FRAME_SIZE - 1];

        Ok(Self {
            counter: (counter_lo as u16) | ((counter_hi as u16) << 8),
            node_id,
            kind,
            payload,
        })
    }
}

/// Encrypting frame codec bound to one preshared key
#[derive(Debug, Clone)]
pub struct FrameCodec {
    cipher: PacketCipher,
}

impl FrameCodec {
    /// Create a codec for the given preshared key
    pub fn new(key: &[u8; KEY_SIZE]) -> Self {
        Self {
            cipher: PacketCipher::new(key),
        }
    }

    /// Decrypt and unpack a raw frame received from the radio
    pub fn decode(&self, raw: &RawFrame) -> Result<Frame, WireError> {
        Frame::from_plaintext(&self.cipher.decrypt(raw))
    }

    /// Pack and encrypt a gateway frame.
    ///
    /// The node id byte always carries [`PLACEHOLDER_NODE_ID`]; nodes reject
    /// gateway frames with any other value.
    pub fn encode(
        &self,
        counter: u16,
        kind: MessageKind,
        payload: &[u8],
    ) -> Result<RawFrame, WireError> {
        self.encode_frame(&Frame::new(counter, PLACEHOLDER_NODE_ID, kind, payload))
    }

    /// Pack and encrypt an arbitrary frame
    pub fn encode_frame(&self, frame: &Frame) -> Result<RawFrame, WireError> {
        Ok(self.cipher.encrypt(&frame.to_plaintext()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const KEY: [u8; KEY_SIZE] = [
        25, 123, 90, 174, 198, 145, 40, 33, 98, 90, 90, 111, 78, 65, 184, 188,
    ];

    #[test]
    fn test_message_kind_conversion() {
        assert_eq!(MessageKind::try_from(0).unwrap(), MessageKind::Register);
        assert_eq!(MessageKind::try_from(4).unwrap(), MessageKind::Pub);
        assert_eq!(MessageKind::try_from(5), Err(WireError::UnknownKind(5)));
    }

    #[test]
    fn test_plaintext_layout() {
        let frame = Frame::new(0xABCD, 7, MessageKind::Pub, vec![1, 2, 3, 4]);
        let plain = frame.to_plaintext().unwrap();

        assert_eq!(plain[0], 0xAB);
        assert_eq!(plain[1], 7);
        assert_eq!(plain[2], MessageKind::Pub as u8);
        assert_eq!(plain[3], 4);
        assert_eq!(&plain[4..8], &[1, 2, 3, 4]);
        assert_eq!(plain[31], 0xCD);
    }

    #[test]
    fn test_plaintext_decode_ignores_padding() {
        let mut plain = [0xEEu8; FRAME_SIZE];
        plain[0] = 0x01;
        plain[1] = 100;
        plain[2] = MessageKind::PubChannel as u8;
        plain[3] = 2;
        plain[4] = 9;
        plain[5] = 8;
        plain[31] = 0x02;

        let frame = Frame::from_plaintext(&plain).unwrap();
        assert_eq!(frame.counter, 0x0102);
        assert_eq!(frame.node_id, 100);
        assert_eq!(frame.kind, MessageKind::PubChannel);
        assert_eq!(frame.payload, vec![9, 8]);
    }

    #[test]
    fn test_payload_length_limits() {
        let mut plain = [0u8; FRAME_SIZE];
        plain[3] = 27;
        assert_eq!(Frame::from_plaintext(&plain).unwrap().payload.len(), 27);

        plain[3] = 28;
        assert!(matches!(
            Frame::from_plaintext(&plain),
            Err(WireError::Malformed(_))
        ));

        let frame = Frame::new(1, 0, MessageKind::Pub, vec![0; 28]);
        assert_eq!(frame.to_plaintext(), Err(WireError::PayloadTooLarge(28)));
    }

    #[test]
    fn test_codec_encode_decode() {
        let codec = FrameCodec::new(&KEY);
        let raw = codec
            .encode(65535, MessageKind::RegisterServerAck, &[1, 2, 3])
            .unwrap();
        let frame = codec.decode(&raw).unwrap();

        assert_eq!(frame.counter, 65535);
        assert_eq!(frame.node_id, PLACEHOLDER_NODE_ID);
        assert_eq!(frame.kind, MessageKind::RegisterServerAck);
        assert_eq!(frame.payload, vec![1, 2, 3]);
    }

    #[test]
    fn test_codec_rejects_wrong_key() {
        let codec = FrameCodec::new(&KEY);
        let other = FrameCodec::new(&[0u8; KEY_SIZE]);
        let frame = Frame::new(10, 3, MessageKind::Pub, vec![0; 27]);

        // A wrong key decrypts to noise; when it parses it must not match
        let raw = codec.encode_frame(&frame).unwrap();
        if let Ok(decoded) = other.decode(&raw) {
            assert_ne!(decoded, frame);
        }
    }

    #[test]
    fn test_counter_split_varies_first_block() {
        let codec = FrameCodec::new(&KEY);
        let a = codec.encode(0x0100, MessageKind::Pub, &[1]).unwrap();
        let b = codec.encode(0x0200, MessageKind::Pub, &[1]).unwrap();
        assert_ne!(a[..16], b[..16]);
    }
}

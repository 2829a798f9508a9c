//! Built-in payload codecs

use crate::TransformError;
use bytes::{Buf, BufMut};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Transform identifier carried in channel declarations
pub type TransformId = u8;

/// On/off state of a switch node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchState {
    /// Whether the switch is on
    pub status: bool,
}

/// Temperature and humidity reading
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Climate {
    /// Temperature in degrees Celsius
    pub temperature: f32,
    /// Relative humidity in percent
    pub humidity: f32,
}

/// Payload codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transform {
    /// One byte, non-zero meaning on: `{"status": bool}`
    Switch,
    /// Two little-endian f32: `{"temperature": f32, "humidity": f32}`
    Temperature,
}

impl Transform {
    /// Every built-in transform
    pub const BUILTIN: [Transform; 2] = [Transform::Switch, Transform::Temperature];

    /// Default id of this transform
    pub fn id(&self) -> TransformId {
        match self {
            Transform::Switch => 0,
            Transform::Temperature => 1,
        }
    }

    /// Transform name
    pub fn as_str(&self) -> &'static str {
        match self {
            Transform::Switch => "switch",
            Transform::Temperature => "temperature",
        }
    }

    /// Bytes the codec reads from a payload
    pub fn payload_size(&self) -> usize {
        match self {
            Transform::Switch => 1,
            Transform::Temperature => 8,
        }
    }

    /// Turn node payload bytes into a bus message.
    ///
    /// Bytes past [`payload_size`](Self::payload_size) are ignored.
    pub fn decode(&self, payload: &[u8]) -> Result<Value, TransformError> {
        self.check_len(payload)?;
        let mut buf = payload;

        let message = match self {
            Transform::Switch => serde_json::to_value(SwitchState {
                status: buf.get_u8() != 0,
            }),
            Transform::Temperature => serde_json::to_value(Climate {
                temperature: buf.get_f32_le(),
                humidity: buf.get_f32_le(),
            }),
        };

        message.map_err(|e| TransformError::Message(e.to_string()))
    }

    /// Turn a bus message into node payload bytes
    pub fn encode(&self, message: &Value) -> Result<Vec<u8>, TransformError> {
        let mut buf = Vec::with_capacity(self.payload_size());

        match self {
            Transform::Switch => {
                let state: SwitchState = parse(message)?;
                buf.put_u8(state.status as u8);
            }
            Transform::Temperature => {
                let climate: Climate = parse(message)?;
                buf.put_f32_le(climate.temperature);
                buf.put_f32_le(climate.humidity);
            }
        }

        Ok(buf)
    }

    fn check_len(&self, payload: &[u8]) -> Result<(), TransformError> {
        if payload.len() < self.payload_size() {
            return Err(TransformError::Payload {
                transform: self.as_str(),
                expected: self.payload_size(),
                actual: payload.len(),
            });
        }
        Ok(())
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn parse<T: DeserializeOwned>(message: &Value) -> Result<T, TransformError> {
    T::deserialize(message).map_err(|e| TransformError::Message(e.to_string()))
}

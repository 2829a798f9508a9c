//! Bus backend implementations

pub mod mem;

#[cfg(feature = "redis-bus")]
pub mod redis;

//! Identity checksum sent alongside the gateway identity.
//!
//! This is a sanity check for nodes, not an authentication primitive. The
//! link itself is protected by the preshared-key cipher.

/// Shifted XOR checksum over a short byte string.
///
/// Each byte is shifted left by its position (truncated to 8 bits) before
/// being folded into the accumulator.
pub fn xor_checksum(bytes: &[u8]) -> u8 {
    bytes.iter().enumerate().fold(0u8, |acc, (index, &value)| {
        let shifted = if index < 8 {
            ((value as u32) << index) as u8
        } else {
            0
        };
        acc ^ shifted
    })
}

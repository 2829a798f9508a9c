//! Two-block AES-128 packet cipher.
//!
//! A 32-byte frame is split into two 16-byte blocks and chained from a fixed
//! all-zero initialization value with a single preshared key:
//!
//! ```text
//! C1 = AES(B1)
//! C2 = AES(C1 ^ B2)
//! ```
//!
//! Identical first blocks produce identical first ciphertext blocks. The frame
//! layout places the high counter byte in B1 to keep C1 varying.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockDecrypt, BlockEncrypt, KeyInit};
use aes::Aes128;
use std::fmt;

/// AES block size in bytes
pub const BLOCK_SIZE: usize = 16;

/// Preshared key size in bytes
pub const KEY_SIZE: usize = 16;

/// Block-chained AES-128 over a fixed 32-byte frame
#[derive(Clone)]
pub struct PacketCipher {
    cipher: Aes128,
}

impl PacketCipher {
    /// Create a cipher from the preshared key
    pub fn new(key: &[u8; KEY_SIZE]) -> Self {
        Self {
            cipher: Aes128::new(GenericArray::from_slice(key)),
        }
    }

    /// Encrypt a 32-byte plaintext frame
    pub fn encrypt(&self, plaintext: &[u8; 2 * BLOCK_SIZE]) -> [u8; 2 * BLOCK_SIZE] {
        let mut buf = *plaintext;
        let (first, second) = buf.split_at_mut(BLOCK_SIZE);

        self.cipher
            .encrypt_block(GenericArray::from_mut_slice(first));
        xor_in_place(second, first);
        self.cipher
            .encrypt_block(GenericArray::from_mut_slice(second));

        buf
    }

    /// Decrypt a 32-byte ciphertext frame (exact inverse of [`encrypt`](Self::encrypt))
    pub fn decrypt(&self, ciphertext: &[u8; 2 * BLOCK_SIZE]) -> [u8; 2 * BLOCK_SIZE] {
        let mut buf = *ciphertext;
        let (first, second) = buf.split_at_mut(BLOCK_SIZE);

        // C1 is still needed to unchain B2, so B2 goes first
        self.cipher
            .decrypt_block(GenericArray::from_mut_slice(second));
        xor_in_place(second, first);
        self.cipher
            .decrypt_block(GenericArray::from_mut_slice(first));

        buf
    }
}

impl fmt::Debug for PacketCipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketCipher").finish_non_exhaustive()
    }
}

fn xor_in_place(target: &mut [u8], other: &[u8]) {
    for (t, o) in target.iter_mut().zip(other) {
        *t ^= *o;
    }
}

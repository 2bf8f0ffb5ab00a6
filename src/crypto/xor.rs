//! Rolling-key stream cipher backing the FAST suite.
//!
//! XOR is symmetric, so `process` both encrypts and decrypts. Data is
//! handled in 1024-byte blocks; after every full block with more data
//! remaining, the 32-byte working key advances by a deterministic mix so
//! the keystream does not repeat within a frame. Peers stay in sync by
//! resetting to the base key at every frame boundary.
//!
//! This construction carries no authentication tag. It is a fast
//! obfuscation path, not a security option.

/// Working key length in bytes.
pub const XOR_KEY_SIZE: usize = 32;

/// Block length after which the working key advances.
pub const XOR_BLOCK_SIZE: usize = 1024;

/// Rolling-key XOR state.
#[derive(Clone)]
pub struct RollingXor {
    base_key: [u8; XOR_KEY_SIZE],
    current_key: [u8; XOR_KEY_SIZE],
    round: u64,
}

impl RollingXor {
    /// Create a cipher from a 32-byte key.
    pub fn new(key: [u8; XOR_KEY_SIZE]) -> Self {
        Self {
            base_key: key,
            current_key: key,
            round: 0,
        }
    }

    /// Encrypt or decrypt `data`, advancing the key between blocks.
    pub fn process(&mut self, data: &[u8]) -> Vec<u8> {
        let mut out = data.to_vec();

        let mut pos = 0;
        while pos < out.len() {
            let block = XOR_BLOCK_SIZE.min(out.len() - pos);
            for i in 0..block {
                out[pos + i] ^= self.current_key[i % XOR_KEY_SIZE];
            }
            pos += block;

            if pos < out.len() {
                self.advance_key();
            }
        }

        out
    }

    /// Restore the base key. Both peers call this at frame boundaries.
    pub fn reset(&mut self) {
        self.current_key = self.base_key;
        self.round = 0;
    }

    fn advance_key(&mut self) {
        self.round += 1;
        for i in 0..XOR_KEY_SIZE {
            self.current_key[i] ^= (self.round.wrapping_mul(31).wrapping_add(i as u64 * 17)
                & 0xFF) as u8;
            self.current_key[i] = self.current_key[i].rotate_left(1);
        }
    }
}

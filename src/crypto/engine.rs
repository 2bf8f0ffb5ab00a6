//! Per-frame encryption engines, one per security suite.
//!
//! Every engine produces a self-describing envelope: whatever the receiver
//! needs to decrypt a frame on its own (the per-frame random nonce/IV) is
//! prepended, and for AEAD suites the authentication tag trails the
//! ciphertext. Keys are derived once per session and never travel on the
//! wire.
//!
//! Envelope layouts:
//!
//! ```text
//! HIGH        12-byte nonce || ciphertext || 16-byte tag
//! FAST        ciphertext                   (reset to base key per frame)
//! AES         16-byte IV    || ciphertext
//! AES-256-GCM 12-byte IV    || ciphertext || 16-byte tag
//! ```

use aes_gcm::Aes256Gcm;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Nonce};
use ctr::cipher::{KeyIvInit, StreamCipher};
use rand::rngs::OsRng;
use rand::RngCore;

use super::keys::{SecretKey, KEY_SIZE};
use super::suite::SecurityLevel;
use super::xor::RollingXor;
use super::CryptoError;

type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;

/// Uniform interface over the session's symmetric cipher.
///
/// An implementation is single-owner: it lives inside one connection's
/// session and is only ever driven by that connection's thread.
pub trait FrameCipher: Send {
    /// Encrypt one frame, returning the full envelope.
    fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// Decrypt one envelope, returning the plaintext.
    fn decrypt(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError>;

    /// Suite this engine implements.
    fn level(&self) -> SecurityLevel;

    /// Re-synchronize internal state at a frame boundary.
    ///
    /// Only meaningful for the FAST suite; the AEAD engines are stateless
    /// between frames.
    fn reset(&mut self);
}

/// Instantiate the engine for a negotiated suite.
pub fn create_cipher(level: SecurityLevel, key: &SecretKey) -> Box<dyn FrameCipher> {
    match level {
        SecurityLevel::High => Box::new(HighCipher::new(key)),
        SecurityLevel::Fast => Box::new(FastCipher::new(key)),
        SecurityLevel::Aes => Box::new(AesCtrCipher::new(key)),
        SecurityLevel::Aes256Gcm => Box::new(GcmCipher::new(key)),
    }
}

fn random_nonce<const N: usize>() -> [u8; N] {
    let mut nonce = [0u8; N];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

fn check_min_len(ciphertext: &[u8], minimum: usize) -> Result<(), CryptoError> {
    if ciphertext.len() < minimum {
        return Err(CryptoError::CiphertextTooShort {
            actual: ciphertext.len(),
            minimum,
        });
    }
    Ok(())
}

/// ChaCha20-Poly1305 with a per-frame random 12-byte nonce.
pub struct HighCipher {
    cipher: ChaCha20Poly1305,
}

impl HighCipher {
    /// Key the engine for a session.
    pub fn new(key: &SecretKey) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(key.as_bytes().into()),
        }
    }
}

impl FrameCipher for HighCipher {
    fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let nonce = random_nonce::<12>();
        let encrypted = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| CryptoError::EncryptionFailed)?;

        let mut out = Vec::with_capacity(nonce.len() + encrypted.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&encrypted);
        Ok(out)
    }

    fn decrypt(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let level = SecurityLevel::High;
        check_min_len(ciphertext, level.nonce_size() + level.tag_size())?;

        let (nonce, body) = ciphertext.split_at(level.nonce_size());
        self.cipher
            .decrypt(Nonce::from_slice(nonce), body)
            .map_err(|_| CryptoError::AuthenticationFailed)
    }

    fn level(&self) -> SecurityLevel {
        SecurityLevel::High
    }

    fn reset(&mut self) {}
}

/// Rolling-key XOR, reset to the base key at every frame boundary so each
/// frame decrypts independently without a per-frame prefix.
pub struct FastCipher {
    xor: RollingXor,
}

impl FastCipher {
    /// Key the engine for a session.
    pub fn new(key: &SecretKey) -> Self {
        Self {
            xor: RollingXor::new(*key.as_bytes()),
        }
    }
}

impl FrameCipher for FastCipher {
    fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.xor.reset();
        Ok(self.xor.process(plaintext))
    }

    fn decrypt(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        self.xor.reset();
        Ok(self.xor.process(ciphertext))
    }

    fn level(&self) -> SecurityLevel {
        SecurityLevel::Fast
    }

    fn reset(&mut self) {
        self.xor.reset();
    }
}

/// AES-256-CTR with a per-frame random 16-byte IV and no tag.
pub struct AesCtrCipher {
    key: [u8; KEY_SIZE],
}

impl AesCtrCipher {
    /// Key the engine for a session.
    pub fn new(key: &SecretKey) -> Self {
        Self {
            key: *key.as_bytes(),
        }
    }

    fn apply(&self, iv: &[u8; 16], data: &[u8]) -> Vec<u8> {
        let mut out = data.to_vec();
        let mut ctr = Aes256Ctr::new((&self.key).into(), iv.into());
        ctr.apply_keystream(&mut out);
        out
    }
}

impl FrameCipher for AesCtrCipher {
    fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let iv = random_nonce::<16>();
        let encrypted = self.apply(&iv, plaintext);

        let mut out = Vec::with_capacity(iv.len() + encrypted.len());
        out.extend_from_slice(&iv);
        out.extend_from_slice(&encrypted);
        Ok(out)
    }

    fn decrypt(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let level = SecurityLevel::Aes;
        check_min_len(ciphertext, level.nonce_size())?;

        let (iv_bytes, body) = ciphertext.split_at(level.nonce_size());
        let mut iv = [0u8; 16];
        iv.copy_from_slice(iv_bytes);
        // CTR mode is its own inverse.
        Ok(self.apply(&iv, body))
    }

    fn level(&self) -> SecurityLevel {
        SecurityLevel::Aes
    }

    fn reset(&mut self) {}
}

/// AES-256-GCM with a per-frame random 12-byte IV.
pub struct GcmCipher {
    cipher: Aes256Gcm,
}

impl GcmCipher {
    /// Key the engine for a session.
    pub fn new(key: &SecretKey) -> Self {
        Self {
            cipher: Aes256Gcm::new(key.as_bytes().into()),
        }
    }
}

impl FrameCipher for GcmCipher {
    fn encrypt(&mut self, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let iv = random_nonce::<12>();
        let encrypted = self
            .cipher
            .encrypt(aes_gcm::Nonce::from_slice(&iv), plaintext)
            .map_err(|_| CryptoError::EncryptionFailed)?;

        let mut out = Vec::with_capacity(iv.len() + encrypted.len());
        out.extend_from_slice(&iv);
        out.extend_from_slice(&encrypted);
        Ok(out)
    }

    fn decrypt(&mut self, ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let level = SecurityLevel::Aes256Gcm;
        check_min_len(ciphertext, level.nonce_size() + level.tag_size())?;

        let (iv, body) = ciphertext.split_at(level.nonce_size());
        self.cipher
            .decrypt(aes_gcm::Nonce::from_slice(iv), body)
            .map_err(|_| CryptoError::AuthenticationFailed)
    }

    fn level(&self) -> SecurityLevel {
        SecurityLevel::Aes256Gcm
    }

    fn reset(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_LEVELS: [SecurityLevel; 4] = [
        SecurityLevel::High,
        SecurityLevel::Fast,
        SecurityLevel::Aes,
        SecurityLevel::Aes256Gcm,
    ];

    fn test_key() -> SecretKey {
        SecretKey::from_bytes([0x42; KEY_SIZE])
    }

    #[test]
    fn test_roundtrip_every_suite() {
        let plaintext = b"the quick brown fox jumps over the lazy dog";
        for level in ALL_LEVELS {
            let mut sender = create_cipher(level, &test_key());
            let mut receiver = create_cipher(level, &test_key());

            let envelope = sender.encrypt(plaintext).unwrap();
            assert_eq!(
                envelope.len(),
                plaintext.len() + level.nonce_size() + level.tag_size(),
                "envelope overhead for {level:?}"
            );

            let decrypted = receiver.decrypt(&envelope).unwrap();
            assert_eq!(decrypted, plaintext, "roundtrip for {level:?}");
        }
    }

    #[test]
    fn test_roundtrip_empty_frame() {
        for level in ALL_LEVELS {
            let mut cipher = create_cipher(level, &test_key());
            let envelope = cipher.encrypt(b"").unwrap();
            assert_eq!(cipher.decrypt(&envelope).unwrap(), b"");
        }
    }

    #[test]
    fn test_authenticated_suites_detect_corruption() {
        let plaintext = b"tamper with me";
        for level in [SecurityLevel::High, SecurityLevel::Aes256Gcm] {
            let mut cipher = create_cipher(level, &test_key());
            let envelope = cipher.encrypt(plaintext).unwrap();

            // Flipping any single byte must break authentication.
            for i in 0..envelope.len() {
                let mut corrupted = envelope.clone();
                corrupted[i] ^= 0x01;
                assert!(
                    matches!(
                        cipher.decrypt(&corrupted),
                        Err(CryptoError::AuthenticationFailed)
                    ),
                    "byte {i} corruption undetected for {level:?}"
                );
            }
        }
    }

    #[test]
    fn test_wrong_key_fails_authentication() {
        for level in [SecurityLevel::High, SecurityLevel::Aes256Gcm] {
            let mut sender = create_cipher(level, &test_key());
            let mut other = create_cipher(level, &SecretKey::from_bytes([0x43; KEY_SIZE]));

            let envelope = sender.encrypt(b"secret").unwrap();
            assert!(other.decrypt(&envelope).is_err());
        }
    }

    #[test]
    fn test_short_ciphertext_rejected() {
        for level in [SecurityLevel::High, SecurityLevel::Aes, SecurityLevel::Aes256Gcm] {
            let mut cipher = create_cipher(level, &test_key());
            let result = cipher.decrypt(&[0u8; 4]);
            assert!(
                matches!(result, Err(CryptoError::CiphertextTooShort { .. })),
                "short ciphertext accepted for {level:?}"
            );
        }
    }

    #[test]
    fn test_random_nonce_varies_ciphertext() {
        for level in [SecurityLevel::High, SecurityLevel::Aes, SecurityLevel::Aes256Gcm] {
            let mut cipher = create_cipher(level, &test_key());
            let a = cipher.encrypt(b"same plaintext").unwrap();
            let b = cipher.encrypt(b"same plaintext").unwrap();
            assert_ne!(a, b, "nonce reuse for {level:?}");
        }
    }

    #[test]
    fn test_frames_decrypt_independently() {
        // A receiver must be able to decrypt frame N without having seen
        // frames 1..N-1.
        for level in ALL_LEVELS {
            let mut sender = create_cipher(level, &test_key());
            let _skipped = sender.encrypt(b"first frame").unwrap();
            let second = sender.encrypt(b"second frame").unwrap();

            let mut receiver = create_cipher(level, &test_key());
            assert_eq!(receiver.decrypt(&second).unwrap(), b"second frame");
        }
    }

    #[test]
    fn test_fast_suite_is_deterministic_per_frame() {
        // The FAST suite resets to the base key each frame; identical
        // plaintexts therefore produce identical frames.
        let mut cipher = create_cipher(SecurityLevel::Fast, &test_key());
        let a = cipher.encrypt(b"payload").unwrap();
        let b = cipher.encrypt(b"payload").unwrap();
        assert_eq!(a, b);
    }
}

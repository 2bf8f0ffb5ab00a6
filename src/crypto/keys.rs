//! Session key provisioning.
//!
//! A session key is 32 bytes, supplied either as 64 hex characters
//! (optional `0x` prefix) in configuration, or derived from a master
//! password with PBKDF2-HMAC-SHA256.
//!
//! The derivation salt is fixed and published so that the same password
//! always produces the same key on both peers. That makes the scheme an
//! interoperability convention, not a password-storage regime; deployments
//! that want distinct key spaces can override the salt in configuration,
//! provided both peers share the override.

use pbkdf2::pbkdf2_hmac;
use sha2::Sha256;
use zeroize::Zeroize;

use super::CryptoError;

/// Session key length in bytes.
pub const KEY_SIZE: usize = 32;

/// PBKDF2 iteration count for password-derived keys.
pub const PBKDF2_ITERATIONS: u32 = 100_000;

/// Fixed derivation salt ("NetCopySalt1234567890ABCDEFGHIJK").
pub const DEFAULT_KEY_SALT: [u8; 32] = [
    0x4e, 0x65, 0x74, 0x43, 0x6f, 0x70, 0x79, 0x53, //
    0x61, 0x6c, 0x74, 0x31, 0x32, 0x33, 0x34, 0x35, //
    0x36, 0x37, 0x38, 0x39, 0x30, 0x41, 0x42, 0x43, //
    0x44, 0x45, 0x46, 0x47, 0x48, 0x49, 0x4a, 0x4b,
];

/// A 32-byte session key, zeroized on drop.
#[derive(Clone)]
pub struct SecretKey {
    key: [u8; KEY_SIZE],
}

impl SecretKey {
    /// Wrap existing key material.
    pub fn from_bytes(key: [u8; KEY_SIZE]) -> Self {
        Self { key }
    }

    /// Parse a key from 64 hex characters, with an optional `0x` prefix.
    pub fn from_hex(hex_key: &str) -> Result<Self, CryptoError> {
        let hex_key = hex_key.strip_prefix("0x").unwrap_or(hex_key);
        if hex_key.len() != KEY_SIZE * 2 {
            return Err(CryptoError::InvalidKeyLength {
                expected: KEY_SIZE * 2,
                actual: hex_key.len(),
            });
        }

        let bytes = hex::decode(hex_key).map_err(|_| CryptoError::InvalidHex)?;
        let mut key = [0u8; KEY_SIZE];
        key.copy_from_slice(&bytes);
        Ok(Self { key })
    }

    /// Derive a key from a master password with the fixed salt.
    pub fn derive_from_password(password: &str) -> Self {
        Self::derive_with_salt(password, &DEFAULT_KEY_SALT)
    }

    /// Derive a key from a master password with an explicit salt.
    pub fn derive_with_salt(password: &str, salt: &[u8]) -> Self {
        let mut key = [0u8; KEY_SIZE];
        pbkdf2_hmac::<Sha256>(password.as_bytes(), salt, PBKDF2_ITERATIONS, &mut key);
        Self { key }
    }

    /// Raw key bytes. Handle with care.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }

    /// Hex rendition with `0x` prefix, for configuration files.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.key))
    }
}

impl Drop for SecretKey {
    fn drop(&mut self) {
        self.key.zeroize();
    }
}

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material.
        f.write_str("SecretKey(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_roundtrip() {
        let key = SecretKey::from_bytes([0x42; KEY_SIZE]);
        let parsed = SecretKey::from_hex(&key.to_hex()).unwrap();
        assert_eq!(parsed.as_bytes(), key.as_bytes());
    }

    #[test]
    fn test_hex_prefix_optional() {
        let bare = "ab".repeat(32);
        let with_prefix = format!("0x{bare}");

        let k1 = SecretKey::from_hex(&bare).unwrap();
        let k2 = SecretKey::from_hex(&with_prefix).unwrap();
        assert_eq!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn test_wrong_length_rejected() {
        assert!(matches!(
            SecretKey::from_hex("abcd"),
            Err(CryptoError::InvalidKeyLength {
                expected: 64,
                actual: 4
            })
        ));
    }

    #[test]
    fn test_bad_hex_rejected() {
        let junk = "zz".repeat(32);
        assert!(matches!(
            SecretKey::from_hex(&junk),
            Err(CryptoError::InvalidHex)
        ));
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let k1 = SecretKey::derive_from_password("correct horse battery staple");
        let k2 = SecretKey::derive_from_password("correct horse battery staple");
        assert_eq!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn test_different_passwords_differ() {
        let k1 = SecretKey::derive_from_password("alpha");
        let k2 = SecretKey::derive_from_password("beta");
        assert_ne!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn test_salt_override_changes_key() {
        let k1 = SecretKey::derive_from_password("alpha");
        let k2 = SecretKey::derive_with_salt("alpha", b"another-deployment-salt");
        assert_ne!(k1.as_bytes(), k2.as_bytes());
    }

    #[test]
    fn test_fixed_salt_spells_its_name() {
        assert_eq!(&DEFAULT_KEY_SALT[..], b"NetCopySalt1234567890ABCDEFGHIJK");
    }
}

//! Security suite definitions.

/// Security suites negotiable at handshake.
///
/// The wire value is fixed; the runtime picks the backing primitive at
/// session creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SecurityLevel {
    /// ChaCha20-Poly1305 AEAD with a per-frame random nonce.
    High = 0,

    /// 32-byte rolling-key stream XOR. Fast, but provides no cryptographic
    /// authenticity; integrity rests on transport sequencing alone.
    Fast = 1,

    /// AES-256-CTR with a per-frame random IV; no authentication tag.
    Aes = 2,

    /// AES-256-GCM AEAD with a per-frame random IV.
    Aes256Gcm = 3,
}

impl SecurityLevel {
    /// Parse a level from its wire byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::High),
            1 => Some(Self::Fast),
            2 => Some(Self::Aes),
            3 => Some(Self::Aes256Gcm),
            _ => None,
        }
    }

    /// Wire byte of this level.
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Parse a level from a configuration/CLI name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "high" => Some(Self::High),
            "fast" => Some(Self::Fast),
            "aes" => Some(Self::Aes),
            "aes-gcm" | "aes256gcm" | "aes-256-gcm" => Some(Self::Aes256Gcm),
            _ => None,
        }
    }

    /// Size of the per-frame nonce/IV prefix in the encrypted envelope.
    pub fn nonce_size(self) -> usize {
        match self {
            Self::High => 12,
            Self::Fast => 0,
            Self::Aes => 16,
            Self::Aes256Gcm => 12,
        }
    }

    /// Size of the authentication tag at the end of the envelope.
    pub fn tag_size(self) -> usize {
        match self {
            Self::High | Self::Aes256Gcm => 16,
            Self::Fast | Self::Aes => 0,
        }
    }

    /// Whether the suite authenticates the ciphertext.
    pub fn is_authenticated(self) -> bool {
        self.tag_size() > 0
    }

    /// Human-readable description for logs.
    pub fn describe(self) -> &'static str {
        match self {
            Self::High => "HIGH (ChaCha20-Poly1305)",
            Self::Fast => "FAST (rolling-key XOR, no authenticity)",
            Self::Aes => "AES (AES-256-CTR)",
            Self::Aes256Gcm => "AES-256-GCM",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [SecurityLevel; 4] = [
        SecurityLevel::High,
        SecurityLevel::Fast,
        SecurityLevel::Aes,
        SecurityLevel::Aes256Gcm,
    ];

    #[test]
    fn test_wire_value_roundtrip() {
        for level in ALL {
            assert_eq!(SecurityLevel::from_u8(level.as_u8()), Some(level));
        }
        assert_eq!(SecurityLevel::from_u8(4), None);
    }

    #[test]
    fn test_envelope_sizes() {
        assert_eq!(SecurityLevel::High.nonce_size(), 12);
        assert_eq!(SecurityLevel::High.tag_size(), 16);
        assert_eq!(SecurityLevel::Fast.nonce_size(), 0);
        assert_eq!(SecurityLevel::Fast.tag_size(), 0);
        assert_eq!(SecurityLevel::Aes.nonce_size(), 16);
        assert_eq!(SecurityLevel::Aes.tag_size(), 0);
        assert_eq!(SecurityLevel::Aes256Gcm.nonce_size(), 12);
        assert_eq!(SecurityLevel::Aes256Gcm.tag_size(), 16);
    }

    #[test]
    fn test_names() {
        assert_eq!(SecurityLevel::from_name("HIGH"), Some(SecurityLevel::High));
        assert_eq!(
            SecurityLevel::from_name("aes-gcm"),
            Some(SecurityLevel::Aes256Gcm)
        );
        assert_eq!(SecurityLevel::from_name("rot13"), None);
    }

    #[test]
    fn test_authenticated_suites() {
        assert!(SecurityLevel::High.is_authenticated());
        assert!(SecurityLevel::Aes256Gcm.is_authenticated());
        assert!(!SecurityLevel::Fast.is_authenticated());
        assert!(!SecurityLevel::Aes.is_authenticated());
    }
}

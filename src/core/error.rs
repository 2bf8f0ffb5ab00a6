//! Crate-wide error types.
//!
//! Each layer owns a small `thiserror` enum; [`NetcopyError`] aggregates
//! them for callers that drive a whole transfer. Framing, protocol, and
//! crypto failures are always fatal to a connection; disk I/O failures
//! during a chunk write are reported in-band through a failed ack and leave
//! the connection usable.

use thiserror::Error;

/// Errors in the crypto layer.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Key material has the wrong length.
    #[error("invalid secret key length: expected {expected} hex characters, got {actual}")]
    InvalidKeyLength {
        /// Expected number of hex characters.
        expected: usize,
        /// Actual number supplied.
        actual: usize,
    },

    /// Key material is not valid hex.
    #[error("secret key is not valid hex")]
    InvalidHex,

    /// Ciphertext shorter than its envelope prefix and tag.
    #[error("ciphertext too short: {actual} bytes, minimum {minimum}")]
    CiphertextTooShort {
        /// Bytes received.
        actual: usize,
        /// Minimum for the suite's envelope.
        minimum: usize,
    },

    /// Authentication tag did not verify.
    #[error("frame authentication failed (wrong key or corrupted data)")]
    AuthenticationFailed,

    /// AEAD encryption failed.
    #[error("frame encryption failed")]
    EncryptionFailed,
}

/// Top-level errors.
#[derive(Debug, Error)]
pub enum NetcopyError {
    /// Framing or protocol failure on the connection.
    #[error("transport error: {0}")]
    Transport(#[from] crate::transport::TransportError),

    /// Crypto failure on the connection.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Configuration loading or validation failure.
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    /// Filesystem failure.
    #[error("file error: {0}")]
    File(#[from] crate::files::FileError),

    /// Transfer-level failure on the client side.
    #[error("transfer error: {0}")]
    Transfer(#[from] crate::client::TransferError),

    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

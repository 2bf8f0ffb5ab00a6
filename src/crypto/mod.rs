//! Security layer: suites, key provisioning, and per-frame engines.

pub mod engine;
pub mod keys;
pub mod suite;
pub mod xor;

pub use crate::core::CryptoError;
pub use engine::{create_cipher, FrameCipher};
pub use keys::{SecretKey, DEFAULT_KEY_SALT, KEY_SIZE, PBKDF2_ITERATIONS};
pub use suite::SecurityLevel;
pub use xor::RollingXor;

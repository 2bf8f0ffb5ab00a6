//! # NetCopy
//!
//! Secure point-to-point file and directory transfer: a long-running
//! server accepts inbound connections and a client pushes files and
//! directory trees to it over an encrypted, length-prefixed framed
//! transport.
//!
//! The crate is organized around four interlocking pieces:
//!
//! - [`protocol`]: the little-endian wire codec and the typed
//!   request/response messages
//! - [`crypto`]: security suites, session keys, and the per-frame
//!   encryption engines
//! - [`transport`]: length-prefixed frame exchange over a reliable byte
//!   stream, cleartext for the handshake and encrypted afterwards
//! - [`client`] / [`server`]: the chunked, resumable transfer state
//!   machines on either end
//!
//! ## Example
//!
//! ```no_run
//! use netcopy::prelude::*;
//!
//! let mut config = ClientConfig::default();
//! config.secret_key = "0x".to_string() + &"ab".repeat(32);
//!
//! let mut client = Client::new(config);
//! client.set_security_level(SecurityLevel::High);
//! client.connect("203.0.113.7", 1245)?;
//! client.transfer_file(
//!     std::path::Path::new("/home/user/report.txt"),
//!     "/var/lib/net_copy/report.txt",
//!     false,
//! )?;
//! # Ok::<(), netcopy::client::TransferError>(())
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod compress;
pub mod config;
pub mod core;
pub mod crypto;
pub mod files;
pub mod protocol;
pub mod server;
pub mod transport;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::client::{Client, TransferError};
    pub use crate::config::{ClientConfig, ConfigError, ServerConfig};
    pub use crate::core::{CryptoError, NetcopyError, VERSION_STRING};
    pub use crate::crypto::{SecretKey, SecurityLevel};
    pub use crate::protocol::{Message, MessageKind};
    pub use crate::server::{Server, ServerHandle};
    pub use crate::transport::{FrameTransport, TransportError};
}

pub use crate::client::Client;
pub use crate::config::{ClientConfig, ServerConfig};
pub use crate::core::NetcopyError;
pub use crate::crypto::{SecretKey, SecurityLevel};
pub use crate::server::Server;

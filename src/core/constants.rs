//! Protocol constants.
//!
//! Wire values here are fixed by the protocol and MUST NOT be changed;
//! peers built from different revisions interoperate only as long as these
//! agree.

use std::time::Duration;

// =============================================================================
// VERSIONING
// =============================================================================

/// Version string exchanged during the handshake.
pub const VERSION_STRING: &str = "NetCopy v1.0.0";

// =============================================================================
// FRAMING
// =============================================================================

/// Handshake nonce length in bytes.
pub const HANDSHAKE_NONCE_SIZE: usize = 16;

/// Hard cap on a declared payload length.
pub const MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Hard cap on the outer frame length, payload plus header and the worst
/// envelope overhead (16-byte IV + 16-byte tag).
pub const MAX_FRAME_SIZE: usize = MAX_PAYLOAD_SIZE + crate::protocol::HEADER_SIZE + 32;

// =============================================================================
// TRANSFER
// =============================================================================

/// Default per-chunk read size.
pub const DEFAULT_BUFFER_SIZE: usize = 65536;

/// Sentinel resume offset in a FileRequest: "tell me what is on disk".
pub const RESUME_PROBE: u64 = 1;

/// Marker basenames that materialize an empty directory server-side
/// without creating the named file.
pub const DIR_MARKER_NAMES: [&str; 2] = [".netcopy_empty_dir", ".netcopy_dir_marker"];

/// Marker basename the client sends for empty directories.
pub const DIR_MARKER: &str = ".netcopy_empty_dir";

// =============================================================================
// NETWORK DEFAULTS
// =============================================================================

/// Default server port.
pub const DEFAULT_PORT: u16 = 1245;

/// Default socket read/write timeout.
pub const DEFAULT_SOCKET_TIMEOUT: Duration = Duration::from_secs(30);

/// Default listen backlog / concurrent connection target.
pub const DEFAULT_MAX_CONNECTIONS: usize = 10;

//! Framed message transport.

pub mod framing;

pub use framing::{FrameTransport, TransportError};

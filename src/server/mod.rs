//! Accept loop and per-connection transfer handling.

pub mod handler;
#[allow(clippy::module_inception)]
pub mod server;

pub use handler::ConnectionHandler;
pub use server::{Server, ServerError, ServerHandle};

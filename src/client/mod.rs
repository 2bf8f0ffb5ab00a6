//! Push-side client API.

#[allow(clippy::module_inception)]
mod client;

pub use client::{Client, PasswordPrompt, ProgressCallback, TransferError};

//! Push-side transfer state machine.
//!
//! The client opens one connection, performs the handshake, and then runs
//! the file protocol strictly in order for each file: request, response,
//! chunk/ack pairs until the last chunk. There is never more than one
//! outstanding chunk.

use std::collections::HashSet;
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info};

use crate::compress::{is_compressible, CompressionError, Compressor};
use crate::config::ClientConfig;
use crate::core::{
    CryptoError, DIR_MARKER, HANDSHAKE_NONCE_SIZE, MAX_PAYLOAD_SIZE, RESUME_PROBE, VERSION_STRING,
};
use crate::crypto::{create_cipher, SecretKey, SecurityLevel};
use crate::files::{self, paths, FileError};
use crate::protocol::Message;
use crate::transport::{FrameTransport, TransportError};

/// Client-side transfer failures.
#[derive(Debug, Error)]
pub enum TransferError {
    /// Fatal connection failure.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Local filesystem failure.
    #[error("file error: {0}")]
    File(#[from] FileError),

    /// Key material problem.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Chunk compression failure.
    #[error("compression error: {0}")]
    Compression(#[from] CompressionError),

    /// The server rejected the file request.
    #[error("server rejected {path}: {reason}")]
    Rejected {
        /// File the request was for.
        path: String,
        /// Server's message, verbatim.
        reason: String,
    },

    /// The server failed to apply a chunk.
    #[error("transfer of {path} failed: {reason}")]
    ChunkFailed {
        /// File being transferred.
        path: String,
        /// Server's message, verbatim.
        reason: String,
    },

    /// The source file shrank while being read.
    #[error("source file truncated during transfer: {path}")]
    SourceTruncated {
        /// File being transferred.
        path: String,
    },

    /// The server requires authentication and no key is available.
    #[error("server requires authentication and no secret key or password is available")]
    MissingKey,

    /// Operation requires an established connection.
    #[error("not connected")]
    NotConnected,

    /// A single-file transfer was pointed at a directory, or vice versa.
    #[error("{path} is not a {expected}")]
    WrongKind {
        /// Offending path.
        path: String,
        /// What the operation needed ("regular file" / "directory").
        expected: &'static str,
    },

    /// Connecting to the server failed.
    #[error("connection failed: {0}")]
    Connect(#[source] std::io::Error),
}

/// Progress observer: (bytes transferred, total bytes, file path).
pub type ProgressCallback = Box<dyn FnMut(u64, u64, &Path) + Send>;

/// Supplies key material when the server demands authentication and the
/// configuration has none. The binary wires this to an interactive prompt.
pub type PasswordPrompt = Box<dyn FnOnce() -> Option<String> + Send>;

/// The transfer client.
pub struct Client {
    config: ClientConfig,
    security_level: SecurityLevel,
    transport: Option<FrameTransport<TcpStream>>,
    negotiated_level: SecurityLevel,
    progress: Option<ProgressCallback>,
    password_prompt: Option<PasswordPrompt>,
    compressor: Compressor,
}

impl Client {
    /// Create a client from a configuration snapshot.
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            security_level: SecurityLevel::High,
            transport: None,
            negotiated_level: SecurityLevel::High,
            progress: None,
            password_prompt: None,
            compressor: Compressor::new(MAX_PAYLOAD_SIZE),
        }
    }

    /// Choose the suite requested at handshake. Defaults to HIGH.
    pub fn set_security_level(&mut self, level: SecurityLevel) {
        self.security_level = level;
    }

    /// Observe per-chunk progress.
    pub fn set_progress_callback(&mut self, callback: ProgressCallback) {
        self.progress = Some(callback);
    }

    /// Install the fallback used when authentication is required but no
    /// key is configured.
    pub fn set_password_prompt(&mut self, prompt: PasswordPrompt) {
        self.password_prompt = Some(prompt);
    }

    /// Suite the session actually uses, fixed by the handshake.
    pub fn negotiated_level(&self) -> SecurityLevel {
        self.negotiated_level
    }

    /// Connect and perform the handshake.
    pub fn connect(&mut self, host: &str, port: u16) -> Result<(), TransferError> {
        info!(%host, port, "connecting");

        let addr = (host, port)
            .to_socket_addrs()
            .map_err(TransferError::Connect)?
            .next()
            .ok_or_else(|| {
                TransferError::Connect(std::io::Error::new(
                    std::io::ErrorKind::AddrNotAvailable,
                    "host resolved to no addresses",
                ))
            })?;
        let stream = TcpStream::connect_timeout(&addr, self.config.timeout)
            .map_err(TransferError::Connect)?;
        stream
            .set_read_timeout(Some(self.config.timeout))
            .map_err(TransferError::Connect)?;
        stream
            .set_write_timeout(Some(self.config.timeout))
            .map_err(TransferError::Connect)?;

        let mut transport = FrameTransport::new(stream);
        transport.send(&Message::HandshakeRequest {
            client_version: VERSION_STRING.to_string(),
            client_nonce: random_nonce(),
            security_level: self.security_level,
        })?;

        let (server_version, authentication_required, accepted_level) = match transport.recv()? {
            Message::HandshakeResponse {
                server_version,
                authentication_required,
                accepted_security_level,
                ..
            } => (server_version, authentication_required, accepted_security_level),
            other => {
                return Err(TransportError::UnexpectedMessage {
                    expected: "HandshakeResponse",
                    got: other.kind(),
                }
                .into());
            }
        };

        info!(
            %server_version,
            level = accepted_level.describe(),
            "handshake complete"
        );

        if authentication_required {
            debug!("server requires shared-key authentication");
        }
        let key = self.resolve_key()?;
        transport.finish_handshake(create_cipher(accepted_level, &key));

        self.negotiated_level = accepted_level;
        self.transport = Some(transport);
        Ok(())
    }

    /// Close the connection.
    pub fn disconnect(&mut self) {
        self.transport = None;
    }

    fn resolve_key(&mut self) -> Result<SecretKey, TransferError> {
        if !self.config.secret_key.is_empty() {
            return Ok(SecretKey::from_hex(&self.config.secret_key)?);
        }

        // No configured key: fall back to the master password. The channel
        // is encrypted whether or not the server demands authentication, so
        // key material is required either way.
        let password = self
            .password_prompt
            .take()
            .and_then(|prompt| prompt())
            .filter(|p| !p.is_empty())
            .ok_or(TransferError::MissingKey)?;

        if self.config.key_salt.is_empty() {
            Ok(SecretKey::derive_from_password(&password))
        } else {
            let salt = hex::decode(&self.config.key_salt).map_err(|_| CryptoError::InvalidHex)?;
            Ok(SecretKey::derive_with_salt(&password, &salt))
        }
    }

    /// Transfer one regular file.
    pub fn transfer_file(
        &mut self,
        local_path: &Path,
        remote_path: &str,
        resume: bool,
    ) -> Result<(), TransferError> {
        if local_path.is_dir() {
            return Err(TransferError::WrongKind {
                path: local_path.display().to_string(),
                expected: "regular file",
            });
        }

        self.transfer_single_file(local_path, remote_path, resume)
    }

    /// Transfer a directory tree.
    ///
    /// The remote layout is `remote_path / basename(local_path) / <relative
    /// entry path>`, always with forward slashes on the wire. Directories
    /// that received no files are materialized afterwards through the
    /// marker-file convention, when enabled in configuration.
    pub fn transfer_directory(
        &mut self,
        local_path: &Path,
        remote_path: &str,
        resume: bool,
    ) -> Result<(), TransferError> {
        if !local_path.is_dir() {
            return Err(TransferError::WrongKind {
                path: local_path.display().to_string(),
                expected: "directory",
            });
        }

        let entries = files::list_tree(local_path)?;
        let base_remote = join_wire(remote_path, &local_basename(local_path));

        let mut created_directories: HashSet<String> = HashSet::new();
        let mut directories: Vec<String> = Vec::new();

        for entry in &entries {
            let relative = entry
                .path
                .strip_prefix(local_path)
                .unwrap_or(&entry.path)
                .to_string_lossy()
                .into_owned();
            let remote_entry = join_wire(&base_remote, &relative);

            if entry.is_directory {
                directories.push(remote_entry);
                continue;
            }

            debug!(local = %entry.path.display(), remote = %remote_entry, "transferring");
            self.transfer_single_file(&entry.path, &remote_entry, resume)?;

            // Every ancestor of a transferred file exists server-side.
            let mut dir = parent_wire(&remote_entry);
            while !dir.is_empty() && dir != "/" {
                if !created_directories.insert(dir.clone()) {
                    break;
                }
                dir = parent_wire(&dir);
            }
        }

        if self.config.create_empty_directories {
            for dir in directories {
                if !created_directories.contains(&dir) {
                    debug!(remote = %dir, "creating empty directory");
                    self.create_empty_directory(&dir)?;
                }
            }
        }

        Ok(())
    }

    /// Materialize an empty directory server-side via the marker file.
    pub fn create_empty_directory(&mut self, remote_dir: &str) -> Result<(), TransferError> {
        let marker = join_wire(remote_dir, DIR_MARKER);

        self.send(&Message::FileRequest {
            source_path: DIR_MARKER.to_string(),
            destination_path: marker.clone(),
            recursive: false,
            resume_offset: 0,
        })?;
        self.expect_file_response(&marker)?;

        self.send(&Message::FileData {
            offset: 0,
            data: Vec::new(),
            is_last_chunk: true,
            compressed: false,
        })?;
        self.expect_file_ack(&marker)?;
        Ok(())
    }

    fn transfer_single_file(
        &mut self,
        local_path: &Path,
        remote_path: &str,
        resume: bool,
    ) -> Result<(), TransferError> {
        let total_size = files::file_size(local_path)?;
        let wire_path = paths::to_wire(remote_path);

        self.send(&Message::FileRequest {
            source_path: paths::to_wire(&local_path.to_string_lossy()),
            destination_path: wire_path.clone(),
            recursive: false,
            resume_offset: if resume { RESUME_PROBE } else { 0 },
        })?;

        let resume_offset = self.expect_file_response(&wire_path)?;
        if resume && resume_offset > 0 {
            info!(
                local = %local_path.display(),
                remote = %wire_path,
                resume_offset,
                "resuming transfer"
            );
        } else {
            info!(local = %local_path.display(), remote = %wire_path, "starting transfer");
        }

        self.send_file_data(local_path, resume_offset, total_size)?;
        info!(local = %local_path.display(), "transfer complete");
        Ok(())
    }

    fn send_file_data(
        &mut self,
        local_path: &Path,
        resume_offset: u64,
        total_size: u64,
    ) -> Result<(), TransferError> {
        let path_label = local_path.display().to_string();
        let compress = is_compressible(local_path);

        // A zero-byte file still needs one chunk so the server creates it.
        if total_size == 0 {
            self.send(&Message::FileData {
                offset: 0,
                data: Vec::new(),
                is_last_chunk: true,
                compressed: false,
            })?;
            self.expect_file_ack(&path_label)?;
            self.report_progress(0, 0, local_path);
            return Ok(());
        }

        let mut bytes_sent = resume_offset;
        while bytes_sent < total_size {
            let want = (total_size - bytes_sent).min(self.config.buffer_size as u64) as usize;
            let chunk = files::read_chunk(local_path, bytes_sent, want)?;
            if chunk.is_empty() {
                return Err(TransferError::SourceTruncated {
                    path: path_label.clone(),
                });
            }
            let raw_len = chunk.len() as u64;

            let (payload, compressed) = if compress {
                let result = self.compressor.compress(&chunk)?;
                let compressed = result.is_compressed();
                (result.into_data(), compressed)
            } else {
                (chunk, false)
            };

            self.send(&Message::FileData {
                offset: bytes_sent,
                data: payload,
                is_last_chunk: bytes_sent + raw_len >= total_size,
                compressed,
            })?;
            self.expect_file_ack(&path_label)?;

            bytes_sent += raw_len;
            self.report_progress(bytes_sent, total_size, local_path);
            self.throttle();
        }

        Ok(())
    }

    fn send(&mut self, message: &Message) -> Result<(), TransferError> {
        self.transport
            .as_mut()
            .ok_or(TransferError::NotConnected)?
            .send(message)
            .map_err(Into::into)
    }

    fn recv(&mut self) -> Result<Message, TransferError> {
        self.transport
            .as_mut()
            .ok_or(TransferError::NotConnected)?
            .recv()
            .map_err(Into::into)
    }

    /// Read a FileResponse, surfacing a rejection with the server's
    /// message verbatim. Returns the server-reported resume offset.
    fn expect_file_response(&mut self, path: &str) -> Result<u64, TransferError> {
        match self.recv()? {
            Message::FileResponse {
                success: true,
                resume_offset,
                ..
            } => Ok(resume_offset),
            Message::FileResponse {
                success: false,
                error_message,
                ..
            } => Err(TransferError::Rejected {
                path: path.to_string(),
                reason: error_message,
            }),
            other => Err(TransportError::UnexpectedMessage {
                expected: "FileResponse",
                got: other.kind(),
            }
            .into()),
        }
    }

    fn expect_file_ack(&mut self, path: &str) -> Result<u64, TransferError> {
        match self.recv()? {
            Message::FileAck {
                success: true,
                bytes_received,
                ..
            } => Ok(bytes_received),
            Message::FileAck {
                success: false,
                error_message,
                ..
            } => Err(TransferError::ChunkFailed {
                path: path.to_string(),
                reason: error_message,
            }),
            other => Err(TransportError::UnexpectedMessage {
                expected: "FileAck",
                got: other.kind(),
            }
            .into()),
        }
    }

    fn report_progress(&mut self, sent: u64, total: u64, path: &Path) {
        if let Some(callback) = self.progress.as_mut() {
            callback(sent, total, path);
        }
    }

    /// Pace chunk emission when a bandwidth cap is configured.
    fn throttle(&self) {
        let percent = self.config.max_bandwidth_percent;
        if percent > 0 && percent < 100 {
            let delay_ms = ((100.0 / percent as f64 - 1.0) * 10.0) as u64;
            std::thread::sleep(Duration::from_millis(delay_ms));
        }
    }
}

fn random_nonce() -> Vec<u8> {
    use rand::RngCore;
    let mut nonce = vec![0u8; HANDSHAKE_NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}

fn local_basename(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Join wire-convention paths with a single forward slash.
fn join_wire(base: &str, relative: &str) -> String {
    let relative = paths::to_wire(relative);
    let relative = relative.trim_start_matches('/');
    if base.is_empty() {
        return relative.to_string();
    }
    format!("{}/{}", base.trim_end_matches('/'), relative)
}

fn parent_wire(path: &str) -> String {
    match path.rsplit_once('/') {
        Some(("", _)) => "/".to_string(),
        Some((parent, _)) => parent.to_string(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_wire() {
        assert_eq!(join_wire("/tmp/out", "a.bin"), "/tmp/out/a.bin");
        assert_eq!(join_wire("/tmp/out/", "sub/b.bin"), "/tmp/out/sub/b.bin");
        assert_eq!(join_wire("/tmp/out", "sub\\c.bin"), "/tmp/out/sub/c.bin");
    }

    #[test]
    fn test_parent_wire() {
        assert_eq!(parent_wire("/tmp/out/a.bin"), "/tmp/out");
        assert_eq!(parent_wire("/a"), "/");
        assert_eq!(parent_wire("plain"), "");
    }
}

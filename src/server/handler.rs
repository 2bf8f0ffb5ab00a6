//! Per-connection protocol handler.
//!
//! A handler owns the accepted stream, its cipher, and the destination
//! path authorized by the most recent file request. The message loop is
//! strictly sequential: requests and chunks arrive one at a time and each
//! chunk is acknowledged before the client sends the next.
//!
//! Error severities follow the propagation policy: framing, protocol, and
//! crypto failures tear the connection down; a failed disk write is
//! reported through a `success=false` ack and the session continues.

use std::io::ErrorKind;
use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::server::ServerError;
use crate::compress::Compressor;
use crate::config::ServerConfig;
use crate::core::{DIR_MARKER_NAMES, HANDSHAKE_NONCE_SIZE, MAX_PAYLOAD_SIZE, VERSION_STRING};
use crate::crypto::{create_cipher, SecretKey};
use crate::files::{self, paths};
use crate::protocol::Message;
use crate::transport::{FrameTransport, TransportError};

/// Handles one accepted connection to completion.
pub struct ConnectionHandler {
    transport: FrameTransport<TcpStream>,
    config: Arc<ServerConfig>,
    key: SecretKey,
    peer: String,
    /// Destination authorized by the latest FileRequest; the only file the
    /// next FileData may touch.
    current_file_path: Option<PathBuf>,
    compressor: Compressor,
}

impl ConnectionHandler {
    /// Wrap an accepted stream, applying the configured socket timeouts.
    pub fn new(
        stream: TcpStream,
        config: Arc<ServerConfig>,
        key: SecretKey,
    ) -> Result<Self, ServerError> {
        let peer = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        stream.set_read_timeout(Some(config.timeout))?;
        stream.set_write_timeout(Some(config.timeout))?;

        Ok(Self {
            transport: FrameTransport::new(stream),
            config,
            key,
            peer,
            current_file_path: None,
            compressor: Compressor::new(MAX_PAYLOAD_SIZE),
        })
    }

    /// Drive the connection until the client disconnects or a fatal error
    /// occurs. Consumes the handler; the stream closes on return.
    pub fn run(mut self) {
        info!(peer = %self.peer, "connection accepted");

        match self.serve() {
            Ok(()) => info!(peer = %self.peer, "connection closed"),
            Err(ServerError::Transport(TransportError::Io(e)))
                if e.kind() == ErrorKind::UnexpectedEof =>
            {
                // Client went away between frames; the normal end of a session.
                info!(peer = %self.peer, "connection closed");
            }
            Err(e) => warn!(peer = %self.peer, error = %e, "connection terminated"),
        }
    }

    fn serve(&mut self) -> Result<(), ServerError> {
        self.perform_handshake()?;

        loop {
            match self.transport.recv()? {
                Message::FileRequest {
                    source_path,
                    destination_path,
                    resume_offset,
                    ..
                } => self.handle_file_request(&source_path, &destination_path, resume_offset)?,
                Message::FileData {
                    offset,
                    data,
                    is_last_chunk,
                    compressed,
                } => self.handle_file_data(offset, data, is_last_chunk, compressed)?,
                other => {
                    return Err(ServerError::ProtocolViolation(format!(
                        "unexpected {:?} in transfer loop",
                        other.kind()
                    )));
                }
            }
        }
    }

    fn perform_handshake(&mut self) -> Result<(), ServerError> {
        let (client_version, level) = match self.transport.recv()? {
            Message::HandshakeRequest {
                client_version,
                security_level,
                ..
            } => (client_version, security_level),
            other => {
                return Err(TransportError::UnexpectedMessage {
                    expected: "HandshakeRequest",
                    got: other.kind(),
                }
                .into());
            }
        };

        info!(peer = %self.peer, %client_version, level = level.describe(), "handshake");

        // The client's suite is accepted unchanged; the response field
        // exists to allow a future downgrade.
        self.transport.send(&Message::HandshakeResponse {
            server_version: VERSION_STRING.to_string(),
            server_nonce: random_nonce(),
            authentication_required: self.config.require_auth,
            accepted_security_level: level,
        })?;

        self.transport.finish_handshake(create_cipher(level, &self.key));
        Ok(())
    }

    fn handle_file_request(
        &mut self,
        source_path: &str,
        destination_path: &str,
        resume_offset: u64,
    ) -> Result<(), ServerError> {
        debug!(peer = %self.peer, source = %source_path, dest = %destination_path, "file request");

        let response = match self.admit_request(source_path, destination_path, resume_offset) {
            Ok((resolved, reported_offset)) => {
                self.current_file_path = Some(resolved);
                Message::FileResponse {
                    success: true,
                    error_message: String::new(),
                    file_size: 0,
                    resume_offset: reported_offset,
                }
            }
            Err(reason) => {
                warn!(peer = %self.peer, dest = %destination_path, %reason, "request denied");
                self.current_file_path = None;
                Message::FileResponse {
                    success: false,
                    error_message: reason,
                    file_size: 0,
                    resume_offset: 0,
                }
            }
        };

        self.transport.send(&response)?;
        Ok(())
    }

    /// Authorize and resolve a destination, returning the native path and
    /// the resume offset to report. A `String` error becomes a
    /// `success=false` response and leaves the connection open.
    fn admit_request(
        &self,
        source_path: &str,
        destination_path: &str,
        resume_offset: u64,
    ) -> Result<(PathBuf, u64), String> {
        let native = paths::to_native(destination_path);
        if !paths::is_absolute(&native) {
            return Err(format!(
                "Relative paths are not allowed. All paths must be absolute. Path: {destination_path}"
            ));
        }

        let normalized = paths::lexical_normalize(Path::new(&native));
        let allowed = self.config.allowed_paths.iter().any(|base| {
            let base = paths::to_native(base);
            paths::is_within(&normalized, Path::new(&base))
        });
        if !allowed {
            return Err(format!("Access denied to path: {destination_path}"));
        }

        // A destination naming an existing directory receives the source's
        // basename.
        let ends_with_separator = native.ends_with('/') || native.ends_with('\\');
        let mut resolved = normalized;
        if ends_with_separator || resolved.is_dir() {
            let basename = wire_basename(source_path);
            if !basename.is_empty() {
                resolved = resolved.join(basename);
            }
        }

        let reported_offset = if resume_offset > 0 {
            let on_disk = files::partial_size(&resolved);
            debug!(path = %resolved.display(), on_disk, "resume probe");
            on_disk
        } else {
            0
        };

        if let Some(parent) = resolved.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                files::create_dir_all(parent).map_err(|e| e.to_string())?;
            }
        }

        Ok((resolved, reported_offset))
    }

    fn handle_file_data(
        &mut self,
        offset: u64,
        data: Vec<u8>,
        is_last_chunk: bool,
        compressed: bool,
    ) -> Result<(), ServerError> {
        let path = self
            .current_file_path
            .clone()
            .ok_or_else(|| {
                ServerError::ProtocolViolation("FileData before any FileRequest".to_string())
            })?;

        let ack = match self.apply_chunk(&path, offset, &data, compressed) {
            Ok(written) => Message::FileAck {
                bytes_received: offset + written,
                success: true,
                error_message: String::new(),
            },
            Err(reason) => {
                warn!(peer = %self.peer, path = %path.display(), %reason, "chunk write failed");
                Message::FileAck {
                    bytes_received: 0,
                    success: false,
                    error_message: reason,
                }
            }
        };

        if is_last_chunk {
            debug!(peer = %self.peer, path = %path.display(), "last chunk processed");
        }

        self.transport.send(&ack)?;
        Ok(())
    }

    /// Write one chunk, returning the number of raw bytes applied. A
    /// `String` error becomes a failed ack; the session continues.
    fn apply_chunk(
        &self,
        path: &Path,
        offset: u64,
        data: &[u8],
        compressed: bool,
    ) -> Result<u64, String> {
        let basename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        if DIR_MARKER_NAMES.contains(&basename.as_str()) {
            // Empty-directory marker: materialize the parent, never the file.
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() && !parent.exists() {
                    files::create_dir_all(parent).map_err(|e| e.to_string())?;
                }
            }
            debug!(path = %path.display(), "directory marker, parent materialized");
            return Ok(data.len() as u64);
        }

        let payload = if compressed {
            self.compressor
                .decompress(data)
                .map_err(|e| e.to_string())?
        } else {
            data.to_vec()
        };

        files::write_chunk(path, offset, &payload).map_err(|e| e.to_string())?;
        Ok(payload.len() as u64)
    }
}

fn random_nonce() -> Vec<u8> {
    use rand::RngCore;
    let mut nonce = vec![0u8; HANDSHAKE_NONCE_SIZE];
    rand::rngs::OsRng.fill_bytes(&mut nonce);
    nonce
}

fn wire_basename(path: &str) -> String {
    let unix = paths::to_wire(path);
    unix.rsplit('/')
        .next()
        .unwrap_or_default()
        .to_string()
}

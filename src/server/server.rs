//! Listener loop and worker lifecycle.
//!
//! The server accepts connections sequentially and hands each accepted
//! stream to its own OS thread. Workers share nothing but the immutable
//! configuration snapshot and the session key; each owns its stream, its
//! cipher, and its current-file state. Stopping flips the running flag and
//! nudges the listener so a pending accept returns; in-flight workers run
//! to completion.

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use thiserror::Error;
use tracing::{error, info, warn};

use super::handler::ConnectionHandler;
use crate::config::ServerConfig;
use crate::core::CryptoError;
use crate::crypto::SecretKey;
use crate::transport::TransportError;

/// Server-side failures.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Binding the listen endpoint failed.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address that failed to bind.
        addr: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Fatal connection failure.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Fatal crypto failure.
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// A message arrived in a state that forbids it.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// I/O error outside an established transport.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Handle for stopping a running server from another thread.
#[derive(Debug, Clone)]
pub struct ServerHandle {
    running: Arc<AtomicBool>,
    addr: SocketAddr,
}

impl ServerHandle {
    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Flip the running flag and wake the listener.
    ///
    /// The accept loop observes the flag on its next wakeup; the throwaway
    /// connection is what interrupts a pending accept.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = TcpStream::connect(self.addr);
    }
}

/// The transfer server.
pub struct Server {
    config: Arc<ServerConfig>,
    key: SecretKey,
    listener: Option<TcpListener>,
    running: Arc<AtomicBool>,
    workers: Vec<JoinHandle<()>>,
}

impl Server {
    /// Create a server from a configuration snapshot and session key.
    pub fn new(config: ServerConfig, key: SecretKey) -> Self {
        Self {
            config: Arc::new(config),
            key,
            listener: None,
            running: Arc::new(AtomicBool::new(false)),
            workers: Vec::new(),
        }
    }

    /// Bind the listen endpoint, returning a stop handle.
    pub fn bind(&mut self) -> Result<ServerHandle, ServerError> {
        let addr = format!(
            "{}:{}",
            self.config.listen_address, self.config.listen_port
        );
        let listener = TcpListener::bind(&addr).map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;

        let local_addr = listener.local_addr()?;
        info!(%local_addr, "listening");

        if self.config.allowed_paths.is_empty() {
            warn!("no allowed paths configured; all requests will be denied");
        } else {
            for path in &self.config.allowed_paths {
                info!(allowed_path = %path, "accepting writes beneath");
            }
        }

        self.running.store(true, Ordering::SeqCst);
        self.listener = Some(listener);
        Ok(ServerHandle {
            running: Arc::clone(&self.running),
            addr: local_addr,
        })
    }

    /// Accept connections until the running flag flips.
    ///
    /// Each accepted stream gets its own worker thread. Workers that
    /// already finished are reaped opportunistically; the rest are joined
    /// when the loop exits.
    pub fn run(&mut self) -> Result<(), ServerError> {
        let listener = self
            .listener
            .take()
            .ok_or_else(|| ServerError::ProtocolViolation("server not bound".to_string()))?;

        for incoming in listener.incoming() {
            if !self.running.load(Ordering::SeqCst) {
                break;
            }

            self.workers.retain(|worker| !worker.is_finished());

            match incoming {
                Ok(stream) => {
                    if self.workers.len() >= self.config.max_connections {
                        warn!(
                            max = self.config.max_connections,
                            "connection limit reached, refusing client"
                        );
                        drop(stream);
                        continue;
                    }

                    let config = Arc::clone(&self.config);
                    let key = self.key.clone();
                    self.workers.push(std::thread::spawn(move || {
                        handle_client(stream, config, key);
                    }));
                }
                Err(e) => {
                    if self.running.load(Ordering::SeqCst) {
                        error!(error = %e, "accept failed");
                    }
                }
            }
        }

        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
        info!("server stopped");
        Ok(())
    }
}

fn handle_client(stream: TcpStream, config: Arc<ServerConfig>, key: SecretKey) {
    let peer = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    match ConnectionHandler::new(stream, config, key) {
        Ok(handler) => handler.run(),
        Err(e) => error!(%peer, error = %e, "failed to set up connection"),
    }
}

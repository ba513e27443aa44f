// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// TCP listener for the LPD server.
//
// Accepts connections on the configured address and runs one server protocol
// engine per connection, each with its own queue backend session.  At most
// `client_connection_threads` connections are handled at once; further
// connections are accepted and wait for a free slot.  Closing the write side
// after the command is part of the protocol: it is how queue-state responses
// end.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::sync::{Notify, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use lpd_core::config::ServerConfig;
use lpd_core::error::{LpdError, Result};
use lpd_core::types::{Charset, ServerStatus};

use crate::queue::QueueBackend;
use crate::server::ServerProtocol;

/// State shared across all connection-handling tasks.
struct SharedState<B> {
    backend: B,
    charset: Charset,
    /// Bounds concurrently handled connections.
    slots: Arc<Semaphore>,
    active_connections: Arc<AtomicU32>,
}

/// LPD server bound to one TCP address.
pub struct LpdServer<B: QueueBackend> {
    config: ServerConfig,
    backend: B,
    status: ServerStatus,
    local_addr: Option<SocketAddr>,
    shutdown_signal: Arc<Notify>,
    task_handle: Option<JoinHandle<()>>,
    active_connections: Arc<AtomicU32>,
}

impl<B: QueueBackend + Clone> LpdServer<B> {
    /// Create a server in `Stopped` state. Call [`start`](Self::start) to
    /// begin accepting connections.
    pub fn new(config: ServerConfig, backend: B) -> Self {
        Self {
            config,
            backend,
            status: ServerStatus::Stopped,
            local_addr: None,
            shutdown_signal: Arc::new(Notify::new()),
            task_handle: None,
            active_connections: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Bound port while running, otherwise the configured one.
    pub fn port(&self) -> u16 {
        self.local_addr
            .map(|addr| addr.port())
            .unwrap_or(self.config.port)
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn status(&self) -> ServerStatus {
        self.status
    }

    /// Number of connections currently being handled.
    pub fn active_connections(&self) -> u32 {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Bind the listener and spawn the accept loop.
    ///
    /// # Errors
    ///
    /// Returns an error if the address does not resolve or cannot be bound.
    pub async fn start(&mut self) -> Result<()> {
        if self.status == ServerStatus::Running {
            debug!(port = self.port(), "LPD server already running");
            return Ok(());
        }

        self.status = ServerStatus::Starting;
        let listener = match self.bind().await {
            Ok(listener) => listener,
            Err(e) => {
                self.status = ServerStatus::Error;
                return Err(e);
            }
        };
        let local_addr = listener.local_addr()?;
        self.local_addr = Some(local_addr);

        info!(
            addr = %local_addr,
            queue_folder = %self.config.queue_folder.display(),
            threads = self.config.client_connection_threads,
            "LPD server listening"
        );

        let shared = Arc::new(SharedState {
            backend: self.backend.clone(),
            charset: self.config.charset,
            slots: Arc::new(Semaphore::new(self.config.client_connection_threads.max(1))),
            active_connections: Arc::clone(&self.active_connections),
        });
        let shutdown = Arc::clone(&self.shutdown_signal);

        let handle = tokio::spawn(async move {
            accept_loop(listener, shutdown, shared).await;
        });

        self.task_handle = Some(handle);
        self.status = ServerStatus::Running;
        Ok(())
    }

    /// Stop accepting connections and wait for the accept loop to exit.
    /// Connections already accepted run to completion.
    pub async fn stop(&mut self) -> Result<()> {
        if self.status != ServerStatus::Running {
            return Ok(());
        }

        info!(port = self.port(), "stopping LPD server");
        self.shutdown_signal.notify_one();

        if let Some(handle) = self.task_handle.take() {
            handle
                .await
                .map_err(|e| LpdError::Backend(format!("accept loop join: {e}")))?;
        }

        self.status = ServerStatus::Stopped;
        self.local_addr = None;
        info!("LPD server stopped");
        Ok(())
    }

    async fn bind(&self) -> Result<TcpListener> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let bind_addr = tokio::net::lookup_host(&addr)
            .await
            .map_err(|e| LpdError::Config(format!("resolve {addr}: {e}")))?
            .next()
            .ok_or_else(|| LpdError::Config(format!("{addr} did not resolve")))?;

        let socket = if bind_addr.is_ipv4() {
            TcpSocket::new_v4()?
        } else {
            TcpSocket::new_v6()?
        };
        socket.set_reuseaddr(true)?;
        socket.bind(bind_addr)?;
        Ok(socket.listen(self.config.socket_backlog_size)?)
    }
}

/// Runs until the shutdown signal fires. Each connection is handed off to
/// [`handle_connection`] in its own task.
async fn accept_loop<B: QueueBackend>(
    listener: TcpListener,
    shutdown: Arc<Notify>,
    shared: Arc<SharedState<B>>,
) {
    loop {
        tokio::select! {
            _ = shutdown.notified() => {
                debug!("accept loop received shutdown signal");
                break;
            }

            accept_result = listener.accept() => {
                match accept_result {
                    Ok((stream, peer_addr)) => {
                        debug!(peer = %peer_addr, "incoming LPD connection");
                        let state = Arc::clone(&shared);
                        tokio::spawn(async move {
                            let Ok(_permit) = Arc::clone(&state.slots).acquire_owned().await else {
                                return;
                            };
                            state.active_connections.fetch_add(1, Ordering::Relaxed);
                            if let Err(e) = handle_connection(stream, peer_addr, &state).await {
                                warn!(peer = %peer_addr, error = %e, "connection handler error");
                            }
                            state.active_connections.fetch_sub(1, Ordering::Relaxed);
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "failed to accept connection");
                    }
                }
            }
        }
    }
}

/// Run one command on `stream`, then close the write side.
async fn handle_connection<B: QueueBackend>(
    stream: TcpStream,
    peer_addr: SocketAddr,
    state: &SharedState<B>,
) -> Result<()> {
    let (reader, writer) = stream.into_split();
    let mut protocol = ServerProtocol::new(BufReader::new(reader), writer, state.backend.session())
        .with_charset(state.charset);

    let result = protocol.handle().await;

    let (_, mut writer, _) = protocol.into_parts();
    if let Err(e) = writer.shutdown().await {
        debug!(peer = %peer_addr, error = %e, "write side already closed");
    }

    if result.is_ok() {
        debug!(peer = %peer_addr, "LPD connection finished");
    }
    result
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::AsyncReadExt;

    use super::*;
    use crate::spool::FileSpool;

    fn config() -> ServerConfig {
        ServerConfig {
            host: "127.0.0.1".into(),
            port: 0,
            ..Default::default()
        }
    }

    async fn query(addr: SocketAddr, request: &[u8]) -> Vec<u8> {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(request).await.unwrap();
        stream.shutdown().await.unwrap();
        let mut response = Vec::new();
        stream.read_to_end(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let mut server = LpdServer::new(config(), FileSpool::new(dir.path(), None));
        assert_eq!(server.status(), ServerStatus::Stopped);

        server.start().await.unwrap();
        assert_eq!(server.status(), ServerStatus::Running);
        assert_ne!(server.port(), 0);

        server.stop().await.unwrap();
        assert_eq!(server.status(), ServerStatus::Stopped);
        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn queue_state_ends_with_close() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("RAW/100-0")).unwrap();
        let mut server = LpdServer::new(config(), FileSpool::new(dir.path(), None));
        server.start().await.unwrap();
        let addr = server.local_addr().unwrap();

        assert_eq!(query(addr, b"\x03RAW\n").await, b"100-0\n");
        assert_eq!(query(addr, b"\x03PDF\n").await, b"Queue PDF does not exist.");

        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn bad_connection_does_not_stop_server() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("RAW")).unwrap();
        let mut server = LpdServer::new(config(), FileSpool::new(dir.path(), None));
        server.start().await.unwrap();
        let addr = server.local_addr().unwrap();

        assert!(query(addr, b"\x09").await.is_empty());
        assert!(query(addr, b"").await.is_empty());
        assert_eq!(query(addr, b"\x03RAW\n").await, b"");
        assert_eq!(server.status(), ServerStatus::Running);

        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn busy_slot_delays_next_connection() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("RAW/1-0")).unwrap();
        let single = ServerConfig {
            client_connection_threads: 1,
            ..config()
        };
        let mut server = LpdServer::new(single, FileSpool::new(dir.path(), None));
        server.start().await.unwrap();
        let addr = server.local_addr().unwrap();

        // Hold the only slot in the sub-command phase.
        let mut stalled = TcpStream::connect(addr).await.unwrap();
        stalled.write_all(b"\x02RAW\n").await.unwrap();
        let mut ack = [0xffu8; 1];
        stalled.read_exact(&mut ack).await.unwrap();
        assert_eq!(ack, [0]);

        let mut waiting = TcpStream::connect(addr).await.unwrap();
        waiting.write_all(b"\x03RAW\n").await.unwrap();
        waiting.shutdown().await.unwrap();
        let mut first = [0u8; 1];
        let early =
            tokio::time::timeout(Duration::from_millis(200), waiting.read(&mut first)).await;
        assert!(early.is_err());
        assert_eq!(server.active_connections(), 1);

        drop(stalled);
        let mut response = Vec::new();
        tokio::time::timeout(Duration::from_secs(5), waiting.read_to_end(&mut response))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response, b"1-0\n");

        server.stop().await.unwrap();
    }

    #[tokio::test]
    async fn port_in_use_is_error_state() {
        let dir = tempfile::tempdir().unwrap();
        let mut first = LpdServer::new(config(), FileSpool::new(dir.path(), None));
        first.start().await.unwrap();

        let taken = ServerConfig {
            port: first.port(),
            ..config()
        };
        let mut second = LpdServer::new(taken, FileSpool::new(dir.path(), None));
        assert!(second.start().await.is_err());
        assert_eq!(second.status(), ServerStatus::Error);

        first.stop().await.unwrap();
    }
}

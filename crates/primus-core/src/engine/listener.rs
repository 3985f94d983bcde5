//! Accept loop for the well-known coordination address.
//!
//! Holding this listener is what makes a process primary: only one process
//! can bind the address. Accepted sockets are handed to the engine over a
//! channel so that all registry mutation stays on the engine task.

use crate::config::ServerConfig;
use crate::Result;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};

/// An accepted socket plus the live-connection counter slot it occupies.
pub struct Incoming {
    pub stream: TcpStream,
    pub peer: SocketAddr,
    slot: ConnectionSlot,
}

impl Incoming {
    /// Split off the connection slot, which must be kept alive as long as the
    /// connection is.
    pub fn into_parts(self) -> (TcpStream, ConnectionSlot) {
        (self.stream, self.slot)
    }
}

/// Decrements the live-connection count when dropped.
pub struct ConnectionSlot {
    active: Arc<AtomicUsize>,
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.active.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Handle to a running listener. Dropping stops accepting.
pub struct ListenerHandle {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task_handle: Option<tokio::task::JoinHandle<()>>,
}

impl ListenerHandle {
    /// Bind `host:port` and start accepting.
    ///
    /// Fails if the address is already taken, which simply means another
    /// process is primary.
    pub async fn bind(
        host: &str,
        port: u16,
        incoming_tx: mpsc::UnboundedSender<Incoming>,
    ) -> Result<Self> {
        let listener = TcpListener::bind((host, port)).await?;
        let addr = listener.local_addr()?;

        info!("Coordination server listening on {}", addr);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let active = Arc::new(AtomicUsize::new(0));
        let task_handle = tokio::spawn(Self::accept_loop(listener, incoming_tx, shutdown_rx, active));

        Ok(Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
            task_handle: Some(task_handle),
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting new connections.
    pub fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }

    async fn accept_loop(
        listener: TcpListener,
        incoming_tx: mpsc::UnboundedSender<Incoming>,
        mut shutdown_rx: oneshot::Receiver<()>,
        active: Arc<AtomicUsize>,
    ) {
        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    info!("Coordination server shutting down");
                    break;
                }
                accept_result = listener.accept() => {
                    match accept_result {
                        Ok((stream, peer)) => {
                            let current = active.load(Ordering::Relaxed);
                            if current >= ServerConfig::MAX_CONNECTIONS {
                                warn!(
                                    "Rejecting connection from {}: at max capacity ({})",
                                    peer,
                                    ServerConfig::MAX_CONNECTIONS
                                );
                                continue;
                            }

                            active.fetch_add(1, Ordering::Relaxed);
                            let slot = ConnectionSlot { active: active.clone() };
                            if incoming_tx.send(Incoming { stream, peer, slot }).is_err() {
                                // Engine is gone.
                                break;
                            }
                        }
                        Err(e) => {
                            error!("Accept error: {}", e);
                        }
                    }
                }
            }
        }
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(handle) = self.task_handle.take() {
            handle.abort();
        }
    }
}

//! TCP control server shell
//!
//! Accepts control connections on the session port and keeps them open
//! until a stop is requested. Payloads are read and discarded. Accept
//! errors (e.g. EMFILE) are logged and retried; only a stop request ends
//! the server.

use super::lifecycle::ServerLifecycle;
use super::{SyncServer, TcpSyncServer, Termination};
use crate::{Error, Result};
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Pause after a failed accept before trying again
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Source of incoming control connections
pub(crate) trait Acceptor: Send + Sync + 'static {
    fn accept(&self) -> impl Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send;
}

impl Acceptor for TcpListener {
    fn accept(&self) -> impl Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send {
        TcpListener::accept(self)
    }
}

/// TCP control server
pub struct TcpControlServer {
    local_addr: SocketAddr,
    lifecycle: Arc<ServerLifecycle>,
}

impl TcpControlServer {
    /// Bind `addr` and start accepting connections
    ///
    /// Must be called from within a tokio runtime. Port 0 lets the OS
    /// choose; [`bound_port`](TcpSyncServer::bound_port) reports the result.
    pub fn bind(addr: SocketAddr, buffer_target: u8) -> Result<Self> {
        let std_listener = std::net::TcpListener::bind(addr)
            .map_err(|e| Error::Server(format!("Failed to bind TCP {}: {}", addr, e)))?;
        std_listener.set_nonblocking(true)?;

        let listener = TcpListener::from_std(std_listener)?;
        let local_addr = listener.local_addr()?;
        info!(
            "TCP control server listening on {} (buffer target {})",
            local_addr, buffer_target
        );

        let lifecycle = ServerLifecycle::new();
        tokio::spawn(accept_loop(listener, Arc::clone(&lifecycle)));

        Ok(Self {
            local_addr,
            lifecycle,
        })
    }
}

impl SyncServer for TcpControlServer {
    fn request_stop(&self) {
        if !self.lifecycle.is_stop_requested() {
            info!("Stopping TCP control server on {}", self.local_addr);
        }
        self.lifecycle.request_stop();
    }

    fn terminated(&self) -> Termination {
        self.lifecycle.terminated()
    }
}

impl TcpSyncServer for TcpControlServer {
    fn bound_port(&self) -> u16 {
        self.local_addr.port()
    }
}

pub(crate) async fn accept_loop<A: Acceptor>(listener: A, lifecycle: Arc<ServerLifecycle>) {
    let _guard = lifecycle.termination_guard();
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            _ = lifecycle.stop_requested() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!("Accepted control connection from {}", peer);
                    connections.spawn(serve_connection(stream, peer, Arc::clone(&lifecycle)));
                }
                Err(e) => {
                    warn!("TCP accept failed, retrying: {}", e);
                    tokio::select! {
                        _ = lifecycle.stop_requested() => break,
                        _ = tokio::time::sleep(ACCEPT_RETRY_DELAY) => {}
                    }
                }
            },
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    drop(listener);
    while connections.join_next().await.is_some() {}
    info!("TCP control server ended");
}

async fn serve_connection(mut stream: TcpStream, peer: SocketAddr, lifecycle: Arc<ServerLifecycle>) {
    let mut buf = [0u8; 1024];
    loop {
        tokio::select! {
            _ = lifecycle.stop_requested() => break,
            read = stream.read(&mut buf) => match read {
                Ok(0) => break,
                Ok(n) => debug!("Control connection {} sent {} bytes", peer, n),
                Err(e) => {
                    debug!("Control connection {} failed: {}", peer, e);
                    break;
                }
            },
        }
    }
    debug!("Control connection {} closed", peer);
}

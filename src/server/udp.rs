//! UDP data server shell

use super::lifecycle::ServerLifecycle;
use super::{SyncServer, Termination};
use crate::{Error, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::UdpSocket;
use tracing::{debug, info, trace, warn};

/// Largest datagram the server reads
const MAX_DATAGRAM: usize = 1500;

/// UDP data server
pub struct UdpDataServer {
    local_addr: SocketAddr,
    lifecycle: Arc<ServerLifecycle>,
}

impl UdpDataServer {
    /// Bind `addr` and start receiving datagrams
    ///
    /// Must be called from within a tokio runtime.
    pub fn bind(addr: SocketAddr) -> Result<Self> {
        let std_socket = std::net::UdpSocket::bind(addr)
            .map_err(|e| Error::Server(format!("Failed to bind UDP {}: {}", addr, e)))?;
        std_socket.set_nonblocking(true)?;

        let socket = UdpSocket::from_std(std_socket)?;
        let local_addr = socket.local_addr()?;
        info!("UDP data server listening on {}", local_addr);

        let lifecycle = ServerLifecycle::new();
        tokio::spawn(receive_loop(socket, Arc::clone(&lifecycle)));

        Ok(Self {
            local_addr,
            lifecycle,
        })
    }

    /// Address the socket is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }
}

impl SyncServer for UdpDataServer {
    fn request_stop(&self) {
        if !self.lifecycle.is_stop_requested() {
            info!("Stopping UDP data server on {}", self.local_addr);
        }
        self.lifecycle.request_stop();
    }

    fn terminated(&self) -> Termination {
        self.lifecycle.terminated()
    }
}

async fn receive_loop(socket: UdpSocket, lifecycle: Arc<ServerLifecycle>) {
    let _guard = lifecycle.termination_guard();
    let mut buf = vec![0u8; MAX_DATAGRAM];

    loop {
        tokio::select! {
            _ = lifecycle.stop_requested() => break,
            received = socket.recv_from(&mut buf) => match received {
                Ok((n, peer)) => trace!("UDP datagram of {} bytes from {}", n, peer),
                // ICMP port-unreachable surfaces here on some platforms; keep serving.
                Err(e) if e.kind() == std::io::ErrorKind::ConnectionReset => {
                    debug!("UDP peer unreachable: {}", e);
                }
                Err(e) => {
                    warn!("UDP receive failed: {}", e);
                    break;
                }
            },
        }
    }

    info!("UDP data server ended");
}

//! Synchronization server pair
//!
//! A netplay session runs two servers on the same port number: a TCP control
//! server and a UDP data server that carries per-frame input and reports
//! desync. The worker only needs to create them, learn the TCP port, ask
//! them to stop and wait for them to end; the traits below are that seam.
//!
//! [`ShellServers`] is a protocol-agnostic implementation that binds the
//! sockets and accepts traffic without interpreting it.

pub mod lifecycle;
pub mod tcp;
pub mod udp;

use crate::Result;
use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::sync::Arc;

pub use lifecycle::ServerLifecycle;
pub use tcp::TcpControlServer;
pub use udp::UdpDataServer;

/// Callback invoked with the synchronization step at which a desync was detected
pub type DesyncCallback = Arc<dyn Fn(u32) + Send + Sync>;

/// Future that resolves once a server has ended
pub type Termination = Pin<Box<dyn Future<Output = ()> + Send>>;

/// One of the two synchronization servers
pub trait SyncServer: Send + Sync {
    /// Ask the server to stop; idempotent and callable from any thread
    fn request_stop(&self);

    /// Resolves when the server has ended, normally or not
    fn terminated(&self) -> Termination;
}

/// The TCP control server, which owns the session's port number
pub trait TcpSyncServer: SyncServer {
    /// Port the server is listening on
    fn bound_port(&self) -> u16;
}

/// Creates the servers of a session
///
/// Both methods are called from the session worker, inside its tokio
/// runtime, so implementations may spawn tasks.
pub trait SyncServerFactory: Send + Sync {
    /// Bind the TCP control server; port 0 lets the OS choose
    fn create_tcp(&self, port: u16) -> Result<Arc<dyn TcpSyncServer>>;

    /// Bind the UDP data server on the TCP server's port
    fn create_udp(&self, port: u16, on_desync: DesyncCallback) -> Result<Arc<dyn SyncServer>>;
}

/// Factory for the socket-only servers
#[derive(Debug, Clone)]
pub struct ShellServers {
    bind_address: IpAddr,
    buffer_target: u8,
}

impl ShellServers {
    /// Servers bound on `bind_address`
    pub fn new(bind_address: IpAddr, buffer_target: u8) -> Self {
        Self {
            bind_address,
            buffer_target,
        }
    }
}

impl SyncServerFactory for ShellServers {
    fn create_tcp(&self, port: u16) -> Result<Arc<dyn TcpSyncServer>> {
        let server = TcpControlServer::bind(SocketAddr::new(self.bind_address, port), self.buffer_target)?;
        Ok(Arc::new(server))
    }

    // The shell does not read sync data, so it never reports desync.
    fn create_udp(&self, port: u16, _on_desync: DesyncCallback) -> Result<Arc<dyn SyncServer>> {
        let server = UdpDataServer::bind(SocketAddr::new(self.bind_address, port))?;
        Ok(Arc::new(server))
    }
}

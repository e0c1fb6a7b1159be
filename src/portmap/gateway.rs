//! Gateway capability consumed by the port mapper

use super::types::{GatewayError, IpProtocol};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// The four primitive NAT traversal operations
///
/// A gateway handle is not safe for concurrent use; callers reach it only
/// through [`PortMapper`](super::PortMapper), which serializes every call.
pub trait Gateway: Send {
    /// Discover the gateway and prepare the handle
    fn init(&mut self, timeout: Duration) -> Result<(), GatewayError>;

    /// Forward `external_port` on the gateway to `internal_port` on this host
    fn add_mapping(
        &mut self,
        protocol: IpProtocol,
        description: &str,
        external_port: u16,
        internal_port: u16,
    ) -> Result<(), GatewayError>;

    /// Remove a mapping
    ///
    /// Removing a mapping that was never added, or port 0, must succeed
    /// as a no-op.
    fn remove_mapping(&mut self, protocol: IpProtocol, port: u16) -> Result<(), GatewayError>;

    /// Release the handle
    fn shutdown(&mut self);
}

/// A gateway shared by every session of an orchestrator
///
/// The mutex is the port mapper's gate.
pub type SharedGateway = Arc<Mutex<Box<dyn Gateway>>>;

/// Wrap a gateway for sharing between sessions
pub fn shared<G: Gateway + 'static>(gateway: G) -> SharedGateway {
    Arc::new(Mutex::new(Box::new(gateway)))
}

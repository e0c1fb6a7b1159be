//! UPnP IGD (Internet Gateway Device) gateway
//!
//! Discovers the IGD on the local network with SSDP and talks to it over
//! SOAP through `igd-next`. All calls block on network I/O.

use super::gateway::Gateway;
use super::types::{GatewayError, IpProtocol};
use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Lease duration for session mappings (0 = until removed or gateway reboot)
const LEASE_DURATION_SECS: u32 = 0;

/// IPv4 address of the interface that routes toward the internet
///
/// The gateway forwards mapped ports to this address.
pub(crate) fn outbound_ipv4() -> Result<Ipv4Addr, GatewayError> {
    // A connected UDP socket sends nothing; the kernel just picks a route.
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80))?;

    match socket.local_addr()?.ip() {
        IpAddr::V4(ip) if !ip.is_unspecified() => Ok(ip),
        other => Err(GatewayError::Internal(format!(
            "no IPv4 route for port mapping (got {})",
            other
        ))),
    }
}

fn to_igd_protocol(protocol: IpProtocol) -> igd_next::PortMappingProtocol {
    match protocol {
        IpProtocol::TCP => igd_next::PortMappingProtocol::TCP,
        IpProtocol::UDP => igd_next::PortMappingProtocol::UDP,
    }
}

/// Gateway backed by a UPnP IGD
#[derive(Default)]
pub struct IgdGateway {
    gateway: Option<igd_next::Gateway>,
    local_ip: Option<Ipv4Addr>,
}

impl IgdGateway {
    /// Create an uninitialized gateway; discovery happens in `init`
    pub fn new() -> Self {
        Self::default()
    }
}

impl Gateway for IgdGateway {
    fn init(&mut self, timeout: Duration) -> Result<(), GatewayError> {
        debug!("Searching for UPnP IGD gateway...");
        let gateway = igd_next::search_gateway(igd_next::SearchOptions {
            timeout: Some(timeout),
            ..Default::default()
        })
        .map_err(|e| {
            debug!("UPnP gateway search failed: {}", e);
            GatewayError::NoGateway
        })?;

        let local_ip = outbound_ipv4()?;
        info!("Found UPnP gateway at {} (local address {})", gateway.addr, local_ip);

        self.gateway = Some(gateway);
        self.local_ip = Some(local_ip);
        Ok(())
    }

    fn add_mapping(
        &mut self,
        protocol: IpProtocol,
        description: &str,
        external_port: u16,
        internal_port: u16,
    ) -> Result<(), GatewayError> {
        let (Some(gateway), Some(local_ip)) = (&self.gateway, self.local_ip) else {
            return Err(GatewayError::NotInitialized);
        };

        let local_addr = SocketAddr::new(IpAddr::V4(local_ip), internal_port);
        debug!(
            "Adding port mapping: {} {} -> {} ({})",
            protocol, external_port, local_addr, description
        );

        gateway
            .add_port(
                to_igd_protocol(protocol),
                external_port,
                local_addr,
                LEASE_DURATION_SECS,
                description,
            )
            .map_err(|e| {
                warn!("UPnP AddPortMapping failed: {}", e);
                GatewayError::AddFailed(e.to_string())
            })
    }

    fn remove_mapping(&mut self, protocol: IpProtocol, port: u16) -> Result<(), GatewayError> {
        if port == 0 {
            return Ok(());
        }
        let Some(gateway) = &self.gateway else {
            // Nothing can have been mapped without a discovered gateway.
            return Ok(());
        };

        gateway
            .remove_port(to_igd_protocol(protocol), port)
            .map_err(|e| GatewayError::RemoveFailed(e.to_string()))?;

        info!("UPnP mapping {} {} deleted", protocol, port);
        Ok(())
    }

    fn shutdown(&mut self) {
        if self.gateway.take().is_some() {
            debug!("UPnP gateway released");
        }
        self.local_ip = None;
    }
}

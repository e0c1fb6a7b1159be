//! Common types for the port mapping module

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Value of every port in the legacy failure triple
pub const FAILED_PORT: i32 = -1;

/// IP protocols a gateway mapping can forward
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[allow(clippy::upper_case_acronyms)]
pub enum IpProtocol {
    /// TCP protocol
    TCP,
    /// UDP protocol
    UDP,
}

impl fmt::Display for IpProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IpProtocol::TCP => f.write_str("TCP"),
            IpProtocol::UDP => f.write_str("UDP"),
        }
    }
}

/// The three mappings a netplay session asks the gateway for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MappingSlot {
    /// Room server port (TCP)
    Room,
    /// TCP control server port
    CoreTcp,
    /// UDP data server port, same number as the TCP control port
    CoreUdp,
}

impl MappingSlot {
    /// All slots in the order they are added and removed
    pub const ALL: [MappingSlot; 3] = [MappingSlot::Room, MappingSlot::CoreTcp, MappingSlot::CoreUdp];

    /// Protocol forwarded for this slot
    pub fn protocol(&self) -> IpProtocol {
        match self {
            MappingSlot::Room | MappingSlot::CoreTcp => IpProtocol::TCP,
            MappingSlot::CoreUdp => IpProtocol::UDP,
        }
    }
}

/// Ports opened on the gateway for a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappedPorts {
    /// Room server port
    pub room_port: u16,
    /// TCP control server port
    pub tcp_port: u16,
    /// UDP data server port
    pub udp_port: u16,
    /// When the gateway accepted the last mapping
    pub mapped_at: DateTime<Utc>,
}

/// Why one slot could not be mapped
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotFailure {
    /// Slot that failed
    pub slot: MappingSlot,
    /// Port that was requested
    pub port: u16,
    /// Gateway error message
    pub reason: String,
}

/// Total mapping failure, with the reason for every slot that failed
///
/// Slots that are not listed were mapped and stay registered until the
/// session tears down.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MappingFailure {
    /// Failed slots, in mapping order
    pub failures: Vec<SlotFailure>,
}

impl MappingFailure {
    /// Check whether the given slot failed
    pub fn failed(&self, slot: MappingSlot) -> bool {
        self.failures.iter().any(|f| f.slot == slot)
    }
}

impl fmt::Display for MappingFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .failures
            .iter()
            .map(|failure| {
                format!(
                    "{:?} {}/{}: {}",
                    failure.slot,
                    failure.slot.protocol(),
                    failure.port,
                    failure.reason
                )
            })
            .collect();
        f.write_str(&parts.join(", "))
    }
}

/// Result of a session's port mapping request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MappingOutcome {
    /// All three mappings succeeded
    Mapped(MappedPorts),
    /// At least one mapping failed
    Failed(MappingFailure),
}

impl MappingOutcome {
    /// Check if all mappings succeeded
    pub fn is_success(&self) -> bool {
        matches!(self, MappingOutcome::Mapped(_))
    }

    /// Legacy `(room, tcp, udp)` triple; `(-1, -1, -1)` on failure
    pub fn as_triple(&self) -> (i32, i32, i32) {
        match self {
            MappingOutcome::Mapped(ports) => (
                i32::from(ports.room_port),
                i32::from(ports.tcp_port),
                i32::from(ports.udp_port),
            ),
            MappingOutcome::Failed(_) => (FAILED_PORT, FAILED_PORT, FAILED_PORT),
        }
    }
}

/// Errors reported by gateway primitives
#[derive(Debug, Error)]
pub enum GatewayError {
    /// No gateway answered discovery
    #[error("No gateway found")]
    NoGateway,

    /// A mapping call was made before `init`
    #[error("Gateway not initialized")]
    NotInitialized,

    /// Gateway rejected an AddPortMapping request
    #[error("AddPortMapping failed: {0}")]
    AddFailed(String),

    /// Gateway rejected a DeletePortMapping request
    #[error("DeletePortMapping failed: {0}")]
    RemoveFailed(String),

    /// IO error during communication
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

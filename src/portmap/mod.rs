//! Port mapping (NAT traversal) for netplay sessions
//!
//! A session asks the local gateway to forward three ports: the room server
//! port over TCP, and the synchronization server port over both TCP and UDP.
//! Mappings are removed when the session ends.

pub mod gateway;
pub mod mapper;
pub mod types;
pub mod upnp;

pub use gateway::{Gateway, SharedGateway, shared};
pub use mapper::{MappingDescriptions, PortMapper};
pub use types::{
    FAILED_PORT, GatewayError, IpProtocol, MappedPorts, MappingFailure, MappingOutcome,
    MappingSlot, SlotFailure,
};
pub use upnp::IgdGateway;

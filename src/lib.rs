//! netplay-host - Netplay session host
//!
//! This library runs the host side of a multiplayer emulation session:
//! it starts the TCP/UDP synchronization servers on a dedicated worker,
//! reports the bound port and desync events to the embedding application,
//! and opens the session ports on the local gateway through UPnP.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod events;
pub mod host;
pub mod orchestrator;
pub mod portmap;
pub mod server;
pub mod session;
pub mod worker;

pub use config::NetplayConfig;
pub use events::{ChannelListener, NetplayEvent, NetplayListener};
pub use orchestrator::{NetplayOrchestrator, StopHandle};
pub use portmap::{Gateway, IgdGateway, MappedPorts, MappingFailure, MappingOutcome, PortMapper};
pub use session::SessionPhase;

/// Result type alias for netplay host operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for netplay host operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Configuration could not be read or written
    #[error("Config error: {0}")]
    Config(String),

    /// A synchronization server failed to start
    #[error("Server error: {0}")]
    Server(String),

    /// The session worker could not be started or reached
    #[error("Worker error: {0}")]
    Worker(String),

    /// Gateway (port mapping) error
    #[error("Gateway error: {0}")]
    Gateway(#[from] portmap::GatewayError),

    /// General I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    JsonSerialization(#[from] serde_json::Error),
}

/// Initialize the netplay host library with logging
pub fn init() {
    tracing_subscriber::fmt::init();
}

#[cfg(test)]
mod tests;

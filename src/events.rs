//! Session events delivered to the embedding application

use crate::portmap::MappingOutcome;
use crossbeam_channel::{Receiver, Sender, unbounded};
use tracing::debug;

/// Observer of a netplay session
///
/// Per session, `on_port_obtained` fires at most once and before
/// `on_finish`, which also fires at most once. `on_desync` may fire any
/// number of times with increasing step indices. `on_upnp_ports_obtained`
/// fires at most once, only if port mapping was requested, and is not
/// ordered against `on_finish`.
///
/// Callbacks run on the session worker or the mapping task and must not
/// block for long.
pub trait NetplayListener: Send + Sync {
    /// The TCP control server is listening on `port`
    fn on_port_obtained(&self, port: u16);

    /// Emulator instances diverged at synchronization step `step`
    fn on_desync(&self, step: u32);

    /// Both synchronization servers have ended
    fn on_finish(&self);

    /// Result of the session's port mapping request
    fn on_upnp_ports_obtained(&self, outcome: MappingOutcome);
}

/// A listener callback as a value
#[derive(Debug, Clone, PartialEq)]
pub enum NetplayEvent {
    /// See [`NetplayListener::on_port_obtained`]
    PortObtained(u16),
    /// See [`NetplayListener::on_desync`]
    Desync(u32),
    /// See [`NetplayListener::on_finish`]
    Finish,
    /// See [`NetplayListener::on_upnp_ports_obtained`]
    UpnpPortsObtained(MappingOutcome),
}

/// Listener that forwards every callback into a channel
///
/// Events arrive in the order the callbacks fired.
#[derive(Clone)]
pub struct ChannelListener {
    tx: Sender<NetplayEvent>,
}

impl ChannelListener {
    /// Create a listener and the receiving end of its channel
    pub fn new() -> (Self, Receiver<NetplayEvent>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }

    fn forward(&self, event: NetplayEvent) {
        if self.tx.send(event).is_err() {
            debug!("Event receiver dropped, discarding netplay event");
        }
    }
}

impl NetplayListener for ChannelListener {
    fn on_port_obtained(&self, port: u16) {
        self.forward(NetplayEvent::PortObtained(port));
    }

    fn on_desync(&self, step: u32) {
        self.forward(NetplayEvent::Desync(step));
    }

    fn on_finish(&self) {
        self.forward(NetplayEvent::Finish);
    }

    fn on_upnp_ports_obtained(&self, outcome: MappingOutcome) {
        self.forward(NetplayEvent::UpnpPortsObtained(outcome));
    }
}

//! Session port mapper
//!
//! `PortMapper` opens and releases the three gateway mappings of one netplay
//! session. Every gateway call, and the `shutting_down` flag, sit behind the
//! shared gateway mutex so that teardown never interleaves with a mapping in
//! flight and no mapping starts once teardown has begun.

use super::gateway::SharedGateway;
use super::types::{MappedPorts, MappingFailure, MappingOutcome, MappingSlot, SlotFailure};
use crate::config::NetplayConfig;
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Gateway descriptions of the three session mappings
#[derive(Debug, Clone, PartialEq)]
pub struct MappingDescriptions {
    /// Room server mapping
    pub room: String,
    /// TCP control server mapping
    pub tcp: String,
    /// UDP data server mapping
    pub udp: String,
}

impl MappingDescriptions {
    fn for_slot(&self, slot: MappingSlot) -> &str {
        match slot {
            MappingSlot::Room => &self.room,
            MappingSlot::CoreTcp => &self.tcp,
            MappingSlot::CoreUdp => &self.udp,
        }
    }
}

impl From<&NetplayConfig> for MappingDescriptions {
    fn from(config: &NetplayConfig) -> Self {
        Self {
            room: config.room_description.clone(),
            tcp: config.tcp_description.clone(),
            udp: config.udp_description.clone(),
        }
    }
}

/// Port mapper for one session
pub struct PortMapper {
    gateway: SharedGateway,
    descriptions: MappingDescriptions,
    init_timeout: Duration,
    // Only read or written while the gateway lock is held.
    shutting_down: AtomicBool,
}

impl PortMapper {
    /// Create a mapper for a new session on the shared gateway
    pub fn new(gateway: SharedGateway, descriptions: MappingDescriptions, init_timeout: Duration) -> Self {
        Self {
            gateway,
            descriptions,
            init_timeout,
            shutting_down: AtomicBool::new(false),
        }
    }

    /// Whether teardown has started for this session
    pub fn is_shutting_down(&self) -> bool {
        let _gate = self.gateway.lock();
        self.shutting_down.load(Ordering::Acquire)
    }

    /// Map the room port and both server ports on the gateway
    ///
    /// Blocks on gateway I/O. Returns `None` without touching the gateway
    /// when teardown has already started for this session.
    ///
    /// All three mappings are attempted even after one fails. Mappings
    /// that succeeded are left in place for teardown to remove.
    pub fn perform_mapping(&self, room_port: u16, tcp_port: u16) -> Option<MappingOutcome> {
        let mut gateway = self.gateway.lock();

        if self.shutting_down.load(Ordering::Acquire) {
            debug!("Session is shutting down, skipping port mapping");
            return None;
        }

        info!(
            "Mapping ports: room {} (TCP), core {} (TCP/UDP)",
            room_port, tcp_port
        );

        if let Err(e) = gateway.init(self.init_timeout) {
            warn!("Gateway init failed: {}", e);
            let failures = MappingSlot::ALL
                .iter()
                .map(|&slot| SlotFailure {
                    slot,
                    port: slot_port(slot, room_port, tcp_port),
                    reason: e.to_string(),
                })
                .collect();
            return Some(MappingOutcome::Failed(MappingFailure { failures }));
        }

        let mut failures = Vec::new();
        for slot in MappingSlot::ALL {
            let port = slot_port(slot, room_port, tcp_port);
            match gateway.add_mapping(slot.protocol(), self.descriptions.for_slot(slot), port, port) {
                Ok(()) => debug!("Mapped {} port {} ({:?})", slot.protocol(), port, slot),
                Err(e) => {
                    warn!("Failed to map {} port {} ({:?}): {}", slot.protocol(), port, slot, e);
                    failures.push(SlotFailure {
                        slot,
                        port,
                        reason: e.to_string(),
                    });
                }
            }
        }

        if failures.is_empty() {
            info!("Port mapping successful");
            Some(MappingOutcome::Mapped(MappedPorts {
                room_port,
                tcp_port,
                udp_port: tcp_port,
                mapped_at: Utc::now(),
            }))
        } else {
            Some(MappingOutcome::Failed(MappingFailure { failures }))
        }
    }

    /// Remove the session's mappings and release the gateway
    ///
    /// Always issues the three removals and the shutdown, whether or not
    /// mapping ever ran. An unknown port is passed as 0. No mapping can
    /// be made through this mapper afterwards.
    pub fn teardown(&self, room_port: u16, tcp_port: u16) {
        self.teardown_with(|| (room_port, tcp_port));
    }

    /// Like [`teardown`](Self::teardown), reading the ports once the gate
    /// is held so a mapping that won the gate is seen with its room port
    pub(crate) fn teardown_with<F>(&self, ports: F)
    where
        F: FnOnce() -> (u16, u16),
    {
        let mut gateway = self.gateway.lock();
        self.shutting_down.store(true, Ordering::Release);
        let (room_port, tcp_port) = ports();

        info!("Shutting down ports");
        for slot in MappingSlot::ALL {
            let port = slot_port(slot, room_port, tcp_port);
            if let Err(e) = gateway.remove_mapping(slot.protocol(), port) {
                debug!("Removing {} port {} failed: {}", slot.protocol(), port, e);
            }
        }

        gateway.shutdown();
    }
}

fn slot_port(slot: MappingSlot, room_port: u16, tcp_port: u16) -> u16 {
    match slot {
        MappingSlot::Room => room_port,
        MappingSlot::CoreTcp | MappingSlot::CoreUdp => tcp_port,
    }
}

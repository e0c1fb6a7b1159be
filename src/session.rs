//! Netplay session record
//!
//! One `Session` exists per start request. The orchestrator, the session
//! worker and the port mapping task share it through an `Arc`; every field
//! is atomic or behind a lock.

use crate::events::NetplayListener;
use crate::portmap::PortMapper;
use crate::server::{SyncServer, TcpSyncServer};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

/// Where a session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionPhase {
    /// Scheduled but not picked up by the worker, or fully torn down
    Idle,
    /// Creating the server pair
    Starting,
    /// Waiting for both servers to end
    Running,
    /// Servers ended, notifying the listener
    Finishing,
    /// Releasing port mappings
    TearingDown,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Starting => "starting",
            SessionPhase::Running => "running",
            SessionPhase::Finishing => "finishing",
            SessionPhase::TearingDown => "tearing-down",
        };
        f.write_str(name)
    }
}

/// State of the session's TCP port as seen by the mapping task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PortState {
    Pending,
    Bound(u16),
    Unavailable,
}

#[derive(Default)]
struct Servers {
    tcp: Option<Arc<dyn TcpSyncServer>>,
    udp: Option<Arc<dyn SyncServer>>,
    stop_requested: bool,
}

/// One orchestrated netplay session
pub struct Session {
    id: Uuid,
    running: AtomicBool,
    port_mapping_enabled: AtomicBool,
    room_port: Mutex<Option<u16>>,
    port: watch::Sender<PortState>,
    phase: Mutex<SessionPhase>,
    listener: RwLock<Arc<dyn NetplayListener>>,
    servers: Mutex<Servers>,
    mapper: PortMapper,
    mapping_task: Mutex<Option<JoinHandle<()>>>,
}

impl Session {
    /// Create a session that is not running yet
    pub fn new(listener: Arc<dyn NetplayListener>, mapper: PortMapper) -> Arc<Self> {
        let (port, _) = watch::channel(PortState::Pending);
        Arc::new(Self {
            id: Uuid::new_v4(),
            running: AtomicBool::new(false),
            port_mapping_enabled: AtomicBool::new(false),
            room_port: Mutex::new(None),
            port,
            phase: Mutex::new(SessionPhase::Idle),
            listener: RwLock::new(listener),
            servers: Mutex::new(Servers::default()),
            mapper,
            mapping_task: Mutex::new(None),
        })
    }

    /// Unique session id, used in logs
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Whether the session is scheduled or its servers are still up
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> SessionPhase {
        *self.phase.lock()
    }

    pub(crate) fn set_phase(&self, phase: SessionPhase) {
        let mut current = self.phase.lock();
        debug!("Session {}: {} -> {}", self.id, *current, phase);
        *current = phase;
    }

    /// Listener currently registered for this session
    pub fn listener(&self) -> Arc<dyn NetplayListener> {
        Arc::clone(&self.listener.read())
    }

    pub(crate) fn replace_listener(&self, listener: Arc<dyn NetplayListener>) {
        *self.listener.write() = listener;
    }

    /// Whether port mapping was requested for this session
    pub fn is_port_mapping_enabled(&self) -> bool {
        self.port_mapping_enabled.load(Ordering::Acquire)
    }

    /// Enable port mapping with `room_port`; false if it was already enabled
    pub(crate) fn enable_port_mapping(&self, room_port: u16) -> bool {
        let mut room = self.room_port.lock();
        if self
            .port_mapping_enabled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        *room = Some(room_port);
        true
    }

    /// Room port recorded by the mapping request
    pub fn room_port(&self) -> Option<u16> {
        *self.room_port.lock()
    }

    /// TCP control server port, once bound
    pub fn bound_port(&self) -> Option<u16> {
        match *self.port.borrow() {
            PortState::Bound(port) => Some(port),
            PortState::Pending | PortState::Unavailable => None,
        }
    }

    pub(crate) fn publish_bound_port(&self, port: u16) {
        self.port.send_replace(PortState::Bound(port));
    }

    /// Mark the port as never coming if it was not bound
    pub(crate) fn close_bound_port(&self) {
        self.port.send_if_modified(|state| {
            if *state == PortState::Pending {
                *state = PortState::Unavailable;
                true
            } else {
                false
            }
        });
    }

    /// Wait until the TCP port is bound; `None` if binding never happened
    pub(crate) async fn wait_bound_port(&self) -> Option<u16> {
        let mut rx = self.port.subscribe();
        let state = *rx.wait_for(|state| *state != PortState::Pending).await.ok()?;
        match state {
            PortState::Bound(port) => Some(port),
            PortState::Pending | PortState::Unavailable => None,
        }
    }

    /// Port mapper of this session
    pub fn mapper(&self) -> &PortMapper {
        &self.mapper
    }

    /// Hand the TCP server to the session; stops it at once if a stop
    /// was already requested
    pub(crate) fn attach_tcp(&self, tcp: Arc<dyn TcpSyncServer>) {
        let mut servers = self.servers.lock();
        if servers.stop_requested {
            tcp.request_stop();
        }
        servers.tcp = Some(tcp);
    }

    /// Same as [`attach_tcp`](Self::attach_tcp) for the UDP server
    pub(crate) fn attach_udp(&self, udp: Arc<dyn SyncServer>) {
        let mut servers = self.servers.lock();
        if servers.stop_requested {
            udp.request_stop();
        }
        servers.udp = Some(udp);
    }

    /// Ask both servers to stop, UDP first; servers created later are
    /// stopped on attach
    pub(crate) fn request_stop(&self) {
        let mut servers = self.servers.lock();
        servers.stop_requested = true;
        if let Some(udp) = &servers.udp {
            udp.request_stop();
        }
        if let Some(tcp) = &servers.tcp {
            tcp.request_stop();
        }
    }

    pub(crate) fn release_servers(&self) {
        let mut servers = self.servers.lock();
        servers.tcp = None;
        servers.udp = None;
    }

    pub(crate) fn set_mapping_task(&self, task: JoinHandle<()>) {
        *self.mapping_task.lock() = Some(task);
    }

    pub(crate) fn take_mapping_task(&self) -> Option<JoinHandle<()>> {
        self.mapping_task.lock().take()
    }
}

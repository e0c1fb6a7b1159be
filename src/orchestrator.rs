//! Netplay session orchestrator
//!
//! The public face of the crate. It owns the session worker and the current
//! session, starts a session on request, stops its servers, and launches
//! the port mapping task.
//!
//! # Example
//!
//! ```no_run
//! use netplay_host::{ChannelListener, NetplayConfig, NetplayEvent, NetplayOrchestrator};
//! use std::sync::Arc;
//!
//! # fn main() -> netplay_host::Result<()> {
//! let orchestrator = NetplayOrchestrator::new(NetplayConfig::default())?;
//! let (listener, events) = ChannelListener::new();
//! orchestrator.start_listening(Arc::new(listener));
//!
//! for event in events {
//!     match event {
//!         NetplayEvent::PortObtained(port) => orchestrator.map_ports(port),
//!         NetplayEvent::Finish => break,
//!         other => println!("{:?}", other),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use crate::config::NetplayConfig;
use crate::events::NetplayListener;
use crate::host::{HeadlessHost, HostLifecycle};
use crate::portmap::{IgdGateway, MappingDescriptions, PortMapper, SharedGateway, shared};
use crate::server::{ShellServers, SyncServerFactory};
use crate::session::{Session, SessionPhase};
use crate::worker::{SessionWorker, WorkerContext};
use crate::Result;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

struct Inner {
    gateway: SharedGateway,
    descriptions: MappingDescriptions,
    gateway_timeout: Duration,
    host: Arc<dyn HostLifecycle>,
    // Lock order: worker, then session.
    worker: Mutex<SessionWorker>,
    session: Mutex<Option<Arc<Session>>>,
}

/// Orchestrates netplay sessions
///
/// At most one session runs at a time. Dropping the orchestrator stops the
/// servers and waits for the running session to finish its teardown.
pub struct NetplayOrchestrator {
    inner: Arc<Inner>,
}

/// Routes an external stop request (e.g. a notification action or a
/// signal handler) to [`NetplayOrchestrator::stop_servers`]
#[derive(Clone)]
pub struct StopHandle {
    inner: Arc<Inner>,
}

impl StopHandle {
    /// Same as [`NetplayOrchestrator::stop_servers`]
    pub fn stop(&self) {
        self.inner.stop_servers();
    }
}

impl NetplayOrchestrator {
    /// Create an orchestrator with the socket servers and the UPnP gateway
    pub fn new(config: NetplayConfig) -> Result<Self> {
        let servers = Arc::new(ShellServers::new(config.bind_address, config.buffer_target));
        Self::with_parts(config, servers, shared(IgdGateway::new()), Arc::new(HeadlessHost))
    }

    /// Create an orchestrator from explicit collaborators
    ///
    /// The session worker is running when this returns.
    pub fn with_parts(
        config: NetplayConfig,
        servers: Arc<dyn SyncServerFactory>,
        gateway: SharedGateway,
        host: Arc<dyn HostLifecycle>,
    ) -> Result<Self> {
        config.validate()?;

        let worker = SessionWorker::spawn(WorkerContext {
            servers,
            tcp_port: config.tcp_port,
            high_priority: config.high_priority,
        })?;
        host.enter_foreground();

        Ok(Self {
            inner: Arc::new(Inner {
                gateway,
                descriptions: MappingDescriptions::from(&config),
                gateway_timeout: Duration::from_millis(config.gateway_timeout_ms),
                host,
                worker: Mutex::new(worker),
                session: Mutex::new(None),
            }),
        })
    }

    /// Start a session reporting to `listener`
    ///
    /// Schedules the session on the worker unless one is already running,
    /// in which case only the listener is replaced.
    pub fn start_listening(&self, listener: Arc<dyn NetplayListener>) {
        let worker = self.inner.worker.lock();
        let mut current = self.inner.session.lock();

        if let Some(session) = current.as_ref().filter(|s| s.is_running()) {
            debug!("Session {} already running, replacing listener", session.id());
            session.replace_listener(listener);
            return;
        }

        let mapper = PortMapper::new(
            Arc::clone(&self.inner.gateway),
            self.inner.descriptions.clone(),
            self.inner.gateway_timeout,
        );
        let session = Session::new(listener, mapper);
        session.set_running(true);

        match worker.schedule(Arc::clone(&session)) {
            Ok(()) => {
                info!("Netplay session {} scheduled", session.id());
                *current = Some(session);
            }
            Err(e) => warn!("Cannot start netplay session: {}", e),
        }
    }

    /// Stop the servers and shut the host down
    ///
    /// Idempotent. The worker stops accepting sessions; the running session
    /// finishes and tears down in the background.
    pub fn stop_servers(&self) {
        self.inner.stop_servers();
    }

    /// Map the room port and the session ports on the gateway
    ///
    /// Only the first call per session does anything. The result arrives
    /// through [`NetplayListener::on_upnp_ports_obtained`], unless the
    /// session is already tearing down.
    pub fn map_ports(&self, room_port: u16) {
        let worker = self.inner.worker.lock();
        let Some(session) = self.inner.session.lock().clone() else {
            warn!("No netplay session to map ports for");
            return;
        };

        if !session.enable_port_mapping(room_port) {
            debug!("Port mapping already requested for session {}", session.id());
            return;
        }

        info!("Port mapping requested for room port {}", room_port);
        let task = worker.runtime().spawn(map_session_ports(Arc::clone(&session)));
        session.set_mapping_task(task);
    }

    /// Handle that stops this orchestrator's servers from elsewhere
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Whether a session is running
    pub fn is_running(&self) -> bool {
        self.current_session().is_some_and(|s| s.is_running())
    }

    /// TCP port of the current session, once bound
    pub fn bound_port(&self) -> Option<u16> {
        self.current_session().and_then(|s| s.bound_port())
    }

    /// Phase of the current session; `Idle` without one
    pub fn phase(&self) -> SessionPhase {
        self.current_session()
            .map(|s| s.phase())
            .unwrap_or(SessionPhase::Idle)
    }

    fn current_session(&self) -> Option<Arc<Session>> {
        self.inner.session.lock().clone()
    }
}

impl Inner {
    fn stop_servers(&self) {
        info!("Stopping netplay servers");
        let mut worker = self.worker.lock();

        if let Some(session) = self.session.lock().as_ref() {
            session.request_stop();
        }

        if worker.is_open() {
            worker.close();
            self.host.leave_foreground();
        }
    }
}

impl Drop for NetplayOrchestrator {
    fn drop(&mut self) {
        self.inner.stop_servers();
        // Joined outside the lock: listener callbacks on the worker may call back in.
        let thread = self.inner.worker.lock().take_thread();
        if let Some(thread) = thread {
            if thread.join().is_err() {
                error!("Session worker thread panicked");
            }
        }
    }
}

async fn map_session_ports(session: Arc<Session>) {
    let Some(tcp_port) = session.wait_bound_port().await else {
        debug!("Session {} never bound a port, skipping port mapping", session.id());
        return;
    };
    let room_port = session.room_port().unwrap_or(0);

    let mapping_session = Arc::clone(&session);
    let outcome = tokio::task::spawn_blocking(move || {
        mapping_session.mapper().perform_mapping(room_port, tcp_port)
    })
    .await;

    match outcome {
        Ok(Some(outcome)) => {
            let (room, tcp, udp) = outcome.as_triple();
            info!("UPnP ports obtained: room {}, tcp {}, udp {}", room, tcp, udp);
            session.listener().on_upnp_ports_obtained(outcome);
        }
        Ok(None) => {}
        Err(e) => error!("Port mapping task failed: {}", e),
    }
}

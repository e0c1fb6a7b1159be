//! Session worker
//!
//! A dedicated thread running a current-thread tokio runtime. It takes one
//! session at a time from its queue and drives it through
//! starting → running → finishing → tearing-down → idle. The synchronization
//! servers and the port mapping task run as tasks on the same runtime.

use crate::server::{DesyncCallback, SyncServer, SyncServerFactory, TcpSyncServer};
use crate::session::{Session, SessionPhase};
use crate::{Error, Result};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Nice value requested for the worker thread (Android's urgent-audio level)
#[cfg(any(target_os = "linux", target_os = "android"))]
const URGENT_NICE: libc::c_int = -19;

/// Settings the worker applies to every session
#[derive(Clone)]
pub struct WorkerContext {
    /// Creates the server pair
    pub servers: Arc<dyn SyncServerFactory>,
    /// TCP port requested for the control server (0 = OS choice)
    pub tcp_port: u16,
    /// Raise the thread priority before running a session
    pub high_priority: bool,
}

/// Handle to the session worker thread
pub struct SessionWorker {
    queue: Option<mpsc::UnboundedSender<Arc<Session>>>,
    runtime: Handle,
    thread: Option<JoinHandle<()>>,
}

impl SessionWorker {
    /// Start the worker thread and wait until its runtime is ready
    pub fn spawn(context: WorkerContext) -> Result<Self> {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = crossbeam_channel::bounded(1);

        let thread = std::thread::Builder::new()
            .name("netplay-session".to_string())
            .spawn(move || {
                let runtime = match tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                {
                    Ok(runtime) => runtime,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(runtime.handle().clone()));

                runtime.block_on(run_queue(queue_rx, context));
                debug!("Session worker drained");
            })?;

        let runtime = ready_rx
            .recv()
            .map_err(|_| Error::Worker("Session worker exited during startup".to_string()))??;

        info!("Session worker started");
        Ok(Self {
            queue: Some(queue_tx),
            runtime,
            thread: Some(thread),
        })
    }

    /// Queue a session; fails once the worker is closed
    pub fn schedule(&self, session: Arc<Session>) -> Result<()> {
        let queue = self
            .queue
            .as_ref()
            .ok_or_else(|| Error::Worker("Session worker is closed".to_string()))?;
        queue
            .send(session)
            .map_err(|_| Error::Worker("Session worker has exited".to_string()))
    }

    /// Handle of the worker's runtime, for tasks tied to a session
    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }

    /// Whether new sessions are still accepted
    pub fn is_open(&self) -> bool {
        self.queue.is_some()
    }

    /// Stop accepting sessions; the queued ones still run
    pub fn close(&mut self) {
        if self.queue.take().is_some() {
            debug!("Session worker closed");
        }
    }

    /// Take the thread handle so it can be joined without holding a lock
    pub(crate) fn take_thread(&mut self) -> Option<JoinHandle<()>> {
        self.close();
        self.thread.take()
    }

    /// Close the queue and wait for the in-flight session to drain
    pub fn join(&mut self) {
        self.close();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Session worker thread panicked");
            }
        }
    }
}

impl Drop for SessionWorker {
    fn drop(&mut self) {
        self.join();
    }
}

async fn run_queue(mut queue: mpsc::UnboundedReceiver<Arc<Session>>, context: WorkerContext) {
    while let Some(session) = queue.recv().await {
        run_session(session, &context).await;
    }
}

/// Drive one session from server creation to teardown
pub(crate) async fn run_session(session: Arc<Session>, context: &WorkerContext) {
    session.set_phase(SessionPhase::Starting);
    if context.high_priority {
        raise_current_thread_priority();
    }

    info!("Netplay session {} started", session.id());
    let (tcp, udp) = start_servers(&session, context);
    session.close_bound_port();
    let tcp_port = tcp.as_ref().map(|tcp| tcp.bound_port()).unwrap_or(0);

    session.set_phase(SessionPhase::Running);
    if let Some(udp) = &udp {
        udp.terminated().await;
    }
    if let Some(tcp) = &tcp {
        tcp.terminated().await;
    }
    info!("Netplay session {} finished", session.id());

    session.set_phase(SessionPhase::Finishing);
    session.set_running(false);
    session.listener().on_finish();

    session.set_phase(SessionPhase::TearingDown);
    let teardown_session = Arc::clone(&session);
    let teardown = tokio::task::spawn_blocking(move || {
        let mapper = teardown_session.mapper();
        mapper.teardown_with(|| (teardown_session.room_port().unwrap_or(0), tcp_port));
    });
    if let Err(e) = teardown.await {
        error!("Port teardown failed: {}", e);
    }

    if let Some(mapping) = session.take_mapping_task() {
        if let Err(e) = mapping.await {
            warn!("Port mapping task failed: {}", e);
        }
    }

    session.release_servers();
    session.set_phase(SessionPhase::Idle);
}

/// Create the TCP server, report its port, then create the UDP server on it
///
/// A missing half stops the other so the session can still finish.
fn start_servers(
    session: &Arc<Session>,
    context: &WorkerContext,
) -> (Option<Arc<dyn TcpSyncServer>>, Option<Arc<dyn SyncServer>>) {
    let tcp = match context.servers.create_tcp(context.tcp_port) {
        Ok(tcp) => tcp,
        Err(e) => {
            error!("Failed to start TCP control server: {}", e);
            return (None, None);
        }
    };
    session.attach_tcp(Arc::clone(&tcp));

    let port = tcp.bound_port();
    session.listener().on_port_obtained(port);
    session.publish_bound_port(port);

    match context.servers.create_udp(port, desync_reporter(session)) {
        Ok(udp) => {
            session.attach_udp(Arc::clone(&udp));
            (Some(tcp), Some(udp))
        }
        Err(e) => {
            error!("Failed to start UDP data server on port {}: {}", port, e);
            tcp.request_stop();
            (Some(tcp), None)
        }
    }
}

// Weak: the UDP server holding this callback is owned by the session.
fn desync_reporter(session: &Arc<Session>) -> DesyncCallback {
    let session: Weak<Session> = Arc::downgrade(session);
    Arc::new(move |step| {
        if let Some(session) = session.upgrade() {
            warn!("Desync detected at step {}", step);
            session.listener().on_desync(step);
        }
    })
}

#[cfg(any(target_os = "linux", target_os = "android"))]
fn raise_current_thread_priority() {
    // SAFETY: gettid and setpriority only read and adjust the calling thread's scheduling state.
    let result = unsafe {
        let tid = libc::gettid() as libc::id_t;
        libc::setpriority(libc::PRIO_PROCESS, tid, URGENT_NICE)
    };
    if result != 0 {
        debug!(
            "Could not raise session worker priority: {}",
            std::io::Error::last_os_error()
        );
    }
}

#[cfg(not(any(target_os = "linux", target_os = "android")))]
fn raise_current_thread_priority() {
    debug!("Thread priority is left unchanged on this platform");
}

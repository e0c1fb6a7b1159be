//! Stop and termination signalling shared by a server and its owner

use super::Termination;
use std::sync::Arc;
use tokio::sync::watch;

/// Stop request and termination state of one server
///
/// The owner calls [`request_stop`](Self::request_stop) and awaits
/// [`terminated`](Self::terminated); the server's task awaits
/// [`stop_requested`](Self::stop_requested) and holds a
/// [`TerminationGuard`] so termination is reported however the task exits.
#[derive(Debug)]
pub struct ServerLifecycle {
    stop_tx: watch::Sender<bool>,
    done_tx: watch::Sender<bool>,
}

impl ServerLifecycle {
    /// Create a lifecycle for a server that is running
    pub fn new() -> Arc<Self> {
        let (stop_tx, _) = watch::channel(false);
        let (done_tx, _) = watch::channel(false);
        Arc::new(Self { stop_tx, done_tx })
    }

    /// Ask the server to stop; further calls have no effect
    pub fn request_stop(&self) {
        self.stop_tx.send_replace(true);
    }

    /// Whether a stop was requested
    pub fn is_stop_requested(&self) -> bool {
        *self.stop_tx.borrow()
    }

    /// Resolves once a stop has been requested
    pub async fn stop_requested(&self) {
        let mut rx = self.stop_tx.subscribe();
        let _ = rx.wait_for(|stop| *stop).await;
    }

    /// Whether the server has ended
    pub fn is_terminated(&self) -> bool {
        *self.done_tx.borrow()
    }

    /// Resolves once the server has ended
    pub fn terminated(&self) -> Termination {
        let mut rx = self.done_tx.subscribe();
        Box::pin(async move {
            let _ = rx.wait_for(|done| *done).await;
        })
    }

    /// Guard that marks the server terminated when dropped
    pub fn termination_guard(self: &Arc<Self>) -> TerminationGuard {
        TerminationGuard(Arc::clone(self))
    }
}

/// Marks its server terminated on drop, including on panic
#[derive(Debug)]
pub struct TerminationGuard(Arc<ServerLifecycle>);

impl Drop for TerminationGuard {
    fn drop(&mut self) {
        self.0.done_tx.send_replace(true);
    }
}

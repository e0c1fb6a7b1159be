//! Host process lifecycle
//!
//! The embedding application usually keeps the process alive in the
//! foreground while a session runs and offers a "stop" action that routes
//! to [`NetplayOrchestrator::stop_servers`](crate::NetplayOrchestrator::stop_servers).

use tracing::info;

/// Foreground registration of the hosting process
pub trait HostLifecycle: Send + Sync {
    /// Register the long-running netplay task with the host
    fn enter_foreground(&self);

    /// Drop the registration; the host may now reclaim the process
    fn leave_foreground(&self);
}

/// Host with no foreground concept; only logs the transitions
#[derive(Debug, Default, Clone, Copy)]
pub struct HeadlessHost;

impl HostLifecycle for HeadlessHost {
    fn enter_foreground(&self) {
        info!("Netplay host running");
    }

    fn leave_foreground(&self) {
        info!("Netplay host leaving foreground");
    }
}

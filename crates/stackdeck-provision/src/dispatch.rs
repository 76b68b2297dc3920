//! Background dispatch of chains and refreshes
//!
//! The presentation layer calls the `trigger_*` methods from its own thread of
//! control; each spawns a tokio task and returns a [`ChainHandle`]. Control
//! availability is published on a `watch` channel so a UI can grey out its
//! buttons while work is in flight.

use crate::orchestrator::Orchestrator;
use crate::report::ChainReport;
use crate::request::{InstanceRequest, NetworkRequest};
use stackdeck_cloud::{LogSink, Snapshot};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Which triggers are currently available
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlState {
    pub create_enabled: bool,
    pub refresh_enabled: bool,
}

impl Default for ControlState {
    fn default() -> Self {
        Self {
            create_enabled: true,
            refresh_enabled: true,
        }
    }
}

/// Shared control state plus the refresh gate
#[derive(Debug)]
struct Controls {
    state: watch::Sender<ControlState>,
    refresh_in_flight: AtomicBool,
}

impl Controls {
    fn new() -> Self {
        let (state, _) = watch::channel(ControlState::default());
        Self {
            state,
            refresh_in_flight: AtomicBool::new(false),
        }
    }

    fn disable_all(&self) {
        self.state.send_modify(|s| {
            s.create_enabled = false;
            s.refresh_enabled = false;
        });
    }

    /// Refresh comes back only if no refresh is running.
    fn enable_create(&self) {
        let refreshing = self.refresh_in_flight.load(Ordering::SeqCst);
        self.state.send_modify(|s| {
            s.create_enabled = true;
            if !refreshing {
                s.refresh_enabled = true;
            }
        });
    }

    /// Claim the refresh gate; false if a refresh already holds it.
    fn begin_refresh(&self) -> bool {
        let claimed = self
            .refresh_in_flight
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if claimed {
            self.state.send_modify(|s| s.refresh_enabled = false);
        }
        claimed
    }

    /// Refresh comes back only while create controls are enabled.
    fn end_refresh(&self) {
        self.refresh_in_flight.store(false, Ordering::SeqCst);
        self.state.send_modify(|s| {
            if s.create_enabled {
                s.refresh_enabled = true;
            }
        });
    }
}

/// Re-enables create controls when a chain task ends, however it ends
struct ChainGuard {
    controls: Arc<Controls>,
    log: LogSink,
}

impl Drop for ChainGuard {
    fn drop(&mut self) {
        if std::thread::panicking() {
            self.log.plain("An unexpected error occurred: chain task panicked");
        }
        self.controls.enable_create();
    }
}

/// Releases the refresh gate when a refresh task ends
struct RefreshGuard {
    controls: Arc<Controls>,
}

impl Drop for RefreshGuard {
    fn drop(&mut self) {
        self.controls.end_refresh();
    }
}

/// Join point for a dispatched task.
///
/// Dropping the handle detaches the task; call [`abort`](Self::abort) to
/// cancel it at its next suspension point.
#[derive(Debug)]
pub struct ChainHandle<T> {
    task: JoinHandle<T>,
}

impl<T> ChainHandle<T> {
    /// Wait for the task; `None` if it was aborted or panicked.
    pub async fn join(self) -> Option<T> {
        match self.task.await {
            Ok(value) => Some(value),
            Err(e) if e.is_cancelled() => {
                tracing::debug!("Task cancelled");
                None
            }
            Err(e) => {
                tracing::error!("Task failed: {}", e);
                None
            }
        }
    }

    pub fn abort(&self) {
        self.task.abort();
    }
}

/// Entry point for the presentation layer
#[derive(Clone)]
pub struct Dispatcher {
    orchestrator: Arc<Orchestrator>,
    controls: Arc<Controls>,
}

impl Dispatcher {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            controls: Arc::new(Controls::new()),
        }
    }

    /// Live view of which triggers are available
    pub fn controls(&self) -> watch::Receiver<ControlState> {
        self.controls.state.subscribe()
    }

    pub fn is_refreshing(&self) -> bool {
        self.controls.refresh_in_flight.load(Ordering::SeqCst)
    }

    /// Current snapshot on disk; empty if missing or unreadable
    pub async fn read_snapshot(&self) -> Snapshot {
        self.orchestrator.inventory().read().await
    }

    fn spawn_chain<F>(&self, banner: &str, chain: F) -> ChainHandle<ChainReport>
    where
        F: Future<Output = ChainReport> + Send + 'static,
    {
        let log = self.orchestrator.log().clone();
        log.plain(banner);
        self.controls.disable_all();

        let guard = ChainGuard {
            controls: self.controls.clone(),
            log,
        };
        let task = tokio::spawn(async move {
            let _guard = guard;
            chain.await
        });
        ChainHandle { task }
    }

    pub fn trigger_network_chain(&self, request: NetworkRequest) -> ChainHandle<ChainReport> {
        let orchestrator = self.orchestrator.clone();
        self.spawn_chain("--- Create Network button clicked ---", async move {
            orchestrator.run_network_chain(request).await
        })
    }

    pub fn trigger_instance_chain(&self, request: InstanceRequest) -> ChainHandle<ChainReport> {
        let orchestrator = self.orchestrator.clone();
        self.spawn_chain("--- Create Instance button clicked ---", async move {
            orchestrator.run_instance_chain(request).await
        })
    }

    /// Start a poll unless one is already running; `None` means it was.
    pub fn trigger_refresh(&self) -> Option<ChainHandle<Snapshot>> {
        if !self.controls.begin_refresh() {
            tracing::debug!("Refresh already in progress");
            return None;
        }

        let log = self.orchestrator.log().clone();
        log.plain("--- Refresh button clicked ---");

        let guard = RefreshGuard {
            controls: self.controls.clone(),
        };
        let orchestrator = self.orchestrator.clone();
        let task = tokio::spawn(async move {
            let _guard = guard;
            let snapshot = orchestrator.inventory().poll().await;
            log.plain("Refresh complete.");
            snapshot
        });
        Some(ChainHandle { task })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chain_disables_everything() {
        let controls = Controls::new();
        controls.disable_all();
        assert_eq!(
            *controls.state.borrow(),
            ControlState {
                create_enabled: false,
                refresh_enabled: false
            }
        );
        controls.enable_create();
        assert_eq!(*controls.state.borrow(), ControlState::default());
    }

    #[test]
    fn test_refresh_stays_disabled_while_refreshing() {
        let controls = Controls::new();
        assert!(controls.begin_refresh());
        assert!(!controls.begin_refresh());

        controls.disable_all();
        controls.enable_create();
        assert!(controls.state.borrow().create_enabled);
        assert!(!controls.state.borrow().refresh_enabled);

        controls.end_refresh();
        assert!(controls.state.borrow().refresh_enabled);
    }

    #[test]
    fn test_finished_refresh_waits_for_create_controls() {
        let controls = Controls::new();
        assert!(controls.begin_refresh());
        controls.disable_all();

        controls.end_refresh();
        assert!(!controls.state.borrow().refresh_enabled);

        controls.enable_create();
        assert!(controls.state.borrow().refresh_enabled);
    }
}

//! Periodic and on-demand sync cycles.
//!
//! At most one cycle runs per node at a time. The interval timer, HTTP
//! triggers and direct [`SyncScheduler::run_now`] calls all compete for the
//! same single-flight lock; whoever loses is dropped, not queued.

use crate::engine::{CycleReport, ReconciliationEngine};
use crate::error::{SyncError, SyncResult};
use crate::peers::PeerSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify, OwnedMutexGuard, RwLock, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

/// How long [`SyncScheduler::stop`] waits for the loop before aborting it.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Scheduler settings.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Time between periodic cycles.
    pub interval: Duration,
    /// Whether to run a cycle as soon as the scheduler starts.
    pub run_on_start: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(86_400),
            run_on_start: true,
        }
    }
}

struct Inner {
    engine: Arc<ReconciliationEngine>,
    peers: PeerSet,
    config: SchedulerConfig,
    cycle_lock: Arc<Mutex<()>>,
    wake: Notify,
    shutdown_tx: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
    last_report: RwLock<Option<CycleReport>>,
}

/// Runs reconciliation cycles on a timer and on demand.
#[derive(Clone)]
pub struct SyncScheduler {
    inner: Arc<Inner>,
}

impl SyncScheduler {
    /// Creates a stopped scheduler.
    pub fn new(engine: Arc<ReconciliationEngine>, peers: PeerSet, config: SchedulerConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                engine,
                peers,
                config,
                cycle_lock: Arc::new(Mutex::new(())),
                wake: Notify::new(),
                shutdown_tx,
                handle: Mutex::new(None),
                last_report: RwLock::new(None),
            }),
        }
    }

    /// The peer set cycles read from.
    pub fn peers(&self) -> &PeerSet {
        &self.inner.peers
    }

    /// The scheduler settings.
    pub fn config(&self) -> &SchedulerConfig {
        &self.inner.config
    }

    /// Starts the background loop. Returns `false` if it was already running.
    pub async fn start(&self) -> bool {
        let mut handle = self.inner.handle.lock().await;
        if handle.is_some() {
            return false;
        }
        self.inner.shutdown_tx.send_replace(false);
        let inner = Arc::clone(&self.inner);
        *handle = Some(tokio::spawn(run_loop(inner)));
        info!(
            interval_secs = self.inner.config.interval.as_secs(),
            "Sync scheduler started"
        );
        true
    }

    /// Stops the loop, cancelling any cycle in flight.
    ///
    /// Waits a few seconds for the loop to exit and aborts it after that.
    pub async fn stop(&self) {
        let Some(mut handle) = self.inner.handle.lock().await.take() else {
            debug!("Sync scheduler not running");
            return;
        };
        self.inner.shutdown_tx.send_replace(true);

        match tokio::time::timeout(STOP_TIMEOUT, &mut handle).await {
            Ok(Ok(())) => debug!("Sync loop stopped gracefully"),
            Ok(Err(e)) => warn!("Sync loop task failed: {e}"),
            Err(_) => {
                warn!("Sync loop did not stop within timeout, aborting");
                handle.abort();
            }
        }
        info!("Sync scheduler stopped");
    }

    /// Whether the background loop is running.
    pub async fn is_started(&self) -> bool {
        self.inner.handle.lock().await.is_some()
    }

    /// Asks the loop for an immediate cycle.
    ///
    /// Returns `false` when the request coalesced into a cycle already in
    /// flight, or when the loop is not running.
    pub async fn trigger(&self) -> bool {
        if self.is_cycle_running() {
            debug!("Sync already in progress; trigger coalesced");
            return false;
        }
        if !self.is_started().await {
            debug!("Sync scheduler not running; trigger ignored");
            return false;
        }
        self.inner.wake.notify_one();
        true
    }

    /// Runs a cycle on the caller's task and waits for its report.
    ///
    /// Returns `None` without doing anything if a cycle is already running.
    /// Once [`SyncScheduler::stop`] has been called, cycles are cancelled as
    /// soon as they begin until the scheduler is started again.
    pub async fn run_now(&self) -> Option<SyncResult<CycleReport>> {
        let guard = Arc::clone(&self.inner.cycle_lock).try_lock_owned().ok()?;
        Some(self.inner.run_guarded(guard).await)
    }

    /// Whether a cycle currently holds the single-flight lock.
    pub fn is_cycle_running(&self) -> bool {
        self.inner.cycle_lock.try_lock().is_err()
    }

    /// Report of the most recent successful cycle.
    pub async fn last_report(&self) -> Option<CycleReport> {
        self.inner.last_report.read().await.clone()
    }
}

async fn run_loop(inner: Arc<Inner>) {
    let mut shutdown_rx = inner.shutdown_tx.subscribe();
    let mut ticker = tokio::time::interval(inner.config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    if !inner.config.run_on_start {
        // The first tick completes immediately.
        ticker.tick().await;
    }

    loop {
        tokio::select! {
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    info!("Sync loop received shutdown signal");
                    break;
                }
            }
            _ = ticker.tick() => {
                debug!("Periodic sync due");
                inner.try_cycle().await;
            }
            _ = inner.wake.notified() => {
                debug!("On-demand sync requested");
                inner.try_cycle().await;
            }
        }
    }

    info!("Sync loop stopped");
}

impl Inner {
    async fn try_cycle(&self) {
        let Ok(guard) = Arc::clone(&self.cycle_lock).try_lock_owned() else {
            debug!("Sync already in progress; skipping");
            return;
        };
        if let Err(e) = self.run_guarded(guard).await {
            error!("Sync cycle failed: {}", e);
        }
    }

    /// Runs one cycle while holding the single-flight guard.
    ///
    /// The cycle runs on its own task so a panic inside it is contained, and
    /// it is aborted if shutdown is signalled first.
    async fn run_guarded(&self, guard: OwnedMutexGuard<()>) -> SyncResult<CycleReport> {
        let peers = self.peers.snapshot().await;
        let engine = Arc::clone(&self.engine);
        let task = tokio::spawn(async move { engine.run_cycle(&peers).await });
        let abort = task.abort_handle();
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let result = tokio::select! {
            joined = task => match joined {
                Ok(result) => result,
                Err(e) if e.is_panic() => {
                    error!("Sync cycle panicked; scheduler keeps running");
                    Err(SyncError::Task(format!("sync cycle panicked: {e}")))
                }
                Err(e) => Err(SyncError::Task(e.to_string())),
            },
            _ = shutdown_rx.wait_for(|stop| *stop) => {
                abort.abort();
                Err(SyncError::Task("sync cycle cancelled by shutdown".to_string()))
            }
        };
        drop(guard);

        if let Ok(report) = &result {
            *self.last_report.write().await = Some(report.clone());
        }
        result
    }
}

//! Background session validation
//!
//! The [`ValidationScheduler`] periodically runs
//! [`SessionManager::validate_sessions`] on a background task so that idle
//! sessions expire even when nothing ever touches them again. Sweeps run on
//! the blocking pool; a sweep that panics is logged and the schedule keeps
//! ticking.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::manager::SessionManager;

/// Periodically sweeps the manager's active sessions for expiry.
///
/// Sweeping can be paused with [`ValidationScheduler::disable`] without
/// tearing down the background task; [`ValidationScheduler::enable`] resumes
/// it on the next tick.
pub struct ValidationScheduler {
    manager: Arc<SessionManager>,
    interval: Duration,
    enabled: Arc<AtomicBool>,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ValidationScheduler {
    /// Build a scheduler for the manager, taking the sweep interval and the
    /// initial enabled state from the manager's configuration.
    pub fn new(manager: Arc<SessionManager>) -> Self {
        let interval = manager.config().validation_interval();
        let enabled = manager.config().validation_enabled;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            manager,
            interval,
            enabled: Arc::new(AtomicBool::new(enabled)),
            shutdown_tx,
            shutdown_rx,
            handle: Mutex::new(None),
        }
    }

    /// Override the sweep interval. Takes effect on the next
    /// [`ValidationScheduler::start`].
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn enable(&self) {
        self.enabled.store(true, Ordering::SeqCst);
    }

    /// Pause sweeping. The background task keeps ticking but skips the
    /// sweep while disabled.
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::SeqCst);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.handle
            .lock()
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Run a single sweep synchronously, regardless of the enabled flag.
    pub fn run_once(&self) -> super::manager::SweepOutcome {
        self.manager.validate_sessions()
    }

    /// Spawn the background sweep loop. Must be called from within a tokio
    /// runtime. Calling it while the loop is already running is a no-op.
    pub fn start(&self) {
        let mut guard = self.handle.lock();
        if guard.as_ref().is_some_and(|h| !h.is_finished()) {
            warn!("validation scheduler already running");
            return;
        }

        info!(interval_ms = self.interval.as_millis() as u64, "starting session validation scheduler");
        let manager = self.manager.clone();
        let enabled = self.enabled.clone();
        let interval = self.interval;
        let mut shutdown_rx = self.shutdown_rx.clone();

        *guard = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick fires immediately; consume it so the first
            // sweep happens one full interval after startup.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => {
                        if *shutdown_rx.borrow() {
                            info!("session validation scheduler shutting down");
                            break;
                        }
                    }
                    _ = ticker.tick() => {
                        if !enabled.load(Ordering::SeqCst) {
                            debug!("session validation disabled; skipping sweep");
                            continue;
                        }
                        let manager = manager.clone();
                        let result =
                            tokio::task::spawn_blocking(move || manager.validate_sessions()).await;
                        match result {
                            Ok(outcome) => {
                                debug!(
                                    checked = outcome.checked,
                                    invalidated = outcome.invalidated,
                                    failed = outcome.failed,
                                    "scheduled validation sweep finished"
                                );
                            }
                            // A panicking sweep must not kill the schedule.
                            Err(e) => {
                                warn!(error = %e, "validation sweep task failed");
                            }
                        }
                    }
                }
            }
        }));
    }

    /// Signal the background loop to stop and wait for it to finish.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

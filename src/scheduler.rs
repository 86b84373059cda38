//! Automatic snapshot scheduling.
//!
//! Two mechanisms drive automatic snapshots: a fixed-interval timer, and a
//! debounced data-change trigger. Rapid repeated mutations within the
//! debounce window replace the pending snapshot task instead of stacking
//! up, so a burst of edits produces a single snapshot after the burst
//! settles.

use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::BackupConfig;
use crate::error::Result;
use crate::ledger::Ledger;
use crate::snapshot::{SnapshotManager, SnapshotMeta, SnapshotTrigger};

/// Drives interval and data-change snapshots over a shared ledger.
#[derive(Debug)]
pub struct BackupScheduler {
    ledger: Arc<Mutex<Ledger>>,
    snapshots: Arc<SnapshotManager>,
    interval: Duration,
    debounce: Duration,
    backup_on_change: bool,
    pending: StdMutex<Option<JoinHandle<()>>>,
}

impl BackupScheduler {
    /// Create a scheduler over the given ledger and snapshot manager.
    #[must_use]
    pub fn new(
        ledger: Arc<Mutex<Ledger>>,
        snapshots: Arc<SnapshotManager>,
        config: &BackupConfig,
    ) -> Self {
        Self {
            ledger,
            snapshots,
            interval: config.interval(),
            debounce: config.debounce(),
            backup_on_change: config.backup_on_change,
            pending: StdMutex::new(None),
        }
    }

    /// Take a snapshot of the current state right now.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be written.
    pub async fn snapshot_now(&self, trigger: SnapshotTrigger) -> Result<SnapshotMeta> {
        let ledger = self.ledger.lock().await;
        self.snapshots
            .create(ledger.kv(), trigger, ledger.stats().into())
    }

    /// Record that the data changed, scheduling a debounced snapshot.
    ///
    /// Any snapshot still pending from an earlier change is cancelled and
    /// replaced, so a burst of mutations yields one snapshot once the
    /// debounce window passes without further changes. Snapshot failures
    /// are logged, never propagated; the next trigger simply tries again.
    pub fn notify_change(&self) {
        if !self.backup_on_change {
            return;
        }

        let ledger = Arc::clone(&self.ledger);
        let snapshots = Arc::clone(&self.snapshots);
        let debounce = self.debounce;
        let task = tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            let ledger = ledger.lock().await;
            match snapshots.create(ledger.kv(), SnapshotTrigger::DataChanged, ledger.stats().into())
            {
                Ok(meta) => debug!("Data-change snapshot {} written", meta.key),
                Err(err) => warn!("Data-change snapshot failed: {err}"),
            }
        });

        let mut pending = self.pending.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(previous) = pending.replace(task) {
            previous.abort();
        }
    }

    /// Cancel any pending data-change snapshot. Called on shutdown, where
    /// the explicit shutdown snapshot supersedes it.
    pub fn cancel_pending(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some(task) = pending.take() {
            task.abort();
        }
    }

    /// Run the fixed-interval snapshot loop until the task is aborted.
    ///
    /// The first tick fires after one full interval, not immediately; the
    /// startup snapshot covers the initial state. Failures are logged and
    /// the loop keeps going.
    pub async fn run_interval(&self) {
        let mut timer = tokio::time::interval(self.interval);
        // interval's first tick completes immediately; consume it
        timer.tick().await;
        loop {
            timer.tick().await;
            match self.snapshot_now(SnapshotTrigger::Interval).await {
                Ok(meta) => debug!("Interval snapshot {} written", meta.key),
                Err(err) => warn!("Interval snapshot failed: {err}"),
            }
        }
    }
}

impl Drop for BackupScheduler {
    fn drop(&mut self) {
        self.cancel_pending();
    }
}

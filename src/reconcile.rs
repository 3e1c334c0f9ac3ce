//! Object store ↔ metadata store reconciliation.
//!
//! The two stores cannot be updated transactionally, so convergence comes
//! from periodically re-diffing them: every key present in the bucket but
//! absent from the index is staged and indexed. A run moves through
//! `Idle → Listing → Diffing → Indexing(n) → Idle`.
//!
//! Failures are handled at two levels:
//! - listing failure aborts the run (no partial diff) and is returned;
//! - any failure for a single key is recorded in the report and the run
//!   continues. The key is still missing next time, so the next run retries it.
//!
//! At most one run is in flight. Triggers arriving while a run is active
//! are dropped, not queued.

use serde::Serialize;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::{Error, ErrorKind, Result};
use crate::indexer::{ContentIndexer, IndexOutcome, IndexRequest};
use crate::repository::FileRepository;
use crate::storage::{stage_object, ObjectStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "remaining", rename_all = "snake_case")]
pub enum ReconcilePhase {
    Idle,
    Listing,
    Diffing,
    /// Keys still to be attempted in this run.
    Indexing(usize),
}

#[derive(Debug, Clone, Serialize)]
pub struct KeyFailure {
    pub key: String,
    pub kind: ErrorKind,
    pub error: String,
}

impl KeyFailure {
    fn new(key: &str, err: &Error) -> Self {
        Self {
            key: key.to_string(),
            kind: err.kind(),
            error: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    /// Keys found in the object store.
    pub listed: usize,
    /// Keys that already had a record.
    pub skipped: usize,
    /// Keys newly indexed by this run.
    pub indexed: Vec<String>,
    pub failures: Vec<KeyFailure>,
    /// The run stopped early on a shutdown signal.
    pub cancelled: bool,
    pub elapsed_ms: u128,
}

pub struct Reconciler {
    store: Arc<dyn ObjectStore>,
    repo: FileRepository,
    indexer: Arc<dyn ContentIndexer>,
    scratch_dir: PathBuf,
    running: AtomicBool,
    phase: Mutex<ReconcilePhase>,
    shutdown: Option<watch::Receiver<bool>>,
}

/// Clears the in-flight flag however the run ends.
struct RunGuard<'a>(&'a Reconciler);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.set_phase(ReconcilePhase::Idle);
        self.0.running.store(false, Ordering::Release);
    }
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        repo: FileRepository,
        indexer: Arc<dyn ContentIndexer>,
        scratch_dir: PathBuf,
    ) -> Self {
        Self {
            store,
            repo,
            indexer,
            scratch_dir,
            running: AtomicBool::new(false),
            phase: Mutex::new(ReconcilePhase::Idle),
            shutdown: None,
        }
    }

    /// Stop between keys once `shutdown` flips to `true`.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn phase(&self) -> ReconcilePhase {
        *self.phase.lock().unwrap()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn set_phase(&self, phase: ReconcilePhase) {
        *self.phase.lock().unwrap() = phase;
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
    }

    /// Run once unless a run is already in flight, in which case `None`.
    pub async fn try_run(&self) -> Option<Result<ReconcileReport>> {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!("reconciliation already in flight; trigger dropped");
            return None;
        }
        let _guard = RunGuard(self);
        Some(self.run().await)
    }

    async fn run(&self) -> Result<ReconcileReport> {
        let started = Instant::now();
        let mut report = ReconcileReport::default();

        self.set_phase(ReconcilePhase::Listing);
        let keys = match self.store.list_keys().await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::error!(error = %e, "reconciliation aborted: cannot list object store");
                return Err(e);
            }
        };
        report.listed = keys.len();

        self.set_phase(ReconcilePhase::Diffing);
        let mut missing = Vec::new();
        for key in keys {
            match self.repo.exists(&key).await {
                Ok(true) => report.skipped += 1,
                Ok(false) => missing.push(key),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "existence check failed");
                    report.failures.push(KeyFailure::new(&key, &e));
                }
            }
        }

        for (i, key) in missing.iter().enumerate() {
            if self.shutdown_requested() {
                report.cancelled = true;
                break;
            }
            self.set_phase(ReconcilePhase::Indexing(missing.len() - i));

            match self.index_key(key).await {
                Ok(IndexOutcome::Indexed) => {
                    tracing::debug!(key = %key, "reconciled");
                    report.indexed.push(key.clone());
                }
                Ok(IndexOutcome::AlreadyIndexed) => report.skipped += 1,
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "failed to reconcile object");
                    report.failures.push(KeyFailure::new(key, &e));
                }
            }
        }

        report.elapsed_ms = started.elapsed().as_millis();
        tracing::info!(
            listed = report.listed,
            indexed = report.indexed.len(),
            skipped = report.skipped,
            failed = report.failures.len(),
            cancelled = report.cancelled,
            elapsed_ms = report.elapsed_ms as u64,
            "reconciliation finished"
        );
        Ok(report)
    }

    /// Reconciled records are named after their key and dated by the
    /// object's last modification.
    async fn index_key(&self, key: &str) -> Result<IndexOutcome> {
        let stat = self.store.stat(key).await?;
        let staged = stage_object(self.store.as_ref(), key, &self.scratch_dir).await?;
        self.indexer
            .index(IndexRequest {
                local_path: staged.path(),
                file_id: key,
                name: key,
                size: stat.size,
                upload_date: stat.last_modified,
            })
            .await
    }

    /// Run every `period` until `shutdown` flips or its sender is dropped.
    ///
    /// The first run happens one period after spawning; a startup run, if
    /// wanted, is the caller's job.
    pub fn spawn_scheduler(
        self: Arc<Self>,
        period: Duration,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if self.try_run().await.is_none() {
                            tracing::info!("scheduled reconciliation skipped: previous run still active");
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }
            tracing::debug!("reconciliation scheduler stopped");
        })
    }
}

//! Best-effort background writer for task snapshots.
//!
//! Engine operations hand snapshots to an unbounded channel and return
//! immediately. Failed writes wait in a backlog (newest snapshot per task
//! wins) and are retried on a timer until `max_retries` is reached. Every
//! store call is bounded by a timeout; a call that runs out counts as a
//! failed, retryable write.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use switchboard_core::{CollaborationTask, SwitchboardError, SwitchboardResult, TaskStore};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteKind {
    Insert,
    Update,
}

enum PersistOp {
    Write(WriteKind, CollaborationTask),
    Flush(oneshot::Sender<()>),
}

struct PendingWrite {
    kind: WriteKind,
    task: CollaborationTask,
    attempts: u32,
}

/// Counters exposed in the engine status.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct PersistStats {
    pub written: u64,
    pub failed_attempts: u64,
    pub dropped: u64,
    pub backlog: usize,
}

/// Handle to the background writer. Cheap to clone.
#[derive(Clone)]
pub struct Persister {
    tx: mpsc::UnboundedSender<PersistOp>,
    stats: Arc<Mutex<PersistStats>>,
}

impl Persister {
    /// Spawn the writer loop. Must be called inside a Tokio runtime.
    pub fn spawn(
        store: Arc<dyn TaskStore>,
        max_retries: u32,
        retry_interval: Duration,
        write_timeout: Duration,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let stats = Arc::new(Mutex::new(PersistStats::default()));
        let worker = Writer {
            store,
            max_retries,
            write_timeout,
            backlog: HashMap::new(),
            stats: stats.clone(),
        };
        let handle = tokio::spawn(worker.run(rx, retry_interval));
        (Self { tx, stats }, handle)
    }

    pub fn record_insert(&self, task: CollaborationTask) {
        self.send(PersistOp::Write(WriteKind::Insert, task));
    }

    pub fn record_update(&self, task: CollaborationTask) {
        self.send(PersistOp::Write(WriteKind::Update, task));
    }

    /// Wait until everything queued so far has been attempted once more.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        self.send(PersistOp::Flush(done_tx));
        let _ = done_rx.await;
    }

    pub fn stats(&self) -> PersistStats {
        *self.stats.lock()
    }

    fn send(&self, op: PersistOp) {
        if self.tx.send(op).is_err() {
            warn!("Persister stopped; dropping write");
        }
    }
}

/// Run a datastore call under `timeout`, turning expiry into a retryable
/// persistence error.
pub(crate) async fn bounded<T>(
    timeout: Duration,
    op: &str,
    call: impl Future<Output = SwitchboardResult<T>>,
) -> SwitchboardResult<T> {
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(SwitchboardError::Persistence(format!(
            "store {op} timed out after {}ms",
            timeout.as_millis()
        ))),
    }
}

struct Writer {
    store: Arc<dyn TaskStore>,
    max_retries: u32,
    write_timeout: Duration,
    backlog: HashMap<Uuid, PendingWrite>,
    stats: Arc<Mutex<PersistStats>>,
}

impl Writer {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<PersistOp>, retry_interval: Duration) {
        let mut ticker = tokio::time::interval(retry_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                op = rx.recv() => match op {
                    Some(PersistOp::Write(kind, task)) => self.accept(kind, task).await,
                    Some(PersistOp::Flush(done)) => {
                        self.retry_backlog().await;
                        let _ = done.send(());
                    }
                    None => {
                        self.retry_backlog().await;
                        if !self.backlog.is_empty() {
                            error!(pending = self.backlog.len(), "Persister shutting down with unsaved tasks");
                        }
                        break;
                    }
                },
                _ = ticker.tick(), if !self.backlog.is_empty() => self.retry_backlog().await,
            }
        }
    }

    async fn accept(&mut self, kind: WriteKind, task: CollaborationTask) {
        // A newer snapshot replaces any backlogged one. An unsaved insert
        // stays an insert.
        let kind = match self.backlog.remove(&task.id) {
            Some(prev) if prev.kind == WriteKind::Insert => WriteKind::Insert,
            _ => kind,
        };
        self.attempt(PendingWrite { kind, task, attempts: 0 }).await;
    }

    async fn retry_backlog(&mut self) {
        let pending: Vec<PendingWrite> = self.backlog.drain().map(|(_, p)| p).collect();
        for write in pending {
            self.attempt(write).await;
        }
    }

    async fn attempt(&mut self, mut write: PendingWrite) {
        let result: SwitchboardResult<()> = match write.kind {
            WriteKind::Insert => bounded(self.write_timeout, "insert", self.store.insert(&write.task)).await,
            WriteKind::Update => bounded(self.write_timeout, "update", self.store.update(&write.task)).await,
        };
        match result {
            Ok(()) => {
                debug!(task_id = %write.task.id, status = %write.task.status, "Task persisted");
                let mut stats = self.stats.lock();
                stats.written += 1;
                stats.backlog = self.backlog.len();
            }
            Err(e) => {
                write.attempts += 1;
                let mut stats = self.stats.lock();
                stats.failed_attempts += 1;
                if !e.is_retryable() || write.attempts > self.max_retries {
                    error!(
                        task_id = %write.task.id,
                        attempts = write.attempts,
                        error = %e,
                        "Giving up on task write"
                    );
                    stats.dropped += 1;
                } else {
                    warn!(
                        task_id = %write.task.id,
                        attempts = write.attempts,
                        error = %e,
                        "Task write failed, will retry"
                    );
                    self.backlog.insert(write.task.id, write);
                }
                stats.backlog = self.backlog.len();
            }
        }
    }
}

//! Bounded-concurrency upload scheduling
//!
//! Fans a batch of upload tasks out over a fixed pool of workers. Pool
//! size is `min(tasks, max_concurrency)` so a two-file batch never opens
//! three sessions. Each worker connects lazily on its first task and all
//! surviving sessions are torn down when the batch drains, successful or
//! not.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::config::RemoteTarget;
use crate::notify::Notifier;
use crate::progress::{ProgressEvent, ProgressReporter, TransferControl};
use crate::status::{SyncStats, SyncStatus};
use crate::sync::{SyncWorker, Synchronizer, TransferOutcome, TransferStatus, UploadTask};

/// Builds worker pools and dispatches upload batches.
pub struct UploadScheduler {
    status: Arc<SyncStatus>,
    stats: Arc<SyncStats>,
    notifier: Arc<dyn Notifier>,
}

/// Handle to an in-flight batch.
///
/// `outcomes` yields one [`TransferOutcome`] per scheduled task, in
/// completion order. Dropping the handle does not cancel the batch; use
/// `control` for that.
pub struct SyncBatch {
    pub outcomes: mpsc::Receiver<TransferOutcome>,
    pub progress: mpsc::UnboundedReceiver<ProgressEvent>,
    pub control: TransferControl,
}

impl SyncBatch {
    /// Drain all outcomes, discarding progress events.
    pub async fn collect(mut self) -> Vec<TransferOutcome> {
        let mut out = Vec::new();
        while let Some(outcome) = self.outcomes.recv().await {
            out.push(outcome);
        }
        out
    }
}

impl UploadScheduler {
    pub fn new(status: Arc<SyncStatus>, stats: Arc<SyncStats>, notifier: Arc<dyn Notifier>) -> Self {
        Self {
            status,
            stats,
            notifier,
        }
    }

    /// Schedule a batch against a live SSH target.
    pub fn schedule(&self, target: Arc<RemoteTarget>, tasks: Vec<UploadTask>) -> SyncBatch {
        let concurrency = tasks.len().min(target.max_concurrency).max(1);
        let workers = (0..concurrency)
            .map(|_| {
                Synchronizer::new(
                    target.clone(),
                    self.status.clone(),
                    self.stats.clone(),
                    self.notifier.clone(),
                )
            })
            .collect();
        self.schedule_with(target, tasks, workers)
    }

    /// Schedule a batch over caller-supplied workers. Pool size is the
    /// worker count; tasks beyond it queue on the semaphore.
    pub fn schedule_with<W: SyncWorker + 'static>(
        &self,
        target: Arc<RemoteTarget>,
        tasks: Vec<UploadTask>,
        workers: Vec<W>,
    ) -> SyncBatch {
        let (outcome_tx, outcome_rx) = mpsc::channel(tasks.len().max(1));
        let (progress_tx, progress_rx) = mpsc::unbounded_channel();
        let control = TransferControl::new();

        let pool_size = workers.len();
        let permits = Arc::new(Semaphore::new(pool_size.max(1)));
        let pool = Arc::new(Mutex::new(workers));

        let mut join_set: JoinSet<()> = JoinSet::new();
        for task in tasks {
            if target.is_excluded(&task.file_name()) {
                debug!("Skipping excluded file {}", task.file_name());
                let _ = outcome_tx.try_send(TransferOutcome {
                    task,
                    status: TransferStatus::SkippedExcluded,
                });
                continue;
            }
            if pool_size == 0 {
                let _ = outcome_tx.try_send(TransferOutcome {
                    task,
                    status: TransferStatus::Failed("no workers available".to_string()),
                });
                continue;
            }

            let permits = permits.clone();
            let pool = pool.clone();
            let outcome_tx = outcome_tx.clone();
            let progress = ProgressReporter::new(progress_tx.clone());
            let control = control.clone();
            join_set.spawn(async move {
                // Closed only if the batch supervisor is gone
                let Ok(_permit) = permits.acquire_owned().await else {
                    return;
                };
                let mut worker = pool
                    .lock()
                    .pop()
                    .expect("pool holds one worker per permit");

                let status = match worker.connect().await {
                    Ok(()) => match worker.transfer(&task, &progress, &control).await {
                        Ok(()) => TransferStatus::Ok,
                        Err(e) => TransferStatus::Failed(e.to_string()),
                    },
                    Err(e) => TransferStatus::Failed(e.to_string()),
                };

                pool.lock().push(worker);
                let _ = outcome_tx.send(TransferOutcome { task, status }).await;
            });
        }
        drop(outcome_tx);
        drop(progress_tx);

        // Supervisor: wait the batch out, then close every session the
        // pool opened.
        tokio::spawn(async move {
            while let Some(result) = join_set.join_next().await {
                if let Err(e) = result {
                    warn!("upload task panicked: {}", e);
                }
            }
            let workers = std::mem::take(&mut *pool.lock());
            for mut worker in workers {
                worker.disconnect().await;
            }
        });

        SyncBatch {
            outcomes: outcome_rx,
            progress: progress_rx,
            control,
        }
    }

    /// Schedule and wait for every outcome.
    pub async fn sync_all(
        &self,
        target: Arc<RemoteTarget>,
        tasks: Vec<UploadTask>,
    ) -> Vec<TransferOutcome> {
        self.schedule(target, tasks).collect().await
    }
}

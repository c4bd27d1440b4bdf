//! Parallel batch scheduler.
//!
//! A fixed pool of `max(1, parallelism)` workers drains one shared item
//! queue (work stealing, not a fixed partition). Each worker owns an
//! independent session, replaced with a fresh one after any
//! connection-level failure. Per-item failures are reported individually
//! and never abort siblings; a single batch-finished notification fires
//! when the atomic completion counter reaches the batch size.
//!
//! Upload batches are fingerprinted by a content signature registered at
//! submission time (on the caller's serialized context, so a re-entrant
//! double submission cannot race the check) and released only when the
//! whole batch completes. A duplicate submission is a silent no-op
//! success.

use crate::xfer::error::{SkiffError, SkiffResult};
use crate::xfer::observer::EventDispatcher;
use crate::xfer::progress::ProgressAggregator;
use crate::xfer::retry::{retry_with_backoff, RetryPolicy};
use crate::xfer::session::{ProtocolSession, SessionConnector};
use crate::xfer::task::TransferTask;
use crate::xfer::types::{ActionKind, TransferConfig, TransferDirection, TransferItem};
use sha2::{Digest, Sha256};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, UNIX_EPOCH};
use tokio::fs;
use uuid::Uuid;

/// In-flight upload-batch signatures, scoped to one controller instance.
pub type SignatureRegistry = Arc<StdMutex<HashSet<String>>>;

/// A worker's session, lazily opened and dropped on failure.
pub(crate) type SessionSlot = Arc<tokio::sync::Mutex<Option<Box<dyn ProtocolSession>>>>;

/// Fingerprint of an upload batch: sha256 over every item's remote path,
/// local length, and local mtime. Missing local files hash as (0, 0) so
/// a batch containing a bad item still has a stable signature.
pub async fn batch_signature(items: &[TransferItem]) -> String {
    let mut hasher = Sha256::new();
    for item in items {
        let (len, mtime) = match fs::metadata(&item.local_path).await {
            Ok(meta) => {
                let mtime = meta
                    .modified()
                    .ok()
                    .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                    .map(|d| d.as_secs())
                    .unwrap_or(0);
                (meta.len(), mtime)
            }
            Err(_) => (0, 0),
        };
        hasher.update(item.remote_path.as_bytes());
        hasher.update(len.to_le_bytes());
        hasher.update(mtime.to_le_bytes());
    }
    hex::encode(hasher.finalize())
}

/// Transfer one item, opening a fresh session per attempt when the slot
/// is empty. A session that saw a retryable failure is torn down so the
/// next attempt reconnects; shared by the parallel and sequential paths.
pub(crate) async fn run_item_with_retry(
    connector: Arc<dyn SessionConnector>,
    slot: SessionSlot,
    task: Arc<TransferTask>,
    direction: TransferDirection,
    item: TransferItem,
    policy: RetryPolicy,
) -> SkiffResult<u64> {
    let label = item.remote_path.clone();
    retry_with_backoff(&policy, &label, |_attempt| {
        let connector = connector.clone();
        let slot = slot.clone();
        let task = task.clone();
        let item = item.clone();
        async move {
            let mut guard = slot.lock().await;
            if guard.is_none() {
                *guard = Some(connector.open().await?);
            }
            let Some(session) = guard.as_mut() else {
                return Err(SkiffError::unknown("session slot empty after open"));
            };

            let result = match direction {
                TransferDirection::Upload => {
                    task.run_upload(session.as_mut(), &item.local_path, &item.remote_path)
                        .await
                }
                TransferDirection::Download => {
                    task.run_download(session.as_mut(), &item.remote_path, &item.local_path)
                        .await
                }
            };

            if let Err(ref err) = result {
                if err.is_retryable() {
                    // Stale sessions are never reused after a failure.
                    if let Some(mut stale) = guard.take() {
                        let _ = stale.disconnect().await;
                    }
                }
            }
            result
        }
    })
    .await
}

/// A batch admitted past the empty-check and dedup gate, ready to run.
pub struct ParallelBatch {
    connector: Arc<dyn SessionConnector>,
    dispatcher: EventDispatcher,
    progress: Arc<ProgressAggregator>,
    config: TransferConfig,
    registry: SignatureRegistry,
    direction: TransferDirection,
    items: Vec<TransferItem>,
    parallelism: usize,
    signature: Option<String>,
}

/// Admission step. Runs on the caller's serialized context: empty
/// batches and duplicate upload submissions are answered immediately
/// with a success notification and yield `None`; otherwise the upload
/// signature is registered and the prepared batch is returned.
#[allow(clippy::too_many_arguments)]
pub async fn submit_parallel(
    connector: Arc<dyn SessionConnector>,
    dispatcher: EventDispatcher,
    progress: Arc<ProgressAggregator>,
    config: TransferConfig,
    registry: SignatureRegistry,
    direction: TransferDirection,
    items: Vec<TransferItem>,
    parallelism: usize,
) -> Option<ParallelBatch> {
    let (_, batch_action) = actions_for(direction);

    if items.is_empty() {
        dispatcher.success(batch_action, "0/0 files finished");
        return None;
    }

    let signature = if direction == TransferDirection::Upload {
        let sig = batch_signature(&items).await;
        let mut running = lock_registry(&registry);
        if !running.insert(sig.clone()) {
            drop(running);
            log::info!("duplicate upload batch suppressed ({} items)", items.len());
            dispatcher.success(batch_action, "batch already in progress");
            return None;
        }
        Some(sig)
    } else {
        None
    };

    Some(ParallelBatch {
        connector,
        dispatcher,
        progress,
        config,
        registry,
        direction,
        items,
        parallelism,
        signature,
    })
}

impl ParallelBatch {
    /// Drain the batch across the worker pool. Resolves when every item
    /// has completed (success or failure) and the finish notification
    /// has fired.
    pub async fn run(self) {
        let (item_action, batch_action) = actions_for(self.direction);
        let total = self.items.len();
        let batch_id = Uuid::new_v4();
        log::info!(
            "batch {}: {} items, {} workers",
            batch_id,
            total,
            self.parallelism.max(1)
        );

        let queue: Arc<StdMutex<VecDeque<TransferItem>>> =
            Arc::new(StdMutex::new(self.items.into_iter().collect()));
        let completed = Arc::new(AtomicUsize::new(0));
        let succeeded = Arc::new(AtomicUsize::new(0));
        let policy = RetryPolicy::new(
            self.config.max_retries,
            Duration::from_secs(self.config.retry_backoff_sec),
        );

        let mut workers = Vec::new();
        for _ in 0..self.parallelism.max(1) {
            let connector = self.connector.clone();
            let dispatcher = self.dispatcher.clone();
            let progress = self.progress.clone();
            let queue = queue.clone();
            let completed = completed.clone();
            let succeeded = succeeded.clone();
            let registry = self.registry.clone();
            let signature = self.signature.clone();
            let task = Arc::new(TransferTask::new(self.config.clone(), progress.clone()));
            let release_on_failure = self.config.release_signature_on_failure;
            let direction = self.direction;

            workers.push(tokio::spawn(async move {
                let slot: SessionSlot = Arc::new(tokio::sync::Mutex::new(None));
                loop {
                    let item = {
                        let mut q = match queue.lock() {
                            Ok(q) => q,
                            Err(poisoned) => poisoned.into_inner(),
                        };
                        q.pop_front()
                    };
                    let Some(item) = item else { break };

                    let key = item.remote_path.clone();
                    let result = run_item_with_retry(
                        connector.clone(),
                        slot.clone(),
                        task.clone(),
                        direction,
                        item,
                        policy,
                    )
                    .await;
                    progress.remove(&key);

                    match result {
                        Ok(bytes) => {
                            succeeded.fetch_add(1, Ordering::SeqCst);
                            dispatcher.success(item_action, format!("{} ({} bytes)", key, bytes));
                        }
                        Err(err) => dispatcher.error(item_action, err),
                    }

                    let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
                    if done == total {
                        // Released before the notification, so an observer
                        // resubmitting from the finished callback is admitted.
                        let ok = succeeded.load(Ordering::SeqCst);
                        if let Some(ref sig) = signature {
                            if ok > 0 || release_on_failure {
                                lock_registry(&registry).remove(sig);
                            }
                        }
                        dispatcher
                            .success(batch_action, format!("{}/{} files finished", done, total));
                    }
                }

                // Workers close their sessions once the queue drains.
                let mut guard = slot.lock().await;
                if let Some(mut session) = guard.take() {
                    let _ = session.disconnect().await;
                }
            }));
        }

        for worker in workers {
            let _ = worker.await;
        }
        log::info!("batch {} finished", batch_id);
    }
}

fn actions_for(direction: TransferDirection) -> (ActionKind, ActionKind) {
    match direction {
        TransferDirection::Upload => (ActionKind::Upload, ActionKind::BatchUpload),
        TransferDirection::Download => (ActionKind::Download, ActionKind::BatchDownload),
    }
}

fn lock_registry(registry: &SignatureRegistry) -> std::sync::MutexGuard<'_, HashSet<String>> {
    match registry.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

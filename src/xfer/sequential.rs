//! Sequential batch scheduler.
//!
//! One shared session, opened lazily and reused across the whole batch
//! (and across batches, while it stays healthy). A connection-level
//! failure mid-item tears the session down; the next retry attempt
//! reopens and re-authenticates. Items are processed strictly in input
//! order, each to full per-item retry exhaustion, and items already
//! completed are never redone. The finish notification fires
//! unconditionally after the loop, failures included.

use crate::xfer::batch::{run_item_with_retry, SessionSlot};
use crate::xfer::observer::EventDispatcher;
use crate::xfer::progress::ProgressAggregator;
use crate::xfer::retry::RetryPolicy;
use crate::xfer::session::SessionConnector;
use crate::xfer::task::TransferTask;
use crate::xfer::types::{ActionKind, TransferConfig, TransferDirection, TransferItem};
use std::sync::Arc;
use std::time::Duration;

pub struct SequentialScheduler {
    connector: Arc<dyn SessionConnector>,
    dispatcher: EventDispatcher,
    progress: Arc<ProgressAggregator>,
    slot: SessionSlot,
}

impl SequentialScheduler {
    pub fn new(
        connector: Arc<dyn SessionConnector>,
        dispatcher: EventDispatcher,
        progress: Arc<ProgressAggregator>,
    ) -> Self {
        Self {
            connector,
            dispatcher,
            progress,
            slot: Arc::new(tokio::sync::Mutex::new(None)),
        }
    }

    /// Process a batch in input order on the shared session.
    pub async fn submit(
        &self,
        config: TransferConfig,
        direction: TransferDirection,
        items: Vec<TransferItem>,
    ) {
        let (item_action, batch_action) = match direction {
            TransferDirection::Upload => (ActionKind::Upload, ActionKind::BatchUpload),
            TransferDirection::Download => (ActionKind::Download, ActionKind::BatchDownload),
        };
        let total = items.len();
        let policy = RetryPolicy::new(
            config.max_retries,
            Duration::from_secs(config.retry_backoff_sec),
        );
        let task = Arc::new(TransferTask::new(config, self.progress.clone()));

        let mut attempted = 0usize;
        for item in items {
            attempted += 1;
            let key = item.remote_path.clone();
            let result = run_item_with_retry(
                self.connector.clone(),
                self.slot.clone(),
                task.clone(),
                direction,
                item,
                policy,
            )
            .await;
            self.progress.remove(&key);

            match result {
                Ok(bytes) => {
                    self.dispatcher
                        .success(item_action, format!("{} ({} bytes)", key, bytes));
                }
                Err(err) => self.dispatcher.error(item_action, err),
            }
        }

        self.dispatcher.success(
            batch_action,
            format!("{}/{} files finished", attempted, total),
        );
    }

    /// Close the shared session, if one is open.
    pub async fn shutdown(&self) {
        let mut guard = self.slot.lock().await;
        if let Some(mut session) = guard.take() {
            let _ = session.disconnect().await;
        }
    }
}

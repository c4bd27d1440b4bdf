//! Concurrent progress aggregation.
//!
//! One map entry per in-flight transfer, keyed by the full remote path.
//! `publish` overwrites in place — intermediate values may be coalesced
//! under high-frequency updates, only the latest per key matters. Every
//! mutation emits one ordered, consistent snapshot to the dispatcher:
//! the snapshot is built while holding the map lock and delivered after
//! releasing it, so observers never see a half-updated set.

use crate::xfer::observer::EventDispatcher;
use crate::xfer::types::TransferProgress;
use std::collections::HashMap;
use std::sync::Mutex;

pub struct ProgressAggregator {
    entries: Mutex<HashMap<String, TransferProgress>>,
    dispatcher: EventDispatcher,
}

impl ProgressAggregator {
    pub fn new(dispatcher: EventDispatcher) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            dispatcher,
        }
    }

    /// Overwrite the entry for `progress.key` and emit a snapshot.
    pub fn publish(&self, progress: TransferProgress) {
        let snapshot = {
            let mut map = match self.entries.lock() {
                Ok(m) => m,
                Err(poisoned) => poisoned.into_inner(),
            };
            map.insert(progress.key.clone(), progress);
            ordered_snapshot(&map)
        };
        self.dispatcher.progress(snapshot);
    }

    /// Remove a finished transfer's entry and emit a snapshot.
    pub fn remove(&self, key: &str) {
        let snapshot = {
            let mut map = match self.entries.lock() {
                Ok(m) => m,
                Err(poisoned) => poisoned.into_inner(),
            };
            map.remove(key);
            ordered_snapshot(&map)
        };
        self.dispatcher.progress(snapshot);
    }

    /// Current entries, in stable key order.
    pub fn snapshot(&self) -> Vec<TransferProgress> {
        let map = match self.entries.lock() {
            Ok(m) => m,
            Err(poisoned) => poisoned.into_inner(),
        };
        ordered_snapshot(&map)
    }
}

fn ordered_snapshot(map: &HashMap<String, TransferProgress>) -> Vec<TransferProgress> {
    let mut list: Vec<TransferProgress> = map.values().cloned().collect();
    list.sort_by(|a, b| a.key.cmp(&b.key));
    list
}

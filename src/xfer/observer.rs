//! Observer surface and single-context event delivery.
//!
//! Every callback is marshaled onto one dedicated delivery task, never
//! the caller's thread, so observer code never races itself. Workers and
//! the background command loop push events through an unbounded channel;
//! the delivery task invokes the currently-attached observer in order.

use crate::xfer::error::SkiffError;
use crate::xfer::types::{ActionKind, FileEntry, TransferProgress};
use std::sync::{Arc, RwLock};
use tokio::sync::mpsc;

/// Callbacks produced by the engine. All default to no-op; implement the
/// subset you care about.
pub trait TransferObserver: Send + Sync {
    fn on_connected(&self) {}
    fn on_disconnected(&self) {}
    fn on_listing(&self, _entries: &[FileEntry]) {}
    fn on_success(&self, _action: ActionKind, _message: &str) {}
    fn on_progress(&self, _snapshot: &[TransferProgress]) {}
    fn on_error(&self, _action: ActionKind, _error: &SkiffError) {}
}

enum Event {
    Connected,
    Disconnected,
    Listing(Vec<FileEntry>),
    Success(ActionKind, String),
    Progress(Vec<TransferProgress>),
    Error(ActionKind, SkiffError),
}

/// Cheap-to-clone handle that queues events for the delivery task.
#[derive(Clone)]
pub struct EventDispatcher {
    tx: mpsc::UnboundedSender<Event>,
    observer: Arc<RwLock<Option<Arc<dyn TransferObserver>>>>,
}

impl EventDispatcher {
    /// Create a dispatcher and spawn its delivery task.
    pub fn new() -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
        let observer: Arc<RwLock<Option<Arc<dyn TransferObserver>>>> =
            Arc::new(RwLock::new(None));

        let delivery_observer = observer.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                let current = delivery_observer
                    .read()
                    .ok()
                    .and_then(|guard| guard.clone());
                let Some(obs) = current else { continue };
                match event {
                    Event::Connected => obs.on_connected(),
                    Event::Disconnected => obs.on_disconnected(),
                    Event::Listing(entries) => obs.on_listing(&entries),
                    Event::Success(action, msg) => obs.on_success(action, &msg),
                    Event::Progress(snapshot) => obs.on_progress(&snapshot),
                    Event::Error(action, err) => obs.on_error(action, &err),
                }
            }
        });

        Self { tx, observer }
    }

    /// Attach an observer, replacing any previous one. The old subscriber
    /// simply stops receiving callbacks.
    pub fn attach(&self, observer: Arc<dyn TransferObserver>) {
        if let Ok(mut guard) = self.observer.write() {
            *guard = Some(observer);
        }
    }

    /// Detach the current observer, if any.
    pub fn detach(&self) {
        if let Ok(mut guard) = self.observer.write() {
            *guard = None;
        }
    }

    pub fn connected(&self) {
        let _ = self.tx.send(Event::Connected);
    }

    pub fn disconnected(&self) {
        let _ = self.tx.send(Event::Disconnected);
    }

    pub fn listing(&self, entries: Vec<FileEntry>) {
        let _ = self.tx.send(Event::Listing(entries));
    }

    pub fn success(&self, action: ActionKind, message: impl Into<String>) {
        let _ = self.tx.send(Event::Success(action, message.into()));
    }

    pub fn progress(&self, snapshot: Vec<TransferProgress>) {
        let _ = self.tx.send(Event::Progress(snapshot));
    }

    pub fn error(&self, action: ActionKind, error: SkiffError) {
        log::warn!("{:?} failed: {}", action, error);
        let _ = self.tx.send(Event::Error(action, error));
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

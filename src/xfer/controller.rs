//! Public facade.
//!
//! Every public method enqueues a command onto one serialized background
//! task and returns immediately; results surface exclusively through
//! observer callbacks, delivered on the dispatcher's delivery task.
//! Parallel batches are detached onto their own worker pool so the
//! serialized context stays responsive; sequential batches run on it.

use crate::xfer::batch::{run_item_with_retry, submit_parallel, SessionSlot, SignatureRegistry};
use crate::xfer::error::SkiffError;
use crate::xfer::observer::{EventDispatcher, TransferObserver};
use crate::xfer::progress::ProgressAggregator;
use crate::xfer::retry::RetryPolicy;
use crate::xfer::sequential::SequentialScheduler;
use crate::xfer::session::SessionConnector;
use crate::xfer::task::TransferTask;
use crate::xfer::types::*;
use std::collections::HashSet;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::mpsc;

enum Command {
    Connect,
    Disconnect,
    List { path: String, options: ListOptions },
    Delete { path: String },
    Rename { from: String, to: String },
    Mkdir { path: String },
    Download { remote_path: String, dest_path: String },
    Upload { local_path: String, remote_path: String },
    BatchParallel {
        direction: TransferDirection,
        items: Vec<TransferItem>,
        parallelism: usize,
    },
    BatchSequential {
        direction: TransferDirection,
        items: Vec<TransferItem>,
    },
    Keepalive,
}

/// Handle to the transfer engine. Cheap to clone; all methods are
/// fire-and-forget, with results delivered to the attached observer.
#[derive(Clone)]
pub struct Controller {
    cmd_tx: mpsc::UnboundedSender<Command>,
    dispatcher: EventDispatcher,
    progress: Arc<ProgressAggregator>,
    state: Arc<StdMutex<ConnectionState>>,
}

/// Retained name for embedders that store the handle long-term.
pub type ControllerHandle = Controller;

impl Controller {
    /// Spawn the background command loop and keep-alive ticker.
    /// Must be called from within a tokio runtime.
    pub fn new(
        connector: Arc<dyn SessionConnector>,
        connection: ConnectionConfig,
        transfer: TransferConfig,
    ) -> Self {
        let dispatcher = EventDispatcher::new();
        let progress = Arc::new(ProgressAggregator::new(dispatcher.clone()));
        let state = Arc::new(StdMutex::new(ConnectionState::Disconnected));
        let registry: SignatureRegistry = Arc::new(StdMutex::new(HashSet::new()));
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();

        let worker = BackgroundLoop {
            connector: connector.clone(),
            dispatcher: dispatcher.clone(),
            progress: progress.clone(),
            shared: Arc::new(tokio::sync::Mutex::new(None)),
            sequential: SequentialScheduler::new(
                connector,
                dispatcher.clone(),
                progress.clone(),
            ),
            state: state.clone(),
            registry,
            connection: connection.clone(),
            transfer,
        };
        tokio::spawn(worker.run(cmd_rx));

        // Keep-alive ticker; pings only while connected.
        if connection.keepalive_interval_sec > 0 {
            let tx = cmd_tx.clone();
            let tick_state = state.clone();
            let interval = Duration::from_secs(connection.keepalive_interval_sec);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(interval);
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    let connected = matches!(
                        tick_state.lock().map(|s| *s),
                        Ok(ConnectionState::Connected)
                    );
                    if connected && tx.send(Command::Keepalive).is_err() {
                        break;
                    }
                }
            });
        }

        Self {
            cmd_tx,
            dispatcher,
            progress,
            state,
        }
    }

    // ─── Observer subscription ───────────────────────────────────

    /// Attach an observer, replacing any previous one.
    pub fn attach_observer(&self, observer: Arc<dyn TransferObserver>) {
        self.dispatcher.attach(observer);
    }

    pub fn detach_observer(&self) {
        self.dispatcher.detach();
    }

    // ─── Introspection ───────────────────────────────────────────

    pub fn state(&self) -> ConnectionState {
        self.state
            .lock()
            .map(|s| *s)
            .unwrap_or(ConnectionState::Disconnected)
    }

    /// Current progress entries, in stable key order.
    pub fn progress_snapshot(&self) -> Vec<TransferProgress> {
        self.progress.snapshot()
    }

    // ─── Operations (all asynchronous, observer-reported) ────────

    pub fn connect(&self) {
        self.send(Command::Connect);
    }

    pub fn disconnect(&self) {
        self.send(Command::Disconnect);
    }

    pub fn list(&self, path: impl Into<String>, options: ListOptions) {
        self.send(Command::List {
            path: path.into(),
            options,
        });
    }

    pub fn delete(&self, path: impl Into<String>) {
        self.send(Command::Delete { path: path.into() });
    }

    pub fn rename(&self, from: impl Into<String>, to: impl Into<String>) {
        self.send(Command::Rename {
            from: from.into(),
            to: to.into(),
        });
    }

    pub fn mkdir(&self, path: impl Into<String>) {
        self.send(Command::Mkdir { path: path.into() });
    }

    pub fn download(&self, remote_path: impl Into<String>, dest_path: impl Into<String>) {
        self.send(Command::Download {
            remote_path: remote_path.into(),
            dest_path: dest_path.into(),
        });
    }

    pub fn upload(&self, local_path: impl Into<String>, remote_path: impl Into<String>) {
        self.send(Command::Upload {
            local_path: local_path.into(),
            remote_path: remote_path.into(),
        });
    }

    /// Submit a batch to a dedicated worker pool. Does not use the
    /// shared session; each worker opens its own.
    pub fn submit_batch(
        &self,
        direction: TransferDirection,
        items: Vec<TransferItem>,
        parallelism: usize,
    ) {
        self.send(Command::BatchParallel {
            direction,
            items,
            parallelism,
        });
    }

    /// Submit a batch processed strictly in order on one session.
    pub fn submit_batch_sequential(&self, direction: TransferDirection, items: Vec<TransferItem>) {
        self.send(Command::BatchSequential { direction, items });
    }

    fn send(&self, cmd: Command) {
        let _ = self.cmd_tx.send(cmd);
    }
}

// ─── Background loop ─────────────────────────────────────────────────

struct BackgroundLoop {
    connector: Arc<dyn SessionConnector>,
    dispatcher: EventDispatcher,
    progress: Arc<ProgressAggregator>,
    /// The controller's "current" session for single-shot operations.
    shared: SessionSlot,
    sequential: SequentialScheduler,
    state: Arc<StdMutex<ConnectionState>>,
    registry: SignatureRegistry,
    connection: ConnectionConfig,
    transfer: TransferConfig,
}

impl BackgroundLoop {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(cmd) = rx.recv().await {
            self.handle(cmd).await;
        }
        // Handle dropped: close whatever is still open.
        self.teardown_shared().await;
        self.sequential.shutdown().await;
    }

    async fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Connect => self.do_connect().await,
            Command::Disconnect => self.do_disconnect().await,
            Command::List { path, options } => self.do_list(&path, options).await,
            Command::Delete { path } => self.do_delete(&path).await,
            Command::Rename { from, to } => self.do_rename(&from, &to).await,
            Command::Mkdir { path } => self.do_mkdir(&path).await,
            Command::Download {
                remote_path,
                dest_path,
            } => {
                self.do_transfer(TransferDirection::Download, &dest_path, &remote_path)
                    .await
            }
            Command::Upload {
                local_path,
                remote_path,
            } => {
                self.do_transfer(TransferDirection::Upload, &local_path, &remote_path)
                    .await
            }
            Command::BatchParallel {
                direction,
                items,
                parallelism,
            } => {
                // Admission (empty-check, dedup registration) happens here
                // on the serialized context; the run itself detaches so
                // simple operations stay responsive.
                let admitted = submit_parallel(
                    self.connector.clone(),
                    self.dispatcher.clone(),
                    self.progress.clone(),
                    self.transfer.clone(),
                    self.registry.clone(),
                    direction,
                    items,
                    parallelism,
                )
                .await;
                if let Some(batch) = admitted {
                    tokio::spawn(batch.run());
                }
            }
            Command::BatchSequential { direction, items } => {
                self.sequential
                    .submit(self.transfer.clone(), direction, items)
                    .await;
            }
            Command::Keepalive => self.do_keepalive().await,
        }
    }

    fn set_state(&self, next: ConnectionState) {
        if let Ok(mut guard) = self.state.lock() {
            *guard = next;
        }
    }

    fn is_connected(&self) -> bool {
        matches!(
            self.state.lock().map(|s| *s),
            Ok(ConnectionState::Connected)
        )
    }

    /// Connectivity gate for single-shot operations.
    fn gate(&self, action: ActionKind) -> bool {
        if self.is_connected() {
            true
        } else {
            self.dispatcher
                .error(action, SkiffError::not_connected("no active session"));
            false
        }
    }

    async fn teardown_shared(&self) {
        let mut guard = self.shared.lock().await;
        if let Some(mut session) = guard.take() {
            let _ = session.disconnect().await;
        }
    }

    /// Drop the shared session after a connection-level failure.
    async fn on_connection_loss(&self) {
        self.teardown_shared().await;
        self.set_state(ConnectionState::Disconnected);
        self.dispatcher.disconnected();
    }

    // ─── Lifecycle ───────────────────────────────────────────────

    async fn do_connect(&mut self) {
        if self.is_connected() {
            // Client error per contract; reconnect rather than stack sessions.
            log::warn!("connect() while already connected; reconnecting");
            self.teardown_shared().await;
        }
        self.set_state(ConnectionState::Connecting);
        log::info!(
            "connecting to {}:{}",
            self.connection.host,
            self.connection.port
        );
        match self.connector.open().await {
            Ok(session) => {
                *self.shared.lock().await = Some(session);
                self.set_state(ConnectionState::Connected);
                self.dispatcher.connected();
            }
            Err(err) => {
                self.set_state(ConnectionState::Disconnected);
                self.dispatcher.error(ActionKind::Connect, err);
            }
        }
    }

    async fn do_disconnect(&mut self) {
        if !self.gate(ActionKind::Disconnect) {
            return;
        }
        self.teardown_shared().await;
        self.sequential.shutdown().await;
        self.set_state(ConnectionState::Disconnected);
        self.dispatcher.disconnected();
        log::info!("disconnected from {}", self.connection.host);
    }

    async fn do_keepalive(&mut self) {
        if !self.is_connected() {
            return;
        }
        let mut guard = self.shared.lock().await;
        let Some(session) = guard.as_mut() else {
            return;
        };
        if let Err(err) = session.noop().await {
            log::warn!("keep-alive failed: {}", err);
            drop(guard);
            self.on_connection_loss().await;
        }
    }

    // ─── Single-shot operations ──────────────────────────────────

    async fn do_list(&mut self, path: &str, options: ListOptions) {
        if !self.gate(ActionKind::List) {
            return;
        }
        let result = {
            let mut guard = self.shared.lock().await;
            match guard.as_mut() {
                Some(session) => session.list(path).await,
                None => Err(SkiffError::not_connected("no active session")),
            }
        };
        match result {
            Ok(entries) => {
                let entries = postprocess_listing(entries, &options);
                self.dispatcher.listing(entries);
            }
            Err(err) => {
                let lost = err.is_retryable();
                self.dispatcher.error(ActionKind::List, err);
                if lost {
                    self.on_connection_loss().await;
                }
            }
        }
    }

    async fn do_delete(&mut self, path: &str) {
        if !self.gate(ActionKind::Delete) {
            return;
        }
        let result = {
            let mut guard = self.shared.lock().await;
            match guard.as_mut() {
                Some(session) => session.delete(path).await,
                None => Err(SkiffError::not_connected("no active session")),
            }
        };
        self.report_one_shot(ActionKind::Delete, path, result).await;
    }

    async fn do_mkdir(&mut self, path: &str) {
        if !self.gate(ActionKind::Mkdir) {
            return;
        }
        let result = {
            let mut guard = self.shared.lock().await;
            match guard.as_mut() {
                Some(session) => session.mkdir(path).await,
                None => Err(SkiffError::not_connected("no active session")),
            }
        };
        self.report_one_shot(ActionKind::Mkdir, path, result).await;
    }

    async fn do_rename(&mut self, from: &str, to: &str) {
        if !self.gate(ActionKind::Rename) {
            return;
        }
        let result = {
            let mut guard = self.shared.lock().await;
            match guard.as_mut() {
                Some(session) => session.rename(from, to).await,
                None => Err(SkiffError::not_connected("no active session")),
            }
        };
        self.report_one_shot(ActionKind::Rename, from, result).await;
    }

    async fn report_one_shot(
        &mut self,
        action: ActionKind,
        path: &str,
        result: crate::xfer::error::SkiffResult<()>,
    ) {
        match result {
            Ok(()) => self.dispatcher.success(action, path),
            Err(err) => {
                let lost = err.is_retryable();
                self.dispatcher.error(action, err);
                if lost {
                    self.on_connection_loss().await;
                }
            }
        }
    }

    // ─── Single-file transfer ────────────────────────────────────

    /// Runs on the shared session; a retryable failure mid-transfer
    /// replaces it with a fresh one, so the controller session ends up
    /// reconnected rather than stale.
    async fn do_transfer(&mut self, direction: TransferDirection, local: &str, remote: &str) {
        let action = match direction {
            TransferDirection::Upload => ActionKind::Upload,
            TransferDirection::Download => ActionKind::Download,
        };
        if !self.gate(action) {
            return;
        }

        let policy = RetryPolicy::new(
            self.transfer.max_retries,
            Duration::from_secs(self.transfer.retry_backoff_sec),
        );
        let task = Arc::new(TransferTask::new(
            self.transfer.clone(),
            self.progress.clone(),
        ));
        let item = TransferItem::new(local, remote);
        let key = item.remote_path.clone();

        let result = run_item_with_retry(
            self.connector.clone(),
            self.shared.clone(),
            task,
            direction,
            item,
            policy,
        )
        .await;
        self.progress.remove(&key);

        match result {
            Ok(bytes) => self
                .dispatcher
                .success(action, format!("{} ({} bytes)", key, bytes)),
            Err(err) => self.dispatcher.error(action, err),
        }

        // Retry exhaustion can leave the slot empty.
        if self.shared.lock().await.is_none() {
            self.set_state(ConnectionState::Disconnected);
            self.dispatcher.disconnected();
        }
    }
}

/// Apply `ListOptions` filtering and sorting to a raw listing.
fn postprocess_listing(mut entries: Vec<FileEntry>, options: &ListOptions) -> Vec<FileEntry> {
    if let Some(ref filter) = options.filter {
        if let Ok(pattern) = glob::Pattern::new(filter) {
            entries.retain(|e| pattern.matches(&e.name));
        }
    }
    if !options.show_hidden {
        entries.retain(|e| !e.name.starts_with('.'));
    }
    if let Some(ref sort_by) = options.sort_by {
        match sort_by {
            SortField::Name => {
                entries.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
            }
            SortField::Size => entries.sort_by(|a, b| a.size.cmp(&b.size)),
            SortField::Kind => entries.sort_by(|a, b| format!("{:?}", a.kind).cmp(&format!("{:?}", b.kind))),
        }
    }
    if options.sort_order == Some(SortOrder::Desc) {
        entries.reverse();
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, kind: EntryKind, size: u64) -> FileEntry {
        FileEntry {
            name: name.into(),
            kind,
            size,
        }
    }

    #[test]
    fn listing_filter_and_hidden() {
        let entries = vec![
            entry(".hidden", EntryKind::File, 1),
            entry("a.txt", EntryKind::File, 2),
            entry("b.bin", EntryKind::File, 3),
        ];
        let opts = ListOptions {
            filter: Some("*.txt".into()),
            show_hidden: false,
            ..Default::default()
        };
        let out = postprocess_listing(entries, &opts);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].name, "a.txt");
    }

    #[test]
    fn listing_sort_desc_by_size() {
        let entries = vec![
            entry("small", EntryKind::File, 1),
            entry("big", EntryKind::File, 100),
            entry("mid", EntryKind::File, 50),
        ];
        let opts = ListOptions {
            sort_by: Some(SortField::Size),
            sort_order: Some(SortOrder::Desc),
            show_hidden: true,
            ..Default::default()
        };
        let out = postprocess_listing(entries, &opts);
        let names: Vec<&str> = out.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["big", "mid", "small"]);
    }
}

//! Test doubles: an in-memory remote filesystem behind the protocol
//! capability traits, with scriptable connection failures, plus a
//! recording observer.

#![allow(dead_code)]

use async_trait::async_trait;
use skiff::xfer::error::{ErrorKind, SkiffError, SkiffResult};
use skiff::{
    ActionKind, ByteSink, ByteStream, EntryKind, FileEntry, ProtocolSession, SessionConnector,
    TransferObserver, TransferProgress,
};
use std::collections::{HashMap, HashSet};
use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

// ─── Remote state ────────────────────────────────────────────────────

#[derive(Default)]
pub struct RemoteState {
    pub files: StdMutex<HashMap<String, Vec<u8>>>,
    pub dirs: StdMutex<HashSet<String>>,
    /// Sessions opened so far.
    pub opened: AtomicUsize,
    /// Next `open()` calls fail with AuthFailed.
    pub auth_fail: AtomicBool,
    /// Size probes fail (size becomes "unknown").
    pub size_unknown: AtomicBool,
    /// `complete_pending` reports the transfer incomplete.
    pub ack_fail: AtomicBool,
    /// Delay applied to each `open()` (milliseconds).
    pub open_delay_ms: AtomicU64,
    /// One-shot read cut: path → absolute offset at which the stream
    /// dies with a timeout after serving bytes up to it.
    pub read_cuts: StdMutex<HashMap<String, u64>>,
    /// One-shot write cut, same semantics for upload sinks.
    pub write_cuts: StdMutex<HashMap<String, u64>>,
    /// Every open_read/open_write call: (op, path, offset).
    pub stream_calls: StdMutex<Vec<(String, String, u64)>>,
}

impl RemoteState {
    pub fn put_file(&self, path: &str, data: &[u8]) {
        self.files.lock().unwrap().insert(path.into(), data.to_vec());
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(path).cloned()
    }

    pub fn set_read_cut(&self, path: &str, at: u64) {
        self.read_cuts.lock().unwrap().insert(path.into(), at);
    }

    pub fn set_write_cut(&self, path: &str, at: u64) {
        self.write_cuts.lock().unwrap().insert(path.into(), at);
    }

    pub fn stream_calls_for(&self, path: &str) -> Vec<(String, u64)> {
        self.stream_calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, p, _)| p == path)
            .map(|(op, _, off)| (op.clone(), *off))
            .collect()
    }

    pub fn sessions_opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

// ─── Connector / session ─────────────────────────────────────────────

pub struct MockConnector {
    pub state: Arc<RemoteState>,
}

impl MockConnector {
    pub fn pair() -> (Arc<MockConnector>, Arc<RemoteState>) {
        let state = Arc::new(RemoteState::default());
        (
            Arc::new(MockConnector {
                state: state.clone(),
            }),
            state,
        )
    }
}

#[async_trait]
impl SessionConnector for MockConnector {
    async fn open(&self) -> SkiffResult<Box<dyn ProtocolSession>> {
        let delay = self.state.open_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.state.auth_fail.load(Ordering::SeqCst) {
            return Err(SkiffError::auth_failed("login rejected"));
        }
        self.state.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(MockSession {
            state: self.state.clone(),
        }))
    }
}

pub struct MockSession {
    state: Arc<RemoteState>,
}

#[async_trait]
impl ProtocolSession for MockSession {
    async fn list(&mut self, path: &str) -> SkiffResult<Vec<FileEntry>> {
        let prefix = if path == "/" {
            "/".to_string()
        } else {
            format!("{}/", path.trim_end_matches('/'))
        };
        let files = self.state.files.lock().unwrap();
        let mut entries = Vec::new();
        let mut seen_dirs = HashSet::new();
        for (key, data) in files.iter() {
            let Some(rest) = key.strip_prefix(&prefix) else {
                continue;
            };
            match rest.split_once('/') {
                Some((dir, _)) => {
                    if seen_dirs.insert(dir.to_string()) {
                        entries.push(FileEntry {
                            name: dir.to_string(),
                            kind: EntryKind::Dir,
                            size: 0,
                        });
                    }
                }
                None => entries.push(FileEntry {
                    name: rest.to_string(),
                    kind: EntryKind::File,
                    size: data.len() as u64,
                }),
            }
        }
        drop(files);
        let known_dir = self.state.dirs.lock().unwrap().contains(path);
        if entries.is_empty() && !known_dir && path != "/" {
            return Err(SkiffError::path_not_found(format!("{} does not exist", path)));
        }
        Ok(entries)
    }

    async fn size(&mut self, path: &str) -> SkiffResult<u64> {
        if self.state.size_unknown.load(Ordering::SeqCst) {
            return Err(SkiffError::unknown("SIZE unsupported"));
        }
        self.state
            .files
            .lock()
            .unwrap()
            .get(path)
            .map(|d| d.len() as u64)
            .ok_or_else(|| SkiffError::path_not_found(format!("{} does not exist", path)))
    }

    async fn open_read(&mut self, path: &str, offset: u64) -> SkiffResult<ByteStream> {
        self.state
            .stream_calls
            .lock()
            .unwrap()
            .push(("read".into(), path.into(), offset));
        let data = self
            .state
            .files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| SkiffError::path_not_found(format!("{} does not exist", path)))?;
        let cut = self.state.read_cuts.lock().unwrap().remove(path);
        let (end, fail_at_end) = match cut {
            Some(at) => ((at as usize).min(data.len()), true),
            None => (data.len(), false),
        };
        let start = (offset as usize).min(end);
        Ok(Box::new(ScriptedReader {
            data: data[start..end].to_vec(),
            pos: 0,
            fail_at_end,
        }))
    }

    async fn open_write(&mut self, path: &str, offset: u64) -> SkiffResult<ByteSink> {
        self.state
            .stream_calls
            .lock()
            .unwrap()
            .push(("write".into(), path.into(), offset));
        {
            let mut files = self.state.files.lock().unwrap();
            let entry = files.entry(path.to_string()).or_default();
            entry.truncate(offset as usize);
        }
        let allowed = self
            .state
            .write_cuts
            .lock()
            .unwrap()
            .remove(path)
            .map(|at| at.saturating_sub(offset) as usize);
        Ok(Box::new(ScriptedSink {
            state: self.state.clone(),
            path: path.to_string(),
            allowed,
        }))
    }

    async fn complete_pending(&mut self) -> SkiffResult<bool> {
        Ok(!self.state.ack_fail.load(Ordering::SeqCst))
    }

    async fn delete(&mut self, path: &str) -> SkiffResult<()> {
        self.state
            .files
            .lock()
            .unwrap()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| SkiffError::path_not_found(format!("{} does not exist", path)))
    }

    async fn rename(&mut self, from: &str, to: &str) -> SkiffResult<()> {
        let mut files = self.state.files.lock().unwrap();
        match files.remove(from) {
            Some(data) => {
                files.insert(to.to_string(), data);
                Ok(())
            }
            None => Err(SkiffError::path_not_found(format!("{} does not exist", from))),
        }
    }

    async fn mkdir(&mut self, path: &str) -> SkiffResult<()> {
        self.state.dirs.lock().unwrap().insert(path.to_string());
        Ok(())
    }

    async fn noop(&mut self) -> SkiffResult<()> {
        Ok(())
    }

    async fn disconnect(&mut self) -> SkiffResult<()> {
        Ok(())
    }
}

// ─── Scriptable streams ──────────────────────────────────────────────

struct ScriptedReader {
    data: Vec<u8>,
    pos: usize,
    fail_at_end: bool,
}

impl AsyncRead for ScriptedReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if this.pos >= this.data.len() {
            if this.fail_at_end {
                this.fail_at_end = false;
                return Poll::Ready(Err(io::Error::new(
                    io::ErrorKind::TimedOut,
                    "connection lost",
                )));
            }
            return Poll::Ready(Ok(()));
        }
        let n = buf.remaining().min(this.data.len() - this.pos);
        buf.put_slice(&this.data[this.pos..this.pos + n]);
        this.pos += n;
        Poll::Ready(Ok(()))
    }
}

struct ScriptedSink {
    state: Arc<RemoteState>,
    path: String,
    /// Remaining bytes accepted before the connection "dies".
    allowed: Option<usize>,
}

impl AsyncWrite for ScriptedSink {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        if this.allowed == Some(0) {
            return Poll::Ready(Err(io::Error::new(
                io::ErrorKind::TimedOut,
                "connection lost",
            )));
        }
        let n = match this.allowed {
            Some(limit) => buf.len().min(limit),
            None => buf.len(),
        };
        this.state
            .files
            .lock()
            .unwrap()
            .entry(this.path.clone())
            .or_default()
            .extend_from_slice(&buf[..n]);
        if let Some(ref mut limit) = this.allowed {
            *limit -= n;
        }
        Poll::Ready(Ok(n))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

// ─── Recording observer ──────────────────────────────────────────────

#[derive(Clone, Debug)]
pub enum Ev {
    Connected,
    Disconnected,
    Listing(Vec<FileEntry>),
    Success(ActionKind, String),
    Progress(Vec<TransferProgress>),
    Error(ActionKind, ErrorKind),
}

#[derive(Default)]
pub struct RecordingObserver {
    events: StdMutex<Vec<Ev>>,
}

impl TransferObserver for RecordingObserver {
    fn on_connected(&self) {
        self.events.lock().unwrap().push(Ev::Connected);
    }

    fn on_disconnected(&self) {
        self.events.lock().unwrap().push(Ev::Disconnected);
    }

    fn on_listing(&self, entries: &[FileEntry]) {
        self.events
            .lock()
            .unwrap()
            .push(Ev::Listing(entries.to_vec()));
    }

    fn on_success(&self, action: ActionKind, message: &str) {
        self.events
            .lock()
            .unwrap()
            .push(Ev::Success(action, message.to_string()));
    }

    fn on_progress(&self, snapshot: &[TransferProgress]) {
        self.events
            .lock()
            .unwrap()
            .push(Ev::Progress(snapshot.to_vec()));
    }

    fn on_error(&self, action: ActionKind, error: &SkiffError) {
        self.events
            .lock()
            .unwrap()
            .push(Ev::Error(action, error.kind));
    }
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<Ev> {
        self.events.lock().unwrap().clone()
    }

    pub fn successes_for(&self, action: ActionKind) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Ev::Success(a, msg) if a == action => Some(msg),
                _ => None,
            })
            .collect()
    }

    pub fn errors_for(&self, action: ActionKind) -> Vec<ErrorKind> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Ev::Error(a, kind) if a == action => Some(kind),
                _ => None,
            })
            .collect()
    }

    pub fn progress_events(&self) -> Vec<Vec<TransferProgress>> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                Ev::Progress(snap) => Some(snap),
                _ => None,
            })
            .collect()
    }

    /// Poll until `pred` holds over the recorded events, or panic after
    /// five seconds with the event log.
    pub async fn wait_until<F>(&self, what: &str, pred: F)
    where
        F: Fn(&[Ev]) -> bool,
    {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            if pred(&self.events()) {
                return;
            }
            if tokio::time::Instant::now() >= deadline {
                panic!("timed out waiting for {}: {:?}", what, self.events());
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

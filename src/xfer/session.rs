//! Protocol-client capability traits.
//!
//! The wire protocol (command codec, passive/binary mode setup, TLS) is
//! entirely the collaborator's concern. The engine consumes a connected,
//! authenticated session through `ProtocolSession` and opens fresh ones
//! through `SessionConnector` — one session per logical task or worker,
//! never shared across concurrent operations.

use crate::xfer::error::SkiffResult;
use crate::xfer::types::FileEntry;
use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

/// Owned streaming read handle (e.g. a data-channel socket).
pub type ByteStream = Box<dyn AsyncRead + Send + Unpin>;

/// Owned streaming write handle.
pub type ByteSink = Box<dyn AsyncWrite + Send + Unpin>;

/// One authenticated connection to the remote server.
///
/// Stream handles are owned values separate from the control connection,
/// but at most one stream operation may be in flight per session: after
/// `open_read`/`open_write` the caller must drain or shut down the stream
/// and then call `complete_pending` before issuing further commands.
#[async_trait]
pub trait ProtocolSession: Send {
    /// List the entries under a remote path.
    async fn list(&mut self, path: &str) -> SkiffResult<Vec<FileEntry>>;

    /// Size of a remote file. An `Err` means "unknown", not fatal.
    async fn size(&mut self, path: &str) -> SkiffResult<u64>;

    /// Open a streaming read of a remote file, starting at `offset`.
    async fn open_read(&mut self, path: &str, offset: u64) -> SkiffResult<ByteStream>;

    /// Open a streaming write to a remote file, starting at `offset`.
    async fn open_write(&mut self, path: &str, offset: u64) -> SkiffResult<ByteSink>;

    /// Acknowledge the completion of the pending stream operation.
    /// Returns `false` when the server reports the transfer incomplete.
    async fn complete_pending(&mut self) -> SkiffResult<bool>;

    /// Delete a remote file.
    async fn delete(&mut self, path: &str) -> SkiffResult<()>;

    /// Rename a remote file or directory.
    async fn rename(&mut self, from: &str, to: &str) -> SkiffResult<()>;

    /// Create a remote directory.
    async fn mkdir(&mut self, path: &str) -> SkiffResult<()>;

    /// Keep-alive ping.
    async fn noop(&mut self) -> SkiffResult<()>;

    /// Gracefully close the session.
    async fn disconnect(&mut self) -> SkiffResult<()>;
}

/// Factory for fresh sessions. `open` performs connect + login + mode
/// configuration and returns a ready session, or `AuthFailed`/`Timeout`.
///
/// Retry loops call this once per attempt — a session that saw a
/// connection-level failure is never reused.
#[async_trait]
pub trait SessionConnector: Send + Sync {
    async fn open(&self) -> SkiffResult<Box<dyn ProtocolSession>>;
}

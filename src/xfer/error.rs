//! Engine-specific error type.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Categorised transfer-engine error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkiffError {
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorKind {
    /// Login rejected by the server.
    AuthFailed,
    /// Operation attempted without an active session.
    NotConnected,
    /// Local file missing/empty, or remote entry absent.
    PathNotFound,
    /// Network-level transient failure.
    Timeout,
    /// Server refused or acknowledged incorrectly (failed completion
    /// acknowledgment, remote partial larger than the local source, ...).
    Protocol,
    /// Local disk failure.
    Io,
    /// Catch-all.
    Unknown,
}

pub type SkiffResult<T> = Result<T, SkiffError>;

// ── Construction helpers ─────────────────────────────────────────────

impl SkiffError {
    pub fn new(kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            message: msg.into(),
        }
    }

    pub fn auth_failed(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::AuthFailed, msg)
    }

    pub fn not_connected(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotConnected, msg)
    }

    pub fn path_not_found(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::PathNotFound, msg)
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, msg)
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Protocol, msg)
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Io, msg)
    }

    pub fn unknown(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown, msg)
    }

    /// Whether a retry with a fresh session can plausibly succeed.
    ///
    /// Structural failures (bad credentials, missing paths, protocol
    /// desync) are terminal; only network-level transients are retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind, ErrorKind::Timeout | ErrorKind::Io)
    }
}

impl fmt::Display for SkiffError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.kind, self.message)
    }
}

impl std::error::Error for SkiffError {}

impl From<std::io::Error> for SkiffError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::TimedOut => Self::timeout(format!("I/O timeout: {}", e)),
            std::io::ErrorKind::NotFound => Self::path_not_found(e.to_string()),
            _ => Self::io(e.to_string()),
        }
    }
}

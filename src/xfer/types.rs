//! Shared types for the transfer engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─── Connection ──────────────────────────────────────────────────────

/// Configuration for a single connection to the remote server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Connection timeout in seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_sec: u64,
    /// Data-stream timeout in seconds.
    #[serde(default = "default_data_timeout")]
    pub data_timeout_sec: u64,
    /// Keep-alive ping interval in seconds (0 = disabled).
    #[serde(default = "default_keepalive")]
    pub keepalive_interval_sec: u64,
}

fn default_connect_timeout() -> u64 {
    15
}
fn default_data_timeout() -> u64 {
    30
}
fn default_keepalive() -> u64 {
    60
}
fn default_true() -> bool {
    true
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 21,
            username: "anonymous".into(),
            password: "anonymous@".into(),
            connect_timeout_sec: default_connect_timeout(),
            data_timeout_sec: default_data_timeout(),
            keepalive_interval_sec: default_keepalive(),
        }
    }
}

/// Connectivity state of the controller's shared session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

// ─── Directory listing ───────────────────────────────────────────────

/// Type of a remote filesystem entry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum EntryKind {
    File,
    Dir,
    Link,
}

/// One entry from a remote directory listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub name: String,
    pub kind: EntryKind,
    pub size: u64,
}

/// Sorting field for directory listings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    Name,
    Size,
    Kind,
}

/// Sort order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Options for listing a directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListOptions {
    /// Filter by glob pattern (e.g. "*.txt").
    pub filter: Option<String>,
    pub sort_by: Option<SortField>,
    pub sort_order: Option<SortOrder>,
    /// Show hidden ("dot") files.
    #[serde(default = "default_true")]
    pub show_hidden: bool,
}

impl Default for ListOptions {
    fn default() -> Self {
        Self {
            filter: None,
            sort_by: None,
            sort_order: None,
            show_hidden: default_true(),
        }
    }
}

// ─── Transfers ───────────────────────────────────────────────────────

/// Direction of a file transfer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum TransferDirection {
    Upload,
    Download,
}

/// One file in a batch, supplied by the caller. Read-only to the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferItem {
    pub local_path: String,
    pub remote_path: String,
}

impl TransferItem {
    pub fn new(local_path: impl Into<String>, remote_path: impl Into<String>) -> Self {
        Self {
            local_path: local_path.into(),
            remote_path: remote_path.into(),
        }
    }
}

/// Live progress snapshot for one in-flight transfer.
///
/// `key` is the full remote path, so same-named files in different
/// folders never collide. Keying by bare file name is a caller pitfall
/// the engine deliberately avoids.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferProgress {
    pub key: String,
    /// Display name (final path component).
    pub name: String,
    pub direction: TransferDirection,
    /// Cumulative bytes, including any resumed prefix.
    pub bytes_transferred: u64,
    /// Total file size, or −1 when the remote size is unknown.
    pub total_bytes: i64,
    pub started_at: DateTime<Utc>,
}

impl TransferProgress {
    pub fn new(key: &str, direction: TransferDirection, total_bytes: i64) -> Self {
        let name = key.rsplit('/').next().unwrap_or(key).to_string();
        Self {
            key: key.to_string(),
            name,
            direction,
            bytes_transferred: 0,
            total_bytes,
            started_at: Utc::now(),
        }
    }
}

/// Tuning for transfer tasks and batch scheduling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferConfig {
    /// Chunk size for progress-tracked reads/writes (bytes).
    #[serde(default = "default_chunk")]
    pub chunk_size: usize,
    /// Retries per file on transient failure.
    #[serde(default = "default_retries")]
    pub max_retries: u32,
    /// Retry back-off base in seconds (linear: base × attempt).
    #[serde(default = "default_backoff")]
    pub retry_backoff_sec: u64,
    /// Suffix appended to in-progress download targets.
    #[serde(default = "default_part_suffix")]
    pub part_suffix: String,
    /// Release an upload batch's dedup signature even when every item
    /// failed. Default keeps the signature until full completion.
    #[serde(default)]
    pub release_signature_on_failure: bool,
}

fn default_chunk() -> usize {
    65_536
}
fn default_retries() -> u32 {
    3
}
fn default_backoff() -> u64 {
    2
}
fn default_part_suffix() -> String {
    ".part".into()
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk(),
            max_retries: default_retries(),
            retry_backoff_sec: default_backoff(),
            part_suffix: default_part_suffix(),
            release_signature_on_failure: false,
        }
    }
}

// ─── Observer actions ────────────────────────────────────────────────

/// Which facade operation an observer callback refers to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum ActionKind {
    Connect,
    Disconnect,
    List,
    Delete,
    Rename,
    Mkdir,
    Upload,
    Download,
    BatchUpload,
    BatchDownload,
}

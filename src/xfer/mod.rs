//! Transfer-orchestration engine.
//!
//! Architecture:
//! - `types` — all data structures, enums, config
//! - `error` — categorized error type + retryable classification
//! - `session` — protocol-client capability traits
//! - `observer` — observer trait + single-context event delivery
//! - `progress` — concurrent progress map with consistent snapshots
//! - `retry` — retry-with-backoff combinator
//! - `task` — resumable single-file upload/download
//! - `batch` — parallel batch scheduler (worker pool + dedup)
//! - `sequential` — single-session sequential batch scheduler
//! - `controller` — public facade (state machine, command loop)

pub mod batch;
pub mod controller;
pub mod error;
pub mod observer;
pub mod progress;
pub mod retry;
pub mod sequential;
pub mod session;
pub mod task;
pub mod types;

pub use error::{ErrorKind, SkiffError, SkiffResult};
pub use types::*;

//! # skiff — resumable transfer orchestration
//!
//! Orchestrates multi-file, resumable, progress-reported transfers over a
//! stateful remote file-transfer protocol. The wire protocol itself is a
//! capability supplied by the caller ([`ProtocolSession`] /
//! [`SessionConnector`]); this crate owns everything above it: per-file
//! resumable upload/download, retry with backoff, parallel and sequential
//! batch scheduling, duplicate-batch suppression, and concurrent progress
//! aggregation with consistent observer snapshots.

pub mod xfer;

pub use xfer::controller::{Controller, ControllerHandle};
pub use xfer::error::{ErrorKind, SkiffError, SkiffResult};
pub use xfer::observer::TransferObserver;
pub use xfer::session::{ByteSink, ByteStream, ProtocolSession, SessionConnector};
pub use xfer::types::*;

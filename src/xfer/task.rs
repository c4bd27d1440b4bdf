//! Resumable single-file transfer state machines.
//!
//! Downloads land in a `<dest><part_suffix>` partial file that survives
//! process restarts; completion atomically renames it into place, so the
//! destination is only ever absent, partial, or final. Uploads resume
//! from the remote file's current size. Both directions publish a
//! progress update after every chunk.

use crate::xfer::error::{SkiffError, SkiffResult};
use crate::xfer::progress::ProgressAggregator;
use crate::xfer::session::ProtocolSession;
use crate::xfer::types::{TransferConfig, TransferDirection, TransferProgress};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

pub struct TransferTask {
    config: TransferConfig,
    progress: Arc<ProgressAggregator>,
}

impl TransferTask {
    pub fn new(config: TransferConfig, progress: Arc<ProgressAggregator>) -> Self {
        Self { config, progress }
    }

    /// The partial-file path for a download destination.
    pub fn part_path(&self, dest: &str) -> PathBuf {
        PathBuf::from(format!("{}{}", dest, self.config.part_suffix))
    }

    // ─── Download ────────────────────────────────────────────────

    /// Download `remote_path` into `dest_path`, resuming any partial
    /// file already on disk. Returns cumulative bytes at the destination.
    pub async fn run_download(
        &self,
        session: &mut dyn ProtocolSession,
        remote_path: &str,
        dest_path: &str,
    ) -> SkiffResult<u64> {
        // Best-effort size probe; failure means "unknown", not fatal.
        let total: i64 = match session.size(remote_path).await {
            Ok(n) => n as i64,
            Err(_) => -1,
        };

        let part = self.part_path(dest_path);
        let resume = match fs::metadata(&part).await {
            Ok(meta) => meta.len(),
            Err(_) => 0,
        };

        // Already fully present as a partial file.
        if total >= 0 && resume >= total as u64 {
            if resume == 0 {
                // Zero-byte remote file with no partial yet.
                fs::File::create(&part).await?;
            }
            finalize(&part, Path::new(dest_path)).await?;
            log::debug!("download {}: already complete at {} bytes", remote_path, resume);
            return Ok(resume);
        }

        let mut record = TransferProgress::new(remote_path, TransferDirection::Download, total);
        record.bytes_transferred = resume;
        self.progress.publish(record.clone());

        let mut stream = session.open_read(remote_path, resume).await?;

        let mut file = if resume > 0 {
            fs::OpenOptions::new().append(true).open(&part).await?
        } else {
            if let Some(parent) = Path::new(dest_path).parent() {
                fs::create_dir_all(parent).await?;
            }
            fs::File::create(&part).await?
        };

        let mut transferred = resume;
        let mut buf = vec![0u8; self.config.chunk_size];
        let outcome = loop {
            match stream.read(&mut buf).await {
                Ok(0) => break Ok(()),
                Ok(n) => {
                    file.write_all(&buf[..n]).await?;
                    transferred += n as u64;
                    record.bytes_transferred = transferred;
                    self.progress.publish(record.clone());
                }
                // The partial must be durable before the error surfaces,
                // or a retry would probe a stale resume offset.
                Err(err) => break Err(SkiffError::from(err)),
            }
        };

        file.flush().await?;
        file.sync_all().await?;
        drop(file);
        drop(stream);
        outcome?;

        if !session.complete_pending().await? {
            return Err(SkiffError::protocol(format!(
                "server did not acknowledge completion of {}",
                remote_path
            )));
        }

        finalize(&part, Path::new(dest_path)).await?;
        log::info!("downloaded {} ({} bytes)", remote_path, transferred);
        Ok(transferred)
    }

    // ─── Upload ──────────────────────────────────────────────────

    /// Upload `local_path` to `remote_path`, resuming from the remote
    /// file's current size. Returns cumulative bytes at the remote.
    pub async fn run_upload(
        &self,
        session: &mut dyn ProtocolSession,
        local_path: &str,
        remote_path: &str,
    ) -> SkiffResult<u64> {
        let meta = fs::metadata(local_path)
            .await
            .map_err(|_| SkiffError::path_not_found(format!("local file {} missing", local_path)))?;
        let local_len = meta.len();
        if local_len == 0 {
            return Err(SkiffError::path_not_found(format!(
                "local file {} is empty",
                local_path
            )));
        }

        // Remote size is the resume point; probe failure means absent.
        let resume = session.size(remote_path).await.unwrap_or(0);
        if resume > local_len {
            return Err(SkiffError::protocol(format!(
                "remote {} has {} bytes but local source has only {}",
                remote_path, resume, local_len
            )));
        }

        let mut record = TransferProgress::new(remote_path, TransferDirection::Upload, local_len as i64);
        record.bytes_transferred = resume;
        self.progress.publish(record.clone());

        if resume == local_len {
            log::debug!("upload {}: already complete at {} bytes", remote_path, resume);
            return Ok(resume);
        }

        let mut file = fs::File::open(local_path).await?;
        if resume > 0 {
            file.seek(std::io::SeekFrom::Start(resume)).await?;
        }

        let mut sink = session.open_write(remote_path, resume).await?;

        let mut transferred = resume;
        let mut buf = vec![0u8; self.config.chunk_size];
        loop {
            let n = file.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            sink.write_all(&buf[..n]).await?;
            transferred += n as u64;
            record.bytes_transferred = transferred;
            self.progress.publish(record.clone());
        }

        sink.flush().await?;
        sink.shutdown().await?;
        drop(sink);

        if !session.complete_pending().await? {
            return Err(SkiffError::protocol(format!(
                "server did not acknowledge completion of {}",
                remote_path
            )));
        }

        log::info!("uploaded {} ({} bytes)", remote_path, transferred);
        Ok(transferred)
    }
}

/// Rename the partial file into place; fall back to copy + delete when
/// the rename crosses filesystems.
async fn finalize(part: &Path, dest: &Path) -> SkiffResult<()> {
    if fs::rename(part, dest).await.is_ok() {
        return Ok(());
    }
    fs::copy(part, dest).await?;
    fs::remove_file(part).await?;
    Ok(())
}

//! Built-in log sinks: stderr (via tracing) and daily-rotated disk files.
//!
//! The MCP notification sink lives in the server crate, next to the peer
//! it writes to.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use tracing::warn;

use super::{LogEnvelope, LogLevel, LogSink, SinkName};

/// File-name prefix of the rotated application logs.
const LOG_FILE_PREFIX: &str = "mdbmcp.log";

/// Sink that forwards envelopes to the process tracing subscriber, which
/// the binary points at stderr.
pub struct StderrSink;

impl LogSink for StderrSink {
    fn name(&self) -> SinkName {
        SinkName::Stderr
    }

    fn write(&self, envelope: &LogEnvelope, message: &str) {
        let id = envelope.id.0;
        let context = envelope.context;
        match envelope.level {
            LogLevel::Debug => tracing::debug!(id, context, "{message}"),
            LogLevel::Info | LogLevel::Notice => tracing::info!(id, context, "{message}"),
            LogLevel::Warning => tracing::warn!(id, context, "{message}"),
            LogLevel::Error => tracing::error!(id, context, "{message}"),
        }
    }
}

/// Daily-rotated JSON-lines sink under the application log directory.
pub struct DiskSink {
    writer: tracing_appender::non_blocking::NonBlocking,
    // Held so the background writer thread flushes on drop.
    _guard: tracing_appender::non_blocking::WorkerGuard,
}

impl DiskSink {
    pub fn new(log_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(log_dir)
            .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;
        let appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        Ok(Self {
            writer,
            _guard: guard,
        })
    }
}

impl LogSink for DiskSink {
    fn name(&self) -> SinkName {
        SinkName::Disk
    }

    fn write(&self, envelope: &LogEnvelope, message: &str) {
        let line = serde_json::json!({
            "t": chrono::Utc::now().to_rfc3339(),
            "id": envelope.id.0,
            "ctx": envelope.context,
            "level": envelope.level.as_str(),
            "msg": message,
        });
        let mut writer = self.writer.clone();
        if let Err(e) = writeln!(writer, "{line}") {
            warn!("[DiskSink] Failed to write log line: {e}");
        }
    }
}

/// Remove rotated log files past the retention window, then trim oldest
/// files until the directory is within the size cap.
///
/// Returns the number of files removed.
pub async fn cleanup_disk_logs(
    log_dir: &Path,
    retention_days: u32,
    max_total_bytes: u64,
) -> Result<usize> {
    if !log_dir.exists() {
        return Ok(0);
    }

    let cutoff = SystemTime::now() - Duration::from_secs(u64::from(retention_days) * 86_400);
    let mut files: Vec<(PathBuf, SystemTime, u64)> = Vec::new();

    let mut entries = tokio::fs::read_dir(log_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_log = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(LOG_FILE_PREFIX));
        if !is_log {
            continue;
        }
        let meta = match tokio::fs::metadata(&path).await {
            Ok(m) => m,
            Err(_) => continue,
        };
        let modified = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
        files.push((path, modified, meta.len()));
    }

    let mut removed = 0usize;

    // Retention pass.
    files.retain(|(path, modified, _)| {
        if *modified < cutoff {
            if let Err(e) = std::fs::remove_file(path) {
                warn!("[LogCleanup] Failed to remove {}: {e}", path.display());
                true
            } else {
                removed += 1;
                false
            }
        } else {
            true
        }
    });

    // Size-cap pass, oldest first.
    let mut total: u64 = files.iter().map(|(_, _, len)| len).sum();
    files.sort_by_key(|(_, modified, _)| *modified);
    for (path, _, len) in files {
        if total <= max_total_bytes {
            break;
        }
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                removed += 1;
                total = total.saturating_sub(len);
            }
            Err(e) => warn!("[LogCleanup] Failed to remove {}: {e}", path.display()),
        }
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn cleanup_respects_size_cap() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..4 {
            let path = dir.path().join(format!("{LOG_FILE_PREFIX}.2025-01-0{}", i + 1));
            std::fs::write(&path, vec![b'x'; 1024]).unwrap();
        }

        // 4 KiB on disk, 2 KiB cap: two oldest files go.
        let removed = cleanup_disk_logs(dir.path(), 365, 2048).await.unwrap();
        assert_eq!(removed, 2);

        let left = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(left, 2);
    }

    #[tokio::test]
    async fn cleanup_ignores_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"keep me").unwrap();

        let removed = cleanup_disk_logs(dir.path(), 0, 0).await.unwrap();
        assert_eq!(removed, 0);
        assert!(dir.path().join("notes.txt").exists());
    }

    #[tokio::test]
    async fn missing_directory_is_a_noop() {
        let removed = cleanup_disk_logs(Path::new("/nonexistent/mdbmcp-logs"), 30, 1024)
            .await
            .unwrap();
        assert_eq!(removed, 0);
    }
}

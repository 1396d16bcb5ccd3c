//! Cursor→file streaming with a bounded write queue.
//!
//! The producer half drains the cursor and serializes documents; the
//! consumer half owns the file handle. The channel between them is
//! bounded so a slow disk cannot pull the whole result set into memory.

use std::path::PathBuf;

use bson::Document;
use futures::TryStreamExt;
use mongodb::Cursor;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::mpsc;
use tracing::debug;

use crate::ejson::{document_to_value, JsonExportFormat};

/// Serialized chunks in flight between cursor and file.
const WRITE_QUEUE_CAPACITY: usize = 16;

/// Streams a cursor into a JSON array file, one extended-JSON document
/// per element.
pub struct JsonArrayWriter {
    path: PathBuf,
    format: JsonExportFormat,
}

impl JsonArrayWriter {
    pub fn new(path: PathBuf, format: JsonExportFormat) -> Self {
        Self { path, format }
    }

    /// Drain `cursor` to the file. Returns bytes written on success, an
    /// error description otherwise. The file is closed (and flushed)
    /// before returning.
    pub async fn stream(&self, mut cursor: Cursor<Document>) -> Result<u64, String> {
        let file = File::create(&self.path)
            .await
            .map_err(|e| format!("Failed to create export file: {e}"))?;

        let (tx, mut rx) = mpsc::channel::<String>(WRITE_QUEUE_CAPACITY);
        let format = self.format;

        let producer = async move {
            let mut count = 0u64;
            loop {
                match cursor.try_next().await {
                    Ok(Some(doc)) => {
                        let value = document_to_value(&doc, format);
                        let chunk = serde_json::to_string_pretty(&value)
                            .map_err(|e| format!("Failed to serialize document: {e}"))?;
                        if tx.send(chunk).await.is_err() {
                            // Consumer hit an I/O error; it reports it.
                            return Ok(count);
                        }
                        count += 1;
                    }
                    Ok(None) => return Ok::<u64, String>(count),
                    Err(e) => return Err(format!("Cursor error: {e}")),
                }
            }
        };

        let consumer = async move {
            let mut writer = BufWriter::new(file);
            let mut bytes: u64 = 0;
            let mut first = true;

            writer.write_all(b"[").await.map_err(io_error)?;
            bytes += 1;

            while let Some(chunk) = rx.recv().await {
                let separator: &[u8] = if first { b"\n" } else { b",\n" };
                first = false;
                writer.write_all(separator).await.map_err(io_error)?;
                writer.write_all(chunk.as_bytes()).await.map_err(io_error)?;
                bytes += (separator.len() + chunk.len()) as u64;
            }

            let tail: &[u8] = if first { b"]\n" } else { b"\n]\n" };
            writer.write_all(tail).await.map_err(io_error)?;
            bytes += tail.len() as u64;
            writer.flush().await.map_err(io_error)?;
            Ok::<u64, String>(bytes)
        };

        let (produced, written) = tokio::join!(producer, consumer);
        let count = produced?;
        let bytes = written?;
        debug!(documents = count, bytes, path = %self.path.display(), "[Exports] Stream complete");
        Ok(bytes)
    }
}

fn io_error(e: std::io::Error) -> String {
    format!("Failed to write export file: {e}")
}

#[cfg(test)]
mod tests {
    use super::*;

    // Streaming against a live cursor is covered by integration tests;
    // here we pin the file shape for the empty-cursor edge through the
    // consumer logic alone.

    #[tokio::test]
    async fn empty_export_is_a_valid_empty_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.json");

        // Drive the consumer with an immediately-closed channel.
        let file = File::create(&path).await.unwrap();
        let (tx, mut rx) = mpsc::channel::<String>(1);
        drop(tx);

        let mut writer = BufWriter::new(file);
        writer.write_all(b"[").await.unwrap();
        while let Some(_chunk) = rx.recv().await {
            unreachable!("channel is closed");
        }
        writer.write_all(b"]\n").await.unwrap();
        writer.flush().await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(parsed, serde_json::json!([]));
    }
}

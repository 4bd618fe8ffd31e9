//! Storage Writer: buffers enriched records and serializes each batch to a
//! timestamped JSON array file. A single background task owns the output
//! directory and drains an mpsc queue, so callers never block on disk I/O.
//!
//! One task owns the channel's receiving end; every producer just sends
//! and moves on, so batching and file naming stay in one place.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

const FLUSH_BUDGET: Duration = Duration::from_secs(10);

/// A single page record as written to a batch file. Field order matches the
/// documented output schema.
#[derive(Debug, Clone, Serialize)]
pub struct EnrichedRecord {
    pub url: String,
    pub domain: String,
    pub timestamp: DateTime<Utc>,
    pub depth: u32,
    pub http_status_code: Option<u16>,
    pub content_length: usize,
    pub content_hash: String,
    pub last_crawl_time: Option<DateTime<Utc>>,
    pub previous_change_time: Option<DateTime<Utc>>,
    pub expected_next_crawl: DateTime<Utc>,
    pub backoff_multiplier: u32,
    pub crawl_count: u64,
    pub change_frequency: f64,
    pub content: String,
}

/// Replaces invalid UTF-8 sequences in bytes pulled from a non-`String`
/// source (e.g. a body read with `response.bytes()` instead of `.text()`)
/// before they are wrapped into a record field.
pub fn sanitize_bytes(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

#[derive(Debug, Error)]
pub enum WriterError {
    #[error("storage writer channel closed")]
    ChannelClosed,
    #[error("io error writing batch file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to serialize batch: {0}")]
    Serialize(#[from] serde_json::Error),
}

enum Command {
    Batch {
        records: Vec<EnrichedRecord>,
        shutdown: bool,
    },
    Flush(oneshot::Sender<()>),
}

/// Handle held by fetcher/parser workers to enqueue finished records.
#[derive(Clone)]
pub struct StorageWriter {
    sender: mpsc::Sender<Command>,
}

impl StorageWriter {
    /// Spawns the background writer task and returns a handle to it.
    pub fn spawn(base_dir: impl Into<PathBuf>) -> Self {
        let base_dir = base_dir.into();
        let (sender, receiver) = mpsc::channel(256);
        tokio::spawn(run_writer(base_dir, receiver));
        Self { sender }
    }

    /// Enqueues a batch for writing. Returns once the batch has been handed
    /// to the writer task, not once it has hit disk.
    pub async fn save_batch(&self, records: Vec<EnrichedRecord>) -> Result<(), WriterError> {
        self.sender
            .send(Command::Batch {
                records,
                shutdown: false,
            })
            .await
            .map_err(|_| WriterError::ChannelClosed)
    }

    /// Like `save_batch`, but the resulting file uses the `shutdown_batch_`
    /// prefix, signaling it was flushed during shutdown rather than in the
    /// normal course of crawling.
    pub async fn save_shutdown_batch(&self, records: Vec<EnrichedRecord>) -> Result<(), WriterError> {
        self.sender
            .send(Command::Batch {
                records,
                shutdown: true,
            })
            .await
            .map_err(|_| WriterError::ChannelClosed)
    }

    /// Waits for every batch enqueued so far to be written, up to a 10
    /// second budget. Logs and returns on timeout rather than blocking
    /// shutdown indefinitely.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.sender.send(Command::Flush(tx)).await.is_err() {
            return;
        }
        if tokio::time::timeout(FLUSH_BUDGET, rx).await.is_err() {
            tracing::warn!("storage writer flush exceeded {:?} budget", FLUSH_BUDGET);
        }
    }
}

async fn run_writer(base_dir: PathBuf, mut receiver: mpsc::Receiver<Command>) {
    if let Err(e) = tokio::fs::create_dir_all(&base_dir).await {
        tracing::error!("storage writer could not create {:?}: {}", base_dir, e);
        return;
    }
    let next_id = AtomicU64::new(0);

    while let Some(command) = receiver.recv().await {
        match command {
            Command::Batch { records, shutdown } => {
                let id = next_id.fetch_add(1, Ordering::Relaxed);
                if let Err(e) = write_batch_file(&base_dir, &records, id, shutdown) {
                    tracing::error!("failed to write batch {}: {}", id, e);
                }
            }
            Command::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

fn write_batch_file(
    dir: &Path,
    records: &[EnrichedRecord],
    id: u64,
    shutdown: bool,
) -> Result<(), WriterError> {
    let timestamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
    let filename = if shutdown {
        format!("shutdown_batch_{}_{}.json", timestamp, id)
    } else {
        format!("batch_{}_{}.json", timestamp, id)
    };
    let body = serde_json::to_vec(records)?;
    std::fs::write(dir.join(filename), body)?;
    Ok(())
}

/// A convenience wrapper for call sites that hold an `Arc<StorageWriter>`.
pub type SharedStorageWriter = Arc<StorageWriter>;

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_record(url: &str) -> EnrichedRecord {
        EnrichedRecord {
            url: url.to_string(),
            domain: "example.com".to_string(),
            timestamp: Utc::now(),
            depth: 0,
            http_status_code: Some(200),
            content_length: 42,
            content_hash: "deadbeef".to_string(),
            last_crawl_time: None,
            previous_change_time: None,
            expected_next_crawl: Utc::now(),
            backoff_multiplier: 1,
            crawl_count: 1,
            change_frequency: 0.0,
            content: "hello".to_string(),
        }
    }

    #[tokio::test]
    async fn save_batch_then_flush_writes_a_file() {
        let dir = tempdir().unwrap();
        let writer = StorageWriter::spawn(dir.path());
        writer.save_batch(vec![sample_record("https://example.com/")]).await.unwrap();
        writer.flush().await;

        let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(files.len(), 1);
        let name = files[0].as_ref().unwrap().file_name();
        assert!(name.to_str().unwrap().starts_with("batch_"));
    }

    #[tokio::test]
    async fn shutdown_batch_uses_the_shutdown_prefix() {
        let dir = tempdir().unwrap();
        let writer = StorageWriter::spawn(dir.path());
        writer
            .save_shutdown_batch(vec![sample_record("https://example.com/")])
            .await
            .unwrap();
        writer.flush().await;

        let files: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        let name = files[0].as_ref().unwrap().file_name();
        assert!(name.to_str().unwrap().starts_with("shutdown_batch_"));
    }

    #[tokio::test]
    async fn written_batch_round_trips_through_serde_json() {
        let dir = tempdir().unwrap();
        let writer = StorageWriter::spawn(dir.path());
        writer.save_batch(vec![sample_record("https://example.com/a")]).await.unwrap();
        writer.flush().await;

        let path = std::fs::read_dir(dir.path()).unwrap().next().unwrap().unwrap().path();
        let body = std::fs::read_to_string(path).unwrap();
        let parsed: Vec<serde_json::Value> = serde_json::from_str(&body).unwrap();
        assert_eq!(parsed[0]["url"], "https://example.com/a");
    }

    #[test]
    fn sanitize_bytes_replaces_invalid_utf8() {
        let raw = [0x68, 0x69, 0xff, 0xfe];
        let cleaned = sanitize_bytes(&raw);
        assert!(cleaned.starts_with("hi"));
    }
}

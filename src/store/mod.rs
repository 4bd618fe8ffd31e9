//! Durable state backing the engine: a single SQLite connection shared by
//! the Metadata Store, Robots Cache, Rate Limiter, and Conditional-GET
//! Cache, plus the run-record table consulted by `--stats` and restart
//! logic.

mod schema;
mod sqlite;

pub use sqlite::{ConditionalGetRow, DurableStore, MetadataRow, RateLimitRow, RobotsRow};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Status of a crawl run, mirrored in the durable `runs` table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Interrupted,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Interrupted => "interrupted",
            RunStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s {
            "completed" => RunStatus::Completed,
            "interrupted" => RunStatus::Interrupted,
            "failed" => RunStatus::Failed,
            _ => RunStatus::Running,
        }
    }
}

/// A single crawl run, persisted so `--stats` can find the most recent one.
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::sqlite::MetadataRow as Row;
    use chrono::Utc;

    #[test]
    fn open_in_memory_initializes_schema() {
        let store = DurableStore::open_in_memory().unwrap();
        assert!(store.metadata_load_all().unwrap().is_empty());
    }

    #[test]
    fn metadata_roundtrip() {
        let store = DurableStore::open_in_memory().unwrap();
        let row = Row {
            url: "https://example.com/".to_string(),
            last_fetch_time: Some(Utc::now()),
            previous_change_time: None,
            expected_next_fetch: Utc::now(),
            content_hash: Some("abc123".to_string()),
            backoff_multiplier: 2,
            fetch_count: 5,
            change_frequency: 0.1,
            temp_failure_count: 0,
        };
        store.metadata_upsert(&row).unwrap();
        let loaded = store.metadata_load_all().unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].url, row.url);
        assert_eq!(loaded[0].content_hash, row.content_hash);
        assert_eq!(loaded[0].backoff_multiplier, 2);
    }

    #[test]
    fn run_lifecycle() {
        let store = DurableStore::open_in_memory().unwrap();
        let run_id = store.create_run("deadbeef").unwrap();
        store.complete_run(run_id, RunStatus::Completed).unwrap();
        let latest = store.latest_run().unwrap().unwrap();
        assert_eq!(latest.id, run_id);
        assert_eq!(latest.status, RunStatus::Completed);
    }

    #[test]
    fn robots_roundtrip() {
        let store = DurableStore::open_in_memory().unwrap();
        let row = RobotsRow {
            host: "example.com".to_string(),
            body: "User-agent: *\nDisallow: /private".to_string(),
            fetched_at: Utc::now(),
            http_status: 200,
            crawl_delay: Some(1.5),
        };
        store.robots_upsert(&row).unwrap();
        let loaded = store.robots_load("example.com").unwrap().unwrap();
        assert_eq!(loaded.crawl_delay, Some(1.5));
        store.robots_invalidate("example.com").unwrap();
        assert!(store.robots_load("example.com").unwrap().is_none());
    }
}

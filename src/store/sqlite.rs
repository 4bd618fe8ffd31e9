//! Durable backing store: a single tuned SQLite connection shared by the
//! Metadata Store, Robots Cache, Rate Limiter, and Conditional-GET Cache.
//!
//! Each component owns its in-memory sharded state and treats this as a
//! write-behind log plus a startup load; nothing here is on a per-request
//! hot path except the batched writer threads.

use crate::store::schema::initialize_schema;
use crate::store::{RunRecord, RunStatus, StoreError, StoreResult};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;

/// Row as persisted for a single URL's scheduling metadata.
#[derive(Debug, Clone)]
pub struct MetadataRow {
    pub url: String,
    pub last_fetch_time: Option<DateTime<Utc>>,
    pub previous_change_time: Option<DateTime<Utc>>,
    pub expected_next_fetch: DateTime<Utc>,
    pub content_hash: Option<String>,
    pub backoff_multiplier: u32,
    pub fetch_count: u64,
    pub change_frequency: f64,
    pub temp_failure_count: u32,
}

/// Row as persisted for a host's robots.txt policy.
#[derive(Debug, Clone)]
pub struct RobotsRow {
    pub host: String,
    pub body: String,
    pub fetched_at: DateTime<Utc>,
    pub http_status: u16,
    pub crawl_delay: Option<f64>,
}

/// Row as persisted for one rate-limit shard.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitRow {
    pub shard_key: u32,
    pub timestamp_nanos: i64,
    pub failure_count: u32,
}

/// Row as persisted for a URL's conditional-GET validators.
#[derive(Debug, Clone)]
pub struct ConditionalGetRow {
    pub url: String,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub response_time: DateTime<Utc>,
}

pub struct DurableStore {
    conn: Mutex<Connection>,
}

impl DurableStore {
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
            PRAGMA temp_store = MEMORY;
            PRAGMA mmap_size = 268435456;
            ",
        )?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    // ===== URL metadata =====

    pub fn metadata_load_all(&self) -> StoreResult<Vec<MetadataRow>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT url, last_fetch_time, previous_change_time, expected_next_fetch,
                    content_hash, backoff_multiplier, fetch_count, change_frequency,
                    temp_failure_count
             FROM url_metadata",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(MetadataRow {
                    url: row.get(0)?,
                    last_fetch_time: row.get::<_, Option<String>>(1)?.and_then(parse_ts),
                    previous_change_time: row.get::<_, Option<String>>(2)?.and_then(parse_ts),
                    expected_next_fetch: parse_ts(row.get::<_, String>(3)?)
                        .unwrap_or_else(Utc::now),
                    content_hash: row.get(4)?,
                    backoff_multiplier: row.get(5)?,
                    fetch_count: row.get(6)?,
                    change_frequency: row.get(7)?,
                    temp_failure_count: row.get(8)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn metadata_upsert(&self, row: &MetadataRow) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO url_metadata
                (url, last_fetch_time, previous_change_time, expected_next_fetch,
                 content_hash, backoff_multiplier, fetch_count, change_frequency,
                 temp_failure_count)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(url) DO UPDATE SET
                last_fetch_time = excluded.last_fetch_time,
                previous_change_time = excluded.previous_change_time,
                expected_next_fetch = excluded.expected_next_fetch,
                content_hash = excluded.content_hash,
                backoff_multiplier = excluded.backoff_multiplier,
                fetch_count = excluded.fetch_count,
                change_frequency = excluded.change_frequency,
                temp_failure_count = excluded.temp_failure_count",
            params![
                row.url,
                row.last_fetch_time.map(|t| t.to_rfc3339()),
                row.previous_change_time.map(|t| t.to_rfc3339()),
                row.expected_next_fetch.to_rfc3339(),
                row.content_hash,
                row.backoff_multiplier,
                row.fetch_count,
                row.change_frequency,
                row.temp_failure_count,
            ],
        )?;
        Ok(())
    }

    pub fn metadata_upsert_batch(&self, rows: &[MetadataRow]) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        for row in rows {
            conn.execute(
                "INSERT INTO url_metadata
                    (url, last_fetch_time, previous_change_time, expected_next_fetch,
                     content_hash, backoff_multiplier, fetch_count, change_frequency,
                     temp_failure_count)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                 ON CONFLICT(url) DO UPDATE SET
                    last_fetch_time = excluded.last_fetch_time,
                    previous_change_time = excluded.previous_change_time,
                    expected_next_fetch = excluded.expected_next_fetch,
                    content_hash = excluded.content_hash,
                    backoff_multiplier = excluded.backoff_multiplier,
                    fetch_count = excluded.fetch_count,
                    change_frequency = excluded.change_frequency,
                    temp_failure_count = excluded.temp_failure_count",
                params![
                    row.url,
                    row.last_fetch_time.map(|t| t.to_rfc3339()),
                    row.previous_change_time.map(|t| t.to_rfc3339()),
                    row.expected_next_fetch.to_rfc3339(),
                    row.content_hash,
                    row.backoff_multiplier,
                    row.fetch_count,
                    row.change_frequency,
                    row.temp_failure_count,
                ],
            )?;
        }
        Ok(())
    }

    // ===== Robots policy =====

    pub fn robots_load(&self, host: &str) -> StoreResult<Option<RobotsRow>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT host, body, fetched_at, http_status, crawl_delay
                 FROM robots_policy WHERE host = ?1",
                params![host],
                |row| {
                    Ok(RobotsRow {
                        host: row.get(0)?,
                        body: row.get(1)?,
                        fetched_at: parse_ts(row.get::<_, String>(2)?).unwrap_or_else(Utc::now),
                        http_status: row.get(3)?,
                        crawl_delay: row.get(4)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn robots_upsert(&self, row: &RobotsRow) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO robots_policy (host, body, fetched_at, http_status, crawl_delay)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(host) DO UPDATE SET
                body = excluded.body,
                fetched_at = excluded.fetched_at,
                http_status = excluded.http_status,
                crawl_delay = excluded.crawl_delay",
            params![
                row.host,
                row.body,
                row.fetched_at.to_rfc3339(),
                row.http_status,
                row.crawl_delay,
            ],
        )?;
        Ok(())
    }

    pub fn robots_invalidate(&self, host: &str) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM robots_policy WHERE host = ?1", params![host])?;
        Ok(())
    }

    // ===== Rate-limit shards =====

    pub fn ratelimit_load_all(&self) -> StoreResult<Vec<RateLimitRow>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT shard_key, timestamp_nanos, failure_count FROM rate_limit_shard")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(RateLimitRow {
                    shard_key: row.get(0)?,
                    timestamp_nanos: row.get(1)?,
                    failure_count: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn ratelimit_upsert_batch(&self, rows: &[RateLimitRow]) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        for row in rows {
            conn.execute(
                "INSERT INTO rate_limit_shard (shard_key, timestamp_nanos, failure_count)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(shard_key) DO UPDATE SET
                    timestamp_nanos = excluded.timestamp_nanos,
                    failure_count = excluded.failure_count",
                params![row.shard_key, row.timestamp_nanos, row.failure_count],
            )?;
        }
        Ok(())
    }

    // ===== Conditional-GET cache =====

    pub fn condget_load(&self, url: &str) -> StoreResult<Option<ConditionalGetRow>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT url, etag, last_modified, response_time FROM conditional_get
                 WHERE url = ?1",
                params![url],
                |row| {
                    Ok(ConditionalGetRow {
                        url: row.get(0)?,
                        etag: row.get(1)?,
                        last_modified: row.get(2)?,
                        response_time: parse_ts(row.get::<_, String>(3)?).unwrap_or_else(Utc::now),
                    })
                },
            )
            .optional()?;
        Ok(row)
    }

    pub fn condget_load_all(&self) -> StoreResult<Vec<ConditionalGetRow>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt =
            conn.prepare("SELECT url, etag, last_modified, response_time FROM conditional_get")?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ConditionalGetRow {
                    url: row.get(0)?,
                    etag: row.get(1)?,
                    last_modified: row.get(2)?,
                    response_time: parse_ts(row.get::<_, String>(3)?).unwrap_or_else(Utc::now),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn condget_upsert(&self, row: &ConditionalGetRow) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO conditional_get (url, etag, last_modified, response_time)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(url) DO UPDATE SET
                etag = excluded.etag,
                last_modified = excluded.last_modified,
                response_time = excluded.response_time",
            params![row.url, row.etag, row.last_modified, row.response_time.to_rfc3339()],
        )?;
        Ok(())
    }

    // ===== Blacklist =====

    pub fn blacklist_load_permanent(&self) -> StoreResult<Vec<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT host FROM blacklist_permanent")?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn blacklist_add_permanent(&self, host: &str) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT OR IGNORE INTO blacklist_permanent (host) VALUES (?1)",
            params![host],
        )?;
        Ok(())
    }

    // ===== Runs =====

    pub fn create_run(&self, config_hash: &str) -> StoreResult<i64> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO runs (started_at, config_hash, status) VALUES (?1, ?2, ?3)",
            params![Utc::now().to_rfc3339(), config_hash, RunStatus::Running.as_str()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn complete_run(&self, run_id: i64, status: RunStatus) -> StoreResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE runs SET finished_at = ?1, status = ?2 WHERE id = ?3",
            params![Utc::now().to_rfc3339(), status.as_str(), run_id],
        )?;
        Ok(())
    }

    pub fn latest_run(&self) -> StoreResult<Option<RunRecord>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT id, started_at, finished_at, config_hash, status
                 FROM runs ORDER BY id DESC LIMIT 1",
                [],
                |row| {
                    Ok(RunRecord {
                        id: row.get(0)?,
                        started_at: row.get(1)?,
                        finished_at: row.get(2)?,
                        config_hash: row.get(3)?,
                        status: RunStatus::from_str(&row.get::<_, String>(4)?),
                    })
                },
            )
            .optional()?;
        Ok(row)
    }
}

fn parse_ts(s: impl AsRef<str>) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s.as_ref())
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

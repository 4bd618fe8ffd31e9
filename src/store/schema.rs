//! SQL schema definitions for the durable state database.
//!
//! One `rusqlite` connection backs every durable concern the engine needs:
//! URL metadata, robots.txt policy, rate-limit shards, conditional-GET
//! entries, and run records. Tables are keyed so each component can load its
//! own slice at startup without scanning the others.

use rusqlite::{Connection, Result as SqliteResult};

pub fn initialize_schema(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS url_metadata (
            url TEXT PRIMARY KEY,
            last_fetch_time TEXT,
            previous_change_time TEXT,
            expected_next_fetch TEXT NOT NULL,
            content_hash TEXT,
            backoff_multiplier INTEGER NOT NULL DEFAULT 1,
            fetch_count INTEGER NOT NULL DEFAULT 0,
            change_frequency REAL NOT NULL DEFAULT 0.0,
            temp_failure_count INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS robots_policy (
            host TEXT PRIMARY KEY,
            body TEXT NOT NULL,
            fetched_at TEXT NOT NULL,
            http_status INTEGER NOT NULL,
            crawl_delay REAL
        );

        CREATE TABLE IF NOT EXISTS rate_limit_shard (
            shard_key INTEGER PRIMARY KEY,
            timestamp_nanos INTEGER NOT NULL,
            failure_count INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS conditional_get (
            url TEXT PRIMARY KEY,
            etag TEXT,
            last_modified TEXT,
            response_time TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS blacklist_permanent (
            host TEXT PRIMARY KEY
        );

        CREATE TABLE IF NOT EXISTS runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            started_at TEXT NOT NULL,
            finished_at TEXT,
            config_hash TEXT NOT NULL,
            status TEXT NOT NULL
        );
        ",
    )
}

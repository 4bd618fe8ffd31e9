//! Metadata Store: durable per-URL scheduling state, sharded in memory.
//!
//! Each URL's last-fetch time, content hash, and backoff multiplier lives in
//! one of 256 shards (`hash(url) mod 256`), guarded by its own mutex so that
//! updates to unrelated URLs never contend. The Frontier consults this store
//! to seed a newly-enqueued URL's scheduled-fetch time and priority; the
//! Parser Pool calls `update_after_crawl` after every fetch to advance it.

mod scheduling;

pub use scheduling::{next_schedule, priority_for};

use crate::store::{DurableStore, MetadataRow};
use chrono::{DateTime, Utc};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

const SHARD_COUNT: usize = 256;

/// Persistent per-URL record described in the data model: last-fetch time,
/// previous-change time, expected-next-fetch time, content hash, backoff
/// multiplier, fetch count, change-frequency estimate, and temporary-failure
/// count.
#[derive(Debug, Clone)]
pub struct UrlMetadata {
    pub last_fetch_time: Option<DateTime<Utc>>,
    pub previous_change_time: Option<DateTime<Utc>>,
    pub expected_next_fetch: DateTime<Utc>,
    pub content_hash: Option<String>,
    pub backoff_multiplier: u32,
    pub fetch_count: u64,
    pub change_frequency: f64,
    pub temp_failure_count: u32,
}

impl UrlMetadata {
    /// A URL seen for the first time: due immediately, multiplier at its
    /// floor.
    fn discovered(now: DateTime<Utc>) -> Self {
        Self {
            last_fetch_time: None,
            previous_change_time: None,
            expected_next_fetch: now,
            content_hash: None,
            backoff_multiplier: 1,
            fetch_count: 0,
            change_frequency: 0.0,
            temp_failure_count: 0,
        }
    }

    fn from_row(row: MetadataRow) -> (String, Self) {
        (
            row.url,
            Self {
                last_fetch_time: row.last_fetch_time,
                previous_change_time: row.previous_change_time,
                expected_next_fetch: row.expected_next_fetch,
                content_hash: row.content_hash,
                backoff_multiplier: row.backoff_multiplier,
                fetch_count: row.fetch_count,
                change_frequency: row.change_frequency,
                temp_failure_count: row.temp_failure_count,
            },
        )
    }

    fn to_row(&self, url: &str) -> MetadataRow {
        MetadataRow {
            url: url.to_string(),
            last_fetch_time: self.last_fetch_time,
            previous_change_time: self.previous_change_time,
            expected_next_fetch: self.expected_next_fetch,
            content_hash: self.content_hash.clone(),
            backoff_multiplier: self.backoff_multiplier,
            fetch_count: self.fetch_count,
            change_frequency: self.change_frequency,
            temp_failure_count: self.temp_failure_count,
        }
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.expected_next_fetch <= now
    }
}

fn shard_index(url: &str) -> usize {
    let mut hasher = DefaultHasher::new();
    url.hash(&mut hasher);
    (hasher.finish() as usize) % SHARD_COUNT
}

/// Sharded, durable store of per-URL metadata.
pub struct MetadataStore {
    shards: Vec<Mutex<HashMap<String, UrlMetadata>>>,
    durable: Option<Arc<DurableStore>>,
}

impl MetadataStore {
    pub fn new(durable: Option<Arc<DurableStore>>) -> Self {
        let mut shards = Vec::with_capacity(SHARD_COUNT);
        for _ in 0..SHARD_COUNT {
            shards.push(Mutex::new(HashMap::new()));
        }
        let store = Self { shards, durable };
        store.load_from_durable();
        store
    }

    fn load_from_durable(&self) {
        let Some(durable) = &self.durable else {
            return;
        };
        let rows = match durable.metadata_load_all() {
            Ok(rows) => rows,
            Err(_) => return,
        };
        for row in rows {
            let (url, metadata) = UrlMetadata::from_row(row);
            let idx = shard_index(&url);
            self.shards[idx].lock().unwrap().insert(url, metadata);
        }
    }

    /// Returns the metadata for `url`, creating a due-immediately entry if
    /// this is the first time the URL has been seen.
    pub fn get_or_create(&self, url: &str, now: DateTime<Utc>) -> UrlMetadata {
        let idx = shard_index(url);
        let mut shard = self.shards[idx].lock().unwrap();
        shard
            .entry(url.to_string())
            .or_insert_with(|| UrlMetadata::discovered(now))
            .clone()
    }

    pub fn get(&self, url: &str) -> Option<UrlMetadata> {
        let idx = shard_index(url);
        self.shards[idx].lock().unwrap().get(url).cloned()
    }

    /// Applies the scheduling policy (§4.9) after a successful fetch and
    /// persists the result.
    pub fn update_after_crawl(&self, url: &str, new_hash: &str, now: DateTime<Utc>) -> UrlMetadata {
        let idx = shard_index(url);
        let updated = {
            let mut shard = self.shards[idx].lock().unwrap();
            let entry = shard
                .entry(url.to_string())
                .or_insert_with(|| UrlMetadata::discovered(now));
            scheduling::apply_after_crawl(entry, new_hash, now);
            entry.clone()
        };
        self.persist(url, &updated);
        updated
    }

    /// Records a fetch failure without a body: backoff still advances (the
    /// scheduling policy treats a null-content fetch as content-unchanged),
    /// but the failure counter is bumped so the fetcher can decide whether
    /// to blacklist the host.
    pub fn record_failure(&self, url: &str, now: DateTime<Utc>) -> UrlMetadata {
        let idx = shard_index(url);
        let updated = {
            let mut shard = self.shards[idx].lock().unwrap();
            let entry = shard
                .entry(url.to_string())
                .or_insert_with(|| UrlMetadata::discovered(now));
            entry.temp_failure_count += 1;
            let hash = entry.content_hash.clone().unwrap_or_default();
            scheduling::apply_after_crawl(entry, &hash, now);
            entry.clone()
        };
        self.persist(url, &updated);
        updated
    }

    fn persist(&self, url: &str, metadata: &UrlMetadata) {
        if let Some(durable) = &self.durable {
            let _ = durable.metadata_upsert(&metadata.to_row(url));
        }
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().unwrap().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

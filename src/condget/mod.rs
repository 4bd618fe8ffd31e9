//! Conditional-GET Cache: per-URL ETag/Last-Modified validators so the
//! fetcher can send `If-None-Match`/`If-Modified-Since` and let origins
//! answer `304 Not Modified` instead of re-sending unchanged bodies.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;

use crate::store::{ConditionalGetRow, DurableStore};

#[derive(Debug, Clone, Default)]
pub struct ConditionalGetEntry {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub response_time: DateTime<Utc>,
}

pub struct ConditionalGetCache {
    entries: DashMap<String, ConditionalGetEntry>,
    durable: Option<Arc<DurableStore>>,
}

impl ConditionalGetCache {
    pub fn new(durable: Option<Arc<DurableStore>>) -> Self {
        let entries = DashMap::new();
        if let Some(durable) = &durable {
            if let Ok(rows) = durable.condget_load_all() {
                for row in rows {
                    entries.insert(
                        row.url.clone(),
                        ConditionalGetEntry {
                            etag: row.etag,
                            last_modified: row.last_modified,
                            response_time: row.response_time,
                        },
                    );
                }
            }
        }
        Self { entries, durable }
    }

    pub fn get(&self, url: &str) -> Option<ConditionalGetEntry> {
        self.entries.get(url).map(|e| e.clone())
    }

    /// Records the validators returned by a `2xx` response so the next fetch
    /// of `url` can be conditional.
    pub fn record(&self, url: &str, etag: Option<String>, last_modified: Option<String>) {
        if etag.is_none() && last_modified.is_none() {
            return;
        }
        let entry = ConditionalGetEntry {
            etag,
            last_modified,
            response_time: Utc::now(),
        };
        self.entries.insert(url.to_string(), entry.clone());
        if let Some(durable) = &self.durable {
            let _ = durable.condget_upsert(&ConditionalGetRow {
                url: url.to_string(),
                etag: entry.etag,
                last_modified: entry.last_modified,
                response_time: entry.response_time,
            });
        }
    }
}

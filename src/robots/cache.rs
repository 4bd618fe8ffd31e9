//! Robots.txt caching implementation
//!
//! This module provides the per-host cached robots.txt record and the
//! concurrent cache that fronts it: a `DashMap` keyed by host, with a
//! placeholder entry inserted on first miss so that concurrent lookups for
//! the same host during an in-flight fetch all see `DeferredFetchStarted`
//! instead of each triggering their own fetch.

use crate::robots::ParsedRobots;
use crate::store::{DurableStore, RobotsRow};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use std::sync::Arc;

/// How long a cached robots.txt is trusted before it must be refetched.
const CACHE_TTL: Duration = Duration::days(30);

/// Outcome of a robots.txt permission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RobotsOutcome {
    Allowed,
    Disallowed,
    /// No fresh policy is cached. The caller must fetch robots.txt for the
    /// host and call `RobotsCache::update_cache`, then re-check.
    DeferredFetchStarted,
}

/// Cached robots.txt data for a host.
#[derive(Debug, Clone)]
pub struct CachedRobots {
    /// The parsed robots.txt content
    pub content: ParsedRobots,

    /// When the robots.txt was fetched
    pub fetched_at: DateTime<Utc>,

    /// HTTP status of the fetch that produced this entry. `403`/`404` are
    /// treated as "allow all" but still expire on the normal TTL.
    pub http_status: u16,
}

impl CachedRobots {
    pub fn new(content: ParsedRobots, http_status: u16) -> Self {
        Self {
            content,
            fetched_at: Utc::now(),
            http_status,
        }
    }

    pub fn is_stale(&self) -> bool {
        Utc::now() - self.fetched_at > CACHE_TTL
    }

    pub fn age(&self) -> Duration {
        Utc::now() - self.fetched_at
    }

    pub fn is_allowed(&self, url: &str, user_agent: &str) -> bool {
        if matches!(self.http_status, 403 | 404) {
            return true;
        }
        self.content.is_allowed(url, user_agent)
    }

    pub fn crawl_delay(&self, user_agent: &str) -> Option<f64> {
        self.content.crawl_delay(user_agent)
    }
}

enum Entry {
    Placeholder,
    Ready(CachedRobots),
}

/// Concurrent robots.txt cache shared by the whole fetcher pool.
pub struct RobotsCache {
    entries: DashMap<String, Entry>,
    durable: Option<Arc<DurableStore>>,
}

impl RobotsCache {
    pub fn new(durable: Option<Arc<DurableStore>>) -> Self {
        Self {
            entries: DashMap::new(),
            durable,
        }
    }

    /// Checks permission for `(host, path)`. Never blocks on network I/O;
    /// when the cache is cold or stale it installs a placeholder and returns
    /// `DeferredFetchStarted` so exactly one caller performs the fetch.
    pub fn is_allowed(&self, host: &str, path: &str, user_agent: &str) -> RobotsOutcome {
        if let Some(entry) = self.entries.get(host) {
            return match &*entry {
                Entry::Placeholder => RobotsOutcome::DeferredFetchStarted,
                Entry::Ready(cached) if !cached.is_stale() => {
                    if cached.is_allowed(path, user_agent) {
                        RobotsOutcome::Allowed
                    } else {
                        RobotsOutcome::Disallowed
                    }
                }
                Entry::Ready(_) => RobotsOutcome::DeferredFetchStarted,
            };
        }

        if let Some(cached) = self.load_from_disk(host) {
            let outcome = if cached.is_allowed(path, user_agent) {
                RobotsOutcome::Allowed
            } else {
                RobotsOutcome::Disallowed
            };
            self.entries.insert(host.to_string(), Entry::Ready(cached));
            return outcome;
        }

        self.entries
            .entry(host.to_string())
            .or_insert(Entry::Placeholder);
        RobotsOutcome::DeferredFetchStarted
    }

    fn load_from_disk(&self, host: &str) -> Option<CachedRobots> {
        let durable = self.durable.as_ref()?;
        let row = durable.robots_load(host).ok().flatten()?;
        let cached = CachedRobots {
            content: ParsedRobots::from_content(&row.body),
            fetched_at: row.fetched_at,
            http_status: row.http_status,
        };
        if cached.is_stale() {
            None
        } else {
            Some(cached)
        }
    }

    /// Publishes a freshly fetched robots.txt body for `host`, replacing any
    /// placeholder and persisting to disk.
    pub fn update_cache(&self, host: &str, body: &str, http_status: u16) {
        let content = ParsedRobots::from_content(body);
        let crawl_delay = content.crawl_delay("*");
        let cached = CachedRobots::new(content, http_status);
        self.entries.insert(host.to_string(), Entry::Ready(cached.clone()));

        if let Some(durable) = &self.durable {
            let _ = durable.robots_upsert(&RobotsRow {
                host: host.to_string(),
                body: body.to_string(),
                fetched_at: cached.fetched_at,
                http_status,
                crawl_delay,
            });
        }
    }

    pub fn crawl_delay(&self, host: &str, user_agent: &str) -> Option<f64> {
        match self.entries.get(host)?.value() {
            Entry::Ready(cached) => cached.crawl_delay(user_agent),
            Entry::Placeholder => None,
        }
    }

    pub fn invalidate_for_host(&self, host: &str) {
        self.entries.remove(host);
        if let Some(durable) = &self.durable {
            let _ = durable.robots_invalidate(host);
        }
    }
}

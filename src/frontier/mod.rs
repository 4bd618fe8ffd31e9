//! URL Frontier: the sharded priority queue of URLs awaiting fetch.
//!
//! A fixed array of 16 partitions, `hash(url) mod 16`. Each partition holds
//! its own priority queue and seen-set behind its own lock; there is no
//! global lock, so unrelated partitions never contend. Dequeue is a
//! two-pass probe: first look for any partition whose top is already due,
//! then fall back to the partition with the earliest scheduled time.

use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::collections::{BinaryHeap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex};

use crate::metadata::MetadataStore;

const PARTITION_COUNT: usize = 16;

/// A URL record joined with its scheduling state, living only inside the
/// Frontier.
#[derive(Debug, Clone)]
pub struct ScheduledUrl {
    pub url: String,
    pub domain: String,
    pub depth: u32,
    pub priority: f64,
    pub expected_next_fetch: DateTime<Utc>,
    pub discovered_at: DateTime<Utc>,
}

impl PartialEq for ScheduledUrl {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url
    }
}
impl Eq for ScheduledUrl {}

impl Ord for ScheduledUrl {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap: "greater" means popped first. Earlier
        // expected-fetch wins, then higher priority, then lower depth, then
        // URL string for determinism.
        other
            .expected_next_fetch
            .cmp(&self.expected_next_fetch)
            .then_with(|| self.priority.total_cmp(&other.priority))
            .then_with(|| other.depth.cmp(&self.depth))
            .then_with(|| self.url.cmp(&other.url))
    }
}

impl PartialOrd for ScheduledUrl {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

struct Partition {
    heap: BinaryHeap<ScheduledUrl>,
    seen: HashSet<String>,
}

impl Partition {
    fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            seen: HashSet::new(),
        }
    }
}

/// A candidate for enqueueing: everything the Frontier needs except the
/// scheduling fields it fills in from the Metadata Store.
#[derive(Debug, Clone)]
pub struct UrlInfo {
    pub url: String,
    pub domain: String,
    pub depth: u32,
    pub priority: f64,
}

pub struct Frontier {
    partitions: Vec<Mutex<Partition>>,
    metadata: Arc<MetadataStore>,
    max_depth: u32,
    max_queue_size: usize,
    size: AtomicUsize,
    rejected_for_capacity: AtomicUsize,
}

fn partition_index(url: &str) -> usize {
    let mut hasher = DefaultHasher::new();
    url.hash(&mut hasher);
    (hasher.finish() as usize) % PARTITION_COUNT
}

impl Frontier {
    pub fn new(metadata: Arc<MetadataStore>, max_depth: u32, max_queue_size: usize) -> Self {
        let mut partitions = Vec::with_capacity(PARTITION_COUNT);
        for _ in 0..PARTITION_COUNT {
            partitions.push(Mutex::new(Partition::new()));
        }
        Self {
            partitions,
            metadata,
            max_depth,
            max_queue_size,
            size: AtomicUsize::new(0),
            rejected_for_capacity: AtomicUsize::new(0),
        }
    }

    pub fn size(&self) -> usize {
        self.size.load(AtomicOrdering::Relaxed)
    }

    pub fn rejected_for_capacity(&self) -> usize {
        self.rejected_for_capacity.load(AtomicOrdering::Relaxed)
    }

    pub fn is_seen(&self, url: &str) -> bool {
        let idx = partition_index(url);
        self.partitions[idx].lock().unwrap().seen.contains(url)
    }

    /// Rejects if `depth > max_depth`, the URL was already seen in its
    /// partition, or the frontier is at `max_queue_size`. On acceptance,
    /// consults the Metadata Store for the URL's scheduled-fetch time.
    pub fn enqueue(&self, info: UrlInfo) -> bool {
        if info.depth > self.max_depth {
            return false;
        }
        if self.size() >= self.max_queue_size {
            self.rejected_for_capacity.fetch_add(1, AtomicOrdering::Relaxed);
            return false;
        }

        let idx = partition_index(&info.url);
        let mut partition = self.partitions[idx].lock().unwrap();
        if partition.seen.contains(&info.url) {
            return false;
        }

        let now = Utc::now();
        let metadata = self.metadata.get_or_create(&info.url, now);
        let scheduled = ScheduledUrl {
            url: info.url.clone(),
            domain: info.domain,
            depth: info.depth,
            priority: info.priority * crate::metadata::priority_for(&metadata, now),
            expected_next_fetch: metadata.expected_next_fetch,
            discovered_at: now,
        };
        partition.seen.insert(info.url);
        partition.heap.push(scheduled);
        drop(partition);
        self.size.fetch_add(1, AtomicOrdering::Relaxed);
        true
    }

    /// Groups by partition without holding any lock, then acquires each
    /// touched partition's lock once. Returns the URLs rejected for
    /// capacity.
    pub fn enqueue_batch(&self, infos: Vec<UrlInfo>) -> Vec<UrlInfo> {
        let mut by_partition: Vec<Vec<UrlInfo>> = (0..PARTITION_COUNT).map(|_| Vec::new()).collect();
        for info in infos {
            let idx = partition_index(&info.url);
            by_partition[idx].push(info);
        }

        let mut rejected = Vec::new();
        for (idx, group) in by_partition.into_iter().enumerate() {
            if group.is_empty() {
                continue;
            }
            let mut partition = self.partitions[idx].lock().unwrap();
            for info in group {
                if info.depth > self.max_depth {
                    rejected.push(info);
                    continue;
                }
                if self.size() >= self.max_queue_size {
                    self.rejected_for_capacity.fetch_add(1, AtomicOrdering::Relaxed);
                    rejected.push(info);
                    continue;
                }
                if partition.seen.contains(&info.url) {
                    continue;
                }
                let now = Utc::now();
                let metadata = self.metadata.get_or_create(&info.url, now);
                let scheduled = ScheduledUrl {
                    url: info.url.clone(),
                    domain: info.domain.clone(),
                    depth: info.depth,
                    priority: info.priority * crate::metadata::priority_for(&metadata, now),
                    expected_next_fetch: metadata.expected_next_fetch,
                    discovered_at: now,
                };
                partition.seen.insert(info.url);
                partition.heap.push(scheduled);
                self.size.fetch_add(1, AtomicOrdering::Relaxed);
            }
        }
        rejected
    }

    /// Round-robin partition probe. First pass returns the top of any
    /// partition whose top is due; second pass returns the earliest-
    /// scheduled top across all partitions. No URL is returned twice.
    pub fn dequeue(&self) -> Option<ScheduledUrl> {
        let now = Utc::now();

        for partition in &self.partitions {
            let mut partition = partition.lock().unwrap();
            if let Some(top) = partition.heap.peek() {
                if top.expected_next_fetch <= now {
                    let item = partition.heap.pop().unwrap();
                    drop(partition);
                    self.size.fetch_sub(1, AtomicOrdering::Relaxed);
                    return Some(item);
                }
            }
        }

        let mut best_idx: Option<usize> = None;
        let mut best_time: Option<DateTime<Utc>> = None;
        for (idx, partition) in self.partitions.iter().enumerate() {
            let partition = partition.lock().unwrap();
            if let Some(top) = partition.heap.peek() {
                if best_time.is_none() || top.expected_next_fetch < best_time.unwrap() {
                    best_time = Some(top.expected_next_fetch);
                    best_idx = Some(idx);
                }
            }
        }

        let idx = best_idx?;
        let mut partition = self.partitions[idx].lock().unwrap();
        let item = partition.heap.pop();
        drop(partition);
        if item.is_some() {
            self.size.fetch_sub(1, AtomicOrdering::Relaxed);
        }
        item
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frontier() -> Frontier {
        Frontier::new(Arc::new(MetadataStore::new(None)), 5, 1000)
    }

    fn info(url: &str, depth: u32, priority: f64) -> UrlInfo {
        UrlInfo {
            url: url.to_string(),
            domain: "example.com".to_string(),
            depth,
            priority,
        }
    }

    #[test]
    fn enqueue_then_dequeue_returns_the_url() {
        let f = frontier();
        assert!(f.enqueue(info("https://example.com/a", 0, 1.0)));
        assert_eq!(f.size(), 1);
        let item = f.dequeue().unwrap();
        assert_eq!(item.url, "https://example.com/a");
        assert_eq!(f.size(), 0);
    }

    #[test]
    fn depth_exceeding_max_is_rejected() {
        let f = frontier();
        assert!(!f.enqueue(info("https://example.com/deep", 6, 1.0)));
        assert_eq!(f.size(), 0);
    }

    #[test]
    fn duplicate_url_is_rejected() {
        let f = frontier();
        assert!(f.enqueue(info("https://example.com/a", 0, 1.0)));
        assert!(!f.enqueue(info("https://example.com/a", 0, 1.0)));
        assert_eq!(f.size(), 1);
    }

    #[test]
    fn capacity_limit_is_enforced() {
        let f = Frontier::new(Arc::new(MetadataStore::new(None)), 5, 1);
        assert!(f.enqueue(info("https://example.com/a", 0, 1.0)));
        assert!(!f.enqueue(info("https://example.com/b", 0, 1.0)));
        assert_eq!(f.rejected_for_capacity(), 1);
    }

    #[test]
    fn higher_priority_dequeued_first_when_both_due() {
        let f = frontier();
        f.enqueue(info("https://example.com/low", 0, 1.0));
        f.enqueue(info("https://example.com/high", 0, 10.0));
        let first = f.dequeue().unwrap();
        assert_eq!(first.url, "https://example.com/high");
    }

    #[test]
    fn every_enqueued_url_is_dequeued_exactly_once() {
        let f = frontier();
        for i in 0..50 {
            f.enqueue(info(&format!("https://example.com/{}", i), 0, i as f64));
        }
        let mut seen = HashSet::new();
        while let Some(item) = f.dequeue() {
            assert!(seen.insert(item.url));
        }
        assert_eq!(seen.len(), 50);
        assert_eq!(f.dequeue(), None);
    }

    #[test]
    fn overdue_metadata_scales_the_enqueued_priority() {
        let metadata = Arc::new(MetadataStore::new(None));
        let now = Utc::now();
        // First crawl leaves expected_next_fetch an hour in the past relative
        // to `now`, so this URL is already overdue when it's (re)enqueued.
        metadata.update_after_crawl("https://example.com/stale", "h", now - chrono::Duration::hours(25));

        let f = Frontier::new(metadata, 5, 1000);
        f.enqueue(info("https://example.com/stale", 0, 2.0));
        let item = f.dequeue().unwrap();
        // priority_for() > 1.0 once overdue, so the scheduled priority must
        // exceed the static 2.0 that was passed in.
        assert!(item.priority > 2.0);
    }

    #[test]
    fn enqueue_batch_groups_by_partition_and_reports_rejections() {
        let f = Frontier::new(Arc::new(MetadataStore::new(None)), 5, 2);
        let infos = vec![
            info("https://example.com/a", 0, 1.0),
            info("https://example.com/b", 0, 1.0),
            info("https://example.com/c", 0, 1.0),
        ];
        let rejected = f.enqueue_batch(infos);
        assert_eq!(rejected.len(), 1);
        assert_eq!(f.size(), 2);
    }
}

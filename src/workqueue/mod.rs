//! Work-Stealing Queue: per-fetcher bounded deques for low-contention
//! dispatch. The Frontier feeds URLs into a fetcher's local deque; a fetcher
//! prefers its own deque (LIFO, cache-hot) and steals (FIFO) from others
//! when its own is empty.
//!
//! Built on `crossbeam-deque`, which is itself unbounded — the per-worker
//! cap from the design (`max_per_worker`) is enforced here with a plain
//! atomic counter alongside each deque.

use crossbeam_deque::{Steal, Stealer, Worker};
use std::sync::atomic::{AtomicUsize, Ordering};

/// A dispatched unit of work: enough context for a fetcher worker to fetch
/// and parse without going back to the Frontier or Metadata Store first.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkItem {
    pub url: String,
    pub domain: String,
    pub depth: u32,
}

pub struct WorkStealingQueue {
    workers: Vec<Worker<WorkItem>>,
    stealers: Vec<Stealer<WorkItem>>,
    counts: Vec<AtomicUsize>,
    max_per_worker: usize,
}

impl WorkStealingQueue {
    pub fn new(num_workers: usize, max_per_worker: usize) -> Self {
        let workers: Vec<Worker<WorkItem>> = (0..num_workers).map(|_| Worker::new_lifo()).collect();
        let stealers = workers.iter().map(|w| w.stealer()).collect();
        let counts = (0..num_workers).map(|_| AtomicUsize::new(0)).collect();
        Self {
            workers,
            stealers,
            counts,
            max_per_worker,
        }
    }

    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    pub fn max_size(&self) -> usize {
        self.workers.len() * self.max_per_worker
    }

    pub fn total_size(&self) -> usize {
        self.counts.iter().map(|c| c.load(Ordering::Relaxed)).sum()
    }

    /// Rejects when the owner's local deque is already at `max_per_worker`;
    /// the caller should spill to disk on rejection.
    pub fn push_local(&self, worker_id: usize, item: WorkItem) -> bool {
        if self.counts[worker_id].load(Ordering::Relaxed) >= self.max_per_worker {
            return false;
        }
        self.workers[worker_id].push(item);
        self.counts[worker_id].fetch_add(1, Ordering::Relaxed);
        true
    }

    /// LIFO pop from the owner's own deque.
    pub fn pop_local(&self, worker_id: usize) -> Option<WorkItem> {
        let item = self.workers[worker_id].pop();
        if item.is_some() {
            self.counts[worker_id].fetch_sub(1, Ordering::Relaxed);
        }
        item
    }

    /// FIFO steal from a round-robin-chosen other deque.
    pub fn try_steal(&self, worker_id: usize) -> Option<WorkItem> {
        let n = self.stealers.len();
        if n <= 1 {
            return None;
        }
        for offset in 1..n {
            let idx = (worker_id + offset) % n;
            loop {
                match self.stealers[idx].steal() {
                    Steal::Success(url) => {
                        self.counts[idx].fetch_sub(1, Ordering::Relaxed);
                        return Some(url);
                    }
                    Steal::Empty => break,
                    Steal::Retry => continue,
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(url: &str) -> WorkItem {
        WorkItem {
            url: url.to_string(),
            domain: "example.com".to_string(),
            depth: 0,
        }
    }

    #[test]
    fn push_then_pop_local_is_lifo() {
        let q = WorkStealingQueue::new(2, 4);
        q.push_local(0, item("a"));
        q.push_local(0, item("b"));
        assert_eq!(q.pop_local(0), Some(item("b")));
        assert_eq!(q.pop_local(0), Some(item("a")));
        assert_eq!(q.pop_local(0), None);
    }

    #[test]
    fn push_local_rejects_beyond_max_per_worker() {
        let q = WorkStealingQueue::new(1, 2);
        assert!(q.push_local(0, item("a")));
        assert!(q.push_local(0, item("b")));
        assert!(!q.push_local(0, item("c")));
    }

    #[test]
    fn try_steal_pulls_from_another_worker() {
        let q = WorkStealingQueue::new(2, 4);
        q.push_local(1, item("x"));
        let stolen = q.try_steal(0);
        assert_eq!(stolen, Some(item("x")));
        assert_eq!(q.total_size(), 0);
    }

    #[test]
    fn try_steal_returns_none_when_all_others_empty() {
        let q = WorkStealingQueue::new(3, 4);
        assert_eq!(q.try_steal(0), None);
    }

    #[test]
    fn max_size_is_workers_times_per_worker_cap() {
        let q = WorkStealingQueue::new(4, 8);
        assert_eq!(q.max_size(), 32);
    }

    #[test]
    fn total_size_tracks_pushes_and_pops_across_workers() {
        let q = WorkStealingQueue::new(2, 4);
        q.push_local(0, item("a"));
        q.push_local(1, item("b"));
        assert_eq!(q.total_size(), 2);
        q.pop_local(0);
        assert_eq!(q.total_size(), 1);
    }
}

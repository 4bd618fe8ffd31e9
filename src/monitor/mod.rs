//! Monitor: periodic statistics sampling, blacklist cooldown sweeps, and the
//! coordinated shutdown sequence.
//!
//! The stats snapshot can be sampled repeatedly while the engine runs, not
//! just printed once at the end; shutdown uses a `stop` flag plus a
//! join-with-timeout so stuck workers can't hang the process.

use crate::blacklist::HostBlacklist;
use crate::frontier::Frontier;
use crate::metadata::MetadataStore;
use crate::workqueue::WorkStealingQueue;
use crate::writer::StorageWriter;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Shared flag checked by every worker loop; shutdown is just setting this
/// to `true` and letting workers notice on their next poll.
#[derive(Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn signal(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// A point-in-time snapshot of engine-wide counters.
#[derive(Debug, Clone)]
pub struct EngineStats {
    pub frontier_size: usize,
    pub frontier_rejected_for_capacity: usize,
    pub workqueue_size: usize,
    pub metadata_count: usize,
    pub temporary_blacklist_count: usize,
}

/// Periodic sampler and blacklist sweeper. One instance lives for the life
/// of the engine; `run` is spawned as its own task and exits once `stop` is
/// signaled.
pub struct Monitor {
    frontier: Arc<Frontier>,
    workqueue: Arc<WorkStealingQueue>,
    metadata: Arc<MetadataStore>,
    blacklist: Arc<HostBlacklist>,
    stop: StopFlag,
}

impl Monitor {
    pub fn new(
        frontier: Arc<Frontier>,
        workqueue: Arc<WorkStealingQueue>,
        metadata: Arc<MetadataStore>,
        blacklist: Arc<HostBlacklist>,
        stop: StopFlag,
    ) -> Self {
        Self {
            frontier,
            workqueue,
            metadata,
            blacklist,
            stop,
        }
    }

    pub fn sample(&self) -> EngineStats {
        EngineStats {
            frontier_size: self.frontier.size(),
            frontier_rejected_for_capacity: self.frontier.rejected_for_capacity(),
            workqueue_size: self.workqueue.total_size(),
            metadata_count: self.metadata.len(),
            temporary_blacklist_count: self.blacklist.temporary_len(),
        }
    }

    /// Samples and sweeps on `interval` until `stop` is signaled.
    pub async fn run(&self, interval: Duration) {
        while !self.stop.is_set() {
            tokio::time::sleep(interval).await;
            if self.stop.is_set() {
                break;
            }
            self.blacklist.sweep();
            let stats = self.sample();
            tracing::info!(
                frontier = stats.frontier_size,
                rejected = stats.frontier_rejected_for_capacity,
                workqueue = stats.workqueue_size,
                metadata = stats.metadata_count,
                temp_blacklist = stats.temporary_blacklist_count,
                "engine stats"
            );
        }
    }
}

pub fn print_stats(stats: &EngineStats) {
    println!("=== Engine Statistics ===\n");
    println!("Frontier size:              {}", stats.frontier_size);
    println!("Frontier capacity rejects:  {}", stats.frontier_rejected_for_capacity);
    println!("Work-stealing queue size:   {}", stats.workqueue_size);
    println!("Tracked URLs (metadata):    {}", stats.metadata_count);
    println!("Hosts in temp cooldown:     {}", stats.temporary_blacklist_count);
}

/// Runs the engine's shutdown sequence: signal stop, join every worker
/// within `join_budget` (detaching stragglers with a warning rather than
/// blocking forever), then flush storage. `stop` must already be shared
/// with every worker loop being joined.
///
/// There's no separate parser-pool or persistence-thread join here: fetch
/// and parse run in the same task (see `engine::Engine::process_one`), and
/// durable writes happen inline on the caller's task rather than through a
/// dedicated persistence thread, so there's nothing left to join once the
/// fetch/dispatch/monitor tasks above have stopped. Durable store handles
/// close on `Drop`, so there's no explicit "close store" step either.
pub async fn shutdown(
    stop: &StopFlag,
    worker_handles: Vec<JoinHandle<()>>,
    writer: &StorageWriter,
    join_budget: Duration,
) {
    stop.signal();

    for (idx, handle) in worker_handles.into_iter().enumerate() {
        match tokio::time::timeout(join_budget, handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("worker {} panicked during shutdown: {}", idx, e),
            Err(_) => tracing::warn!(
                "worker {} did not join within {:?}, detaching",
                idx,
                join_budget
            ),
        }
    }

    writer.flush().await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_flag_starts_unset() {
        let stop = StopFlag::new();
        assert!(!stop.is_set());
    }

    #[test]
    fn stop_flag_signal_is_visible_through_clones() {
        let stop = StopFlag::new();
        let clone = stop.clone();
        clone.signal();
        assert!(stop.is_set());
    }

    #[tokio::test]
    async fn monitor_run_exits_promptly_once_stop_is_signaled() {
        let metadata = Arc::new(MetadataStore::new(None));
        let frontier = Arc::new(Frontier::new(metadata.clone(), 10, 1000));
        let workqueue = Arc::new(WorkStealingQueue::new(2, 16));
        let blacklist = Arc::new(HostBlacklist::new(vec![], None));
        let stop = StopFlag::new();

        let monitor = Monitor::new(frontier, workqueue, metadata, blacklist, stop.clone());
        let handle = tokio::spawn(async move { monitor.run(Duration::from_secs(60)).await });
        stop.signal();
        tokio::time::timeout(Duration::from_millis(200), handle)
            .await
            .expect("monitor task should exit once stop is signaled")
            .unwrap();
    }

    #[tokio::test]
    async fn shutdown_joins_workers_and_flushes_writer() {
        let dir = tempfile::tempdir().unwrap();
        let writer = StorageWriter::spawn(dir.path());
        let stop = StopFlag::new();
        let worker_stop = stop.clone();
        let handle = tokio::spawn(async move {
            while !worker_stop.is_set() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });

        shutdown(&stop, vec![handle], &writer, Duration::from_secs(1)).await;
        assert!(stop.is_set());
    }
}

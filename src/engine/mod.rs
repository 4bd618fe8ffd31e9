//! Engine: wires every component into the worker pipeline described by the
//! concurrency model — Frontier dequeue → fetch → parse → metadata update →
//! storage enqueue — and owns the startup/shutdown sequence.
//!
//! A dispatcher moves due URLs from the Frontier into the work-stealing
//! queue, N fetcher tasks drain it (spilling to disk on local-deque
//! overflow), each fetch result feeds parsing and a metadata update, and
//! the Monitor samples/sweeps/shuts everything down.

use crate::blacklist::HostBlacklist;
use crate::condget::ConditionalGetCache;
use crate::config::UserAgentConfig;
use crate::fetcher::{self, FetcherContext, FetchOutcome};
use crate::frontier::{Frontier, UrlInfo};
use crate::metadata::MetadataStore;
use crate::monitor::{self, Monitor, StopFlag};
use crate::parser::{self, DiscoveredLink};
use crate::ratelimit::RateLimiter;
use crate::robots::RobotsCache;
use crate::spill::SpillQueue;
use crate::store::DurableStore;
use crate::workqueue::{WorkItem, WorkStealingQueue};
use crate::writer::{EnrichedRecord, StorageWriter};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use url::Url;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("failed to open durable store: {0}")]
    Store(#[from] crate::store::StoreError),
    #[error("failed to build http client: {0}")]
    Client(#[from] reqwest::Error),
    #[error("failed to initialize spill queue: {0}")]
    Spill(#[from] std::io::Error),
}

/// Startup knobs for the engine. A subset of the top-level `Config` the
/// caller has already validated.
pub struct EngineSettings {
    pub network_workers: usize,
    pub max_per_worker: usize,
    pub max_depth: u32,
    pub max_queue_size: usize,
    pub permanent_blacklist: Vec<String>,
    pub spill_enabled: bool,
    pub spill_dir: PathBuf,
    pub output_dir: PathBuf,
    pub durable_path: Option<PathBuf>,
    pub user_agent: UserAgentConfig,
    pub stats_interval: Duration,
    pub domain_configs: crate::config::DomainConfigs,
}

impl EngineSettings {
    /// Builds engine settings from a loaded `Config`, applying the mode
    /// overrides from the data model's `FRESH` crawl mode (no spill queue,
    /// shallower depth, smaller queue cap) and the CLI's `--fresh` flag
    /// (ignore any previously persisted durable state).
    pub fn from_config(
        config: &crate::config::Config,
        permanent_blacklist: Vec<String>,
        ignore_durable_state: bool,
        domain_configs: crate::config::DomainConfigs,
    ) -> Self {
        let fresh_mode = config.engine.mode == crate::config::CrawlMode::Fresh;
        let max_depth = if fresh_mode {
            config.engine.max_depth.min(2)
        } else {
            config.engine.max_depth
        };
        let max_queue_size = if fresh_mode {
            (config.engine.max_queue_size / 10).max(1)
        } else {
            config.engine.max_queue_size
        };

        Self {
            network_workers: config.engine.network_workers,
            max_per_worker: config.engine.max_per_worker,
            max_depth,
            max_queue_size,
            permanent_blacklist,
            spill_enabled: !fresh_mode,
            spill_dir: PathBuf::from(&config.storage.spill_dir),
            output_dir: PathBuf::from(&config.storage.output_dir),
            durable_path: if ignore_durable_state {
                None
            } else {
                Some(PathBuf::from(&config.storage.durable_path))
            },
            user_agent: config.user_agent.clone(),
            stats_interval: Duration::from_secs(30),
            domain_configs,
        }
    }
}

pub struct Engine {
    frontier: Arc<Frontier>,
    workqueue: Arc<WorkStealingQueue>,
    spill: Arc<SpillQueue>,
    metadata: Arc<MetadataStore>,
    blacklist: Arc<HostBlacklist>,
    writer: Arc<StorageWriter>,
    fetcher_ctx: Arc<FetcherContext>,
    durable: Option<Arc<DurableStore>>,
    stop: StopFlag,
    network_workers: usize,
    max_depth: u32,
    dispatch_cursor: AtomicUsize,
    user_agent: String,
    stats_interval: Duration,
    run_id: std::sync::Mutex<Option<i64>>,
    domain_configs: crate::config::DomainConfigs,
}

impl Engine {
    pub fn new(settings: EngineSettings) -> Result<Self, EngineError> {
        let durable = match &settings.durable_path {
            Some(path) => Some(Arc::new(DurableStore::open(path)?)),
            None => None,
        };

        let metadata = Arc::new(MetadataStore::new(durable.clone()));
        let frontier = Arc::new(Frontier::new(
            metadata.clone(),
            settings.max_depth,
            settings.max_queue_size,
        ));
        let workqueue = Arc::new(WorkStealingQueue::new(
            settings.network_workers,
            settings.max_per_worker,
        ));
        let spill = Arc::new(SpillQueue::new(&settings.spill_dir, settings.spill_enabled)?);
        let ratelimit = Arc::new(RateLimiter::new(durable.clone()));
        let robots = Arc::new(RobotsCache::new(durable.clone()));
        let blacklist = Arc::new(HostBlacklist::new(settings.permanent_blacklist, durable.clone()));
        let condget = Arc::new(ConditionalGetCache::new(durable.clone()));
        let writer = Arc::new(StorageWriter::spawn(&settings.output_dir));
        let domain_configs = settings.domain_configs.clone();

        let user_agent = format!(
            "{}/{} (+{}; {})",
            settings.user_agent.crawler_name,
            settings.user_agent.crawler_version,
            settings.user_agent.contact_url,
            settings.user_agent.contact_email
        );

        let fetcher_ctx = Arc::new(FetcherContext {
            client: fetcher::build_http_client(&settings.user_agent)?,
            robots,
            ratelimit,
            blacklist: blacklist.clone(),
            condget,
            user_agent: user_agent.clone(),
        });

        Ok(Self {
            frontier,
            workqueue,
            spill,
            metadata,
            blacklist,
            writer,
            fetcher_ctx,
            durable,
            stop: StopFlag::new(),
            network_workers: settings.network_workers,
            max_depth: settings.max_depth,
            dispatch_cursor: AtomicUsize::new(0),
            user_agent,
            stats_interval: settings.stats_interval,
            run_id: std::sync::Mutex::new(None),
            domain_configs,
        })
    }

    /// Applies the `domain_configs.json` per-host override to a candidate
    /// priority, or `None` if the host is disabled for crawling. Override
    /// keys may be an exact host or a `*.`-prefixed wildcard; when both an
    /// exact entry and a wildcard ancestor would match, the exact entry wins.
    fn apply_domain_override(&self, domain: &str, priority: f64) -> Option<f64> {
        let pattern = match crate::url::most_specific_match(
            self.domain_configs.domains.keys().map(String::as_str),
            domain,
        ) {
            Some(pattern) => pattern,
            None => return Some(priority),
        };
        let over_ = &self.domain_configs.domains[pattern];
        if over_.enabled == Some(false) {
            return None;
        }
        Some(priority * over_.priority_multiplier.unwrap_or(1.0))
    }

    /// Records a new run row in the durable store, if one is configured.
    /// A no-op (returns `Ok(())`) when running without durable state.
    pub fn start_run(&self, config_hash: &str) -> Result<(), crate::store::StoreError> {
        let Some(durable) = &self.durable else {
            return Ok(());
        };
        let id = durable.create_run(config_hash)?;
        *self.run_id.lock().unwrap() = Some(id);
        Ok(())
    }

    /// Marks the current run row completed/interrupted. A no-op when either
    /// no durable store is configured or `start_run` was never called.
    pub fn finish_run(&self, status: crate::store::RunStatus) {
        let Some(durable) = &self.durable else {
            return;
        };
        let Some(id) = *self.run_id.lock().unwrap() else {
            return;
        };
        if let Err(e) = durable.complete_run(id, status) {
            tracing::warn!("failed to record run completion: {}", e);
        }
    }

    /// Seeds the Frontier with a batch of top-level URLs (depth 0).
    pub fn seed(&self, urls: Vec<String>) {
        let infos = urls
            .into_iter()
            .filter_map(|url| {
                let domain = crate::url::extract_domain(&Url::parse(&url).ok()?)?;
                let priority = self.apply_domain_override(&domain, 1.0)?;
                Some(UrlInfo {
                    url,
                    domain,
                    depth: 0,
                    priority,
                })
            })
            .collect::<Vec<_>>();
        let rejected = self.frontier.enqueue_batch(infos);
        for info in rejected {
            let _ = self.spill.save(&[info.url]);
        }
    }

    pub fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    /// Spawns the dispatcher, fetcher, and monitor tasks and returns their
    /// handles so the caller can run `monitor::shutdown` against them.
    pub fn spawn_workers(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        let mut handles = Vec::new();

        let dispatcher_engine = self.clone();
        handles.push(tokio::spawn(async move {
            dispatcher_engine.run_dispatcher().await;
        }));

        for worker_id in 0..self.network_workers {
            let engine = self.clone();
            handles.push(tokio::spawn(async move {
                engine.run_fetch_worker(worker_id).await;
            }));
        }

        let monitor = Monitor::new(
            self.frontier.clone(),
            self.workqueue.clone(),
            self.metadata.clone(),
            self.blacklist.clone(),
            self.stop.clone(),
        );
        let stats_interval = self.stats_interval;
        handles.push(tokio::spawn(async move {
            monitor.run(stats_interval).await;
        }));

        handles
    }

    pub async fn shutdown(&self, handles: Vec<JoinHandle<()>>, join_budget: Duration) {
        monitor::shutdown(&self.stop, handles, &self.writer, join_budget).await;
    }

    async fn run_dispatcher(self: Arc<Self>) {
        while !self.stop.is_set() {
            match self.frontier.dequeue() {
                Some(scheduled) => {
                    let worker_id = self.dispatch_cursor.fetch_add(1, Ordering::Relaxed) % self.network_workers.max(1);
                    let item = WorkItem {
                        url: scheduled.url,
                        domain: scheduled.domain,
                        depth: scheduled.depth,
                    };
                    if !self.workqueue.push_local(worker_id, item.clone()) {
                        let _ = self.spill.save(&[item.url]);
                    }
                }
                None => {
                    if let Ok(drained) = self.spill.load(self.network_workers.max(1)) {
                        for (i, url) in drained.into_iter().enumerate() {
                            let domain = Url::parse(&url)
                                .ok()
                                .and_then(|u| crate::url::extract_domain(&u))
                                .unwrap_or_default();
                            self.workqueue.push_local(
                                i % self.network_workers.max(1),
                                WorkItem { url, domain, depth: 0 },
                            );
                        }
                    }
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
            }
        }
    }

    async fn run_fetch_worker(self: Arc<Self>, worker_id: usize) {
        loop {
            if self.stop.is_set() {
                break;
            }
            let item = self
                .workqueue
                .pop_local(worker_id)
                .or_else(|| self.workqueue.try_steal(worker_id));

            let Some(item) = item else {
                tokio::time::sleep(Duration::from_millis(20)).await;
                continue;
            };

            self.process_one(item).await;
        }
    }

    async fn process_one(&self, item: WorkItem) {
        let now = Utc::now();
        let outcome = fetcher::fetch(&self.fetcher_ctx, &item.url).await;

        match outcome {
            FetchOutcome::Fetched {
                final_url,
                status_code,
                body,
                ..
            } => {
                self.handle_fetched(&item, &final_url, status_code, body, now).await;
            }
            FetchOutcome::NotModified => {
                let existing_hash = self.metadata.get(&item.url).and_then(|m| m.content_hash);
                self.metadata
                    .update_after_crawl(&item.url, &existing_hash.unwrap_or_default(), now);
            }
            FetchOutcome::HttpError { .. } | FetchOutcome::NetworkError { .. } => {
                self.metadata.record_failure(&item.url, now);
            }
            FetchOutcome::ContentMismatch { .. }
            | FetchOutcome::RobotsDisallowed
            | FetchOutcome::Blacklisted
            | FetchOutcome::Throttled { .. }
            | FetchOutcome::RedirectError { .. }
            | FetchOutcome::BodyTooLarge => {}
        }
    }

    async fn handle_fetched(
        &self,
        item: &WorkItem,
        final_url: &str,
        status_code: u16,
        body: String,
        now: chrono::DateTime<Utc>,
    ) {
        let Ok(base_url) = Url::parse(final_url) else {
            return;
        };
        let parsed = match parser::parse_html(&body, &base_url) {
            Ok(p) => p,
            Err(e) => {
                tracing::debug!("failed to parse {}: {}", final_url, e);
                let meta = self.metadata.update_after_crawl(&item.url, "", now);
                self.enqueue_record(item, final_url, status_code, &body, "", &meta, now).await;
                return;
            }
        };

        self.enqueue_discovered_links(item, &parsed.links);

        let meta = self
            .metadata
            .update_after_crawl(&item.url, &parsed.content_hash, now);
        self.enqueue_record(item, final_url, status_code, &body, &parsed.content_hash, &meta, now)
            .await;
    }

    fn enqueue_discovered_links(&self, parent: &WorkItem, links: &[DiscoveredLink]) {
        let child_depth = parent.depth + 1;
        let infos: Vec<UrlInfo> = links
            .iter()
            .filter_map(|link| {
                let domain = crate::url::extract_domain(&Url::parse(&link.url).ok()?)?;
                let priority = self.apply_domain_override(&domain, link.priority)?;
                Some(UrlInfo {
                    url: link.url.clone(),
                    domain,
                    depth: child_depth,
                    priority,
                })
            })
            .collect();
        let rejected = self.frontier.enqueue_batch(infos);
        if !rejected.is_empty() {
            let urls: Vec<String> = rejected.into_iter().map(|i| i.url).collect();
            let _ = self.spill.save(&urls);
        }
    }

    async fn enqueue_record(
        &self,
        item: &WorkItem,
        final_url: &str,
        status_code: u16,
        body: &str,
        content_hash: &str,
        meta: &crate::metadata::UrlMetadata,
        now: chrono::DateTime<Utc>,
    ) {
        let record = EnrichedRecord {
            url: final_url.to_string(),
            domain: item.domain.clone(),
            timestamp: now,
            depth: item.depth,
            http_status_code: Some(status_code),
            content_length: body.len(),
            content_hash: content_hash.to_string(),
            last_crawl_time: meta.last_fetch_time,
            previous_change_time: meta.previous_change_time,
            expected_next_crawl: meta.expected_next_fetch,
            backoff_multiplier: meta.backoff_multiplier,
            crawl_count: meta.fetch_count,
            change_frequency: meta.change_frequency,
            content: body.to_string(),
        };
        let _ = self.writer.save_batch(vec![record]).await;
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }
}

use serde::Deserialize;

/// Top-level configuration loaded from the TOML file given on the command
/// line.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub engine: EngineConfig,
    #[serde(rename = "user-agent")]
    pub user_agent: UserAgentConfig,
    pub storage: StorageConfig,
}

/// Crawl mode: `Regular` uses seeds/sitemap discovery and keeps the spill
/// queue enabled; `Fresh` starts from nothing, disables spill, and caps
/// depth/queue size lower.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CrawlMode {
    Regular,
    Fresh,
}

impl Default for CrawlMode {
    fn default() -> Self {
        CrawlMode::Regular
    }
}

/// Thread counts, queue caps, and run mode.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Number of fetcher workers (the paper's N).
    #[serde(rename = "network-workers")]
    pub network_workers: usize,

    /// Per-worker local deque cap before spilling to disk.
    #[serde(rename = "max-per-worker")]
    pub max_per_worker: usize,

    /// Maximum link depth from a seed URL.
    #[serde(rename = "max-depth")]
    pub max_depth: u32,

    /// Frontier-wide URL cap before new URLs are rejected.
    #[serde(rename = "max-queue-size")]
    pub max_queue_size: usize,

    /// 0 = unbounded.
    #[serde(rename = "max-runtime-minutes", default)]
    pub max_runtime_minutes: u64,

    #[serde(default)]
    pub mode: CrawlMode,
}

/// User agent identification configuration
#[derive(Debug, Clone, Deserialize)]
pub struct UserAgentConfig {
    /// Name of the crawler
    #[serde(rename = "crawler-name")]
    pub crawler_name: String,

    /// Version of the crawler
    #[serde(rename = "crawler-version")]
    pub crawler_version: String,

    /// URL with information about the crawler
    #[serde(rename = "contact-url")]
    pub contact_url: String,

    /// Email address for crawler-related contact
    #[serde(rename = "contact-email")]
    pub contact_email: String,
}

/// Output/durable-storage locations and paths to the side files.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Base directory for `batch_*.json` / `shutdown_batch_*.json` files.
    #[serde(rename = "output-dir")]
    pub output_dir: String,

    /// SQLite file backing the Metadata/Robots/Rate-Limit/Conditional-GET
    /// stores.
    #[serde(rename = "durable-path")]
    pub durable_path: String,

    /// Directory for the Spill Queue's sharded overflow files.
    #[serde(rename = "spill-dir")]
    pub spill_dir: String,

    #[serde(rename = "seeds-path", default)]
    pub seeds_path: Option<String>,

    #[serde(rename = "feeds-path", default)]
    pub feeds_path: Option<String>,

    #[serde(rename = "blacklist-path", default)]
    pub blacklist_path: Option<String>,

    #[serde(rename = "domain-configs-path", default)]
    pub domain_configs_path: Option<String>,
}

/// A single entry from `feeds.json`.
#[derive(Debug, Clone, Deserialize)]
pub struct FeedEntry {
    pub url: String,
    #[serde(default)]
    pub priority: Option<f64>,
    #[serde(default)]
    pub poll_interval: Option<String>,
}

/// Parsed `domain_configs.json`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DomainConfigs {
    #[serde(default)]
    pub domains: std::collections::HashMap<String, DomainOverride>,
}

/// Per-host override applied on top of the engine defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DomainOverride {
    #[serde(default)]
    pub crawl_frequency_limit: Option<String>,
    #[serde(default)]
    pub language_whitelist: Option<Vec<String>>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub priority_multiplier: Option<f64>,
}

//! Configuration module
//!
//! Loads, parses, and validates the TOML configuration file plus the JSON/
//! text side files it references (seeds, feeds, blacklist, per-domain
//! overrides).
//!
//! # Example
//!
//! ```no_run
//! use tidecrawl::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("engine.toml")).unwrap();
//! println!("Crawler will use max depth: {}", config.engine.max_depth);
//! ```

mod parser;
mod types;
mod validation;

pub use types::{
    Config, CrawlMode, DomainConfigs, DomainOverride, EngineConfig, FeedEntry, StorageConfig,
    UserAgentConfig,
};

pub use parser::{
    compute_config_hash, load_blacklist_file, load_config, load_config_with_hash,
    load_domain_configs, load_feeds, load_seeds,
};

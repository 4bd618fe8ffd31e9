//! Tidecrawl: a politeness-aware, restart-safe web crawler core.
//!
//! The engine schedules URLs for re-fetch through a sharded frontier,
//! fetches them under per-host rate limits and robots.txt policy, parses
//! discovered links, and durably persists enriched page records as batched
//! JSON files. See [`engine::Engine`] for the orchestrator that wires every
//! component together.

pub mod blacklist;
pub mod condget;
pub mod config;
pub mod engine;
pub mod fetcher;
pub mod frontier;
pub mod metadata;
pub mod monitor;
pub mod parser;
pub mod ratelimit;
pub mod robots;
pub mod spill;
pub mod store;
pub mod url;
pub mod workqueue;
pub mod writer;

use thiserror::Error;

/// Crate-wide error type aggregating every component's own error enum.
/// Per the error handling design, only startup/config/durable-store-open
/// failures are expected to surface this out of `main`; per-URL failures are
/// captured as typed [`fetcher::FetchOutcome`] values and logged instead.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("engine startup error: {0}")]
    Startup(#[from] engine::EngineError),

    #[error("durable store error: {0}")]
    Store(#[from] store::StoreError),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid domain pattern: {0}")]
    InvalidPattern(String),
}

/// URL-specific errors
#[derive(Debug, Error)]
pub enum UrlError {
    #[error("Failed to parse URL: {0}")]
    Parse(String),

    #[error("Invalid URL scheme: {0}")]
    InvalidScheme(String),

    #[error("Missing domain in URL")]
    MissingDomain,

    #[error("Malformed URL: {0}")]
    Malformed(String),
}

/// Result type alias for top-level engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for URL operations
pub type UrlResult<T> = std::result::Result<T, UrlError>;

pub use config::Config;
pub use engine::{Engine, EngineSettings};

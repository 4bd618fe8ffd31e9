//! Tidecrawl main entry point
//!
//! Thin CLI shell around [`tidecrawl::engine::Engine`]: load config, wire the
//! engine, run until stopped, shut down cleanly.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tidecrawl::config::{load_blacklist_file, load_config_with_hash, load_domain_configs, load_seeds};
use tidecrawl::engine::{Engine, EngineSettings};
use tokio::signal;
use tracing_subscriber::EnvFilter;

/// Tidecrawl: a politeness-aware web crawler core.
#[derive(Parser, Debug)]
#[command(name = "tidecrawl")]
#[command(version = "0.1.0")]
#[command(about = "A politeness-aware web crawler core", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Resume from durable state (default behavior)
    #[arg(long, conflicts_with = "fresh")]
    resume: bool,

    /// Start a fresh run, ignoring previously persisted durable state
    #[arg(long, conflicts_with = "resume")]
    fresh: bool,

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long, conflicts_with_all = ["stats"])]
    dry_run: bool,

    /// Show statistics from the durable store and exit
    #[arg(long, conflicts_with_all = ["dry_run"])]
    stats: bool,

    /// Stop the run after this many minutes (0 = unbounded)
    #[arg(long)]
    max_runtime_minutes: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok(pair) => pair,
        Err(e) => {
            tracing::error!("failed to load configuration: {}", e);
            return Err(e.into());
        }
    };
    tracing::info!(hash = %config_hash, "configuration loaded");

    if cli.dry_run {
        handle_dry_run(&config, &cli.config);
        return Ok(());
    }
    if cli.stats {
        handle_stats(&config)?;
        return Ok(());
    }

    handle_crawl(config, &config_hash, &cli).await
}

fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("tidecrawl=info,warn"),
            1 => EnvFilter::new("tidecrawl=debug,info"),
            2 => EnvFilter::new("tidecrawl=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn handle_dry_run(config: &tidecrawl::config::Config, config_path: &std::path::Path) {
    println!("=== Tidecrawl Dry Run ===\n");
    println!("Engine:");
    println!("  Mode: {:?}", config.engine.mode);
    println!("  Network workers: {}", config.engine.network_workers);
    println!("  Max per worker: {}", config.engine.max_per_worker);
    println!("  Max depth: {}", config.engine.max_depth);
    println!("  Max queue size: {}", config.engine.max_queue_size);

    println!("\nUser Agent:");
    println!("  Name: {}", config.user_agent.crawler_name);
    println!("  Version: {}", config.user_agent.crawler_version);
    println!("  Contact URL: {}", config.user_agent.contact_url);

    println!("\nStorage:");
    println!("  Output dir: {}", config.storage.output_dir);
    println!("  Durable path: {}", config.storage.durable_path);
    println!("  Spill dir: {}", config.storage.spill_dir);

    if let Some(path) = &config.storage.seeds_path {
        match load_seeds(config_path, path) {
            Ok(seeds) => println!("\nSeeds ({}): would enqueue {} URLs", path, seeds.len()),
            Err(e) => println!("\nSeeds ({}): failed to load: {}", path, e),
        }
    }

    println!("\n\u{2713} Configuration is valid");
}

fn handle_stats(config: &tidecrawl::config::Config) -> Result<(), Box<dyn std::error::Error>> {
    use tidecrawl::store::DurableStore;

    let durable = Arc::new(DurableStore::open(std::path::Path::new(&config.storage.durable_path))?);
    let metadata = tidecrawl::metadata::MetadataStore::new(Some(durable.clone()));

    println!("=== Tidecrawl Statistics ===\n");
    println!("Durable store:        {}", config.storage.durable_path);
    println!("Tracked URLs:         {}", metadata.len());

    match durable.latest_run()? {
        Some(run) => {
            println!("\nMost recent run:");
            println!("  Started:  {}", run.started_at);
            println!("  Finished: {}", run.finished_at.as_deref().unwrap_or("(in progress)"));
            println!("  Status:   {}", run.status.as_str());
            println!("  Config hash: {}", run.config_hash);
        }
        None => println!("\nNo runs recorded yet."),
    }

    Ok(())
}

async fn handle_crawl(
    config: tidecrawl::config::Config,
    config_hash: &str,
    cli: &Cli,
) -> Result<(), Box<dyn std::error::Error>> {
    if cli.fresh {
        tracing::info!("starting fresh run (ignoring previous durable state)");
    } else {
        tracing::info!("starting run (resuming from durable state if present)");
    }

    let permanent_blacklist = match &config.storage.blacklist_path {
        Some(path) => load_blacklist_file(&cli.config, path).unwrap_or_else(|e| {
            tracing::warn!("failed to load blacklist file: {}", e);
            Vec::new()
        }),
        None => Vec::new(),
    };

    let domain_configs = match &config.storage.domain_configs_path {
        Some(path) => load_domain_configs(&cli.config, path).unwrap_or_else(|e| {
            tracing::warn!("failed to load domain configs: {}", e);
            Default::default()
        }),
        None => Default::default(),
    };

    let settings = EngineSettings::from_config(&config, permanent_blacklist, cli.fresh, domain_configs);
    let engine = Arc::new(Engine::new(settings)?);
    if let Err(e) = engine.start_run(config_hash) {
        tracing::warn!("failed to record run start: {}", e);
    }

    if let Some(seeds_path) = &config.storage.seeds_path {
        match load_seeds(&cli.config, seeds_path) {
            Ok(seeds) => {
                tracing::info!(count = seeds.len(), "seeding frontier");
                engine.seed(seeds);
            }
            Err(e) => tracing::warn!("failed to load seeds: {}", e),
        }
    }

    let handles = engine.spawn_workers();

    let max_runtime = cli
        .max_runtime_minutes
        .unwrap_or(config.engine.max_runtime_minutes);
    let stop_flag = engine.stop_flag();

    if max_runtime > 0 {
        let stop_flag = stop_flag.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(max_runtime * 60)).await;
            tracing::info!("max runtime reached, signaling shutdown");
            stop_flag.signal();
        });
    }

    let interrupted;
    tokio::select! {
        _ = signal::ctrl_c() => {
            tracing::info!("received interrupt, shutting down");
            interrupted = true;
        }
    }

    engine.shutdown(handles, Duration::from_secs(8)).await;
    engine.finish_run(if interrupted {
        tidecrawl::store::RunStatus::Interrupted
    } else {
        tidecrawl::store::RunStatus::Completed
    });
    tracing::info!("run complete");
    Ok(())
}

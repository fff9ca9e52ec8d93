//! Ripple-Crawl main entry point
//!
//! This is the command-line interface for the Ripple-Crawl crawler.

use anyhow::Context;
use clap::Parser;
use ripple_crawl::config::{load_config_with_hash, Config};
use ripple_crawl::output::print_report;
use ripple_crawl::Coordinator;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Ripple-Crawl: a polite web crawler
///
/// Ripple-Crawl fetches pages breadth-first from a set of seeds while
/// honouring robots.txt, per-host crawl delays and a per-host concurrency cap.
#[derive(Parser, Debug)]
#[command(name = "ripple-crawl")]
#[command(version)]
#[command(about = "A polite web crawler", long_about = None)]
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

    /// Validate config and show what would be crawled without actually crawling
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, hash) = load_config_with_hash(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);

    if cli.dry_run {
        handle_dry_run(&config);
        return Ok(());
    }

    handle_crawl(config).await
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("ripple_crawl=info,warn"),
            1 => EnvFilter::new("ripple_crawl=debug,info"),
            2 => EnvFilter::new("ripple_crawl=trace,debug"),
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

/// Handles the --dry-run mode: shows the effective configuration
fn handle_dry_run(config: &Config) {
    println!("=== Ripple-Crawl Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Workers: {}", config.crawler.workers);
    println!(
        "  Max concurrent per host: {}",
        config.crawler.max_concurrent_per_host
    );
    println!(
        "  Default crawl delay: {}ms (robots.txt delays capped at {}ms)",
        config.crawler.default_crawl_delay_ms, config.crawler.max_crawl_delay_ms
    );
    println!("  Retry ceiling: {}", config.crawler.retry_ceiling);
    println!("  Fetch timeout: {}ms", config.crawler.fetch_timeout_ms);
    println!("  Max depth: {}", config.crawler.max_depth);

    println!("\nUser Agent:");
    println!("  {}", config.user_agent.header_value());

    println!("\nRobots:");
    println!("  Cache TTL: {}s", config.robots.ttl_secs);
    println!("  When unreachable: {:?}", config.robots.on_unreachable);

    println!("\nStorage:");
    match &config.storage.database_path {
        Some(path) => println!("  Database: {}", path),
        None => println!("  In memory"),
    }

    if let Some(shard) = &config.shard {
        println!("\nShard:");
        println!("  {} of [{}]", shard.shard_id, shard.peers.join(", "));
    }

    println!("\nSeeds ({}):", config.seeds.len());
    for seed in &config.seeds {
        match seed.priority {
            Some(priority) => println!("  - {} ({})", seed.url, priority),
            None => println!("  - {}", seed.url),
        }
    }

    println!("\n✓ Configuration is valid");
}

/// Handles the main crawl operation
async fn handle_crawl(config: Config) -> anyhow::Result<()> {
    if config.shard.is_some() {
        anyhow::bail!("the command-line crawler runs a single shard; remove [shard] from the config");
    }

    let seeds = config.seeds.clone();
    let coordinator = Coordinator::new(config).context("failed to start crawler")?;
    coordinator.seed(&seeds).await?;

    let stop = coordinator.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, finishing in-flight fetches");
            stop.stop();
        }
    });

    let report = coordinator.run().await?;
    print_report(&report);
    Ok(())
}

//! Yeonjae main entry point
//!
//! This is the command-line interface for the Yeonjae web-novel metadata
//! harvester.

use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use yeonjae::config::load_config_with_hash;
use yeonjae::crawler::{run_once, CrawlRequest, RunSummary, SharedSink};
use yeonjae::record::Platform;
use yeonjae::storage::{export_jsonl, load_stats, open_store, print_stats, NullSink};
use yeonjae::Collection;

/// Yeonjae: a web-novel metadata harvester
///
/// Yeonjae walks the listing surfaces of Korean web-novel platforms
/// (Naver Series, KakaoPage, Ridibooks), extracts normalized metadata
/// through configurable selectors, and persists it idempotently to SQLite.
#[derive(Parser, Debug)]
#[command(name = "yeonjae")]
#[command(version = "0.1.0")]
#[command(about = "A web-novel metadata harvester", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Platform to crawl: naver, kakao, ridi, or all (repeatable)
    #[arg(short, long = "platform", default_value = "all")]
    platforms: Vec<String>,

    /// Genre display names, comma-separated (e.g. "판타지,로맨스")
    #[arg(short, long, value_delimiter = ',')]
    genres: Vec<String>,

    /// Maximum validated records per traversal (0 = unbounded)
    #[arg(short, long, default_value_t = 20)]
    limit: usize,

    /// Listing collection to traverse: all, new, ranking, or completed
    #[arg(long, default_value = "all", value_parser = parse_collection)]
    collection: Collection,

    /// Include adult-gated titles (logs in where the platform requires it)
    #[arg(long)]
    adult: bool,

    /// Skip detail pages; records carry listing fields only
    #[arg(long)]
    no_details: bool,

    /// Run the pipeline without writing to the database
    #[arg(long)]
    no_save: bool,

    /// Stop gracefully after this many seconds
    #[arg(long, value_name = "SECS")]
    timeout_secs: Option<u64>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,

    /// Validate config and show the crawl plan without crawling
    #[arg(long, conflicts_with_all = ["stats", "export_jsonl"])]
    dry_run: bool,

    /// Show statistics from the database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "export_jsonl"])]
    stats: bool,

    /// Dump all stored records as JSON Lines to PATH and exit
    #[arg(long, value_name = "PATH", conflicts_with_all = ["dry_run", "stats"])]
    export_jsonl: Option<PathBuf>,
}

fn parse_collection(s: &str) -> Result<Collection, String> {
    Collection::from_str_opt(s)
        .ok_or_else(|| format!("unknown collection '{s}' (expected all, new, ranking, or completed)"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, _config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    // Handle different modes
    if cli.dry_run {
        handle_dry_run(&config)?;
    } else if cli.stats {
        handle_stats(&config)?;
    } else if let Some(path) = &cli.export_jsonl {
        handle_export(&config, path)?;
    } else {
        handle_crawl(config, &cli).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("yeonjae=info,warn"),
            1 => EnvFilter::new("yeonjae=debug,info"),
            2 => EnvFilter::new("yeonjae=trace,debug"),
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

/// Handles the --dry-run mode: validates config and shows the crawl plan
fn handle_dry_run(config: &yeonjae::Config) -> anyhow::Result<()> {
    println!("=== Yeonjae Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  User agent: {}", config.crawler.user_agent);
    println!("  Rate limit: {}ms", config.crawler.rate_limit_ms);
    println!("  Max retries: {}", config.crawler.max_retries);
    println!("  Batch size: {}", config.crawler.batch_size);
    println!("  Page cap: {}", config.crawler.max_pages);

    println!("\nStorage:");
    println!("  Database: {}", config.storage.database_path);

    println!("\nPlatforms ({}):", config.platforms.len());
    for platform in &config.platforms {
        println!(
            "  - {} [{}] {}",
            platform.name, platform.strategy, platform.base_url
        );
        let surfaces: Vec<&str> = platform.surfaces.entries().map(|(c, _)| c.as_str()).collect();
        println!("    surfaces: {}", surfaces.join(", "));
        if !platform.genres.is_empty() {
            println!("    genres: {} configured", platform.genres.len());
        }
        if platform.menu.is_some() {
            println!("    genres: discovered from menu at runtime");
        }
        if platform.detail.is_some() {
            println!("    detail pages: enabled");
        }
        if platform.auth.is_some() {
            println!("    auth: adult gate configured");
        }
    }

    println!("\n✓ Configuration is valid");
    Ok(())
}

/// Handles the --stats mode: shows statistics from the database
fn handle_stats(config: &yeonjae::Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.storage.database_path);

    let store = open_store(Path::new(&config.storage.database_path))?;
    let stats = load_stats(&store)?;
    print_stats(&stats);

    Ok(())
}

/// Handles the --export-jsonl mode: dumps the stored catalog
fn handle_export(config: &yeonjae::Config, output_path: &Path) -> anyhow::Result<()> {
    println!("=== Exporting Catalog ===\n");
    println!("Database: {}", config.storage.database_path);
    println!("Output: {}", output_path.display());
    println!();

    let store = open_store(Path::new(&config.storage.database_path))?;
    let exported = export_jsonl(&store, output_path)?;

    println!("✓ Exported {} novel(s) to: {}", exported, output_path.display());
    Ok(())
}

/// Handles the main crawl operation
async fn handle_crawl(config: yeonjae::Config, cli: &Cli) -> anyhow::Result<()> {
    let platforms = resolve_platforms(&cli.platforms)?;
    let request = CrawlRequest {
        platforms,
        genres: cli.genres.clone(),
        limit: if cli.limit == 0 { None } else { Some(cli.limit) },
        collection: cli.collection,
        include_adult: cli.adult,
        fetch_details: !cli.no_details,
    };

    let sink: SharedSink = if cli.no_save {
        tracing::info!("Running without persistence (--no-save)");
        Arc::new(Mutex::new(NullSink::new()))
    } else {
        let store = open_store(Path::new(&config.storage.database_path))?;
        Arc::new(Mutex::new(store))
    };

    let cancel = Arc::new(AtomicBool::new(false));
    spawn_interrupt_watch(cancel.clone());
    if let Some(secs) = cli.timeout_secs {
        spawn_deadline(cancel.clone(), Duration::from_secs(secs));
    }

    let summary = run_once(Arc::new(config), request, sink, cancel).await?;
    print_run_summary(&summary);

    if !summary.is_success() {
        tracing::error!("Run extracted no records");
        anyhow::bail!("run extracted no records");
    }
    Ok(())
}

/// Maps CLI platform names onto the request filter; "all" clears the filter.
fn resolve_platforms(raw: &[String]) -> anyhow::Result<Vec<Platform>> {
    let mut platforms = Vec::new();
    for entry in raw {
        if entry == "all" {
            return Ok(Vec::new());
        }
        match Platform::from_str_opt(entry) {
            Some(p) => platforms.push(p),
            None => {
                anyhow::bail!("unknown platform '{entry}' (expected naver, kakao, ridi, or all)")
            }
        }
    }
    Ok(platforms)
}

fn spawn_interrupt_watch(cancel: Arc<AtomicBool>) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current batch");
            cancel.store(true, Ordering::Relaxed);
        }
    });
}

fn spawn_deadline(cancel: Arc<AtomicBool>, deadline: Duration) {
    tokio::spawn(async move {
        tokio::time::sleep(deadline).await;
        tracing::warn!(
            "Deadline of {:?} reached, stopping after the current batch",
            deadline
        );
        cancel.store(true, Ordering::Relaxed);
    });
}

fn print_run_summary(summary: &RunSummary) {
    let elapsed = (summary.finished_at - summary.started_at).num_milliseconds() as f64 / 1000.0;

    println!("\n=== Run Summary ===");
    for platform in &summary.platforms {
        match &platform.error {
            Some(error) => println!(
                "  {}: FAILED after {} page(s): {}",
                platform.platform, platform.pages, error
            ),
            None => println!(
                "  {}: {} extracted ({} author(s)), {} written, {} failed, {} duplicate(s), {} page(s)",
                platform.platform,
                platform.extracted,
                platform.unique_authors,
                platform.written,
                platform.failed_items,
                platform.duplicates,
                platform.pages
            ),
        }
    }
    println!(
        "  Total: {} extracted, {} written in {:.1}s",
        summary.total_extracted(),
        summary.total_written(),
        elapsed
    );
    if summary.cancelled {
        println!("  Stopped early on interrupt or deadline");
    }
}

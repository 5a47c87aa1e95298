//! Sumi-Mirror main entry point
//!
//! This is the command-line interface for the Sumi-Mirror website mirroring engine.

use clap::Parser;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use sumi_mirror::config::{load_config_with_hash, Config};
use sumi_mirror::crawler::engine_from_config;
use sumi_mirror::output::{FanoutReporter, Reporter, SqliteReporter, TracingReporter};
use sumi_mirror::storage::{open_storage, ReportStore, RunStatus};
use tracing_subscriber::EnvFilter;

/// File name of the markdown summary when `summary-path` is not configured
const DEFAULT_SUMMARY_FILE: &str = "mirror-summary.md";

/// Sumi-Mirror: a website mirroring crawl engine
///
/// Sumi-Mirror fetches a site from its seed URLs, rewrites every link it
/// finds into a locally-resolvable form and writes each page and asset
/// to disk exactly once.
#[derive(Parser, Debug)]
#[command(name = "sumi-mirror")]
#[command(version)]
#[command(about = "A website mirroring crawl engine", long_about = None)]
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

    /// Validate config and show what would be mirrored without fetching anything
    #[arg(long, conflicts_with_all = ["stats", "export_summary"])]
    dry_run: bool,

    /// Show statistics from the report database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "export_summary"])]
    stats: bool,

    /// Generate markdown summary from the report database and exit
    #[arg(long, conflicts_with_all = ["dry_run", "stats"])]
    export_summary: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    setup_logging(cli.verbose, cli.quiet);

    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if cli.dry_run {
        handle_dry_run(&config)?;
    } else if cli.stats {
        handle_stats(&config)?;
    } else if cli.export_summary {
        handle_export_summary(&config)?;
    } else {
        handle_mirror(config, &config_hash).await?;
    }

    Ok(())
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_mirror=info,warn"),
            1 => EnvFilter::new("sumi_mirror=debug,info"),
            2 => EnvFilter::new("sumi_mirror=trace,debug"),
            _ => EnvFilter::new("trace"),
        }
    };

    // targets stay visible: the report streams are told apart by target
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .init();
}

fn report_database(config: &Config) -> Result<&str, Box<dyn std::error::Error>> {
    config
        .mirror
        .report_database
        .as_deref()
        .ok_or_else(|| "No report-database configured in [mirror]".into())
}

fn summary_path(config: &Config) -> PathBuf {
    match &config.mirror.summary_path {
        Some(path) => PathBuf::from(path),
        None => Path::new(&config.mirror.local_root).join(DEFAULT_SUMMARY_FILE),
    }
}

/// Handles the --dry-run mode: validates config and shows what would be mirrored
fn handle_dry_run(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("=== Sumi-Mirror Dry Run ===\n");

    println!("Crawler Configuration:");
    println!("  Max depth: {}", config.crawler.max_depth);
    println!("  Concurrency: {}", config.crawler.concurrency);
    match config.crawler.adaptive_period_ms.filter(|ms| *ms > 0) {
        Some(period) => println!(
            "  Adaptive: every {}ms between {} and {}",
            period, config.crawler.min_concurrency, config.crawler.max_concurrency
        ),
        None => println!("  Adaptive: off"),
    }

    println!("\nRequests:");
    println!("  User agent: {}", config.request.user_agent);
    println!("  Timeout: {}s", config.request.timeout_secs);
    println!("  Extra headers: {}", config.request.headers.len());
    println!("  Preloaded cookies: {}", config.request.cookies.len());

    println!("\nOutput:");
    println!("  Local root: {}", config.mirror.local_root);
    println!(
        "  Report database: {}",
        config.mirror.report_database.as_deref().unwrap_or("(none)")
    );
    println!("  Summary: {}", summary_path(config).display());

    let rules = &config.rules;
    println!("\nRules:");
    if rules.allowed_hosts.is_empty() {
        println!("  Allowed hosts: seed hosts");
    } else {
        println!("  Allowed hosts: {}", rules.allowed_hosts.join(", "));
    }
    println!("  Host aliases: {}", rules.host_alias.len());
    println!("  Overrides: {}", rules.overrides.len());
    println!(
        "  Skipped / dropped path prefixes: {} / {}",
        rules.skip_path_prefixes.len(),
        rules.drop_path_prefixes.len()
    );

    // builds the full engine without starting it, so rule errors surface here
    engine_from_config(config, Arc::new(TracingReporter))?;

    println!("\nSeeds ({}):", config.crawler.seeds.len());
    for seed in &config.crawler.seeds {
        println!("  - {}", seed);
    }

    println!("\n✓ Configuration is valid");
    println!(
        "✓ Would start mirroring with {} seed URLs",
        config.crawler.seeds.len()
    );

    Ok(())
}

/// Handles the --stats mode: shows statistics from the report database
fn handle_stats(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    use sumi_mirror::output::{load_statistics, print_statistics};

    let database = report_database(config)?;
    println!("Database: {}\n", database);

    let storage = open_storage(Path::new(database))?;
    let stats = load_statistics(&storage)?;
    print_statistics(&stats);

    Ok(())
}

/// Handles the --export-summary mode: generates markdown summary
fn handle_export_summary(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    use sumi_mirror::output::{generate_markdown_summary, generate_summary};

    let database = report_database(config)?;
    let output = summary_path(config);

    println!("=== Exporting Mirror Summary ===\n");
    println!("Database: {}", database);
    println!("Output: {}", output.display());
    println!();

    let storage = open_storage(Path::new(database))?;

    tracing::info!("Loading run data from database...");
    let summary = generate_summary(&storage, None)?;

    tracing::info!("Generating markdown summary...");
    generate_markdown_summary(&summary, &output)?;

    println!("✓ Summary exported to: {}", output.display());

    Ok(())
}

/// Handles the main mirror operation
async fn handle_mirror(config: Config, config_hash: &str) -> Result<(), Box<dyn std::error::Error>> {
    tracing::info!(
        "Mirroring {} seed URLs into {} (max depth {})",
        config.crawler.seeds.len(),
        config.mirror.local_root,
        config.crawler.max_depth
    );

    let mut ledger = None;
    let mut reporter = FanoutReporter::new().with(Arc::new(TracingReporter));
    if let Some(database) = &config.mirror.report_database {
        let storage: Arc<Mutex<dyn ReportStore>> =
            Arc::new(Mutex::new(open_storage(Path::new(database))?));
        let sqlite = Arc::new(SqliteReporter::start_run(storage, config_hash)?);
        tracing::info!("Recording run {} in {}", sqlite.run_id(), database);
        reporter = reporter.with(sqlite.clone());
        ledger = Some(sqlite);
    }
    let reporter: Arc<dyn Reporter> = Arc::new(reporter);

    let engine = match engine_from_config(&config, reporter) {
        Ok(engine) => engine,
        Err(e) => {
            tracing::error!("Mirror failed to start: {}", e);
            if let Some(ledger) = &ledger {
                ledger.abandon(RunStatus::Failed)?;
            }
            return Err(e.into());
        }
    };

    let outcome = tokio::select! {
        outcome = engine.run() => outcome,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("Interrupted; stopping the mirror");
            engine.pause();
            if let Some(ledger) = &ledger {
                ledger.abandon(RunStatus::Interrupted)?;
            }
            return Ok(());
        }
    };

    tracing::info!(
        "Mirror completed: {} saved, {} not found, {} errors in {:.1}s",
        outcome.completed,
        outcome.not_found,
        outcome.errors,
        outcome.elapsed.as_secs_f64()
    );

    if let Some(ledger) = &ledger {
        let storage = open_storage(Path::new(report_database(&config)?))?;
        let summary = sumi_mirror::output::generate_summary(&storage, Some(ledger.run_id()))?;
        let path = summary_path(&config);
        sumi_mirror::output::generate_markdown_summary(&summary, &path)?;
        tracing::info!("Summary written to {}", path.display());
    }

    Ok(())
}

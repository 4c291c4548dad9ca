//! Sumi-Harvest main entry point
//!
//! This is the command-line interface for the publisher and the capture workers.

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use sumi_harvest::config::{load_config_with_hash, validate, Config};
use sumi_harvest::shard::{list_shards, CheckpointStore, ShardState};
use tracing_subscriber::EnvFilter;

/// Sumi-Harvest: a resumable, distributed page-capture fleet
///
/// One publisher hands out URL records from shard files; any number of
/// workers render those pages in a headless browser and store the HTML and
/// screenshots.
#[derive(Parser, Debug)]
#[command(name = "sumi-harvest")]
#[command(version = "1.0.0")]
#[command(about = "A resumable, distributed page-capture fleet", long_about = None)]
struct Cli {
    /// Path to TOML configuration file (defaults apply without one)
    #[arg(short, long, value_name = "CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, conflicts_with = "verbose", global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve tasks from the shard directory
    Publish {
        /// Directory holding the shard files
        #[arg(long)]
        shard_dir: Option<String>,

        /// Address to listen on (host:port)
        #[arg(long)]
        bind: Option<String>,

        /// Ignore the existing checkpoint and start every shard over
        #[arg(long)]
        fresh: bool,
    },

    /// Pull tasks from a publisher and capture them
    Work {
        /// Base URL of the publisher
        #[arg(long)]
        publisher_url: Option<String>,

        /// Root directory for captured artifacts
        #[arg(long)]
        storage_dir: Option<String>,

        /// Name of this run's storage directory (default: worker_<timestamp>)
        #[arg(long)]
        run_name: Option<String>,
    },

    /// Show per-shard progress from the checkpoint and exit
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    let mut config = load_configuration(cli.config.as_deref())?;

    match cli.command {
        Command::Publish {
            shard_dir,
            bind,
            fresh,
        } => {
            if let Some(shard_dir) = shard_dir {
                config.publisher.shard_dir = shard_dir;
            }
            if let Some(bind) = bind {
                config.publisher.bind = bind;
            }
            validate(&config).context("Invalid configuration after command-line overrides")?;
            handle_publish(&config, fresh).await
        }
        Command::Work {
            publisher_url,
            storage_dir,
            run_name,
        } => {
            if let Some(publisher_url) = publisher_url {
                config.worker.publisher_url = publisher_url;
            }
            if let Some(storage_dir) = storage_dir {
                config.worker.storage_dir = storage_dir;
            }
            validate(&config).context("Invalid configuration after command-line overrides")?;
            handle_work(&config, run_name).await
        }
        Command::Status => handle_status(&config),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("sumi_harvest=info,warn"),
            1 => EnvFilter::new("sumi_harvest=debug,info"),
            2 => EnvFilter::new("sumi_harvest=trace,debug"),
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

fn load_configuration(path: Option<&Path>) -> anyhow::Result<Config> {
    let Some(path) = path else {
        tracing::info!("No configuration file given, using defaults");
        return Ok(Config::default());
    };

    tracing::info!("Loading configuration from: {}", path.display());
    let (config, hash) = load_config_with_hash(path)
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
    tracing::info!("Configuration loaded successfully (hash: {})", hash);
    Ok(config)
}

/// Handles the `publish` command
async fn handle_publish(config: &Config, fresh: bool) -> anyhow::Result<()> {
    if fresh {
        tracing::info!("Starting fresh (ignoring checkpoint)");
    } else {
        tracing::info!(
            "Starting publisher (will resume from {} if present)",
            config.publisher.checkpoint_file
        );
    }

    sumi_harvest::publisher::run_publisher(&config.publisher, fresh)
        .await
        .context("Publisher failed")
}

/// Handles the `work` command
#[cfg(feature = "chromium")]
async fn handle_work(config: &Config, run_name: Option<String>) -> anyhow::Result<()> {
    sumi_harvest::worker::run_worker(config, run_name)
        .await
        .context("Worker failed")
}

/// Handles the `work` command
#[cfg(not(feature = "chromium"))]
async fn handle_work(_config: &Config, _run_name: Option<String>) -> anyhow::Result<()> {
    anyhow::bail!("No browser backend was compiled in; rebuild with `--features chromium`")
}

/// Handles the `status` command: prints per-shard progress
fn handle_status(config: &Config) -> anyhow::Result<()> {
    let store = CheckpointStore::new(&config.publisher.checkpoint_file, Duration::ZERO);
    let checkpoint = store.load();
    let shards = list_shards(
        Path::new(&config.publisher.shard_dir),
        &config.publisher.shard_extension,
    )?;

    println!("Shard directory: {}", config.publisher.shard_dir);
    println!("Checkpoint: {}\n", store.path().display());

    let mut total = 0;
    let mut remaining = 0;
    for shard in &shards {
        let contents = shard.load()?;
        let saved = checkpoint.get(&shard.id);
        let state = ShardState::resume(
            &shard.id,
            &contents.fingerprint,
            contents.records.len(),
            saved,
        );

        let label = match saved {
            Some(entry) if entry.checksum != state.fingerprint => "changed",
            _ if state.is_complete() => "done",
            _ if state.progress_offset > 0 => "partial",
            _ => "new",
        };

        println!(
            "  {:<40} {:>8}/{:<8} {}",
            shard.id, state.progress_offset, state.record_count, label
        );
        total += state.record_count;
        remaining += state.remaining();
    }

    println!(
        "\n{} shards, {} records, {} not yet dispatched",
        shards.len(),
        total,
        remaining
    );
    Ok(())
}

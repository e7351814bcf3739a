//! Forum-Archiver main entry point
//!
//! This is the command-line interface for crawling a phpBB board into a local
//! record store and packing that store into a static chunked archive.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use forum_archiver::config::{load_config_with_hash, Config};
use forum_archiver::crawler::crawl;
use forum_archiver::record::{Item, Key, Record};
use forum_archiver::storage::{open_storage, RecordStore, RunStatus};
use forum_archiver::{pack_store, ArchiveReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Forum-Archiver: a resumable forum crawler and static archive packer
///
/// Crawls every forum and topic reachable from the board index into a SQLite
/// store, then packs the store into gzip chunks plus a key index that a static
/// viewer can load on demand.
#[derive(Parser, Debug)]
#[command(name = "forum-archiver")]
#[command(version = "1.0.0")]
#[command(about = "A resumable forum crawler and static archive packer", long_about = None)]
struct Cli {
    /// Path to TOML configuration file
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

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
    /// Crawl the board into the record store, resuming where a previous run stopped
    Crawl,

    /// Pack the record store into the chunk directory
    Pack,

    /// Show record counts and crawl run history
    Stats,

    /// Print one record from the packed archive
    Show {
        /// Record key, e.g. root, f2 or f2t15
        key: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    setup_logging(cli.verbose, cli.quiet);

    // Load and validate configuration
    tracing::info!("Loading configuration from: {}", cli.config.display());
    let (config, config_hash) = match load_config_with_hash(&cli.config) {
        Ok((cfg, hash)) => {
            tracing::info!("Configuration loaded successfully (hash: {})", hash);
            (cfg, hash)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            return Err(e).context(format!("loading {}", cli.config.display()));
        }
    };

    match cli.command {
        Command::Crawl => handle_crawl(&config, &config_hash).await,
        Command::Pack => handle_pack(&config),
        Command::Stats => handle_stats(&config),
        Command::Show { key } => handle_show(&config, &key),
    }
}

/// Sets up the logging/tracing subscriber based on verbosity level
fn setup_logging(verbose: u8, quiet: bool) {
    let filter = if quiet {
        // Only show errors
        EnvFilter::new("error")
    } else {
        match verbose {
            0 => EnvFilter::new("forum_archiver=info,warn"),
            1 => EnvFilter::new("forum_archiver=debug,info"),
            2 => EnvFilter::new("forum_archiver=trace,debug"),
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

/// Handles the crawl command, recording the run in the store
async fn handle_crawl(config: &Config, config_hash: &str) -> anyhow::Result<()> {
    let storage = Arc::new(open_storage(Path::new(&config.output.database_path))?);

    if let Some(latest) = storage.get_latest_run()? {
        if latest.status == RunStatus::Running {
            tracing::warn!(
                "Run {} never finished; marking it failed and resuming",
                latest.id
            );
            storage.finish_run(latest.id, RunStatus::Failed)?;
        }
    }

    let run_id = storage.create_run(config_hash)?;
    tracing::info!(
        "Starting run {} against {} ({} records already stored)",
        run_id,
        config.crawler.base_url,
        storage.len()?
    );

    match crawl(config, storage.clone()).await {
        Ok(summary) => {
            storage.finish_run(run_id, RunStatus::Completed)?;
            tracing::info!(
                "Crawl completed successfully: {} forums, {} topics, {} requests",
                summary.forums_written,
                summary.topics_written,
                summary.requests
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!("Crawl failed: {}", e);
            storage.finish_run(run_id, RunStatus::Failed)?;
            Err(e).context("crawl aborted; re-run to resume")
        }
    }
}

/// Handles the pack command
fn handle_pack(config: &Config) -> anyhow::Result<()> {
    let storage = open_storage(Path::new(&config.output.database_path))?;
    if !storage.contains(&Key::root())? {
        tracing::warn!("No root record stored; the crawl has not completed yet");
    }

    let summary = pack_store(
        &storage,
        Path::new(&config.output.chunks_dir),
        config.output.chunk_size,
    )
    .context("packing archive")?;

    println!(
        "Packed {} records into {} chunks ({} bytes) at {}",
        summary.records, summary.chunks, summary.bytes, config.output.chunks_dir
    );
    Ok(())
}

/// Handles the stats command: record counts and run history
fn handle_stats(config: &Config) -> anyhow::Result<()> {
    println!("Database: {}\n", config.output.database_path);

    let storage = open_storage(Path::new(&config.output.database_path))?;
    let counts = storage.record_counts()?;

    println!("Records:");
    println!("  Forums: {}", counts.forums);
    println!("  Topics: {}", counts.topics);
    println!("  Posts:  {}", counts.posts);
    if counts.other > 0 {
        println!("  Other:  {}", counts.other);
    }
    println!(
        "  Complete: {}",
        if storage.contains(&Key::root())? { "yes" } else { "no" }
    );

    let runs = storage.list_runs()?;
    println!("\nRuns ({}):", runs.len());
    for run in runs {
        println!(
            "  #{} {} -> {} [{}] config {}",
            run.id,
            run.started_at,
            run.finished_at.as_deref().unwrap_or("-"),
            run.status.to_db_string(),
            &run.config_hash[..run.config_hash.len().min(12)]
        );
    }

    Ok(())
}

/// Handles the show command: reads one record back through the archive index
fn handle_show(config: &Config, raw_key: &str) -> anyhow::Result<()> {
    let Some(key) = Key::parse(raw_key) else {
        bail!("not a record key: {}", raw_key);
    };

    let mut reader = ArchiveReader::open(&config.output.chunks_dir)
        .with_context(|| format!("opening archive at {}", config.output.chunks_dir))?;
    let Some(record) = reader.load(&key)? else {
        bail!("{} is not in the archive", key);
    };

    match &record {
        Record::Forum { title, items } => {
            println!("{} [{}]", title, key);
            for item in items {
                match item {
                    Item::Group { title } => println!("\n  == {} ==", title),
                    Item::Redirect { title, target_url, .. } => {
                        println!("  {} -> {}", title, target_url)
                    }
                    other => match other.target_key() {
                        Some(target) => println!("  {} ({})", other.title(), target),
                        None => println!("  {}", other.title()),
                    },
                }
            }
        }
        Record::Topic { items } => {
            println!("[{}] {} posts", key, items.len());
            for post in items {
                println!(
                    "\n  #{} {} by {} at {}",
                    post.post_id, post.title, post.user_name, post.datetime
                );
            }
        }
    }

    Ok(())
}

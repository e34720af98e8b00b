//! autopost-send - publish due posts from the queue
//!
//! One scan with `--once` (for cron or a process manager), or a poll loop
//! that scans at a fixed interval until SIGINT/SIGTERM.

use clap::Parser;
use libautopost::error::StoreError;
use libautopost::logging::{LogFormat, LoggingConfig};
use libautopost::scheduler::RetryPolicy;
use libautopost::store::memory::MemoryStore;
use libautopost::store::PostStore;
use libautopost::{AutopostError, Config, PublisherRegistry, QueueScanner, Result, ScanReport};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::{sleep, Duration};
use tracing::{debug, error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "autopost-send")]
#[command(version)]
#[command(about = "Publish due posts from the autopost queue")]
#[command(long_about = "\
autopost-send - Publish due posts from the autopost queue

DESCRIPTION:
    autopost-send scans the post queue for approved posts whose scheduled
    time has passed and publishes each one to its platforms. Every platform
    is retried with exponential backoff (2s, 6s, ...) up to the configured
    number of attempts. A platform that keeps failing marks the post as
    'error' but never stops the remaining platforms or posts.

USAGE:
    # Single scan, e.g. from cron
    autopost-send --once

    # Keep scanning every 30 seconds
    autopost-send --poll-interval 30

    # See what would be published without touching the queue
    autopost-send --once --dry-run

SIGNALS:
    SIGTERM, SIGINT - Graceful shutdown (finishes the current scan)

CONFIGURATION:
    Configuration file: ~/.config/autopost/config.toml
    Queue location:     ~/.local/share/autopost/posts.db

    [scheduler]
    max_attempts = 3
    initial_backoff_ms = 2000
    backoff_multiplier = 3
    poll_interval_secs = 60

    [platforms.instagram]
    command = \"/usr/local/bin/publish-instagram\"

EXIT CODES:
    0 - Scan completed (individual posts may still have failed)
    1 - Runtime or storage error
    2 - Configuration error
")]
struct Cli {
    /// Scan once and exit
    #[arg(long)]
    once: bool,

    /// Seconds between scans (overrides config)
    #[arg(long, value_name = "SECONDS")]
    poll_interval: Option<u64>,

    /// Log instead of publishing; the queue is not modified
    #[arg(long)]
    dry_run: bool,

    /// Enable verbose logging to stderr
    #[arg(short, long)]
    verbose: bool,

    /// Log format: text, json or pretty
    #[arg(long, value_name = "FORMAT")]
    log_format: Option<LogFormat>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut logging = LoggingConfig::from_env(cli.verbose);
    if let Some(format) = cli.log_format {
        logging.format = format;
    }
    logging.init();

    if let Err(e) = run(cli).await {
        error!(error = %e, "autopost-send failed");
        eprintln!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load()?;
    let scanner = build_scanner(&config, cli.dry_run).await?;

    if cli.verbose {
        spawn_event_logger(&scanner);
    }

    if cli.once {
        let report = scanner.run().await?;
        println!("{}", report_json(&report)?);
        return Ok(());
    }

    let shutdown = Arc::new(AtomicBool::new(false));
    setup_signal_handlers(shutdown.clone())?;

    let poll_interval = cli
        .poll_interval
        .unwrap_or(config.scheduler.poll_interval_secs)
        .max(1);
    info!(poll_interval_secs = poll_interval, "autopost-send starting");

    run_poll_loop(&scanner, poll_interval, shutdown).await;

    info!("autopost-send stopped");
    Ok(())
}

async fn build_scanner(config: &Config, dry_run: bool) -> Result<QueueScanner> {
    let store = libautopost::store::open(&config.storage).await?;
    let policy = RetryPolicy::from_config(&config.scheduler);

    if dry_run {
        // Work on a copy so the real queue is left untouched
        let snapshot: Arc<dyn PostStore> = Arc::new(MemoryStore::with_posts(store.list().await?));
        let registry = PublisherRegistry::dry_run(&config.platforms);
        info!(platforms = ?registry.names(), "Dry run: nothing will be published");
        return Ok(QueueScanner::new(snapshot, registry, policy.without_backoff()));
    }

    let registry = PublisherRegistry::from_config(&config.platforms);
    if registry.is_empty() {
        warn!("No platforms configured; every due post will end in error");
    } else {
        debug!(platforms = ?registry.names(), "Registered publishers");
    }
    Ok(QueueScanner::new(store, registry, policy))
}

fn spawn_event_logger(scanner: &QueueScanner) {
    let mut events = scanner.events().subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let Ok(json) = serde_json::to_string(&event) {
                debug!(event = %json, "Scheduler event");
            }
        }
    });
}

/// Scan, then sleep; stop once shutdown is requested
async fn run_poll_loop(scanner: &QueueScanner, poll_interval: u64, shutdown: Arc<AtomicBool>) {
    loop {
        if shutdown.load(Ordering::Relaxed) {
            info!("Shutdown requested, stopping poll loop");
            break;
        }

        // A failed scan is retried on the next tick
        if let Err(e) = scanner.run().await {
            error!(error = %e, "Scan failed");
        }

        // Check shutdown every second while waiting
        for _ in 0..poll_interval {
            if shutdown.load(Ordering::Relaxed) {
                break;
            }
            sleep(Duration::from_secs(1)).await;
        }
    }
}

#[cfg(unix)]
fn setup_signal_handlers(shutdown: Arc<AtomicBool>) -> Result<()> {
    use signal_hook::consts::{SIGINT, SIGTERM};
    use signal_hook::iterator::Signals;

    let mut signals = Signals::new([SIGINT, SIGTERM])
        .map_err(|e| AutopostError::InvalidInput(format!("Signal setup failed: {}", e)))?;

    std::thread::spawn(move || {
        if signals.forever().next().is_some() {
            info!("Received shutdown signal, finishing current scan...");
            shutdown.store(true, Ordering::Relaxed);
        }
    });

    Ok(())
}

#[cfg(not(unix))]
fn setup_signal_handlers(_shutdown: Arc<AtomicBool>) -> Result<()> {
    Ok(())
}

fn report_json(report: &ScanReport) -> Result<String> {
    Ok(serde_json::to_string(report).map_err(StoreError::from)?)
}

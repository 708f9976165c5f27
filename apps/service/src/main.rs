use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info};

use watcher::monitoring::{AlertRegistry, CheckRegistry};
use watcher::orchestrator::{CycleReport, Outcome};
use watcher::{FileStateStore, Monitor, WatcherConfig, config};

#[derive(Parser)]
#[command(name = "watcher")]
#[command(about = "Lightweight system monitoring: checks targets and alerts on status changes", long_about = None)]
#[command(version)]
struct Cli {
    /// Run once and exit (good for cron usage)
    #[arg(short, long)]
    single_shot: bool,

    /// Configuration file path (default: ./config.ini, then $XDG_CONFIG_HOME/watcher/config.ini)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Show detailed output for all checks
    #[arg(short, long)]
    verbose: bool,

    /// Seconds between cycles in continuous mode (overrides `interval`)
    #[arg(short, long, value_parser = clap::value_parser!(u64).range(1..=config::MAX_INTERVAL_SECS))]
    interval: Option<u64>,

    /// State file path (overrides `state_file`)
    #[arg(long)]
    state_file: Option<PathBuf>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logger::init_tracing(cli.verbose);

    let config_path = cli.config.clone().unwrap_or_else(config::default_config_path);
    let WatcherConfig { mut settings, targets } = WatcherConfig::load(&config_path)
        .with_context(|| format!("Error loading configuration from {}", config_path.display()))?;

    if let Some(secs) = cli.interval {
        settings.interval = Duration::from_secs(secs);
    }
    if let Some(state_file) = cli.state_file {
        settings.state_file = state_file;
    }
    debug!("{}", settings);

    let checks = CheckRegistry::with_builtins(&settings).context("Failed to set up check strategies")?;
    let alerts = AlertRegistry::with_builtins(&settings);
    let store = Arc::new(FileStateStore::new(&settings.state_file));
    let monitor = Monitor::new(checks, alerts, store);

    let verbose = cli.verbose;
    if cli.single_shot {
        let report = monitor.run_cycle(&targets).await;
        print_report(&report, verbose);
        return Ok(());
    }

    let shutdown = shutdown_signal()?;
    monitor
        .run_until(&targets, settings.interval, shutdown, |report| print_report(report, verbose))
        .await;

    info!("Exiting watcher...");
    Ok(())
}

/// Listen for Ctrl-C (and SIGTERM on Unix). The handlers are installed
/// here, before the first cycle, so a signal arriving mid-cycle is held until
/// that cycle has saved its state.
#[cfg(unix)]
fn shutdown_signal() -> Result<impl Future<Output = ()>> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = signal(SignalKind::interrupt()).context("Failed to listen for Ctrl-C")?;
    let mut terminate = signal(SignalKind::terminate()).context("Failed to listen for SIGTERM")?;

    Ok(async move {
        tokio::select! {
            _ = interrupt.recv() => {}
            _ = terminate.recv() => {}
        }
    })
}

#[cfg(windows)]
fn shutdown_signal() -> Result<impl Future<Output = ()>> {
    let mut ctrl_c = tokio::signal::windows::ctrl_c().context("Failed to listen for Ctrl-C")?;

    Ok(async move {
        ctrl_c.recv().await;
    })
}

/// Print per-target results to stdout in verbose mode
fn print_report(report: &CycleReport, verbose: bool) {
    if !verbose {
        return;
    }

    let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
    for result in &report.results {
        match &result.outcome {
            Outcome::Up | Outcome::Down => {
                let status = if result.outcome == Outcome::Up { "UP" } else { "DOWN" };
                match result.transition {
                    Some(transition) => println!(
                        "[{timestamp}] {} ({}) status: {status} ({transition})",
                        result.name, result.host
                    ),
                    None => println!("[{timestamp}] {} ({}) status: {status}", result.name, result.host),
                }
            }
            Outcome::Skipped(reason) => {
                println!("[{timestamp}] {} ({}) SKIPPED: {reason}", result.name, result.host)
            }
        }
    }
}

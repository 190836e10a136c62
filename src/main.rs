use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

use restock_watcher::config::{AppConfig, Destination};
use restock_watcher::control::{ControlSurface, TelegramControl};
use restock_watcher::scheduler::CycleScheduler;
use restock_watcher::storage::open_store;
use restock_watcher::watcher::load_initial_state;
use restock_watcher::{telemetry, InventoryWatcher};

#[derive(Parser)]
#[command(name = "restock-watcher", version, about = "Watches a catalog feed and alerts on new stock")]
struct Cli {
    /// Directory holding default.toml, {RUN_MODE}.toml and local.toml
    #[arg(long, default_value = "config")]
    config_dir: PathBuf,

    /// Log notifications instead of sending them and keep state in memory
    #[arg(long)]
    dry_run: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Clone, Copy, PartialEq, Eq)]
enum Commands {
    /// Poll on a schedule and listen for control commands (default)
    Run,
    /// Run a single cycle and exit
    Once,
    /// Print the persisted tracking state and exit
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let command = cli.command.unwrap_or(Commands::Run);

    let mut config = AppConfig::load_unchecked(&cli.config_dir)
        .with_context(|| format!("failed to load configuration from {}", cli.config_dir.display()))?;
    if cli.dry_run {
        config.notifications.destination = Destination::Log;
    }
    if command != Commands::Run {
        config.control.enabled = false;
    }

    let _log_guard = telemetry::init_tracing(&config.logging)?;

    match command {
        Commands::Status => print_status(&config).await,
        Commands::Once => {
            config.validate().context("invalid configuration")?;
            run_once(&config, cli.dry_run).await
        }
        Commands::Run => {
            config.validate().context("invalid configuration")?;
            run(&config, cli.dry_run).await
        }
    }
}

async fn print_status(config: &AppConfig) -> Result<()> {
    let store = open_store(&config.storage).await?;
    let state = load_initial_state(store.as_ref(), config.control.alerts_enabled_on_start).await?;

    println!("Store: {}", store.describe());
    println!("Alerts enabled: {}", state.alerts_enabled());
    println!("Tracked products: {}", state.tracked_count());
    println!("In stock: {}", state.in_stock_count());
    println!("Notifications recorded: {}", state.notified_count());
    Ok(())
}

async fn run_once(config: &AppConfig, dry_run: bool) -> Result<()> {
    let watcher = InventoryWatcher::from_config(config, dry_run).await?;
    let report = watcher.run_cycle().await;
    watcher.dispatcher().shutdown().await;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn run(config: &AppConfig, dry_run: bool) -> Result<()> {
    info!("Starting Restock Watcher...");
    telemetry::init_metrics(&config.metrics)?;

    let watcher = Arc::new(InventoryWatcher::from_config(config, dry_run).await?);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let control_task = if config.control.enabled {
        let surface = ControlSurface::new(watcher.state().clone(), watcher.store());
        let control = TelegramControl::from_config(
            &config.notifications.telegram,
            &config.control,
            Duration::from_secs(config.notifications.request_timeout),
            surface,
        )
        .context("failed to set up Telegram control")?;
        Some(tokio::spawn(control.run(shutdown_rx)))
    } else {
        None
    };

    let mut scheduler = CycleScheduler::new(watcher.clone(), config.scheduler.clone()).await?;
    scheduler.start().await?;

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");

    let _ = shutdown_tx.send(true);
    scheduler.shutdown().await?;
    if let Some(task) = control_task {
        if let Err(e) = task.await {
            tracing::warn!("Control task ended abnormally: {}", e);
        }
    }
    watcher.dispatcher().shutdown().await;

    let stats = scheduler.stats().await;
    info!(
        completed_cycles = stats.completed_cycles,
        skipped_triggers = stats.skipped_triggers,
        uptime_seconds = stats.uptime_seconds,
        "Stopped"
    );
    Ok(())
}

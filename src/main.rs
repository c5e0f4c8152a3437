use std::sync::Arc;

use mockable::DefaultClock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use roomledger::config::Config;
use roomledger::directory::InMemoryDirectory;
use roomledger::engine::Engine;
use roomledger::inventory::Inventory;
use roomledger::notify::NotifyHub;
use roomledger::observability;
use roomledger::scheduler::{self, Cadence, ReconciliationScheduler};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let cfg = Config::from_env()?;
    observability::init(cfg.metrics_port)?;

    // Ensure data directory exists
    std::fs::create_dir_all(&cfg.data_dir)?;

    let directory = Arc::new(InMemoryDirectory::new());
    let engine = Arc::new(Engine::new(
        cfg.wal_path(),
        Arc::new(NotifyHub::new()),
        directory.clone(),
        Arc::new(DefaultClock),
    )?);

    if let Some(path) = &cfg.inventory_file {
        let inventory = Inventory::load(path)?;
        inventory.apply(&engine, &directory).await?;
    }

    info!("roomledger started");
    info!("  data_dir: {}", cfg.data_dir.display());
    info!("  reconcile: daily at {:02}:00 UTC", cfg.reconcile_hour);
    info!("  compact_threshold: {}", cfg.compact_threshold);
    info!("  users: {}", directory.len());
    info!(
        "  metrics: {}",
        cfg.metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    let scheduler = ReconciliationScheduler::start(
        engine.clone(),
        Cadence::DailyAt {
            hour: cfg.reconcile_hour,
        },
    );
    let compactor_cancel = CancellationToken::new();
    let compactor = tokio::spawn(scheduler::run_compactor(
        engine.clone(),
        cfg.compact_threshold,
        compactor_cancel.clone(),
    ));

    // SIGTERM/ctrl-c stop the daemon; SIGHUP runs a sweep right away.
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sighup = signal(SignalKind::hangup())?;
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                _ = sigterm.recv() => break,
                _ = sighup.recv() => match scheduler.run_now().await {
                    Some(report) => info!(
                        "manual reconciliation for {}: {} completed, {} failures",
                        report.processed_on, report.completed, report.failures
                    ),
                    None => warn!("manual reconciliation requested but the scheduler is not running"),
                },
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
    }

    info!("shutdown signal received");
    scheduler.stop().await;
    compactor_cancel.cancel();
    if let Err(e) = compactor.await {
        warn!("compactor task failed: {e}");
    }

    info!("roomledger stopped");
    Ok(())
}

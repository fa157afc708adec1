//! Watch command
//!
//! Periodic monitor cycles with graceful shutdown on Ctrl+C. Cycles run on
//! the blocking pool since data loading, evaluation and webhook delivery are
//! synchronous.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{error, info, warn};

use signal_alerts::monitor::{CycleReport, Monitor, SymbolOutcome};
use signal_alerts::Config;

pub fn run(config_path: String, poll_override: Option<u64>, once: bool) -> Result<()> {
    let config = Config::from_file(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;
    let poll_secs = poll_override.unwrap_or(config.poll_secs).max(1);

    info!("Symbols: {}", config.symbols.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(", "));
    info!("Ruleset: {}", config.ruleset.name());
    info!("Interval: {} (lookback {})", config.interval, config.effective_lookback());
    info!("Delivery policy: {:?}", config.notify.policy);

    let monitor = Arc::new(Monitor::from_config(config)?);
    info!("Notifier: {}", monitor.notifier_name());

    if once {
        log_report(&monitor.run_cycle());
        return Ok(());
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to build tokio runtime")?;

    // The last handle is dropped here, outside the runtime, since the
    // blocking HTTP client may not be dropped from async context.
    let result = runtime.block_on(run_async(Arc::clone(&monitor), poll_secs));
    drop(runtime);
    drop(monitor);
    result
}

async fn run_async(monitor: Arc<Monitor>, poll_secs: u64) -> Result<()> {
    let (shutdown_tx, mut shutdown_rx) = mpsc::channel::<()>(1);

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, initiating shutdown...");
                let _ = shutdown_tx.send(()).await;
            }
            Err(e) => {
                error!("Error setting up signal handler: {}", e);
            }
        }
    });

    let mut cycle_interval = interval(Duration::from_secs(poll_secs));
    let mut cycles = 0u64;

    info!("Starting watch loop ({}s between cycles)...", poll_secs);

    loop {
        tokio::select! {
            _ = cycle_interval.tick() => {
                let monitor = Arc::clone(&monitor);
                match tokio::task::spawn_blocking(move || monitor.run_cycle()).await {
                    Ok(report) => {
                        cycles += 1;
                        log_report(&report);
                    }
                    Err(e) => error!("Monitor cycle task failed: {}", e),
                }
            }
            _ = shutdown_rx.recv() => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    info!("Watch stopped after {} cycles", cycles);
    Ok(())
}

fn log_report(report: &CycleReport) {
    for (symbol, outcome) in &report.outcomes {
        match outcome {
            SymbolOutcome::Quiet { signal } => info!(symbol = %symbol, signal = %signal, "No new transition"),
            SymbolOutcome::Alerted { alerts } => {
                for alert in alerts {
                    let levels = alert
                        .levels
                        .map(|l| format!("stop={:.2} target={:.2}", l.stop_loss, l.take_profit))
                        .unwrap_or_else(|| "no levels".to_string());
                    let signal = alert.event.signal;
                    let bar = alert.event.datetime;
                    if alert.delivered {
                        info!(symbol = %symbol, %signal, %bar, "Alert delivered ({})", levels);
                    } else {
                        warn!(symbol = %symbol, %signal, %bar, "Alert NOT delivered ({})", levels);
                    }
                }
            }
            SymbolOutcome::Degraded { reason } => warn!(symbol = %symbol, "Degraded: {}", reason),
            SymbolOutcome::Failed { error } => error!(symbol = %symbol, "Failed: {}", error),
        }
    }
}

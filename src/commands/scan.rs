//! Scan command implementation

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use signal_alerts::data::{CsvDataSource, DataSource, Interval, Lookback};
use signal_alerts::risk::compute_levels;
use signal_alerts::{Config, Indicator, IndicatorFrame, RuleSet, SignalEngine, Symbol};

pub fn run(
    config_path: String,
    symbols_override: Vec<String>,
    ruleset_override: Option<String>,
    interval_override: Option<String>,
    transitions: usize,
) -> Result<()> {
    let mut config = Config::from_file(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;
    info!("Loaded configuration from: {}", config_path);

    if !symbols_override.is_empty() {
        config.symbols = symbols_override.iter().map(Symbol::new).collect();
    }

    if let Some(name) = ruleset_override {
        config.ruleset = RuleSet::from_name(&name).with_context(|| {
            format!(
                "Unknown ruleset: {}. Available rulesets: {}",
                name,
                RuleSet::available().join(", ")
            )
        })?;
        info!("Overriding ruleset to: {}", name);
    }

    if let Some(interval) = interval_override {
        config.interval = interval.parse::<Interval>()?;
        info!("Overriding interval to: {}", config.interval);
    }

    config.validate()?;

    let source = CsvDataSource::new(&config.data_dir);
    let lookback = config.effective_lookback();

    println!("\n{}", "=".repeat(60));
    println!(
        "SIGNAL SCAN  ruleset={}  interval={}  lookback={}",
        config.ruleset.name(),
        config.interval,
        lookback
    );
    println!("{}", "=".repeat(60));

    for symbol in &config.symbols {
        if let Err(e) = scan_symbol(&config, &source, symbol, lookback, transitions) {
            error!(symbol = %symbol, "Scan failed: {:#}", e);
            println!("{:<10} ERROR: {:#}", symbol, e);
        }
    }

    println!("{}", "=".repeat(60));
    Ok(())
}

fn scan_symbol(
    config: &Config,
    source: &dyn DataSource,
    symbol: &Symbol,
    lookback: Lookback,
    transitions: usize,
) -> Result<()> {
    let series = source.fetch(symbol, lookback, config.interval)?;
    let frame = IndicatorFrame::compute(&series, &config.indicators);

    let signals = match SignalEngine::evaluate(&frame, &config.ruleset) {
        Ok(signals) => signals,
        Err(e) => {
            warn!(symbol = %symbol, "Signals unavailable: {}", e);
            println!("{:<10} HOLD ({})", symbol, e);
            return Ok(());
        }
    };

    let last = frame.len() - 1;
    let latest = signals.latest().unwrap_or_default();
    let close = frame.close(last).unwrap_or_default();

    println!(
        "{:<10} {:<5} close={:.2} bars={}",
        symbol,
        latest,
        close,
        frame.len()
    );

    let recent = signals.transitions();
    for (index, signal) in recent.iter().rev().take(transitions).rev() {
        println!(
            "{:<10}   {} -> {}",
            "",
            signals.timestamps()[*index].format("%Y-%m-%d %H:%M"),
            signal
        );
    }

    if let Some(levels) = compute_levels(close, frame.value(Indicator::Atr, last), latest, &config.risk) {
        println!(
            "{:<10}   stop={:.2} target={:.2}",
            "", levels.stop_loss, levels.take_profit
        );
    }

    Ok(())
}

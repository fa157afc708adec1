//! State command implementation

use anyhow::{Context, Result};
use tracing::info;

use signal_alerts::state_store::SqliteStateStore;
use signal_alerts::{Config, Symbol};

fn open_store(config_path: &str) -> Result<SqliteStateStore> {
    let config = Config::from_file(config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;
    let path = config
        .state_db
        .context("No state database configured (set state_db or ALERT_STATE_DB)")?;
    SqliteStateStore::open(path)
}

pub fn show(config_path: String, json: bool) -> Result<()> {
    let states = open_store(&config_path)?.load_all()?;

    if json {
        println!("{}", serde_json::to_string_pretty(&states)?);
        return Ok(());
    }

    if states.is_empty() {
        println!("No tracked state stored");
        return Ok(());
    }

    println!("{:<12} {:<6} {}", "SYMBOL", "LAST", "UPDATED");
    for state in &states {
        println!(
            "{:<12} {:<6} {}",
            state.symbol, state.last_notified, state.updated_at
        );
    }
    Ok(())
}

pub fn reset(config_path: String, symbol: Option<String>) -> Result<()> {
    let store = open_store(&config_path)?;

    match symbol {
        Some(symbol) => {
            let symbol = Symbol::new(symbol);
            if store.clear(&symbol)? {
                info!(symbol = %symbol, "Tracked state reset");
            } else {
                info!(symbol = %symbol, "No stored state to reset");
            }
        }
        None => {
            let removed = store.clear_all()?;
            info!("Tracked state reset for {} symbols", removed);
        }
    }
    Ok(())
}

//! Configuration management
//!
//! Handles loading and parsing of the JSON configuration file, with
//! environment variable overrides for the webhook endpoint and state database.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::data::{Interval, Lookback};
use crate::frame::IndicatorParams;
use crate::risk::RiskConfig;
use crate::rules::{MessageLine, RuleSet};
use crate::tracker::DeliveryPolicy;
use crate::types::Symbol;

pub const ENV_WEBHOOK_URL: &str = "ALERT_WEBHOOK_URL";
pub const ENV_STATE_DB: &str = "ALERT_STATE_DB";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_symbols")]
    pub symbols: Vec<Symbol>,

    #[serde(default = "default_interval")]
    pub interval: Interval,

    /// Defaults to the interval's minimum lookback
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookback: Option<Lookback>,

    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    #[serde(default)]
    pub ruleset: RuleSet,

    #[serde(default)]
    pub indicators: IndicatorParams,

    #[serde(default)]
    pub risk: RiskConfig,

    #[serde(default)]
    pub notify: NotifyConfig,

    /// SQLite file for last-notified state; in-memory only when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_db: Option<PathBuf>,

    /// Seconds between monitor cycles
    #[serde(default = "default_poll_secs")]
    pub poll_secs: u64,
}

fn default_symbols() -> Vec<Symbol> { vec![Symbol::new("AAPL")] }
fn default_interval() -> Interval { Interval::Day1 }
fn default_data_dir() -> PathBuf { PathBuf::from("data") }
fn default_poll_secs() -> u64 { 300 }

impl Default for Config {
    fn default() -> Self {
        Self {
            symbols: default_symbols(),
            interval: default_interval(),
            lookback: None,
            data_dir: default_data_dir(),
            ruleset: RuleSet::default(),
            indicators: IndicatorParams::default(),
            risk: RiskConfig::default(),
            notify: NotifyConfig::default(),
            state_db: None,
            poll_secs: default_poll_secs(),
        }
    }
}

/// Alert delivery settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotifyConfig {
    #[serde(default)]
    pub policy: DeliveryPolicy,

    /// Alerts go to the log when no webhook is configured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Append a VWAP line to every alert
    #[serde(default)]
    pub include_vwap: bool,
}

fn default_timeout_secs() -> u64 { 10 }

fn is_positive(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

fn is_non_negative(value: f64) -> bool {
    value.is_finite() && value >= 0.0
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            policy: DeliveryPolicy::default(),
            webhook_url: None,
            timeout_secs: default_timeout_secs(),
            include_vwap: false,
        }
    }
}

impl Config {
    /// Load configuration from a JSON file and apply environment overrides
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let mut config = Self::from_json(&contents)?;
        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to parse config JSON")
    }

    /// Override settings from `lookup` (the process environment in production)
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(ENV_WEBHOOK_URL).filter(|v| !v.trim().is_empty()) {
            self.notify.webhook_url = Some(url);
        }
        if let Some(path) = lookup(ENV_STATE_DB).filter(|v| !v.trim().is_empty()) {
            self.state_db = Some(PathBuf::from(path));
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.symbols.is_empty() {
            anyhow::bail!("At least one symbol is required");
        }

        let p = &self.indicators;
        let windows = [
            ("sma_fast", p.sma_fast),
            ("sma_slow", p.sma_slow),
            ("rsi_period", p.rsi_period),
            ("macd_fast", p.macd_fast),
            ("macd_slow", p.macd_slow),
            ("macd_signal", p.macd_signal),
            ("bb_period", p.bb_period),
            ("atr_period", p.atr_period),
            ("stoch_k", p.stoch_k),
            ("stoch_d", p.stoch_d),
            ("adx_period", p.adx_period),
            ("fib_lookback", p.fib_lookback),
        ];
        if let Some((name, _)) = windows.iter().find(|(_, w)| *w == 0) {
            anyhow::bail!("Indicator window '{}' must be positive", name);
        }
        if p.sma_fast >= p.sma_slow {
            anyhow::bail!(
                "sma_fast ({}) must be shorter than sma_slow ({})",
                p.sma_fast,
                p.sma_slow
            );
        }

        if !is_positive(self.risk.atr_multiplier) || !is_positive(self.risk.risk_reward) {
            anyhow::bail!("atr_multiplier and risk_reward must be positive");
        }

        if let RuleSet::Confluence(rule) = &self.ruleset {
            if !is_non_negative(rule.fib_threshold) || !is_non_negative(rule.bollinger_proximity) {
                anyhow::bail!("fib_threshold and bollinger_proximity must be non-negative");
            }
        }

        Ok(())
    }

    /// Configured lookback, widened to the interval's minimum when shorter
    pub fn effective_lookback(&self) -> Lookback {
        let minimum = self.interval.min_lookback();
        match self.lookback {
            Some(lookback) if lookback < minimum => {
                warn!(
                    configured = %lookback,
                    minimum = %minimum,
                    interval = %self.interval,
                    "Lookback too short for interval, widening"
                );
                minimum
            }
            Some(lookback) => lookback,
            None => minimum,
        }
    }

    /// Indicator lines appended to alert bodies
    pub fn message_lines(&self) -> Vec<MessageLine> {
        let mut lines = self.ruleset.message_lines().to_vec();
        if self.notify.include_vwap && !lines.contains(&MessageLine::Vwap) {
            lines.push(MessageLine::Vwap);
        }
        lines
    }
}

//! Risk sizing
//!
//! Stop-loss and take-profit levels from an entry price and ATR:
//! ```text
//! BUY:  stop = entry - atr_multiplier * atr,  target = entry + risk_reward * (entry - stop)
//! SELL: stop = entry + atr_multiplier * atr,  target = entry - risk_reward * (stop - entry)
//! ```
//!
//! Levels only exist for a directional signal with a positive ATR. Nothing is
//! ever fabricated from a zero, negative or undefined volatility measure.

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::types::{Signal, TradeLevels};

/// Configuration for level sizing using builder pattern
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Stop distance in ATR units (default: 1.5)
    #[serde(default = "default_atr_multiplier")]
    pub atr_multiplier: f64,

    /// Target distance as a multiple of the stop distance (default: 2.0)
    #[serde(default = "default_risk_reward")]
    pub risk_reward: f64,
}

fn default_atr_multiplier() -> f64 { 1.5 }
fn default_risk_reward() -> f64 { 2.0 }

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            atr_multiplier: default_atr_multiplier(),
            risk_reward: default_risk_reward(),
        }
    }
}

impl RiskConfig {
    /// Set the stop distance in ATR units
    pub fn with_atr_multiplier(mut self, multiplier: f64) -> Self {
        self.atr_multiplier = multiplier;
        self
    }

    /// Set the reward-to-risk ratio
    pub fn with_risk_reward(mut self, ratio: f64) -> Self {
        self.risk_reward = ratio;
        self
    }
}

/// Compute trade levels for `signal` entered at `entry_price`.
///
/// Returns `None` for HOLD, for an undefined or non-positive ATR, and for an
/// entry price that is not a positive finite number.
pub fn compute_levels(
    entry_price: f64,
    atr: Option<f64>,
    signal: Signal,
    config: &RiskConfig,
) -> Option<TradeLevels> {
    let atr = atr.filter(|a| a.is_finite() && *a > 0.0)?;
    if !entry_price.is_finite() || entry_price <= 0.0 {
        return None;
    }

    let stop_distance = config.atr_multiplier * atr;
    let (stop_loss, take_profit) = match signal {
        Signal::Buy => {
            let stop = entry_price - stop_distance;
            (stop, entry_price + config.risk_reward * (entry_price - stop))
        }
        Signal::Sell => {
            let stop = entry_price + stop_distance;
            (stop, entry_price - config.risk_reward * (stop - entry_price))
        }
        Signal::Hold => return None,
    };

    trace!(
        signal = %signal,
        entry_price,
        atr,
        stop_loss,
        take_profit,
        "Trade levels computed"
    );

    Some(TradeLevels {
        direction: signal,
        entry_price,
        stop_loss,
        take_profit,
    })
}

//! Confluence rule
//!
//! Four factors must agree on the transition bar:
//! - SMA crossover edge
//! - close within `fib_threshold` of a Fibonacci retracement level of the
//!   rolling swing range
//! - close hugging the outer Bollinger band
//! - Stochastic %K crossing %D inside the oversold/overbought zone
//!
//! Persistence is on by default: between edges the engine carries the last
//! signal forward instead of resetting to HOLD.

use serde::{Deserialize, Serialize};

use super::{crossed_above, crossed_below, MessageLine, Rule};
use crate::frame::{Indicator, IndicatorFrame, IndicatorParams};
use crate::indicators::near_fibonacci_level;
use crate::types::{Column, Signal};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfluenceRule {
    /// Max relative distance from a retracement level (default: 0.01)
    #[serde(default = "default_fib_threshold")]
    pub fib_threshold: f64,

    /// Band proximity: BUY at close <= (1 + p) x lower, SELL at close >= (1 - p) x upper
    #[serde(default = "default_bollinger_proximity")]
    pub bollinger_proximity: f64,

    #[serde(default = "default_stoch_oversold")]
    pub stoch_oversold: f64,

    #[serde(default = "default_stoch_overbought")]
    pub stoch_overbought: f64,

    #[serde(default = "default_persistence")]
    pub persistence: bool,
}

fn default_fib_threshold() -> f64 { 0.01 }
fn default_bollinger_proximity() -> f64 { 0.01 }
fn default_stoch_oversold() -> f64 { 20.0 }
fn default_stoch_overbought() -> f64 { 80.0 }
fn default_persistence() -> bool { true }

impl Default for ConfluenceRule {
    fn default() -> Self {
        Self {
            fib_threshold: default_fib_threshold(),
            bollinger_proximity: default_bollinger_proximity(),
            stoch_oversold: default_stoch_oversold(),
            stoch_overbought: default_stoch_overbought(),
            persistence: default_persistence(),
        }
    }
}

impl ConfluenceRule {
    fn near_fibonacci(&self, frame: &IndicatorFrame, index: usize) -> bool {
        match (
            frame.close(index),
            frame.value(Indicator::SwingHigh, index),
            frame.value(Indicator::SwingLow, index),
        ) {
            (Some(close), Some(high), Some(low)) => {
                near_fibonacci_level(close, high, low, self.fib_threshold)
            }
            _ => false,
        }
    }

    fn near_lower_band(&self, frame: &IndicatorFrame, index: usize) -> bool {
        match (frame.close(index), frame.value(Indicator::BollingerLower, index)) {
            (Some(close), Some(lower)) => close <= (1.0 + self.bollinger_proximity) * lower,
            _ => false,
        }
    }

    fn near_upper_band(&self, frame: &IndicatorFrame, index: usize) -> bool {
        match (frame.close(index), frame.value(Indicator::BollingerUpper, index)) {
            (Some(close), Some(upper)) => close >= (1.0 - self.bollinger_proximity) * upper,
            _ => false,
        }
    }

    fn stochastic_buy(&self, frame: &IndicatorFrame, index: usize) -> bool {
        match frame.value(Indicator::StochK, index) {
            Some(k) => {
                k < self.stoch_oversold
                    && crossed_above(frame, Indicator::StochK, Indicator::StochD, index)
            }
            None => false,
        }
    }

    fn stochastic_sell(&self, frame: &IndicatorFrame, index: usize) -> bool {
        match frame.value(Indicator::StochK, index) {
            Some(k) => {
                k > self.stoch_overbought
                    && crossed_below(frame, Indicator::StochK, Indicator::StochD, index)
            }
            None => false,
        }
    }
}

impl Rule for ConfluenceRule {
    fn name(&self) -> &'static str {
        "confluence"
    }

    fn required_columns(&self) -> &'static [Column] {
        &[Column::Close, Column::High, Column::Low]
    }

    fn min_history(&self, params: &IndicatorParams) -> usize {
        let stoch_window = (params.stoch_k + params.stoch_d).saturating_sub(1);
        [params.sma_fast, params.sma_slow, params.bb_period, stoch_window]
            .into_iter()
            .max()
            .unwrap_or(0)
            + 1
    }

    fn persistence(&self) -> bool {
        self.persistence
    }

    fn signal_at(&self, frame: &IndicatorFrame, index: usize) -> Signal {
        if crossed_above(frame, Indicator::SmaFast, Indicator::SmaSlow, index)
            && self.near_fibonacci(frame, index)
            && self.near_lower_band(frame, index)
            && self.stochastic_buy(frame, index)
        {
            return Signal::Buy;
        }

        if crossed_below(frame, Indicator::SmaFast, Indicator::SmaSlow, index)
            && self.near_fibonacci(frame, index)
            && self.near_upper_band(frame, index)
            && self.stochastic_sell(frame, index)
        {
            return Signal::Sell;
        }

        Signal::Hold
    }

    fn message_lines(&self) -> &'static [MessageLine] {
        &[MessageLine::Bollinger, MessageLine::Stochastic, MessageLine::Fibonacci]
    }
}

//! Filtered SMA crossover
//!
//! Edge-triggered. BUY only on the bar where:
//! 1. fast SMA moves from at-or-below to above the slow SMA
//! 2. RSI is oversold
//! 3. MACD crosses from below to above its signal line on the same bar
//!
//! SELL is the mirror (cross down, RSI overbought, MACD crosses down).
//! Every other bar is HOLD.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use super::{crossed_above, crossed_below, orderings, Rule};
use crate::frame::{Indicator, IndicatorFrame, IndicatorParams};
use crate::types::{Column, Signal};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilteredCrossoverRule {
    /// RSI below this confirms a BUY (default: 30)
    #[serde(default = "default_rsi_oversold")]
    pub rsi_oversold: f64,

    /// RSI above this confirms a SELL (default: 70)
    #[serde(default = "default_rsi_overbought")]
    pub rsi_overbought: f64,

    #[serde(default)]
    pub persistence: bool,
}

fn default_rsi_oversold() -> f64 { 30.0 }
fn default_rsi_overbought() -> f64 { 70.0 }

impl Default for FilteredCrossoverRule {
    fn default() -> Self {
        Self {
            rsi_oversold: default_rsi_oversold(),
            rsi_overbought: default_rsi_overbought(),
            persistence: false,
        }
    }
}

impl FilteredCrossoverRule {
    /// MACD strictly below its signal line on the prior bar, strictly above now
    fn macd_crossed_up(frame: &IndicatorFrame, index: usize) -> bool {
        orderings(frame, Indicator::Macd, Indicator::MacdSignal, index)
            == Some((Ordering::Less, Ordering::Greater))
    }

    fn macd_crossed_down(frame: &IndicatorFrame, index: usize) -> bool {
        orderings(frame, Indicator::Macd, Indicator::MacdSignal, index)
            == Some((Ordering::Greater, Ordering::Less))
    }
}

impl Rule for FilteredCrossoverRule {
    fn name(&self) -> &'static str {
        "filtered"
    }

    fn required_columns(&self) -> &'static [Column] {
        &[Column::Close]
    }

    fn min_history(&self, params: &IndicatorParams) -> usize {
        // RSI needs `period` price changes; the MACD signal line is an EMA of
        // a MACD line that is itself only defined after the slow window
        [
            params.sma_fast,
            params.sma_slow,
            params.rsi_period + 1,
            (params.macd_slow + params.macd_signal).saturating_sub(1),
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
            + 1
    }

    fn persistence(&self) -> bool {
        self.persistence
    }

    fn signal_at(&self, frame: &IndicatorFrame, index: usize) -> Signal {
        let rsi = match frame.value(Indicator::Rsi, index) {
            Some(v) => v,
            None => return Signal::Hold,
        };

        if rsi < self.rsi_oversold
            && crossed_above(frame, Indicator::SmaFast, Indicator::SmaSlow, index)
            && Self::macd_crossed_up(frame, index)
        {
            return Signal::Buy;
        }

        if rsi > self.rsi_overbought
            && crossed_below(frame, Indicator::SmaFast, Indicator::SmaSlow, index)
            && Self::macd_crossed_down(frame, index)
        {
            return Signal::Sell;
        }

        Signal::Hold
    }
}

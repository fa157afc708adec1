//! Simple SMA crossover
//!
//! Level-based: BUY while the fast SMA is above the slow SMA, SELL while it is
//! below, HOLD on an exact tie or when either average is undefined. The same
//! signal is re-asserted on every bar the ordering holds; de-duplication is
//! the transition tracker's job.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use super::{compare, Rule};
use crate::frame::{Indicator, IndicatorFrame, IndicatorParams};
use crate::types::{Column, Signal};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleCrossoverRule {
    #[serde(default)]
    pub persistence: bool,
}

impl Default for SimpleCrossoverRule {
    fn default() -> Self {
        Self { persistence: false }
    }
}

impl Rule for SimpleCrossoverRule {
    fn name(&self) -> &'static str {
        "simple"
    }

    fn required_columns(&self) -> &'static [Column] {
        &[Column::Close]
    }

    fn min_history(&self, params: &IndicatorParams) -> usize {
        params.sma_fast.max(params.sma_slow) + 1
    }

    fn persistence(&self) -> bool {
        self.persistence
    }

    fn signal_at(&self, frame: &IndicatorFrame, index: usize) -> Signal {
        match compare(frame, Indicator::SmaFast, Indicator::SmaSlow, index) {
            Some(Ordering::Greater) => Signal::Buy,
            Some(Ordering::Less) => Signal::Sell,
            _ => Signal::Hold,
        }
    }
}

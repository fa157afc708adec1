//! Signal engine
//!
//! Turns an indicator frame into one signal per bar using the selected rule
//! set. Evaluation is pure: no I/O, no shared state, the output depends only
//! on the frame and the rule set, so different instruments can be evaluated
//! concurrently.

use chrono::{DateTime, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::error::EngineError;
use crate::frame::IndicatorFrame;
use crate::rules::RuleSet;
use crate::types::{Signal, Symbol};

/// Per-bar signals aligned with the frame they were computed from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalSeries {
    symbol: Symbol,
    timestamps: Vec<DateTime<Utc>>,
    signals: Vec<Signal>,
}

impl SignalSeries {
    /// All-HOLD series covering every bar of `frame`
    pub fn hold(frame: &IndicatorFrame) -> Self {
        Self {
            symbol: frame.symbol().clone(),
            timestamps: frame.bars().iter().map(|b| b.datetime).collect(),
            signals: vec![Signal::Hold; frame.len()],
        }
    }

    /// Series from already evaluated signals, one per timestamp
    pub fn from_parts(symbol: Symbol, timestamps: Vec<DateTime<Utc>>, signals: Vec<Signal>) -> Self {
        debug_assert_eq!(timestamps.len(), signals.len());
        Self {
            symbol,
            timestamps,
            signals,
        }
    }

    pub fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn signals(&self) -> &[Signal] {
        &self.signals
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Signal> {
        self.signals.get(index).copied()
    }

    /// Signal at the last bar
    pub fn latest(&self) -> Option<Signal> {
        self.signals.last().copied()
    }

    /// Signal at the bar before the last one
    pub fn previous(&self) -> Option<Signal> {
        self.signals.len().checked_sub(2).and_then(|i| self.get(i))
    }

    /// (bar index, new value) at every bar whose signal differs from the bar before
    pub fn transitions(&self) -> Vec<(usize, Signal)> {
        self.signals
            .iter()
            .enumerate()
            .tuple_windows()
            .filter(|((_, prev), (_, cur))| prev != cur)
            .map(|(_, (index, &signal))| (index, signal))
            .collect()
    }
}

/// Stateless evaluator for every rule set
pub struct SignalEngine;

impl SignalEngine {
    /// Evaluate `ruleset` over every bar of `frame`.
    ///
    /// Fails with `MissingColumns` when the series lacks a column the rule set
    /// needs, and with `InsufficientHistory` when the frame is shorter than the
    /// rule set's minimum history. Bars whose indicators are undefined are HOLD.
    pub fn evaluate(frame: &IndicatorFrame, ruleset: &RuleSet) -> Result<SignalSeries, EngineError> {
        let missing = frame.columns().missing(ruleset.required_columns());
        if !missing.is_empty() {
            return Err(EngineError::MissingColumns { missing });
        }

        let required = ruleset.min_history(frame.params());
        if frame.len() < required {
            return Err(EngineError::InsufficientHistory {
                required,
                available: frame.len(),
            });
        }

        let rule = ruleset.rule();
        let persistence = rule.persistence();
        let mut signals = Vec::with_capacity(frame.len());
        let mut carried = Signal::Hold;

        for index in 0..frame.len() {
            let raw = rule.signal_at(frame, index);
            let signal = match raw {
                Signal::Hold if persistence => carried,
                other => other,
            };
            if raw.is_directional() {
                trace!(symbol = %frame.symbol(), index, signal = %raw, "Rule fired");
            }
            signals.push(signal);
            carried = signal;
        }

        let series = SignalSeries {
            symbol: frame.symbol().clone(),
            timestamps: frame.bars().iter().map(|b| b.datetime).collect(),
            signals,
        };

        debug!(
            symbol = %series.symbol,
            ruleset = ruleset.name(),
            bars = series.len(),
            latest = %series.latest().unwrap_or_default(),
            "Signals evaluated"
        );

        Ok(series)
    }

    /// Like [`SignalEngine::evaluate`], but degrades either engine error to an
    /// all-HOLD series.
    pub fn evaluate_or_hold(frame: &IndicatorFrame, ruleset: &RuleSet) -> SignalSeries {
        match Self::evaluate(frame, ruleset) {
            Ok(series) => series,
            Err(e) => {
                warn!(
                    symbol = %frame.symbol(),
                    ruleset = ruleset.name(),
                    error = %e,
                    "Falling back to HOLD"
                );
                SignalSeries::hold(frame)
            }
        }
    }
}

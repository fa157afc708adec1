//! Signal rule sets
//!
//! Three tiers of increasing strictness behind one entry point:
//! - `simple`: level-based SMA ordering
//! - `filtered`: SMA crossover edge confirmed by RSI and a MACD cross
//! - `confluence`: SMA edge + Fibonacci + Bollinger + Stochastic, persisting
//!   the last signal between edges
//!
//! A rule only produces the raw per-bar signal. Persistence (carry the previous
//! bar's signal forward when the rule is silent) is applied by the engine from
//! the rule's `persistence` flag.

pub mod confluence;
pub mod filtered_crossover;
pub mod simple_crossover;

pub use confluence::ConfluenceRule;
pub use filtered_crossover::FilteredCrossoverRule;
pub use simple_crossover::SimpleCrossoverRule;

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::frame::{Indicator, IndicatorFrame, IndicatorParams};
use crate::types::{Column, Signal};

// =============================================================================
// Rule Trait
// =============================================================================

/// Optional indicator lines a rule set adds to alert messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLine {
    Bollinger,
    Stochastic,
    Fibonacci,
    Vwap,
}

/// Contract every rule set implements
pub trait Rule: Send + Sync {
    /// Identifier used in configuration
    fn name(&self) -> &'static str;

    /// Bar columns the rule cannot work without
    fn required_columns(&self) -> &'static [Column];

    /// Longest indicator window used plus one bar of crossover lookback
    fn min_history(&self, params: &IndicatorParams) -> usize;

    /// Carry the previous bar's signal forward when no new signal fires
    fn persistence(&self) -> bool;

    /// Raw signal at bar `index`. Reads only bars `index - 1` and `index`.
    fn signal_at(&self, frame: &IndicatorFrame, index: usize) -> Signal;

    /// Extra indicator lines for alert messages
    fn message_lines(&self) -> &'static [MessageLine] {
        &[]
    }
}

// =============================================================================
// RuleSet - tagged variant with one evaluate path
// =============================================================================

/// Selectable rule set, tagged by `"name"` in configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum RuleSet {
    Simple(SimpleCrossoverRule),
    Filtered(FilteredCrossoverRule),
    Confluence(ConfluenceRule),
}

impl RuleSet {
    /// Rule set with default parameters by configuration name
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "simple" => Some(RuleSet::Simple(SimpleCrossoverRule::default())),
            "filtered" => Some(RuleSet::Filtered(FilteredCrossoverRule::default())),
            "confluence" => Some(RuleSet::Confluence(ConfluenceRule::default())),
            _ => None,
        }
    }

    /// Names accepted by [`RuleSet::from_name`]
    pub fn available() -> &'static [&'static str] {
        &["simple", "filtered", "confluence"]
    }

    pub fn rule(&self) -> &dyn Rule {
        match self {
            RuleSet::Simple(rule) => rule,
            RuleSet::Filtered(rule) => rule,
            RuleSet::Confluence(rule) => rule,
        }
    }

    pub fn name(&self) -> &'static str {
        self.rule().name()
    }

    pub fn min_history(&self, params: &IndicatorParams) -> usize {
        self.rule().min_history(params)
    }

    pub fn required_columns(&self) -> &'static [Column] {
        self.rule().required_columns()
    }

    pub fn persistence(&self) -> bool {
        self.rule().persistence()
    }

    pub fn message_lines(&self) -> &'static [MessageLine] {
        self.rule().message_lines()
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        RuleSet::Simple(SimpleCrossoverRule::default())
    }
}

// =============================================================================
// Shared helpers
// =============================================================================

/// Ordering of `a` against `b` at `index`; `None` when either is undefined
pub(crate) fn compare(
    frame: &IndicatorFrame,
    a: Indicator,
    b: Indicator,
    index: usize,
) -> Option<Ordering> {
    let a = frame.value(a, index)?;
    let b = frame.value(b, index)?;
    a.partial_cmp(&b)
}

/// (previous bar ordering, current bar ordering) of `a` against `b`
pub(crate) fn orderings(
    frame: &IndicatorFrame,
    a: Indicator,
    b: Indicator,
    index: usize,
) -> Option<(Ordering, Ordering)> {
    let prev = index.checked_sub(1)?;
    Some((compare(frame, a, b, prev)?, compare(frame, a, b, index)?))
}

/// `a` moved from at-or-below `b` to strictly above it on this bar
pub(crate) fn crossed_above(frame: &IndicatorFrame, a: Indicator, b: Indicator, index: usize) -> bool {
    matches!(
        orderings(frame, a, b, index),
        Some((prev, Ordering::Greater)) if prev != Ordering::Greater
    )
}

/// `a` moved from at-or-above `b` to strictly below it on this bar
pub(crate) fn crossed_below(frame: &IndicatorFrame, a: Indicator, b: Indicator, index: usize) -> bool {
    matches!(
        orderings(frame, a, b, index),
        Some((prev, Ordering::Less)) if prev != Ordering::Less
    )
}

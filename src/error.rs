//! Error types for the signal engine, series construction and notification delivery

use chrono::{DateTime, Utc};
use itertools::Itertools;
use thiserror::Error;

use crate::types::Column;

/// Conditions that stop a rule set from producing signals for a frame.
///
/// Both are recoverable by the caller: wait for more data, widen the lookback,
/// or pick a different interval.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("insufficient history: {required} bars required, {available} available")]
    InsufficientHistory { required: usize, available: usize },

    #[error("missing columns: {}", .missing.iter().join(", "))]
    MissingColumns { missing: Vec<Column> },
}

/// Errors raised while building a [`crate::Series`]
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SeriesError {
    #[error("bar {index} at {current} is not after previous bar at {previous}")]
    NotAscending {
        index: usize,
        previous: DateTime<Utc>,
        current: DateTime<Utc>,
    },

    #[error("bar {index} has invalid close price {close}")]
    InvalidClose { index: usize, close: f64 },

    #[error("indicator {indicator} has {actual} values for {expected} bars")]
    IndicatorLength {
        indicator: &'static str,
        expected: usize,
        actual: usize,
    },
}

/// Unrecognised configuration values
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("unknown interval '{0}' (expected one of 1m, 5m, 15m, 1h, 1d, 1wk, 1mo)")]
    Interval(String),

    #[error("unknown lookback '{0}' (expected one of 5d, 1mo, 3mo, 6mo, 1y, 2y, 5y, max)")]
    Lookback(String),
}

/// Errors from a [`crate::notify::Notifier`]
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("notification rejected with status {status}")]
    Rejected { status: u16 },

    #[error("notifier misconfigured: {0}")]
    Config(String),
}

impl From<reqwest::Error> for NotifyError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_columns_message() {
        let err = EngineError::MissingColumns {
            missing: vec![Column::High, Column::Low],
        };
        assert_eq!(err.to_string(), "missing columns: high, low");
    }

    #[test]
    fn test_insufficient_history_message() {
        let err = EngineError::InsufficientHistory {
            required: 31,
            available: 20,
        };
        assert_eq!(
            err.to_string(),
            "insufficient history: 31 bars required, 20 available"
        );
    }
}

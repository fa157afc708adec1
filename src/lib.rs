//! Signal Alerts
//!
//! Indicator-driven BUY/SELL signal engine: three selectable rule sets,
//! per-instrument de-duplication of alerts, and ATR-based stop-loss and
//! take-profit levels.

pub mod config;
pub mod data;
pub mod engine;
pub mod error;
pub mod frame;
pub mod indicators;
pub mod monitor;
pub mod notify;
pub mod risk;
pub mod rules;
pub mod state_store;
pub mod tracker;
pub mod types;

pub use config::Config;
pub use engine::{SignalEngine, SignalSeries};
pub use error::{EngineError, NotifyError, SeriesError};
pub use frame::{Indicator, IndicatorFrame, IndicatorParams, IndicatorSnapshot};
pub use rules::RuleSet;
pub use tracker::{AlertEvent, DeliveryPolicy, TrackedState, TransitionTracker};
pub use types::*;

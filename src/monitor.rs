//! Monitor: one evaluation cycle over every configured instrument
//!
//! Per instrument: fetch -> indicators -> signals -> transition check ->
//! levels -> notify -> persist. Instruments are evaluated in parallel and in
//! isolation; a data or engine failure for one never stops the others.

use anyhow::Result;
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::data::{CsvDataSource, DataSource};
use crate::engine::SignalEngine;
use crate::error::EngineError;
use crate::frame::{Indicator, IndicatorFrame};
use crate::notify::{render_body, render_subject, LogNotifier, Notifier, WebhookNotifier};
use crate::risk::compute_levels;
use crate::rules::MessageLine;
use crate::state_store::SqliteStateStore;
use crate::tracker::{AlertEvent, DeliveryPolicy, TransitionTracker};
use crate::types::{Signal, Symbol, TradeLevels};

/// What happened to one instrument in a cycle
#[derive(Debug)]
pub enum SymbolOutcome {
    /// Evaluated; nothing new to report
    Quiet { signal: Signal },
    /// New transitions fired, oldest bar first
    Alerted { alerts: Vec<RaisedAlert> },
    /// Not enough data for the rule set
    Degraded { reason: EngineError },
    /// Data could not be fetched
    Failed { error: String },
}

/// An alert raised in a cycle and whether the notifier accepted it
#[derive(Debug)]
pub struct RaisedAlert {
    pub event: AlertEvent,
    pub levels: Option<TradeLevels>,
    pub delivered: bool,
}

#[derive(Debug)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub outcomes: Vec<(Symbol, SymbolOutcome)>,
}

impl CycleReport {
    pub fn alerts(&self) -> impl Iterator<Item = &AlertEvent> {
        self.outcomes
            .iter()
            .filter_map(|(_, o)| match o {
                SymbolOutcome::Alerted { alerts } => Some(alerts),
                _ => None,
            })
            .flatten()
            .map(|alert| &alert.event)
    }

    pub fn alert_count(&self) -> usize {
        self.alerts().count()
    }

    pub fn failure_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, o)| matches!(o, SymbolOutcome::Failed { .. } | SymbolOutcome::Degraded { .. }))
            .count()
    }

    pub fn outcome(&self, symbol: &Symbol) -> Option<&SymbolOutcome> {
        self.outcomes
            .iter()
            .find(|(s, _)| s == symbol)
            .map(|(_, o)| o)
    }
}

pub struct Monitor {
    config: Config,
    message_lines: Vec<MessageLine>,
    source: Arc<dyn DataSource>,
    notifier: Arc<dyn Notifier>,
    tracker: TransitionTracker,
    store: Option<SqliteStateStore>,
}

impl Monitor {
    pub fn new(config: Config, source: Arc<dyn DataSource>, notifier: Arc<dyn Notifier>) -> Self {
        let tracker = TransitionTracker::new(config.notify.policy);
        Self {
            message_lines: config.message_lines(),
            config,
            source,
            notifier,
            tracker,
            store: None,
        }
    }

    /// Monitor wired from configuration: CSV data, webhook or log notifier,
    /// and the SQLite store when `state_db` is set.
    pub fn from_config(config: Config) -> Result<Self> {
        let source: Arc<dyn DataSource> = Arc::new(CsvDataSource::new(&config.data_dir));
        let notifier: Arc<dyn Notifier> = match &config.notify.webhook_url {
            Some(url) => Arc::new(WebhookNotifier::new(
                url.clone(),
                Duration::from_secs(config.notify.timeout_secs),
            )?),
            None => Arc::new(LogNotifier),
        };
        let store = config
            .state_db
            .as_ref()
            .map(SqliteStateStore::open)
            .transpose()?;

        let monitor = Self::new(config, source, notifier);
        match store {
            Some(store) => monitor.with_store(store),
            None => Ok(monitor),
        }
    }

    /// Attach a state store and seed the tracker from it
    pub fn with_store(mut self, store: SqliteStateStore) -> Result<Self> {
        let states = store.load_all()?;
        for state in &states {
            if self.config.symbols.contains(&state.symbol) {
                self.tracker
                    .restore(state.symbol.clone(), state.last_notified);
            }
        }
        info!(restored = states.len(), "Tracker restored from state store");
        self.store = Some(store);
        Ok(self)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn tracker(&self) -> &TransitionTracker {
        &self.tracker
    }

    pub fn store(&self) -> Option<&SqliteStateStore> {
        self.store.as_ref()
    }

    pub fn notifier_name(&self) -> &'static str {
        self.notifier.name()
    }

    /// Evaluate every configured instrument once
    pub fn run_cycle(&self) -> CycleReport {
        let started_at = Utc::now();

        let outcomes: Vec<(Symbol, SymbolOutcome)> = self
            .config
            .symbols
            .par_iter()
            .map(|symbol| (symbol.clone(), self.process_symbol(symbol)))
            .collect();

        let report = CycleReport {
            started_at,
            outcomes,
        };
        info!(
            symbols = report.outcomes.len(),
            alerts = report.alert_count(),
            failures = report.failure_count(),
            "Cycle complete"
        );
        report
    }

    fn process_symbol(&self, symbol: &Symbol) -> SymbolOutcome {
        let series = match self.source.fetch(
            symbol,
            self.config.effective_lookback(),
            self.config.interval,
        ) {
            Ok(series) => series,
            Err(e) => {
                error!(symbol = %symbol, "Data fetch failed: {:#}", e);
                return SymbolOutcome::Failed {
                    error: format!("{:#}", e),
                };
            }
        };

        let frame = IndicatorFrame::compute(&series, &self.config.indicators);
        let signals = match SignalEngine::evaluate(&frame, &self.config.ruleset) {
            Ok(signals) => signals,
            Err(reason) => {
                warn!(symbol = %symbol, %reason, "Signal evaluation degraded");
                return SymbolOutcome::Degraded { reason };
            }
        };

        let events = self.tracker.observe_series(&signals, &frame);
        if events.is_empty() {
            return SymbolOutcome::Quiet {
                signal: signals.latest().unwrap_or_default(),
            };
        }

        SymbolOutcome::Alerted {
            alerts: events.into_iter().map(|event| self.deliver(event)).collect(),
        }
    }

    fn deliver(&self, event: AlertEvent) -> RaisedAlert {
        let levels = compute_levels(
            event.snapshot.close,
            event.snapshot.get(Indicator::Atr),
            event.signal,
            &self.config.risk,
        );

        let subject = render_subject(&event);
        let body = render_body(
            &event,
            levels.as_ref(),
            &self.config.indicators,
            &self.message_lines,
        );

        info!(
            symbol = %event.symbol,
            signal = %event.signal,
            price = event.snapshot.close,
            notifier = self.notifier.name(),
            "Alert raised"
        );

        let delivered = match self.notifier.send(&subject, &body) {
            Ok(()) => true,
            Err(e) => {
                error!(symbol = %event.symbol, "Alert delivery failed: {}", e);
                false
            }
        };

        if delivered && self.tracker.policy() == DeliveryPolicy::AdvanceOnDelivery {
            self.tracker.confirm_delivery(&event.symbol, event.signal);
        }

        self.persist(&event.symbol);

        RaisedAlert {
            event,
            levels,
            delivered,
        }
    }

    fn persist(&self, symbol: &Symbol) {
        let (Some(store), Some(state)) = (&self.store, self.tracker.state(symbol)) else {
            return;
        };
        if let Err(e) = store.save(symbol, state.last_notified) {
            warn!(symbol = %symbol, "Failed to persist tracked state: {:#}", e);
        }
    }
}

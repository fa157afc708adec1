//! Transition tracker
//!
//! Keeps the last notified signal per instrument and decides, for each bar
//! not seen before, whether its signal is a new transition worth alerting on.
//! An alert fires when a bar's signal differs from the previous bar's,
//! differs from the last notified value, and is not HOLD. The first
//! observation of an instrument only establishes the baseline; re-polling a
//! bar that was already seen never fires.
//!
//! State is keyed per instrument behind its own lock, so concurrent cycles
//! over different instruments never share or clobber a last-notified value.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use tracing::debug;

use crate::engine::SignalSeries;
use crate::frame::{IndicatorFrame, IndicatorSnapshot};
use crate::types::{Signal, Symbol};

/// When the last-notified value advances after an alert fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryPolicy {
    /// Advance as soon as the alert fires, before delivery is attempted
    #[default]
    AdvanceAlways,
    /// Advance only once delivery is confirmed; undelivered alerts stay pending
    AdvanceOnDelivery,
}

/// Per-instrument tracker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TrackedState {
    pub last_notified: Signal,
    /// False until the first observation has set the baseline
    pub initialized: bool,
    /// Timestamp of the newest bar observed so far
    pub last_seen: Option<DateTime<Utc>>,
    /// Fired but not yet confirmed (AdvanceOnDelivery only)
    pub pending: Option<Signal>,
}

impl TrackedState {
    /// State seeded from a persisted last-notified value
    pub fn restored(last_notified: Signal) -> Self {
        Self {
            last_notified,
            initialized: true,
            last_seen: None,
            pending: None,
        }
    }

    /// Whether the bar at `datetime` has already been observed
    pub fn has_seen(&self, datetime: DateTime<Utc>) -> bool {
        self.last_seen.is_some_and(|seen| datetime <= seen)
    }

    /// Feed one bar. Returns the signal when the bar carries a new transition;
    /// mutates the state when it does.
    ///
    /// Bars at or before `last_seen` are ignored.
    pub fn observe(
        &mut self,
        datetime: DateTime<Utc>,
        latest: Signal,
        previous: Option<Signal>,
        policy: DeliveryPolicy,
    ) -> Option<Signal> {
        if self.has_seen(datetime) {
            return None;
        }
        self.last_seen = Some(datetime);

        if !self.initialized {
            self.initialized = true;
            return None;
        }

        if self.pending.is_some_and(|pending| pending != latest) {
            self.pending = None;
        }

        let previous = previous?;
        let fires = previous != latest
            && latest != self.last_notified
            && self.pending != Some(latest)
            && latest.is_directional();
        if !fires {
            return None;
        }

        match policy {
            DeliveryPolicy::AdvanceAlways => self.last_notified = latest,
            DeliveryPolicy::AdvanceOnDelivery => self.pending = Some(latest),
        }
        Some(latest)
    }

    /// Undelivered alert still standing at `latest`, to be raised again
    pub fn retry(&self, latest: Signal) -> Option<Signal> {
        self.pending.filter(|&pending| pending == latest)
    }

    /// Mark a pending alert as delivered. Returns false when nothing matched.
    pub fn confirm(&mut self, signal: Signal) -> bool {
        if self.pending == Some(signal) {
            self.last_notified = signal;
            self.pending = None;
            true
        } else {
            false
        }
    }
}

/// A new, not yet notified transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub symbol: Symbol,
    pub signal: Signal,
    pub datetime: DateTime<Utc>,
    pub snapshot: IndicatorSnapshot,
}

impl AlertEvent {
    fn new(symbol: &Symbol, signal: Signal, snapshot: IndicatorSnapshot) -> Self {
        Self {
            symbol: symbol.clone(),
            signal,
            datetime: snapshot.datetime,
            snapshot,
        }
    }
}

/// Owns one [`TrackedState`] per instrument
#[derive(Debug, Default)]
pub struct TransitionTracker {
    policy: DeliveryPolicy,
    states: RwLock<HashMap<Symbol, Arc<Mutex<TrackedState>>>>,
}

fn lock(state: &Mutex<TrackedState>) -> MutexGuard<'_, TrackedState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn log_alert(state: &TrackedState, event: &AlertEvent) {
    debug!(
        symbol = %event.symbol,
        signal = %event.signal,
        bar = %event.datetime,
        last_notified = %state.last_notified,
        pending = state.pending.is_some(),
        "Transition detected"
    );
}

impl TransitionTracker {
    pub fn new(policy: DeliveryPolicy) -> Self {
        Self {
            policy,
            states: RwLock::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> DeliveryPolicy {
        self.policy
    }

    fn entry(&self, symbol: &Symbol) -> Arc<Mutex<TrackedState>> {
        {
            let states = self.states.read().unwrap_or_else(|p| p.into_inner());
            if let Some(state) = states.get(symbol) {
                return Arc::clone(state);
            }
        }

        let mut states = self.states.write().unwrap_or_else(|p| p.into_inner());
        Arc::clone(states.entry(symbol.clone()).or_default())
    }

    /// Observe one bar for `symbol`: its signal and the previous bar's.
    ///
    /// `snapshot` is the bar's indicator snapshot; its timestamp identifies
    /// the bar. A pending undelivered alert that still stands is raised again
    /// even when the bar was already seen.
    pub fn observe(
        &self,
        symbol: &Symbol,
        latest: Signal,
        previous: Option<Signal>,
        snapshot: &IndicatorSnapshot,
    ) -> Option<AlertEvent> {
        let entry = self.entry(symbol);
        let mut state = lock(&entry);

        let signal = state
            .observe(snapshot.datetime, latest, previous, self.policy)
            .or_else(|| state.retry(latest))?;

        let event = AlertEvent::new(symbol, signal, snapshot.clone());
        log_alert(&state, &event);
        Some(event)
    }

    /// Observe every bar of an evaluated series newer than the last one seen,
    /// oldest first, returning one event per transition.
    ///
    /// On a cold start or after a restore only the last bar is observed.
    pub fn observe_series(&self, signals: &SignalSeries, frame: &IndicatorFrame) -> Vec<AlertEvent> {
        let Some(latest) = signals.latest() else {
            return Vec::new();
        };
        let symbol = signals.symbol();
        let timestamps = signals.timestamps();

        let entry = self.entry(symbol);
        let mut state = lock(&entry);

        let start = match state.last_seen {
            Some(seen) => timestamps.partition_point(|t| *t <= seen),
            None => signals.len() - 1,
        };

        let mut events = Vec::new();
        for index in start..signals.len() {
            let Some(current) = signals.get(index) else {
                break;
            };
            let previous = index.checked_sub(1).and_then(|p| signals.get(p));
            if let Some(signal) = state.observe(timestamps[index], current, previous, self.policy) {
                if let Some(snapshot) = frame.snapshot(index) {
                    events.push(AlertEvent::new(symbol, signal, snapshot));
                }
            }
        }

        if events.is_empty() {
            let retried = state
                .retry(latest)
                .zip(frame.snapshot(signals.len() - 1));
            if let Some((signal, snapshot)) = retried {
                events.push(AlertEvent::new(symbol, signal, snapshot));
            }
        }

        for event in &events {
            log_alert(&state, event);
        }
        events
    }

    /// Confirm delivery of a pending alert (AdvanceOnDelivery)
    pub fn confirm_delivery(&self, symbol: &Symbol, signal: Signal) -> bool {
        let state = self.entry(symbol);
        let confirmed = lock(&state).confirm(signal);
        confirmed
    }

    pub fn state(&self, symbol: &Symbol) -> Option<TrackedState> {
        let states = self.states.read().unwrap_or_else(|p| p.into_inner());
        states.get(symbol).map(|s| *lock(s))
    }

    /// Every tracked instrument, ordered by symbol
    pub fn states(&self) -> Vec<(Symbol, TrackedState)> {
        let states = self.states.read().unwrap_or_else(|p| p.into_inner());
        let mut all: Vec<_> = states
            .iter()
            .map(|(symbol, state)| (symbol.clone(), *lock(state)))
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Seed an instrument from persisted state
    pub fn restore(&self, symbol: Symbol, last_notified: Signal) {
        let mut states = self.states.write().unwrap_or_else(|p| p.into_inner());
        states.insert(
            symbol,
            Arc::new(Mutex::new(TrackedState::restored(last_notified))),
        );
    }

    /// Forget one instrument; its next observation is a cold start again
    pub fn reset(&self, symbol: &Symbol) -> bool {
        let mut states = self.states.write().unwrap_or_else(|p| p.into_inner());
        states.remove(symbol).is_some()
    }

    pub fn reset_all(&self) {
        let mut states = self.states.write().unwrap_or_else(|p| p.into_inner());
        states.clear();
    }

    pub fn len(&self) -> usize {
        self.states.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

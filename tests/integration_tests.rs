//! Integration tests for the signal-alerts system
//!
//! These tests verify that data loading, indicators, rule sets, the tracker,
//! risk sizing and the monitor work together correctly.

use chrono::{DateTime, Duration, TimeZone, Utc};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use signal_alerts::data::{CsvDataSource, DataSource, Interval, Lookback};
use signal_alerts::monitor::{Monitor, SymbolOutcome};
use signal_alerts::risk::{compute_levels, RiskConfig};
use signal_alerts::rules::{ConfluenceRule, FilteredCrossoverRule, SimpleCrossoverRule};
use signal_alerts::{
    Bar, Column, Columns, Config, DeliveryPolicy, EngineError, Indicator, IndicatorFrame,
    IndicatorParams, RuleSet, Series, Signal, SignalEngine, SignalSeries, Symbol,
    TransitionTracker,
};

// =============================================================================
// Test Utilities
// =============================================================================

fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 1, 2, 0, 0, 0).unwrap()
}

/// Daily bars around the given closes
fn bars_from_closes(closes: &[f64]) -> Vec<Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let spread = close * 0.01;
            Bar::new(
                start_time() + Duration::days(i as i64),
                close - spread * 0.3,
                close + spread,
                close - spread,
                close,
                1000.0 + i as f64 * 10.0,
            )
            .unwrap()
        })
        .collect()
}

fn series(symbol: &str, closes: &[f64]) -> Series {
    Series::new(
        Symbol::new(symbol),
        Interval::Day1,
        bars_from_closes(closes),
        Columns::ALL,
    )
    .unwrap()
}

/// Steady decline followed by a sharper recovery
fn generate_reversal_closes(count: usize, base_price: f64) -> Vec<f64> {
    let turn = count / 2;
    (0..count)
        .map(|i| {
            if i < turn {
                base_price - i as f64 * 0.8
            } else {
                base_price - turn as f64 * 0.8 + (i - turn) as f64 * 1.6
            }
        })
        .collect()
}

/// Flat prices: every moving average ties
fn generate_flat_closes(count: usize, price: f64) -> Vec<f64> {
    vec![price; count]
}

/// Reversal closes and the index of the first BUY bar of the simple rule
fn reversal_with_buy(count: usize) -> (Vec<f64>, usize) {
    let closes = generate_reversal_closes(count, 150.0);
    let (signals, _) = evaluated("TMP", &closes, &RuleSet::default());
    let (index, _) = signals
        .transitions()
        .into_iter()
        .find(|(_, s)| *s == Signal::Buy)
        .expect("reversal produces a BUY crossover");
    (closes, index)
}

fn evaluated(symbol: &str, closes: &[f64], ruleset: &RuleSet) -> (SignalSeries, IndicatorFrame) {
    let frame = IndicatorFrame::compute(&series(symbol, closes), &IndicatorParams::default());
    let signals = SignalEngine::evaluate(&frame, ruleset).unwrap();
    (signals, frame)
}

/// Flat base, an old dip to 60 and a spike 30 bars before the end, then a
/// step up and a three-bar drop onto the 78.6% retracement. The spike leaving
/// the slow window lifts the fast SMA over the slow one on the last bar while
/// the close sits on the lower band with %K turning up from oversold.
fn confluence_buy_closes() -> Vec<f64> {
    let wobble = |i: usize, level: f64, amplitude: f64| {
        if i % 2 == 1 { level + amplitude } else { level - amplitude }
    };

    let mut closes: Vec<f64> = (0..40).map(|i| wobble(i, 100.0, 0.5)).collect();
    closes.extend((0..19).map(|i| if i == 9 { 60.0 } else { wobble(i, 100.0, 0.5) }));
    closes.push(120.0);
    closes.extend((0..20).map(|i| wobble(i, 96.0, 0.3)));
    closes.extend((0..7).map(|i| wobble(i, 99.0, 0.3)));
    closes.extend([91.0, 89.0, 90.0]);
    closes
}

fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!(
        "signal_alerts_it_{}_{}",
        name,
        std::process::id()
    ));
    fs::create_dir_all(&dir).unwrap();
    dir
}

fn write_csv(dir: &Path, symbol: &str, closes: &[f64]) {
    let mut content = String::from("Date,Open,High,Low,Close,Volume\n");
    for bar in bars_from_closes(closes) {
        content.push_str(&format!(
            "{},{},{},{},{},{}\n",
            bar.datetime.format("%Y-%m-%d"),
            bar.open,
            bar.high,
            bar.low,
            bar.close,
            bar.volume
        ));
    }
    fs::write(dir.join(format!("{}_1d.csv", symbol)), content).unwrap();
}

// =============================================================================
// Engine Properties
// =============================================================================

/// Fast SMA below slow for 10 bars, then above for 30; RSI oversold throughout
/// and MACD crossing its signal line on the same bar as the SMAs.
fn sustained_uptrend_frame() -> IndicatorFrame {
    let n = 40;
    let above = |i: usize| i >= 10;
    let column = |f: &dyn Fn(usize) -> f64| (0..n).map(|i| Some(f(i))).collect::<Vec<_>>();

    let mut values = BTreeMap::new();
    values.insert(Indicator::SmaFast, column(&|i| if above(i) { 105.0 } else { 95.0 }));
    values.insert(Indicator::SmaSlow, column(&|_| 100.0));
    values.insert(Indicator::Rsi, column(&|_| 25.0));
    values.insert(Indicator::Macd, column(&|i| if above(i) { 1.0 } else { -1.0 }));
    values.insert(Indicator::MacdSignal, column(&|_| 0.0));

    IndicatorFrame::from_columns(
        series("TREND", &generate_flat_closes(n, 100.0)),
        IndicatorParams::default(),
        values,
    )
    .unwrap()
}

#[test]
fn test_simple_reasserts_while_filtered_fires_once() {
    let frame = sustained_uptrend_frame();

    let simple = SignalEngine::evaluate(&frame, &RuleSet::Simple(SimpleCrossoverRule::default()))
        .unwrap();
    assert!(simple.signals()[10..].iter().all(|s| *s == Signal::Buy));

    let filtered =
        SignalEngine::evaluate(&frame, &RuleSet::Filtered(FilteredCrossoverRule::default()))
            .unwrap();
    assert_eq!(filtered.get(10), Some(Signal::Buy));
    assert!(filtered.signals()[11..].iter().all(|s| *s == Signal::Hold));
    assert_eq!(filtered.transitions(), vec![(10, Signal::Buy), (11, Signal::Hold)]);
}

#[test]
fn test_evaluate_is_bit_identical_across_runs() {
    let frame = IndicatorFrame::compute(
        &series("IDEM", &generate_reversal_closes(150, 200.0)),
        &IndicatorParams::default(),
    );

    for name in RuleSet::available() {
        let ruleset = RuleSet::from_name(name).unwrap();
        let a = SignalEngine::evaluate(&frame, &ruleset).unwrap();
        let b = SignalEngine::evaluate(&frame, &ruleset).unwrap();
        assert_eq!(a, b);
    }
}

#[test]
fn test_short_series_never_fabricates_signals() {
    let params = IndicatorParams::default();
    let frame = IndicatorFrame::compute(&series("SHORT", &generate_reversal_closes(20, 100.0)), &params);

    for name in RuleSet::available() {
        let ruleset = RuleSet::from_name(name).unwrap();
        assert_eq!(
            SignalEngine::evaluate(&frame, &ruleset).unwrap_err(),
            EngineError::InsufficientHistory {
                required: ruleset.min_history(&params),
                available: 20
            }
        );
        let degraded = SignalEngine::evaluate_or_hold(&frame, &ruleset);
        assert!(degraded.signals().iter().all(|s| *s == Signal::Hold));
    }
}

#[test]
fn test_flat_prices_hold() {
    let frame = IndicatorFrame::compute(
        &series("FLAT", &generate_flat_closes(60, 50.0)),
        &IndicatorParams::default(),
    );
    let signals = SignalEngine::evaluate(&frame, &RuleSet::default()).unwrap();
    assert!(signals.signals().iter().all(|s| *s == Signal::Hold));
}

#[test]
fn test_close_only_data_rejects_confluence() {
    let dir = temp_dir("close_only");
    let mut content = String::from("date,close\n");
    for (i, close) in generate_reversal_closes(80, 100.0).iter().enumerate() {
        content.push_str(&format!(
            "{},{}\n",
            (start_time() + Duration::days(i as i64)).format("%Y-%m-%d"),
            close
        ));
    }
    fs::write(dir.join("IDX_1d.csv"), content).unwrap();

    let series = CsvDataSource::new(&dir)
        .fetch(&Symbol::new("IDX"), Lookback::Max, Interval::Day1)
        .unwrap();
    let frame = IndicatorFrame::compute(&series, &IndicatorParams::default());

    let err = SignalEngine::evaluate(&frame, &RuleSet::Confluence(ConfluenceRule::default()))
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::MissingColumns {
            missing: vec![Column::High, Column::Low]
        }
    );
    assert!(SignalEngine::evaluate(&frame, &RuleSet::default()).is_ok());

    fs::remove_dir_all(dir).ok();
}

// =============================================================================
// Tracker Properties
// =============================================================================

#[test]
fn test_tracker_over_evaluated_series() {
    let (closes, buy) = reversal_with_buy(120);
    let tracker = TransitionTracker::new(DeliveryPolicy::AdvanceAlways);

    // Cold start: the first observation is only a baseline, and re-polling
    // the same bars stays silent
    let (signals, frame) = evaluated("AAPL", &closes[..buy], &RuleSet::default());
    assert!(tracker.observe_series(&signals, &frame).is_empty());
    assert!(tracker.observe_series(&signals, &frame).is_empty());

    let (signals, frame) = evaluated("AAPL", &closes[..=buy], &RuleSet::default());
    let alerts = tracker.observe_series(&signals, &frame);
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].signal, Signal::Buy);
    assert_eq!(alerts[0].datetime, *signals.timestamps().last().unwrap());
    assert_eq!(alerts[0].snapshot.close, closes[buy]);
    assert!(alerts[0].snapshot.get(Indicator::SmaSlow).is_some());

    assert!(tracker.observe_series(&signals, &frame).is_empty());
}

#[test]
fn test_cold_start_on_transition_bar_never_alerts() {
    let (closes, buy) = reversal_with_buy(120);
    let (signals, frame) = evaluated("AAPL", &closes[..=buy], &RuleSet::default());
    let tracker = TransitionTracker::new(DeliveryPolicy::AdvanceAlways);

    for _ in 0..3 {
        assert!(tracker.observe_series(&signals, &frame).is_empty());
    }
    assert_eq!(tracker.state(&Symbol::new("AAPL")).unwrap().last_notified, Signal::Hold);
}

/// Fast SMA below slow, above on bar 35 only, below again afterwards
fn whipsaw_frame() -> IndicatorFrame {
    let n = 40;
    let column = |f: &dyn Fn(usize) -> f64| (0..n).map(|i| Some(f(i))).collect::<Vec<_>>();

    let mut values = BTreeMap::new();
    values.insert(Indicator::SmaFast, column(&|i| if i == 35 { 105.0 } else { 95.0 }));
    values.insert(Indicator::SmaSlow, column(&|_| 100.0));

    IndicatorFrame::from_columns(
        series("WHIP", &generate_flat_closes(n, 100.0)),
        IndicatorParams::default(),
        values,
    )
    .unwrap()
}

#[test]
fn test_transitions_between_polls_are_all_reported() {
    let tracker = TransitionTracker::new(DeliveryPolicy::AdvanceAlways);
    let full = SignalEngine::evaluate(&whipsaw_frame(), &RuleSet::default()).unwrap();
    let poll = |bars: usize| {
        let signals = SignalSeries::from_parts(
            Symbol::new("WHIP"),
            full.timestamps()[..bars].to_vec(),
            full.signals()[..bars].to_vec(),
        );
        tracker.observe_series(&signals, &whipsaw_frame())
    };

    assert!(poll(35).is_empty());

    let alerts = poll(36);
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].signal, Signal::Buy);
    assert_eq!(alerts[0].datetime, full.timestamps()[35]);

    // Two bars arrive before the next poll; the flip back on the first of them
    // still alerts
    let alerts = poll(38);
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].signal, Signal::Sell);
    assert_eq!(alerts[0].datetime, full.timestamps()[36]);

    assert!(poll(38).is_empty());
}

#[test]
fn test_alert_for_one_instrument_leaves_other_untouched() {
    let tracker = TransitionTracker::new(DeliveryPolicy::AdvanceAlways);
    let a = Symbol::new("A");
    let b = Symbol::new("B");
    let (closes, buy) = reversal_with_buy(120);

    let (signals, frame) = evaluated("A", &closes[..=buy], &RuleSet::default());
    let snapshot = frame.snapshot(frame.len() - 1).unwrap();
    tracker.observe(&b, Signal::Sell, None, &snapshot);
    let before = tracker.state(&b).unwrap();

    let (baseline, baseline_frame) = evaluated("A", &closes[..buy], &RuleSet::default());
    tracker.observe_series(&baseline, &baseline_frame);
    assert_eq!(tracker.observe_series(&signals, &frame).len(), 1);

    assert_eq!(tracker.state(&a).unwrap().last_notified, Signal::Buy);
    assert_eq!(tracker.state(&b).unwrap(), before);
}

// =============================================================================
// Confluence Over Computed Indicators
// =============================================================================

#[test]
fn test_confluence_fires_on_computed_frame() {
    let closes = confluence_buy_closes();
    let last = closes.len() - 1;
    let ruleset = RuleSet::Confluence(ConfluenceRule::default());
    let (signals, frame) = evaluated("DIP", &closes, &ruleset);

    assert_eq!(signals.transitions(), vec![(last, Signal::Buy)]);

    let close = frame.close(last).unwrap();
    let value = |indicator| frame.value(indicator, last).unwrap();
    assert!(value(Indicator::SmaFast) > value(Indicator::SmaSlow));
    assert!(close <= 1.01 * value(Indicator::BollingerLower));
    assert!(value(Indicator::StochK) < 20.0);
    assert!(value(Indicator::StochK) > value(Indicator::StochD));

    // The same bar reaches the tracker as a fresh BUY once a baseline exists
    let tracker = TransitionTracker::new(DeliveryPolicy::AdvanceAlways);
    let (baseline, baseline_frame) = evaluated("DIP", &closes[..last], &ruleset);
    assert!(tracker.observe_series(&baseline, &baseline_frame).is_empty());
    let alerts = tracker.observe_series(&signals, &frame);
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].signal, Signal::Buy);
}

// =============================================================================
// Risk Sizing
// =============================================================================

#[test]
fn test_levels_from_frame_atr() {
    let frame = IndicatorFrame::compute(
        &series("ATR", &generate_reversal_closes(80, 100.0)),
        &IndicatorParams::default(),
    );
    let last = frame.len() - 1;
    let close = frame.close(last).unwrap();
    let atr = frame.value(Indicator::Atr, last);
    assert!(atr.unwrap() > 0.0);

    let config = RiskConfig::default();
    let buy = compute_levels(close, atr, Signal::Buy, &config).unwrap();
    let sell = compute_levels(close, atr, Signal::Sell, &config).unwrap();

    assert!(buy.stop_loss < close && close < buy.take_profit);
    assert!(sell.take_profit < close && close < sell.stop_loss);
    assert!((buy.reward_per_unit() - 2.0 * buy.risk_per_unit()).abs() < 1e-9);
    assert!(compute_levels(close, atr, Signal::Hold, &config).is_none());
}

// =============================================================================
// Monitor End-to-End
// =============================================================================

fn monitor_config(dir: &Path, symbols: &[&str]) -> Config {
    let mut config = Config::default();
    config.symbols = symbols.iter().map(Symbol::new).collect();
    config.data_dir = dir.to_path_buf();
    config.lookback = Some(Lookback::Max);
    config
}

#[test]
fn test_monitor_from_csv() {
    let dir = temp_dir("monitor");
    let (closes, buy) = reversal_with_buy(120);
    write_csv(&dir, "AAPL", &closes[..buy]);
    write_csv(&dir, "SHORT", &generate_flat_closes(10, 20.0));

    let monitor = Monitor::from_config(monitor_config(&dir, &["AAPL", "SHORT", "NOFILE"])).unwrap();
    assert_eq!(monitor.notifier_name(), "log");

    let first = monitor.run_cycle();
    assert_eq!(first.alert_count(), 0);
    assert!(matches!(
        first.outcome(&Symbol::new("SHORT")),
        Some(SymbolOutcome::Degraded { .. })
    ));
    assert!(matches!(
        first.outcome(&Symbol::new("NOFILE")),
        Some(SymbolOutcome::Failed { .. })
    ));

    // No new bar: nothing to report
    assert_eq!(monitor.run_cycle().alert_count(), 0);

    write_csv(&dir, "AAPL", &closes[..=buy]);
    let second = monitor.run_cycle();
    assert_eq!(second.alert_count(), 1);
    match second.outcome(&Symbol::new("AAPL")) {
        Some(SymbolOutcome::Alerted { alerts }) => {
            assert_eq!(alerts.len(), 1);
            assert_eq!(alerts[0].event.signal, Signal::Buy);
            assert!(alerts[0].delivered);
            assert!(alerts[0].levels.is_some());
        }
        other => panic!("expected alert, got {:?}", other),
    }

    assert_eq!(monitor.run_cycle().alert_count(), 0);

    fs::remove_dir_all(dir).ok();
}

#[test]
fn test_monitor_restart_does_not_realert() {
    let dir = temp_dir("restart");
    let (closes, buy) = reversal_with_buy(120);
    write_csv(&dir, "MSFT", &closes[..buy]);

    let mut config = monitor_config(&dir, &["MSFT"]);
    config.state_db = Some(dir.join("state").join("alerts.db"));

    {
        let monitor = Monitor::from_config(config.clone()).unwrap();
        assert_eq!(monitor.run_cycle().alert_count(), 0);
        write_csv(&dir, "MSFT", &closes[..=buy]);
        assert_eq!(monitor.run_cycle().alert_count(), 1);
    }

    let restarted = Monitor::from_config(config).unwrap();
    let state = restarted.tracker().state(&Symbol::new("MSFT")).unwrap();
    assert_eq!(state.last_notified, Signal::Buy);
    assert_eq!(restarted.run_cycle().alert_count(), 0);

    fs::remove_dir_all(dir).ok();
}

#[test]
fn test_config_file_round_trip() {
    let dir = temp_dir("config");
    let path = dir.join("alerts.json");
    fs::write(
        &path,
        r#"{
            "symbols": ["AAPL"],
            "interval": "1d",
            "ruleset": {"name": "filtered", "rsi_oversold": 25},
            "notify": {"policy": "advance_on_delivery"}
        }"#,
    )
    .unwrap();

    let config = Config::from_file(&path).unwrap();
    match &config.ruleset {
        RuleSet::Filtered(rule) => {
            assert_eq!(rule.rsi_oversold, 25.0);
            assert_eq!(rule.rsi_overbought, 70.0);
            assert!(!rule.persistence);
        }
        other => panic!("unexpected ruleset {:?}", other),
    }
    assert_eq!(config.notify.policy, DeliveryPolicy::AdvanceOnDelivery);

    fs::remove_dir_all(dir).ok();
}

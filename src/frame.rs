//! Indicator frame: a bar series augmented with per-bar indicator values
//!
//! Every indicator column is aligned with the bars and holds `None` where the
//! indicator is undefined (insufficient history). Non-finite numbers are read
//! back as undefined as well, so rules never compare against NaN.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

use crate::error::SeriesError;
use crate::indicators;
use crate::types::{Bar, Columns, Series, Symbol};

/// Names of the indicator columns a frame can carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Indicator {
    SmaFast,
    SmaSlow,
    Rsi,
    Macd,
    MacdSignal,
    MacdHistogram,
    BollingerUpper,
    BollingerMiddle,
    BollingerLower,
    Atr,
    StochK,
    StochD,
    Adx,
    Vwap,
    SwingHigh,
    SwingLow,
}

impl Indicator {
    pub fn name(self) -> &'static str {
        match self {
            Indicator::SmaFast => "sma_fast",
            Indicator::SmaSlow => "sma_slow",
            Indicator::Rsi => "rsi",
            Indicator::Macd => "macd",
            Indicator::MacdSignal => "macd_signal",
            Indicator::MacdHistogram => "macd_histogram",
            Indicator::BollingerUpper => "bb_upper",
            Indicator::BollingerMiddle => "bb_middle",
            Indicator::BollingerLower => "bb_lower",
            Indicator::Atr => "atr",
            Indicator::StochK => "stoch_k",
            Indicator::StochD => "stoch_d",
            Indicator::Adx => "adx",
            Indicator::Vwap => "vwap",
            Indicator::SwingHigh => "swing_high",
            Indicator::SwingLow => "swing_low",
        }
    }
}

impl fmt::Display for Indicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Window lengths used to compute a frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorParams {
    #[serde(default = "default_sma_fast")]
    pub sma_fast: usize,

    #[serde(default = "default_sma_slow")]
    pub sma_slow: usize,

    #[serde(default = "default_rsi_period")]
    pub rsi_period: usize,

    #[serde(default = "default_macd_fast")]
    pub macd_fast: usize,

    #[serde(default = "default_macd_slow")]
    pub macd_slow: usize,

    #[serde(default = "default_macd_signal")]
    pub macd_signal: usize,

    #[serde(default = "default_bb_period")]
    pub bb_period: usize,

    #[serde(default = "default_bb_std")]
    pub bb_std: f64,

    #[serde(default = "default_atr_period")]
    pub atr_period: usize,

    #[serde(default = "default_stoch_k")]
    pub stoch_k: usize,

    #[serde(default = "default_stoch_d")]
    pub stoch_d: usize,

    #[serde(default = "default_adx_period")]
    pub adx_period: usize,

    /// Bars in the rolling swing high/low window for retracement levels
    #[serde(default = "default_fib_lookback")]
    pub fib_lookback: usize,
}

fn default_sma_fast() -> usize { 10 }
fn default_sma_slow() -> usize { 30 }
fn default_rsi_period() -> usize { 14 }
fn default_macd_fast() -> usize { 12 }
fn default_macd_slow() -> usize { 26 }
fn default_macd_signal() -> usize { 9 }
fn default_bb_period() -> usize { 20 }
fn default_bb_std() -> f64 { 2.0 }
fn default_atr_period() -> usize { 14 }
fn default_stoch_k() -> usize { 14 }
fn default_stoch_d() -> usize { 3 }
fn default_adx_period() -> usize { 14 }
fn default_fib_lookback() -> usize { 50 }

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            sma_fast: default_sma_fast(),
            sma_slow: default_sma_slow(),
            rsi_period: default_rsi_period(),
            macd_fast: default_macd_fast(),
            macd_slow: default_macd_slow(),
            macd_signal: default_macd_signal(),
            bb_period: default_bb_period(),
            bb_std: default_bb_std(),
            atr_period: default_atr_period(),
            stoch_k: default_stoch_k(),
            stoch_d: default_stoch_d(),
            adx_period: default_adx_period(),
            fib_lookback: default_fib_lookback(),
        }
    }
}

/// Close price and every defined indicator value at one bar
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndicatorSnapshot {
    pub datetime: DateTime<Utc>,
    pub close: f64,
    pub values: BTreeMap<Indicator, f64>,
}

impl IndicatorSnapshot {
    pub fn get(&self, indicator: Indicator) -> Option<f64> {
        self.values.get(&indicator).copied()
    }
}

/// Series augmented with indicator columns
#[derive(Debug, Clone)]
pub struct IndicatorFrame {
    series: Series,
    params: IndicatorParams,
    values: BTreeMap<Indicator, Vec<Option<f64>>>,
}

impl IndicatorFrame {
    /// Compute every indicator the series' columns permit.
    ///
    /// High/low-dependent indicators (ATR, Stochastic, ADX, swing high/low) are
    /// left out when either column is absent; VWAP needs volume.
    pub fn compute(series: &Series, params: &IndicatorParams) -> Self {
        let close = series.closes();
        let columns = series.columns();
        let mut values = BTreeMap::new();

        values.insert(Indicator::SmaFast, indicators::sma(&close, params.sma_fast));
        values.insert(Indicator::SmaSlow, indicators::sma(&close, params.sma_slow));
        values.insert(Indicator::Rsi, indicators::rsi(&close, params.rsi_period));

        let [macd, signal, histogram] =
            indicators::macd(&close, params.macd_fast, params.macd_slow, params.macd_signal);
        values.insert(Indicator::Macd, macd);
        values.insert(Indicator::MacdSignal, signal);
        values.insert(Indicator::MacdHistogram, histogram);

        let [upper, middle, lower] =
            indicators::bollinger_bands(&close, params.bb_period, params.bb_std);
        values.insert(Indicator::BollingerUpper, upper);
        values.insert(Indicator::BollingerMiddle, middle);
        values.insert(Indicator::BollingerLower, lower);

        if columns.has_range() {
            let high = series.highs();
            let low = series.lows();

            values.insert(
                Indicator::Atr,
                indicators::atr(&high, &low, &close, params.atr_period),
            );

            let [k, d] =
                indicators::stochastic(&high, &low, &close, params.stoch_k, params.stoch_d);
            values.insert(Indicator::StochK, k);
            values.insert(Indicator::StochD, d);

            values.insert(
                Indicator::Adx,
                indicators::adx(&high, &low, &close, params.adx_period),
            );

            let [swing_high, swing_low] =
                indicators::rolling_high_low(&high, &low, params.fib_lookback);
            values.insert(Indicator::SwingHigh, swing_high);
            values.insert(Indicator::SwingLow, swing_low);
        }

        if columns.volume {
            let volume = series.volumes();
            let vwap = if columns.has_range() {
                indicators::vwap(&series.highs(), &series.lows(), &close, &volume)
            } else {
                indicators::vwap(&close, &close, &close, &volume)
            };
            values.insert(Indicator::Vwap, vwap.into_iter().map(Some).collect());
        }

        // Empty inputs yield empty columns; pad so every column matches the bars
        for column in values.values_mut() {
            column.resize(close.len(), None);
        }

        debug!(
            symbol = %series.symbol(),
            bars = series.len(),
            indicators = values.len(),
            "Indicator frame computed"
        );

        Self {
            series: series.clone(),
            params: params.clone(),
            values,
        }
    }

    /// Build a frame from indicator columns computed elsewhere.
    ///
    /// Every column must have exactly one value per bar.
    pub fn from_columns(
        series: Series,
        params: IndicatorParams,
        values: BTreeMap<Indicator, Vec<Option<f64>>>,
    ) -> Result<Self, SeriesError> {
        for (indicator, column) in &values {
            if column.len() != series.len() {
                return Err(SeriesError::IndicatorLength {
                    indicator: indicator.name(),
                    expected: series.len(),
                    actual: column.len(),
                });
            }
        }

        Ok(Self {
            series,
            params,
            values,
        })
    }

    pub fn symbol(&self) -> &Symbol {
        self.series.symbol()
    }

    pub fn series(&self) -> &Series {
        &self.series
    }

    pub fn bars(&self) -> &[Bar] {
        self.series.bars()
    }

    pub fn columns(&self) -> Columns {
        self.series.columns()
    }

    pub fn params(&self) -> &IndicatorParams {
        &self.params
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Whether the frame carries a column for `indicator` at all
    pub fn has(&self, indicator: Indicator) -> bool {
        self.values.contains_key(&indicator)
    }

    /// Indicator value at bar `index`; `None` when undefined, absent or out of range
    pub fn value(&self, indicator: Indicator, index: usize) -> Option<f64> {
        self.values
            .get(&indicator)
            .and_then(|column| column.get(index).copied().flatten())
            .filter(|v| v.is_finite())
    }

    pub fn close(&self, index: usize) -> Option<f64> {
        self.bars().get(index).map(|b| b.close)
    }

    pub fn snapshot(&self, index: usize) -> Option<IndicatorSnapshot> {
        let bar = self.bars().get(index)?;
        let values = self
            .values
            .keys()
            .filter_map(|&indicator| self.value(indicator, index).map(|v| (indicator, v)))
            .collect();

        Some(IndicatorSnapshot {
            datetime: bar.datetime,
            close: bar.close,
            values,
        })
    }
}

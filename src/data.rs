//! Market data access
//!
//! The engine never fetches data itself. Callers go through the
//! [`DataSource`] trait; [`CsvDataSource`] reads locally stored OHLCV files.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, warn};

use crate::error::ParseError;
use crate::types::{Bar, Columns, Series, Symbol};

// =============================================================================
// Interval & Lookback
// =============================================================================

/// Bar interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Interval {
    #[serde(rename = "1m")]
    Minute1,
    #[serde(rename = "5m")]
    Minute5,
    #[serde(rename = "15m")]
    Minute15,
    #[serde(rename = "1h", alias = "60m")]
    Hour1,
    #[serde(rename = "1d")]
    Day1,
    #[serde(rename = "1wk")]
    Week1,
    #[serde(rename = "1mo")]
    Month1,
}

impl Interval {
    pub const ALL: [Interval; 7] = [
        Interval::Minute1,
        Interval::Minute5,
        Interval::Minute15,
        Interval::Hour1,
        Interval::Day1,
        Interval::Week1,
        Interval::Month1,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Interval::Minute1 => "1m",
            Interval::Minute5 => "5m",
            Interval::Minute15 => "15m",
            Interval::Hour1 => "1h",
            Interval::Day1 => "1d",
            Interval::Week1 => "1wk",
            Interval::Month1 => "1mo",
        }
    }

    /// Shortest lookback that leaves the default indicator windows defined
    pub fn min_lookback(self) -> Lookback {
        match self {
            Interval::Minute1 => Lookback::Days5,
            Interval::Minute5 | Interval::Minute15 => Lookback::Month1,
            Interval::Hour1 | Interval::Day1 => Lookback::Month3,
            Interval::Week1 => Lookback::Year2,
            Interval::Month1 => Lookback::Year5,
        }
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Interval {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s == "60m" {
            return Ok(Interval::Hour1);
        }
        Interval::ALL
            .into_iter()
            .find(|i| i.as_str() == s)
            .ok_or_else(|| ParseError::Interval(s.to_string()))
    }
}

/// How far back to fetch, ordered shortest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Lookback {
    #[serde(rename = "5d")]
    Days5,
    #[serde(rename = "1mo")]
    Month1,
    #[serde(rename = "3mo")]
    Month3,
    #[serde(rename = "6mo")]
    Month6,
    #[serde(rename = "1y")]
    Year1,
    #[serde(rename = "2y")]
    Year2,
    #[serde(rename = "5y")]
    Year5,
    #[serde(rename = "max")]
    Max,
}

impl Lookback {
    pub const ALL: [Lookback; 8] = [
        Lookback::Days5,
        Lookback::Month1,
        Lookback::Month3,
        Lookback::Month6,
        Lookback::Year1,
        Lookback::Year2,
        Lookback::Year5,
        Lookback::Max,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Lookback::Days5 => "5d",
            Lookback::Month1 => "1mo",
            Lookback::Month3 => "3mo",
            Lookback::Month6 => "6mo",
            Lookback::Year1 => "1y",
            Lookback::Year2 => "2y",
            Lookback::Year5 => "5y",
            Lookback::Max => "max",
        }
    }

    /// Calendar days covered; `None` means all available history
    pub fn days(self) -> Option<i64> {
        match self {
            Lookback::Days5 => Some(5),
            Lookback::Month1 => Some(31),
            Lookback::Month3 => Some(92),
            Lookback::Month6 => Some(183),
            Lookback::Year1 => Some(366),
            Lookback::Year2 => Some(731),
            Lookback::Year5 => Some(1827),
            Lookback::Max => None,
        }
    }
}

impl fmt::Display for Lookback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Lookback {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Lookback::ALL
            .into_iter()
            .find(|l| l.as_str() == s)
            .ok_or_else(|| ParseError::Lookback(s.to_string()))
    }
}

// =============================================================================
// DataSource
// =============================================================================

/// Supplies bar series to the monitor
pub trait DataSource: Send + Sync {
    fn fetch(&self, symbol: &Symbol, lookback: Lookback, interval: Interval) -> Result<Series>;
}

// =============================================================================
// CSV Data Source
// =============================================================================

/// Reads `{data_dir}/{symbol}_{interval}.csv`
///
/// Columns are located by header name, case-insensitively. Timestamp and close
/// are required; open, high, low and volume are optional and their absence is
/// recorded on the series.
#[derive(Debug, Clone)]
pub struct CsvDataSource {
    data_dir: PathBuf,
}

const DATETIME_HEADERS: &[&str] = &["datetime", "timestamp", "date", "time"];
const CLOSE_HEADERS: &[&str] = &["close", "adj close", "adj_close"];

struct ColumnIndex {
    datetime: usize,
    open: Option<usize>,
    high: Option<usize>,
    low: Option<usize>,
    close: usize,
    volume: Option<usize>,
}

impl ColumnIndex {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self> {
        let names: Vec<String> = headers.iter().map(|h| h.trim().to_ascii_lowercase()).collect();
        let find = |candidates: &[&str]| {
            candidates
                .iter()
                .find_map(|c| names.iter().position(|n| n == c))
        };

        Ok(Self {
            datetime: find(DATETIME_HEADERS).context("No datetime column in header")?,
            open: find(&["open"]),
            high: find(&["high"]),
            low: find(&["low"]),
            close: find(CLOSE_HEADERS).context("No close column in header")?,
            volume: find(&["volume"]),
        })
    }

    fn columns(&self) -> Columns {
        Columns {
            open: self.open.is_some(),
            high: self.high.is_some(),
            low: self.low.is_some(),
            volume: self.volume.is_some(),
        }
    }
}

/// Parse RFC 3339, `%Y-%m-%d %H:%M:%S`, `%Y-%m-%d` or unix seconds as UTC
fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = s.parse::<DateTime<Utc>>() {
        return Some(dt);
    }
    if let Ok(dt) = DateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%z") {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(ndt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(ndt.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|ndt| ndt.and_utc());
    }
    s.parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
}

fn parse_field(record: &csv::StringRecord, index: Option<usize>) -> Result<Option<f64>> {
    match index {
        Some(i) => {
            let raw = record.get(i).context("Row is shorter than header")?;
            let value = raw
                .trim()
                .parse::<f64>()
                .with_context(|| format!("Failed to parse number '{}'", raw))?;
            Ok(Some(value))
        }
        None => Ok(None),
    }
}

fn parse_row(record: &csv::StringRecord, index: &ColumnIndex) -> Result<Bar> {
    let raw_dt = record.get(index.datetime).context("Missing datetime")?;
    let datetime =
        parse_datetime(raw_dt).with_context(|| format!("Failed to parse datetime '{}'", raw_dt))?;
    let close = parse_field(record, Some(index.close))?.context("Missing close")?;

    let open = parse_field(record, index.open)?.unwrap_or(close);
    let high = parse_field(record, index.high)?.unwrap_or(open.max(close));
    let low = parse_field(record, index.low)?.unwrap_or(open.min(close));
    let volume = parse_field(record, index.volume)?.unwrap_or(0.0);

    Ok(Bar::new(datetime, open, high, low, close, volume)?)
}

impl CsvDataSource {
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
        }
    }

    pub fn path_for(&self, symbol: &Symbol, interval: Interval) -> PathBuf {
        self.data_dir
            .join(format!("{}_{}.csv", symbol.as_str(), interval))
    }

    /// Load every valid bar from a CSV file, oldest first.
    ///
    /// Rows that fail to parse or validate are skipped with a warning.
    pub fn load(&self, path: &Path) -> Result<(Vec<Bar>, Columns)> {
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("Failed to open CSV file {}", path.display()))?;
        let index = ColumnIndex::from_headers(reader.headers().context("Failed to read header")?)?;

        let mut bars = Vec::new();
        for (row_idx, result) in reader.records().enumerate() {
            let record = result.with_context(|| format!("Failed to read row {}", row_idx + 1))?;
            match parse_row(&record, &index) {
                Ok(bar) => bars.push(bar),
                Err(e) => warn!(file = %path.display(), row = row_idx + 1, "Skipping row: {:#}", e),
            }
        }

        bars.sort_by_key(|b| b.datetime);
        let before = bars.len();
        bars.dedup_by_key(|b| b.datetime);
        if bars.len() != before {
            debug!(
                file = %path.display(),
                dropped = before - bars.len(),
                "Dropped duplicate timestamps"
            );
        }

        Ok((bars, index.columns()))
    }
}

impl DataSource for CsvDataSource {
    fn fetch(&self, symbol: &Symbol, lookback: Lookback, interval: Interval) -> Result<Series> {
        let path = self.path_for(symbol, interval);
        if !path.exists() {
            anyhow::bail!("Data file not found: {}", path.display());
        }

        let (mut bars, columns) = self
            .load(&path)
            .with_context(|| format!("Failed to load data for {}", symbol))?;

        let last = match bars.last() {
            Some(bar) => bar.datetime,
            None => anyhow::bail!("No valid bars in {}", path.display()),
        };
        if let Some(days) = lookback.days() {
            let cutoff = last - Duration::days(days);
            bars.retain(|b| b.datetime >= cutoff);
        }

        debug!(
            symbol = %symbol,
            interval = %interval,
            lookback = %lookback,
            bars = bars.len(),
            "Loaded series"
        );

        Ok(Series::new(symbol.clone(), interval, bars, columns)?)
    }
}

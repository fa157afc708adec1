//! Indicator library
//!
//! Whole-series wrappers over the `ta` streaming indicators, aligned
//! one-to-one with the input bars. Every output is causal: the value at
//! index `i` only reads inputs at indices `<= i`. Bars still inside an
//! indicator's warm-up window are `None`.
//!
//! - Trend: SMA, MACD, ADX
//! - Momentum: RSI, Stochastic
//! - Volatility: ATR, Bollinger Bands
//! - Volume: VWAP
//! - Levels: rolling swing high/low, Fibonacci retracements

use ta::indicators::{
    BollingerBands, FastStochastic, MovingAverageConvergenceDivergence, RelativeStrengthIndex,
    SimpleMovingAverage,
};
use ta::{DataItem, Next};

/// One optional value per bar
pub type Line = Vec<Option<f64>>;

/// Retracement fractions of the swing range
pub const FIB_RATIOS: [f64; 5] = [0.236, 0.382, 0.5, 0.618, 0.786];

// =============================================================================
// Streaming Helpers
// =============================================================================

/// Drive a `ta` indicator over `inputs`, hiding the first `warmup - 1` outputs.
fn stream<I, T>(
    indicator: &mut I,
    inputs: impl IntoIterator<Item = T>,
    warmup: usize,
) -> Vec<Option<I::Output>>
where
    I: Next<T>,
{
    inputs
        .into_iter()
        .enumerate()
        .map(|(i, input)| {
            let out = indicator.next(input);
            (i + 1 >= warmup).then_some(out)
        })
        .collect()
}

/// Split multi-line indicator outputs into one line per field
fn split<O, const N: usize>(rows: &[Option<O>], pick: impl Fn(&O) -> [f64; N]) -> [Line; N] {
    std::array::from_fn(|line| {
        rows.iter()
            .map(|row| row.as_ref().map(|o| pick(o)[line]))
            .collect()
    })
}

fn undefined<const N: usize>(len: usize) -> [Line; N] {
    std::array::from_fn(|_| vec![None; len])
}

/// Wilder smoothing seeded with the mean of the first `period` inputs:
/// `next = (prev * (period - 1) + x) / period`
fn wilder(values: &[f64], period: usize) -> Line {
    let mut smoothed: Option<f64> = None;
    values
        .iter()
        .enumerate()
        .map(|(i, &x)| {
            if period == 0 || i + 1 < period {
                return None;
            }
            let next = match smoothed {
                None => values[..period].iter().sum::<f64>() / period as f64,
                Some(prev) => (prev * (period - 1) as f64 + x) / period as f64,
            };
            smoothed = Some(next);
            smoothed
        })
        .collect()
}

// =============================================================================
// Close-Only Indicators
// =============================================================================

/// Simple moving average of the last `period` values
pub fn sma(values: &[f64], period: usize) -> Line {
    match SimpleMovingAverage::new(period) {
        Ok(mut ind) => stream(&mut ind, values.iter().copied(), period),
        Err(_) => vec![None; values.len()],
    }
}

/// Relative strength index on a 0..=100 scale.
///
/// Defined once `period` price changes exist, i.e. from the `period + 1`th close.
pub fn rsi(values: &[f64], period: usize) -> Line {
    match RelativeStrengthIndex::new(period) {
        Ok(mut ind) => stream(&mut ind, values.iter().copied(), period + 1),
        Err(_) => vec![None; values.len()],
    }
}

/// MACD as `[macd line, signal line, histogram]`.
///
/// The MACD line is defined once the slow EMA has a full window; the signal
/// line and histogram need a further `signal - 1` MACD values.
pub fn macd(values: &[f64], fast: usize, slow: usize, signal: usize) -> [Line; 3] {
    match MovingAverageConvergenceDivergence::new(fast, slow, signal) {
        Ok(mut ind) => {
            let rows = stream(&mut ind, values.iter().copied(), slow);
            let [macd_line, mut signal_line, mut histogram] =
                split(&rows, |o| [o.macd, o.signal, o.histogram]);

            let warmup = (slow + signal).saturating_sub(2).min(values.len());
            signal_line[..warmup].fill(None);
            histogram[..warmup].fill(None);
            [macd_line, signal_line, histogram]
        }
        Err(_) => undefined(values.len()),
    }
}

/// Bollinger Bands as `[upper, middle, lower]`
pub fn bollinger_bands(values: &[f64], period: usize, num_std: f64) -> [Line; 3] {
    match BollingerBands::new(period, num_std) {
        Ok(mut ind) => {
            let rows = stream(&mut ind, values.iter().copied(), period);
            split(&rows, |o| [o.upper, o.average, o.lower])
        }
        Err(_) => undefined(values.len()),
    }
}

// =============================================================================
// Range Indicators
// =============================================================================

fn true_range(high: &[f64], low: &[f64], close: &[f64]) -> Vec<f64> {
    (0..high.len())
        .map(|i| {
            let range = high[i] - low[i];
            match i.checked_sub(1).map(|p| close[p]) {
                Some(prev) => range.max((high[i] - prev).abs()).max((low[i] - prev).abs()),
                None => range,
            }
        })
        .collect()
}

fn same_len(high: &[f64], low: &[f64], close: &[f64]) -> bool {
    high.len() == low.len() && high.len() == close.len()
}

/// Average true range with Wilder smoothing
pub fn atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Line {
    if !same_len(high, low, close) {
        return vec![None; close.len()];
    }
    wilder(&true_range(high, low, close), period)
}

/// Fast stochastic `[%K, %D]`; %D is the SMA of %K over `d_period`.
///
/// A bar with close outside its high/low makes the whole oscillator undefined.
pub fn stochastic(
    high: &[f64],
    low: &[f64],
    close: &[f64],
    k_period: usize,
    d_period: usize,
) -> [Line; 2] {
    let n = close.len();
    if !same_len(high, low, close) {
        return undefined(n);
    }

    let items: Option<Vec<DataItem>> = (0..n)
        .map(|i| {
            DataItem::builder()
                .open(close[i])
                .high(high[i])
                .low(low[i])
                .close(close[i])
                .volume(0.0)
                .build()
                .ok()
        })
        .collect();

    let (Some(items), Ok(mut ind)) = (items, FastStochastic::new(k_period)) else {
        return undefined(n);
    };

    let k = stream(&mut ind, items.iter(), k_period);
    let defined: Vec<f64> = k.iter().flatten().copied().collect();
    let mut d = vec![None; n - defined.len()];
    d.extend(sma(&defined, d_period));

    [k, d]
}

/// Average directional index.
///
/// Needs `2 * period - 1` bars: one window for the directional indicators and
/// a second to smooth DX.
pub fn adx(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Line {
    let n = close.len();
    if period == 0 || n < period || !same_len(high, low, close) {
        return vec![None; n];
    }

    let (plus_dm, minus_dm): (Vec<f64>, Vec<f64>) = (0..n)
        .map(|i| {
            if i == 0 {
                return (0.0, 0.0);
            }
            let up = high[i] - high[i - 1];
            let down = low[i - 1] - low[i];
            (
                if up > down && up > 0.0 { up } else { 0.0 },
                if down > up && down > 0.0 { down } else { 0.0 },
            )
        })
        .unzip();

    let plus = wilder(&plus_dm, period);
    let minus = wilder(&minus_dm, period);
    let range = atr(high, low, close, period);

    let dx: Vec<f64> = (period - 1..n)
        .map(|i| match (plus[i], minus[i], range[i]) {
            (Some(p), Some(m), Some(tr)) if tr > 0.0 => {
                let (pdi, mdi) = (p / tr * 100.0, m / tr * 100.0);
                if pdi + mdi > 0.0 {
                    (pdi - mdi).abs() / (pdi + mdi) * 100.0
                } else {
                    0.0
                }
            }
            _ => 0.0,
        })
        .collect();

    let mut result = vec![None; period - 1];
    result.extend(wilder(&dx, period));
    result
}

// =============================================================================
// Volume
// =============================================================================

/// Cumulative volume-weighted typical price over the whole series.
///
/// Falls back to the close while no volume has traded.
pub fn vwap(high: &[f64], low: &[f64], close: &[f64], volume: &[f64]) -> Vec<f64> {
    let mut weighted = 0.0;
    let mut traded = 0.0;
    (0..close.len())
        .map(|i| {
            weighted += (high[i] + low[i] + close[i]) / 3.0 * volume[i];
            traded += volume[i];
            if traded > 0.0 {
                weighted / traded
            } else {
                close[i]
            }
        })
        .collect()
}

// =============================================================================
// Retracement Levels
// =============================================================================

/// Rolling swing `[high, low]` over the trailing `lookback` bars.
///
/// Uses whatever history is available while fewer than `lookback` bars exist,
/// so values are defined from the first bar.
pub fn rolling_high_low(high: &[f64], low: &[f64], lookback: usize) -> [Line; 2] {
    if lookback == 0 || high.len() != low.len() {
        return undefined(high.len());
    }

    let window = |i: usize| (i + 1).saturating_sub(lookback)..=i;
    let swing_high = (0..high.len())
        .map(|i| high[window(i)].iter().copied().reduce(f64::max))
        .collect();
    let swing_low = (0..low.len())
        .map(|i| low[window(i)].iter().copied().reduce(f64::min))
        .collect();

    [swing_high, swing_low]
}

/// Retracement levels measured down from the swing high
pub fn fibonacci_levels(swing_high: f64, swing_low: f64) -> [f64; 5] {
    let range = swing_high - swing_low;
    FIB_RATIOS.map(|ratio| swing_high - ratio * range)
}

/// True when `price` lies within `threshold` (a fraction, 0.01 = 1%) of any
/// retracement level. A flat range has no meaningful levels.
pub fn near_fibonacci_level(price: f64, swing_high: f64, swing_low: f64, threshold: f64) -> bool {
    if swing_high.is_nan() || swing_low.is_nan() || swing_high <= swing_low {
        return false;
    }

    fibonacci_levels(swing_high, swing_low)
        .iter()
        .any(|&level| (price - level).abs() <= threshold * level)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sma() {
        let values = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let result = sma(&values, 3);

        assert_eq!(result[0], None);
        assert_eq!(result[1], None);
        assert_relative_eq!(result[2].unwrap(), 2.0, epsilon = 1e-9);
        assert_relative_eq!(result[3].unwrap(), 3.0, epsilon = 1e-9);
        assert_relative_eq!(result[4].unwrap(), 4.0, epsilon = 1e-9);
    }

    #[test]
    fn test_sma_is_causal() {
        let values: Vec<f64> = (1..=40).map(|x| x as f64).collect();
        let full = sma(&values, 10);
        let truncated = sma(&values[..25], 10);

        // Appending future bars never changes earlier values
        assert_eq!(&full[..25], &truncated[..]);
    }

    #[test]
    fn test_rsi() {
        let values = vec![
            44.0, 44.25, 44.5, 43.75, 44.5, 44.25, 44.0, 43.5, 44.0, 44.5, 45.0, 45.25, 45.5, 45.0,
            44.75,
        ];
        let result = rsi(&values, 14);

        let rsi_val = result.last().unwrap().unwrap();
        assert!((0.0..=100.0).contains(&rsi_val));
        // 14 price changes need 15 closes
        assert_eq!(result[13], None);
        assert!(result[14].is_some());
    }

    #[test]
    fn test_macd() {
        let values: Vec<f64> = (1..=50).map(|x| x as f64).collect();
        let [macd_line, signal, histogram] = macd(&values, 12, 26, 9);

        assert_eq!(macd_line[24], None);
        assert!(macd_line[25].is_some());
        // Signal line needs 9 defined MACD values: 26 + 9 - 1 bars
        assert_eq!(signal[32], None);
        assert_eq!(histogram[32], None);
        assert!(signal[33].is_some());
        assert!(histogram[33].is_some());
        assert!(macd_line.last().unwrap().is_some());
        assert!(signal.last().unwrap().is_some());
        assert!(histogram.last().unwrap().is_some());
        // Steady uptrend: fast EMA above slow EMA
        assert!(macd_line.last().unwrap().unwrap() > 0.0);
    }

    #[test]
    fn test_stochastic() {
        let high = vec![5.0, 6.0, 7.0, 8.0, 9.0, 8.0, 7.0, 8.0, 9.0, 10.0];
        let low = vec![4.0, 5.0, 6.0, 7.0, 8.0, 7.0, 6.0, 7.0, 8.0, 9.0];
        let close = vec![4.5, 5.5, 6.5, 7.5, 8.5, 7.5, 6.5, 7.5, 8.5, 9.5];

        let [k, d] = stochastic(&high, &low, &close, 5, 3);

        assert_eq!(k.len(), 10);
        assert_eq!(d.len(), 10);
        assert_eq!(k[3], None);
        assert!(k[4].is_some());
        assert_eq!(d[5], None);
        assert!(d[6].is_some());

        let k_val = k.last().unwrap().unwrap();
        assert!(
            (0.0..=100.0).contains(&k_val),
            "Stochastic %K should be between 0 and 100, got {}",
            k_val
        );
    }

    #[test]
    fn test_stochastic_inconsistent_bar_is_undefined() {
        let high = vec![5.0, 6.0, 7.0];
        let low = vec![4.0, 5.0, 6.0];
        let close = vec![4.5, 9.0, 6.5];

        let [k, d] = stochastic(&high, &low, &close, 2, 2);
        assert!(k.iter().all(|v| v.is_none()));
        assert!(d.iter().all(|v| v.is_none()));
    }

    #[test]
    fn test_bollinger_bands() {
        let values = vec![20.0, 21.0, 22.0, 21.0, 20.0, 21.0, 22.0, 23.0, 22.0, 21.0];
        let [upper, middle, lower] = bollinger_bands(&values, 5, 2.0);

        assert_eq!(upper[3], None);
        assert!(upper[4].unwrap() > middle[4].unwrap());
        assert!(middle[4].unwrap() > lower[4].unwrap());
    }

    #[test]
    fn test_atr() {
        let high = vec![10.0, 11.0, 12.0, 11.5, 12.0];
        let low = vec![9.0, 10.0, 11.0, 10.5, 11.0];
        let close = vec![9.5, 10.5, 11.5, 11.0, 11.5];

        let result = atr(&high, &low, &close, 3);

        assert_eq!(result[1], None);
        // First ATR is the mean of the first three true ranges: (1.0 + 1.5 + 1.5) / 3
        assert_relative_eq!(result[2].unwrap(), 4.0 / 3.0, epsilon = 1e-9);
        assert!(result[4].unwrap() > 0.0);
    }

    #[test]
    fn test_adx_warmup() {
        let n = 40;
        let high: Vec<f64> = (0..n).map(|i| 101.0 + i as f64).collect();
        let low: Vec<f64> = (0..n).map(|i| 99.0 + i as f64).collect();
        let close: Vec<f64> = (0..n).map(|i| 100.0 + i as f64).collect();

        let result = adx(&high, &low, &close, 5);

        assert_eq!(result[7], None);
        assert!(result[8].is_some());
        // Straight-line uptrend has maximal directional strength
        assert!(result[n - 1].unwrap() > 90.0);
    }

    #[test]
    fn test_vwap() {
        let high = vec![10.0, 11.0, 12.0, 11.0, 10.0];
        let low = vec![9.0, 10.0, 11.0, 10.0, 9.0];
        let close = vec![9.5, 10.5, 11.5, 10.5, 9.5];
        let volume = vec![100.0, 150.0, 200.0, 150.0, 100.0];

        let result = vwap(&high, &low, &close, &volume);

        assert_eq!(result.len(), 5);
        assert!(result[4] > 9.0 && result[4] < 12.0);
    }

    #[test]
    fn test_rolling_high_low_uses_available_history() {
        let high = vec![10.0, 12.0, 11.0, 9.0];
        let low = vec![8.0, 9.0, 7.0, 8.5];

        let [hi, lo] = rolling_high_low(&high, &low, 2);

        assert_eq!(hi, vec![Some(10.0), Some(12.0), Some(12.0), Some(11.0)]);
        assert_eq!(lo, vec![Some(8.0), Some(8.0), Some(7.0), Some(7.0)]);
    }

    #[test]
    fn test_fibonacci_levels() {
        let levels = fibonacci_levels(200.0, 100.0);
        assert_relative_eq!(levels[0], 176.4, epsilon = 1e-9);
        assert_relative_eq!(levels[2], 150.0, epsilon = 1e-9);
        assert_relative_eq!(levels[4], 121.4, epsilon = 1e-9);
    }

    #[test]
    fn test_near_fibonacci_level() {
        // 50% level is 150; 1% band is [148.5, 151.5]
        assert!(near_fibonacci_level(151.0, 200.0, 100.0, 0.01));
        assert!(!near_fibonacci_level(157.0, 200.0, 100.0, 0.01));
        assert!(!near_fibonacci_level(100.0, 100.0, 100.0, 0.01));
    }
}

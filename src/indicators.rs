//! Indicator math over plain f64 vectors. Every function returns a vector
//! aligned 1:1 with its input; warmup entries are padded so callers can
//! index by bar position without offset bookkeeping.

pub fn sma(prices: &[f64], period: usize) -> Vec<f64> {
    if prices.is_empty() {
        return Vec::new();
    }
    if period <= 1 {
        return prices.to_vec();
    }
    if prices.len() < period {
        return vec![prices[0]; prices.len()];
    }

    let mut values = Vec::with_capacity(prices.len());
    for _ in 0..period - 1 {
        values.push(prices[0]);
    }

    let mut window_sum: f64 = prices[..period].iter().sum();
    values.push(window_sum / period as f64);
    for i in period..prices.len() {
        window_sum += prices[i] - prices[i - period];
        values.push(window_sum / period as f64);
    }

    values
}

pub fn ema(prices: &[f64], period: usize) -> Vec<f64> {
    if prices.is_empty() {
        return Vec::new();
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut values = Vec::with_capacity(prices.len());
    values.push(prices[0]);

    for i in 1..prices.len() {
        let next = (prices[i] * multiplier) + (values[i - 1] * (1.0 - multiplier));
        values.push(next);
    }

    values
}

/// Returns (macd line, signal line, histogram).
pub fn macd(
    prices: &[f64],
    fast_period: usize,
    slow_period: usize,
    signal_period: usize,
) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let fast_ema = ema(prices, fast_period);
    let slow_ema = ema(prices, slow_period);

    let macd_line: Vec<f64> = fast_ema
        .iter()
        .zip(slow_ema.iter())
        .map(|(fast, slow)| fast - slow)
        .collect();

    let signal_line = ema(&macd_line, signal_period);

    let histogram: Vec<f64> = macd_line
        .iter()
        .zip(signal_line.iter())
        .map(|(line, signal)| line - signal)
        .collect();

    (macd_line, signal_line, histogram)
}

/// Wilder-smoothed RSI. Warmup entries are padded with the neutral 50.
pub fn rsi(prices: &[f64], period: usize) -> Vec<f64> {
    if prices.is_empty() {
        return Vec::new();
    }
    if period == 0 || prices.len() < period + 1 {
        return vec![50.0; prices.len()];
    }

    let mut values = vec![50.0; prices.len()];
    let mut sum_gain = 0.0f64;
    let mut sum_loss = 0.0f64;
    for i in 1..=period {
        let delta = prices[i] - prices[i - 1];
        if delta >= 0.0 {
            sum_gain += delta;
        } else {
            sum_loss += -delta;
        }
    }

    let mut avg_gain = sum_gain / period as f64;
    let mut avg_loss = sum_loss / period as f64;
    values[period] = rsi_from_avgs(avg_gain, avg_loss);

    for i in (period + 1)..prices.len() {
        let delta = prices[i] - prices[i - 1];
        let gain = if delta > 0.0 { delta } else { 0.0 };
        let loss = if delta < 0.0 { -delta } else { 0.0 };
        avg_gain = (avg_gain * (period as f64 - 1.0) + gain) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + loss) / period as f64;
        values[i] = rsi_from_avgs(avg_gain, avg_loss);
    }

    values
}

fn rsi_from_avgs(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        if avg_gain == 0.0 {
            return 50.0;
        }
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - (100.0 / (1.0 + rs))
}

#[derive(Debug, Clone)]
pub struct BollingerBands {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

/// Bands collapse onto the price during warmup (zero-width window).
pub fn bollinger(prices: &[f64], period: usize, width: f64) -> BollingerBands {
    let middle = sma(prices, period);
    let mut upper = Vec::with_capacity(prices.len());
    let mut lower = Vec::with_capacity(prices.len());

    for i in 0..prices.len() {
        if period == 0 || i + 1 < period {
            upper.push(middle[i]);
            lower.push(middle[i]);
            continue;
        }
        let window = &prices[i + 1 - period..=i];
        let mean = middle[i];
        let variance =
            window.iter().map(|value| (value - mean).powi(2)).sum::<f64>() / period as f64;
        let std_dev = variance.sqrt();
        upper.push(mean + width * std_dev);
        lower.push(mean - width * std_dev);
    }

    BollingerBands {
        upper,
        middle,
        lower,
    }
}

/// ATR as an SMA of true range. The first `period` entries are NaN because
/// true range needs a previous close and the average needs a full window.
pub fn atr(highs: &[f64], lows: &[f64], closes: &[f64], period: usize) -> Vec<f64> {
    let len = highs.len();
    if period == 0 || len < period + 1 {
        return vec![f64::NAN; len];
    }

    let mut tr_values = Vec::with_capacity(len - 1);
    for i in 1..len {
        let tr = (highs[i] - lows[i])
            .max((highs[i] - closes[i - 1]).abs())
            .max((lows[i] - closes[i - 1]).abs());
        tr_values.push(tr);
    }

    let mut values = vec![f64::NAN; period];
    let start = period - 1;
    for i in start..tr_values.len() {
        let window_start = i + 1 - period;
        let avg = tr_values[window_start..=i].iter().sum::<f64>() / period as f64;
        values.push(avg);
    }

    values
}

#[derive(Debug, Clone, Copy)]
pub struct SuperTrendPoint {
    pub value: f64,
    /// 1 while the trend is up, -1 while it is down.
    pub direction: i32,
}

pub fn super_trend(
    highs: &[f64],
    lows: &[f64],
    closes: &[f64],
    period: usize,
    multiplier: f64,
) -> Vec<SuperTrendPoint> {
    let len = highs.len();
    let warmup = SuperTrendPoint {
        value: 0.0,
        direction: 1,
    };
    if period == 0 || len < period + 1 {
        return vec![warmup; len];
    }

    let atr_values = atr(highs, lows, closes, period);
    let mut result: Vec<SuperTrendPoint> = vec![warmup; period];

    for i in period..len {
        let current_atr = atr_values[i];
        let median_price = (highs[i] + lows[i]) / 2.0;
        let mut upper_band = median_price + multiplier * current_atr;
        let mut lower_band = median_price - multiplier * current_atr;

        let prev = result[i - 1];
        let seeded = i > period;
        if seeded {
            // Bands only ratchet in the trend direction.
            if prev.direction == 1 {
                lower_band = lower_band.max(prev.value);
            } else {
                upper_band = upper_band.min(prev.value);
            }
        }

        let (direction, value) = if !seeded {
            (1, lower_band)
        } else if prev.direction == 1 && closes[i] < prev.value {
            (-1, upper_band)
        } else if prev.direction == -1 && closes[i] > prev.value {
            (1, lower_band)
        } else if prev.direction == 1 {
            (1, lower_band)
        } else {
            (-1, upper_band)
        };

        result.push(SuperTrendPoint { value, direction });
    }

    result
}

/// Fast %K and smoothed %D. Warmup entries are padded with the neutral 50.
pub fn stochastic(
    highs: &[f64],
    lows: &[f64],
    closes: &[f64],
    k_period: usize,
    d_period: usize,
) -> (Vec<f64>, Vec<f64>) {
    let len = closes.len();
    if k_period == 0 || len < k_period {
        return (vec![50.0; len], vec![50.0; len]);
    }

    let mut k_values = vec![50.0; len];
    for i in (k_period - 1)..len {
        let window_start = i + 1 - k_period;
        let highest = highs[window_start..=i]
            .iter()
            .fold(f64::MIN, |acc, &v| acc.max(v));
        let lowest = lows[window_start..=i]
            .iter()
            .fold(f64::MAX, |acc, &v| acc.min(v));
        let range = highest - lowest;
        k_values[i] = if range > 0.0 {
            100.0 * (closes[i] - lowest) / range
        } else {
            50.0
        };
    }

    let d_values = sma(&k_values, d_period.max(1));
    (k_values, d_values)
}

/// Rolling maximum over the trailing `period` entries (inclusive). Warmup
/// uses the partial prefix.
pub fn rolling_max(values: &[f64], period: usize) -> Vec<f64> {
    rolling_extreme(values, period, f64::max)
}

/// Rolling minimum over the trailing `period` entries (inclusive).
pub fn rolling_min(values: &[f64], period: usize) -> Vec<f64> {
    rolling_extreme(values, period, f64::min)
}

fn rolling_extreme(values: &[f64], period: usize, pick: fn(f64, f64) -> f64) -> Vec<f64> {
    let mut result = Vec::with_capacity(values.len());
    for i in 0..values.len() {
        let window_start = if period == 0 || i + 1 < period {
            0
        } else {
            i + 1 - period
        };
        let extreme = values[window_start..=i]
            .iter()
            .copied()
            .reduce(pick)
            .unwrap_or(values[i]);
        result.push(extreme);
    }
    result
}

/// Distance from the rolling mean in standard deviations. Zero during
/// warmup and when the window has no variance.
pub fn zscore(prices: &[f64], period: usize) -> Vec<f64> {
    let middle = sma(prices, period);
    let mut values = Vec::with_capacity(prices.len());

    for i in 0..prices.len() {
        if period == 0 || i + 1 < period {
            values.push(0.0);
            continue;
        }
        let window = &prices[i + 1 - period..=i];
        let mean = middle[i];
        let variance =
            window.iter().map(|value| (value - mean).powi(2)).sum::<f64>() / period as f64;
        let std_dev = variance.sqrt();
        values.push(if std_dev > 0.0 {
            (prices[i] - mean) / std_dev
        } else {
            0.0
        });
    }

    values
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sma_matches_window_average() {
        let prices = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let values = sma(&prices, 3);
        assert_eq!(values.len(), prices.len());
        assert!((values[2] - 2.0).abs() < 1e-9);
        assert!((values[4] - 4.0).abs() < 1e-9);
    }

    #[test]
    fn ema_starts_from_first_price() {
        let prices = vec![10.0, 11.0, 12.0];
        let values = ema(&prices, 2);
        assert!((values[0] - 10.0).abs() < 1e-9);
        assert!(values[2] > values[0]);
    }

    #[test]
    fn rsi_stays_in_bounds_and_reacts_to_direction() {
        let rising: Vec<f64> = (0..40).map(|i| 100.0 + i as f64).collect();
        let values = rsi(&rising, 14);
        assert_eq!(values.len(), rising.len());
        assert!(values.iter().all(|v| (0.0..=100.0).contains(v)));
        assert!(values[30] > 70.0, "pure uptrend should read overbought");

        let falling: Vec<f64> = (0..40).map(|i| 100.0 - i as f64).collect();
        let values = rsi(&falling, 14);
        assert!(values[30] < 30.0, "pure downtrend should read oversold");
    }

    #[test]
    fn bollinger_bands_straddle_the_mean() {
        let prices: Vec<f64> = (0..30).map(|i| 100.0 + (i % 5) as f64).collect();
        let bands = bollinger(&prices, 10, 2.0);
        for i in 10..prices.len() {
            assert!(bands.upper[i] > bands.middle[i]);
            assert!(bands.lower[i] < bands.middle[i]);
        }
    }

    #[test]
    fn stochastic_hits_extremes_at_range_edges() {
        let highs: Vec<f64> = (0..20).map(|i| 101.0 + i as f64).collect();
        let lows: Vec<f64> = (0..20).map(|i| 99.0 + i as f64).collect();
        let closes: Vec<f64> = (0..20).map(|i| 101.0 + i as f64).collect();
        let (k, _d) = stochastic(&highs, &lows, &closes, 5, 3);
        // Close pinned at the window high reads near 100.
        assert!(k[19] > 95.0);
    }

    #[test]
    fn super_trend_flips_direction_on_reversal() {
        let mut closes: Vec<f64> = (0..30).map(|i| 100.0 + i as f64).collect();
        closes.extend((0..30).map(|i| 130.0 - 2.0 * i as f64));
        let highs: Vec<f64> = closes.iter().map(|c| c + 1.0).collect();
        let lows: Vec<f64> = closes.iter().map(|c| c - 1.0).collect();

        let points = super_trend(&highs, &lows, &closes, 10, 3.0);
        assert_eq!(points.len(), closes.len());
        assert_eq!(points[25].direction, 1);
        assert_eq!(points[55].direction, -1);
    }

    #[test]
    fn zscore_is_zero_for_flat_series() {
        let prices = vec![100.0; 25];
        let values = zscore(&prices, 10);
        assert!(values.iter().all(|v| v.abs() < 1e-9));
    }

    #[test]
    fn rolling_extremes_track_window() {
        let values = vec![1.0, 5.0, 3.0, 2.0, 8.0, 4.0];
        let highs = rolling_max(&values, 3);
        let lows = rolling_min(&values, 3);
        assert!((highs[4] - 8.0).abs() < 1e-9);
        assert!((highs[2] - 5.0).abs() < 1e-9);
        assert!((lows[3] - 2.0).abs() < 1e-9);
    }
}

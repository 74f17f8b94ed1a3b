use precompute_core::{Bar, DailyIndicators};

/// Return val if it is finite, otherwise return default.
#[inline]
pub fn finite_or(val: f64, default: f64) -> f64 {
    if val.is_finite() {
        val
    } else {
        default
    }
}

/// Simple Moving Average. Defined only once `period` observations exist.
pub fn sma(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.len() < period {
        return vec![];
    }

    let mut result = Vec::with_capacity(data.len() - period + 1);
    for i in period - 1..data.len() {
        let sum: f64 = data[i + 1 - period..=i].iter().sum();
        result.push(finite_or(sum / period as f64, 0.0));
    }
    result
}

/// Exponential Moving Average, seeded with an SMA over the first `period` elements.
pub fn ema(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.is_empty() {
        return vec![];
    }

    let mut result = Vec::with_capacity(data.len());
    let multiplier = 2.0 / (period as f64 + 1.0);

    if data.len() < period {
        let avg = data.iter().sum::<f64>() / data.len() as f64;
        return vec![finite_or(avg, 0.0)];
    }

    let sma_seed: f64 = data[..period].iter().sum::<f64>() / period as f64;
    let sma_seed = finite_or(sma_seed, 0.0);

    for _ in 0..period {
        result.push(sma_seed);
    }

    for i in period..data.len() {
        let prev_ema = result[i - 1];
        let ema_val = (data[i] - prev_ema) * multiplier + prev_ema;
        result.push(finite_or(ema_val, prev_ema));
    }

    result
}

/// Relative Strength Index using Wilder's smoothing. First valid output at
/// observation `period + 1`.
pub fn rsi(data: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || data.len() < period + 1 {
        return vec![];
    }

    let mut gains = Vec::new();
    let mut losses = Vec::new();

    for i in 1..data.len() {
        let change = data[i] - data[i - 1];
        if change > 0.0 {
            gains.push(change);
            losses.push(0.0);
        } else {
            gains.push(0.0);
            losses.push(change.abs());
        }
    }

    let mut avg_gain = gains[..period].iter().sum::<f64>() / period as f64;
    let mut avg_loss = losses[..period].iter().sum::<f64>() / period as f64;

    let mut rsi_values = Vec::with_capacity(data.len() - period);

    for i in period..gains.len() {
        avg_gain = (avg_gain * (period - 1) as f64 + gains[i]) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + losses[i]) / period as f64;

        let rs = if avg_loss == 0.0 {
            100.0
        } else {
            avg_gain / avg_loss
        };

        let rsi = 100.0 - (100.0 / (1.0 + rs));
        rsi_values.push(finite_or(rsi, 50.0));
    }

    rsi_values
}

pub struct MacdResult {
    pub macd_line: Vec<f64>,
    pub signal_line: Vec<f64>,
    pub histogram: Vec<f64>,
}

/// MACD = EMA(fast) - EMA(slow); signal = EMA(signal_period) of the MACD line.
pub fn macd(data: &[f64], fast_period: usize, slow_period: usize, signal_period: usize) -> MacdResult {
    if fast_period == 0 || slow_period == 0 || signal_period == 0 || slow_period < fast_period {
        return MacdResult {
            macd_line: vec![],
            signal_line: vec![],
            histogram: vec![],
        };
    }

    let ema_fast = ema(data, fast_period);
    let ema_slow = ema(data, slow_period);

    let offset = slow_period - fast_period;
    let mut macd_line = Vec::new();

    for i in offset..ema_fast.len() {
        macd_line.push(ema_fast[i] - ema_slow[i - offset]);
    }

    let signal_line = ema(&macd_line, signal_period);

    let mut histogram = Vec::new();
    let hist_offset = macd_line.len().saturating_sub(signal_line.len());
    for i in 0..signal_line.len() {
        histogram.push(macd_line[i + hist_offset] - signal_line[i]);
    }

    MacdResult {
        macd_line,
        signal_line,
        histogram,
    }
}

pub struct BollingerBands {
    pub upper: Vec<f64>,
    pub middle: Vec<f64>,
    pub lower: Vec<f64>,
}

/// 20-period SMA +/- `std_dev` standard deviations.
pub fn bollinger_bands(data: &[f64], period: usize, std_dev: f64) -> BollingerBands {
    if period == 0 || data.len() < period {
        return BollingerBands {
            upper: vec![],
            middle: vec![],
            lower: vec![],
        };
    }

    let middle = sma(data, period);
    let mut upper = Vec::with_capacity(middle.len());
    let mut lower = Vec::with_capacity(middle.len());

    for i in period - 1..data.len() {
        let slice = &data[i + 1 - period..=i];
        let mean = middle[i + 1 - period];
        let variance: f64 = slice.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / period as f64;
        let std = variance.sqrt();

        upper.push(finite_or(mean + std_dev * std, mean));
        lower.push(finite_or(mean - std_dev * std, mean));
    }

    BollingerBands { upper, middle, lower }
}

/// Average True Range via Wilder's smoothing of the true range.
pub fn atr(bars: &[Bar], period: usize) -> Vec<f64> {
    if period == 0 || bars.len() < period + 1 {
        return vec![];
    }

    let mut true_ranges = Vec::new();

    for i in 1..bars.len() {
        let high_low = bars[i].high - bars[i].low;
        let high_close = (bars[i].high - bars[i - 1].close).abs();
        let low_close = (bars[i].low - bars[i - 1].close).abs();

        true_ranges.push(high_low.max(high_close).max(low_close));
    }

    let mut atr_values = Vec::new();
    let mut atr = true_ranges[..period].iter().sum::<f64>() / period as f64;
    atr = finite_or(atr, 0.0);
    atr_values.push(atr);

    for tr in &true_ranges[period..] {
        atr = (atr * (period - 1) as f64 + tr) / period as f64;
        atr_values.push(finite_or(atr, 0.0));
    }

    atr_values
}

/// Volume-Weighted Average Price, cumulative over the whole series.
pub fn vwap(bars: &[Bar]) -> Vec<f64> {
    if bars.is_empty() {
        return vec![];
    }

    let mut vwap_values = Vec::with_capacity(bars.len());
    let mut cumulative_tpv = 0.0;
    let mut cumulative_volume = 0.0;

    for bar in bars {
        let typical_price = (bar.high + bar.low + bar.close) / 3.0;
        cumulative_tpv += typical_price * bar.volume;
        cumulative_volume += bar.volume;

        let vwap = if cumulative_volume > 0.0 {
            cumulative_tpv / cumulative_volume
        } else {
            typical_price
        };

        vwap_values.push(finite_or(vwap, typical_price));
    }

    vwap_values
}

/// Bounded 0-100 composite of realized volatility, recent range expansion,
/// and volume dispersion over a trailing window. Each component is
/// normalized against its own trailing mean so the composite stays roughly
/// comparable across symbols of different price/volume scale.
pub fn uncertainty_score(bars: &[Bar], window: usize) -> Option<f64> {
    if bars.len() < window + 1 {
        return None;
    }
    let recent = &bars[bars.len() - window..];

    let returns: Vec<f64> = recent
        .windows(2)
        .map(|w| {
            if w[0].close > 0.0 {
                (w[1].close - w[0].close) / w[0].close
            } else {
                0.0
            }
        })
        .collect();
    let ret_mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let ret_var = returns.iter().map(|r| (r - ret_mean).powi(2)).sum::<f64>() / returns.len() as f64;
    let realized_vol = ret_var.sqrt();

    let ranges: Vec<f64> = recent.iter().map(|b| b.high - b.low).collect();
    let range_mean = ranges.iter().sum::<f64>() / ranges.len() as f64;
    let latest_range = *ranges.last().unwrap_or(&0.0);
    let range_expansion = if range_mean > 0.0 {
        (latest_range / range_mean - 1.0).max(0.0)
    } else {
        0.0
    };

    let volumes: Vec<f64> = recent.iter().map(|b| b.volume).collect();
    let vol_mean = volumes.iter().sum::<f64>() / volumes.len() as f64;
    let vol_var = volumes.iter().map(|v| (v - vol_mean).powi(2)).sum::<f64>() / volumes.len() as f64;
    let volume_dispersion = if vol_mean > 0.0 { vol_var.sqrt() / vol_mean } else { 0.0 };

    // Each component is squashed to [0,1] with a fixed scale, then weighted
    // 50/25/25 toward realized volatility as the dominant signal.
    let vol_component = (realized_vol * 20.0).min(1.0);
    let range_component = range_expansion.min(1.0);
    let volume_component = volume_dispersion.min(1.0);

    let score = 100.0 * (0.5 * vol_component + 0.25 * range_component + 0.25 * volume_component);
    Some(finite_or(score, 0.0).clamp(0.0, 100.0))
}

/// Computes the full indicator set for the most recent observation in
/// `bars`. `bars` must be sorted strictly ascending by date with no
/// duplicate dates — callers enforce that upstream of this function.
pub fn compute_daily_indicators(bars: &[Bar]) -> DailyIndicators {
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let volumes: Vec<f64> = bars.iter().map(|b| b.volume).collect();

    let Some(latest) = bars.last() else {
        return DailyIndicators::default();
    };

    let sma_20 = sma(&closes, 20).last().copied();
    let sma_50 = sma(&closes, 50).last().copied();
    let sma_200 = sma(&closes, 200).last().copied();
    let rsi_14 = rsi(&closes, 14).last().copied();

    let macd_result = macd(&closes, 12, 26, 9);
    let macd_val = macd_result.macd_line.last().copied();
    let macd_signal = macd_result.signal_line.last().copied();
    let macd_histogram = macd_result.histogram.last().copied();

    let bb = bollinger_bands(&closes, 20, 2.0);
    let bb_upper = bb.upper.last().copied();
    let bb_middle = bb.middle.last().copied();
    let bb_lower = bb.lower.last().copied();

    let atr_14 = atr(bars, 14).last().copied();
    let atr_pct = atr_14.filter(|_| latest.close > 0.0).map(|a| 100.0 * a / latest.close);

    let vwap_val = vwap(bars).last().copied();
    let price_to_vwap_pct = vwap_val
        .filter(|v| *v > 0.0)
        .map(|v| 100.0 * (latest.close - v) / v);

    let volume_sma_20 = sma(&volumes, 20).last().copied();
    let volume_ratio = volume_sma_20
        .filter(|s| *s > 0.0)
        .map(|s| latest.volume / s);

    let uncertainty = uncertainty_score(bars, 20);

    DailyIndicators {
        open: Some(latest.open),
        high: Some(latest.high),
        low: Some(latest.low),
        close: Some(latest.close),
        volume: Some(latest.volume),
        sma_20,
        sma_50,
        sma_200,
        rsi_14,
        macd: macd_val,
        macd_signal,
        macd_histogram,
        bb_upper,
        bb_middle,
        bb_lower,
        atr_14,
        atr_pct,
        vwap: vwap_val,
        volume_sma: volume_sma_20,
        volume_ratio,
        uncertainty_score: uncertainty,
        price_to_vwap_pct,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_bars(n: usize) -> Vec<Bar> {
        (0..n)
            .map(|i| {
                let base = 100.0 + i as f64;
                Bar {
                    date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(i as i64),
                    open: base,
                    high: base + 2.0,
                    low: base - 1.0,
                    close: base + 1.0,
                    volume: 1_000_000.0,
                }
            })
            .collect()
    }

    #[test]
    fn test_sma_basic() {
        let data = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let result = sma(&data, 3);

        assert_eq!(result.len(), 3);
        assert!((result[0] - 2.0).abs() < 0.001);
        assert!((result[1] - 3.0).abs() < 0.001);
        assert!((result[2] - 4.0).abs() < 0.001);
    }

    #[test]
    fn test_sma_insufficient_data_is_absent() {
        let data = vec![1.0, 2.0];
        assert!(sma(&data, 5).is_empty());
    }

    #[test]
    fn test_rsi_first_output_at_observation_fifteen() {
        let data = sample_bars(20).iter().map(|b| b.close).collect::<Vec<_>>();
        let result = rsi(&data, 14);
        assert_eq!(result.len(), data.len() - 14);
    }

    #[test]
    fn test_compute_daily_indicators_needs_full_window_for_sma_200() {
        let bars = sample_bars(30);
        let indicators = compute_daily_indicators(&bars);
        assert!(indicators.sma_200.is_none());
        assert!(indicators.sma_20.is_some());
    }

    #[test]
    fn test_uncertainty_score_is_bounded() {
        let bars = sample_bars(40);
        let score = uncertainty_score(&bars, 20).expect("enough bars for the window");
        assert!((0.0..=100.0).contains(&score));
    }
}

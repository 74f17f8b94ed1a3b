use precompute_core::{DailyIndicators, IndicatorPercentiles};

/// Arithmetic mean; `0.0` for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation; `0.0` for an empty slice.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Empirical-CDF percentile rank of `value` within `window`, in `[0, 100]`.
/// `None` if the window is empty.
pub fn percentile_rank(window: &[f64], value: f64) -> Option<f64> {
    if window.is_empty() {
        return None;
    }
    let below_or_equal = window.iter().filter(|&&w| w <= value).count();
    Some(100.0 * below_or_equal as f64 / window.len() as f64)
}

/// Fraction of `window` satisfying `predicate`, in `[0, 1]`. `None` if the
/// window is empty.
pub fn frequency_of<F: Fn(f64) -> bool>(window: &[f64], predicate: F) -> Option<f64> {
    if window.is_empty() {
        return None;
    }
    let matching = window.iter().filter(|&&w| predicate(w)).count();
    Some(matching as f64 / window.len() as f64)
}

/// Computes percentile ranks and threshold frequencies for the most recent
/// entry in `history` against the trailing `lookback_days` window.
/// `history` must be sorted ascending by date, most recent last.
pub fn compute_indicator_percentiles(history: &[DailyIndicators], lookback_days: i32) -> IndicatorPercentiles {
    let window_len = lookback_days.max(0) as usize;
    let start = history.len().saturating_sub(window_len);
    let window = &history[start..];

    let Some(latest) = window.last() else {
        return IndicatorPercentiles {
            lookback_days,
            ..Default::default()
        };
    };

    let rsi_window: Vec<f64> = window.iter().filter_map(|d| d.rsi_14).collect();
    let atr_pct_window: Vec<f64> = window.iter().filter_map(|d| d.atr_pct).collect();
    let volume_ratio_window: Vec<f64> = window.iter().filter_map(|d| d.volume_ratio).collect();
    let uncertainty_window: Vec<f64> = window.iter().filter_map(|d| d.uncertainty_score).collect();

    IndicatorPercentiles {
        lookback_days,
        rsi_14_percentile: latest.rsi_14.and_then(|v| percentile_rank(&rsi_window, v)),
        atr_pct_percentile: latest.atr_pct.and_then(|v| percentile_rank(&atr_pct_window, v)),
        volume_ratio_percentile: latest
            .volume_ratio
            .and_then(|v| percentile_rank(&volume_ratio_window, v)),
        uncertainty_percentile: latest
            .uncertainty_score
            .and_then(|v| percentile_rank(&uncertainty_window, v)),
        rsi_overbought_frequency: frequency_of(&rsi_window, |v| v > 70.0),
        rsi_oversold_frequency: frequency_of(&rsi_window, |v| v < 30.0),
    }
}

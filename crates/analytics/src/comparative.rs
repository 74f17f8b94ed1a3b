use precompute_core::{Bar, ComparativeFeatures};
use statrs::statistics::Statistics;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

fn daily_returns(closes: &[f64]) -> Vec<f64> {
    closes
        .windows(2)
        .map(|w| if w[0] > 0.0 { w[1] / w[0] - 1.0 } else { 0.0 })
        .collect()
}

fn period_return(closes: &[f64], periods_back: usize) -> Option<f64> {
    if closes.len() <= periods_back {
        return None;
    }
    let latest = *closes.last()?;
    let past = closes[closes.len() - 1 - periods_back];
    if past <= 0.0 {
        return None;
    }
    Some(latest / past - 1.0)
}

/// Annualized realized volatility (stdev of daily returns, scaled by
/// sqrt(252)) over the trailing `window` daily observations.
fn realized_volatility(closes: &[f64], window: usize) -> Option<f64> {
    if closes.len() <= window {
        return None;
    }
    let recent = &closes[closes.len() - window - 1..];
    let returns = daily_returns(recent);
    if returns.len() < 2 {
        return None;
    }
    Some(returns.std_dev() * TRADING_DAYS_PER_YEAR.sqrt())
}

/// Annualized Sharpe ratio of daily returns against `risk_free_rate`
/// (an annualized rate, e.g. 0.02 for 2%) over the trailing `window`.
fn sharpe_ratio(closes: &[f64], window: usize, risk_free_rate: f64) -> Option<f64> {
    if closes.len() <= window {
        return None;
    }
    let recent = &closes[closes.len() - window - 1..];
    let returns = daily_returns(recent);
    if returns.len() < 2 {
        return None;
    }
    let daily_rf = risk_free_rate / TRADING_DAYS_PER_YEAR;
    let excess_mean = returns.mean() - daily_rf;
    let vol = returns.std_dev();
    if vol == 0.0 {
        return None;
    }
    Some(excess_mean / vol * TRADING_DAYS_PER_YEAR.sqrt())
}

/// Maximum peak-to-trough drawdown (a negative fraction, or `0.0` if the
/// series never dropped below a prior peak) over the trailing `window`.
fn max_drawdown(closes: &[f64], window: usize) -> Option<f64> {
    if closes.len() <= window {
        return None;
    }
    let recent = &closes[closes.len() - window - 1..];
    let mut peak = recent[0];
    let mut worst = 0.0f64;
    for &price in recent.iter().skip(1) {
        if price > peak {
            peak = price;
        }
        if peak > 0.0 {
            let drawdown = price / peak - 1.0;
            worst = worst.min(drawdown);
        }
    }
    Some(worst)
}

/// Ratio of the symbol's cumulative return to a reference index's cumulative
/// return over the same trailing window; `None` if either series is too
/// short or the benchmark was flat.
fn relative_strength(closes: &[f64], benchmark_closes: &[f64], window: usize) -> Option<f64> {
    let symbol_return = period_return(closes, window)?;
    let benchmark_return = period_return(benchmark_closes, window)?;
    if (1.0 + benchmark_return).abs() < f64::EPSILON {
        return None;
    }
    Some((1.0 + symbol_return) / (1.0 + benchmark_return))
}

/// Computes the comparative-feature set for the most recent observation in
/// `bars` against an optional `benchmark_bars` reference index.
pub fn compute_comparative_features(bars: &[Bar], benchmark_bars: &[Bar], risk_free_rate: f64) -> ComparativeFeatures {
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();
    let benchmark_closes: Vec<f64> = benchmark_bars.iter().map(|b| b.close).collect();

    ComparativeFeatures {
        daily_return: period_return(&closes, 1),
        weekly_return: period_return(&closes, 5),
        monthly_return: period_return(&closes, 21),
        ytd_return: year_to_date_return(bars),
        volatility_30d: realized_volatility(&closes, 30),
        volatility_90d: realized_volatility(&closes, 90),
        sharpe_30d: sharpe_ratio(&closes, 30, risk_free_rate),
        sharpe_90d: sharpe_ratio(&closes, 90, risk_free_rate),
        max_drawdown_30d: max_drawdown(&closes, 30),
        max_drawdown_90d: max_drawdown(&closes, 90),
        relative_strength: relative_strength(&closes, &benchmark_closes, 90),
    }
}

fn year_to_date_return(bars: &[Bar]) -> Option<f64> {
    use chrono::Datelike;
    let latest = bars.last()?;
    let year = latest.date.year();
    let first_of_year = bars.iter().find(|b| b.date.year() == year)?;
    if first_of_year.close <= 0.0 {
        return None;
    }
    Some(latest.close / first_of_year.close - 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn bars_from_closes(closes: &[f64]) -> Vec<Bar> {
        closes
            .iter()
            .enumerate()
            .map(|(i, &c)| Bar {
                date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(i as i64),
                open: c,
                high: c,
                low: c,
                close: c,
                volume: 1_000_000.0,
            })
            .collect()
    }

    #[test]
    fn daily_return_reflects_last_two_closes() {
        let bars = bars_from_closes(&[100.0, 110.0]);
        let features = compute_comparative_features(&bars, &[], 0.02);
        assert!((features.daily_return.unwrap() - 0.10).abs() < 1e-9);
    }

    #[test]
    fn max_drawdown_is_never_positive() {
        let closes: Vec<f64> = (0..40).map(|i| 100.0 + (i as f64 * 0.37).sin() * 10.0).collect();
        let bars = bars_from_closes(&closes);
        let features = compute_comparative_features(&bars, &[], 0.02);
        assert!(features.max_drawdown_30d.unwrap() <= 0.0);
    }

    #[test]
    fn relative_strength_above_one_means_symbol_outperformed() {
        let mut symbol_closes = vec![100.0; 91];
        symbol_closes[90] = 120.0;
        let mut benchmark_closes = vec![100.0; 91];
        benchmark_closes[90] = 110.0;

        let symbol_bars = bars_from_closes(&symbol_closes);
        let benchmark_bars = bars_from_closes(&benchmark_closes);
        let features = compute_comparative_features(&symbol_bars, &benchmark_bars, 0.02);
        assert!(features.relative_strength.unwrap() > 1.0);
    }

    #[test]
    fn short_series_yields_absent_windowed_metrics() {
        let bars = bars_from_closes(&[100.0, 101.0, 99.0]);
        let features = compute_comparative_features(&bars, &[], 0.02);
        assert!(features.volatility_30d.is_none());
        assert!(features.sharpe_90d.is_none());
    }
}

use precompute_core::{
    ComparativeFeatures, DailyIndicators, IndicatorPercentiles, MomentumDirection, MomentumState,
    MomentumStrength, RiskRegime, SemanticState, TrendState, VolumeState,
};

// Fixed thresholds for the classification layer (§4.3a). Belong in code, not
// in a prompt: changing them changes the classifier's behavior directly.
const RISK_ATR_PCT_MODERATE: f64 = 2.0;
const RISK_ATR_PCT_HIGH: f64 = 4.0;
const RISK_ATR_PCT_EXTREME: f64 = 7.0;
const RISK_UNCERTAINTY_MODERATE: f64 = 35.0;
const RISK_UNCERTAINTY_HIGH: f64 = 60.0;
const RISK_UNCERTAINTY_EXTREME: f64 = 80.0;

const MOMENTUM_RSI_BULLISH: f64 = 55.0;
const MOMENTUM_RSI_BEARISH: f64 = 45.0;
const MOMENTUM_RSI_STRONG_BULLISH: f64 = 70.0;
const MOMENTUM_RSI_STRONG_BEARISH: f64 = 30.0;

const VOLUME_SURGE_RATIO: f64 = 2.0;
const VOLUME_ABOVE_AVERAGE_RATIO: f64 = 1.3;
const VOLUME_BELOW_AVERAGE_RATIO: f64 = 0.7;

/// Maps ATR% and the uncertainty score to a risk regime, taking the more
/// severe of the two readings.
fn classify_risk_regime(indicators: &DailyIndicators) -> RiskRegime {
    let atr_regime = match indicators.atr_pct {
        Some(v) if v >= RISK_ATR_PCT_EXTREME => RiskRegime::Extreme,
        Some(v) if v >= RISK_ATR_PCT_HIGH => RiskRegime::High,
        Some(v) if v >= RISK_ATR_PCT_MODERATE => RiskRegime::Moderate,
        Some(_) => RiskRegime::Low,
        None => RiskRegime::Low,
    };

    let uncertainty_regime = match indicators.uncertainty_score {
        Some(v) if v >= RISK_UNCERTAINTY_EXTREME => RiskRegime::Extreme,
        Some(v) if v >= RISK_UNCERTAINTY_HIGH => RiskRegime::High,
        Some(v) if v >= RISK_UNCERTAINTY_MODERATE => RiskRegime::Moderate,
        Some(_) => RiskRegime::Low,
        None => RiskRegime::Low,
    };

    severer_regime(atr_regime, uncertainty_regime)
}

fn severer_regime(a: RiskRegime, b: RiskRegime) -> RiskRegime {
    fn rank(r: RiskRegime) -> u8 {
        match r {
            RiskRegime::Low => 0,
            RiskRegime::Moderate => 1,
            RiskRegime::High => 2,
            RiskRegime::Extreme => 3,
        }
    }
    if rank(a) >= rank(b) {
        a
    } else {
        b
    }
}

/// Direction from the MA stack and RSI, strength from how far RSI sits past
/// its neutral band and whether the MACD histogram confirms direction.
fn classify_momentum(indicators: &DailyIndicators) -> MomentumState {
    let ma_bullish = matches!(
        (indicators.sma_20, indicators.sma_50),
        (Some(s20), Some(s50)) if s20 > s50
    );
    let ma_bearish = matches!(
        (indicators.sma_20, indicators.sma_50),
        (Some(s20), Some(s50)) if s20 < s50
    );
    let rsi = indicators.rsi_14.unwrap_or(50.0);
    let macd_confirms_up = indicators.macd_histogram.map(|h| h > 0.0).unwrap_or(false);
    let macd_confirms_down = indicators.macd_histogram.map(|h| h < 0.0).unwrap_or(false);

    let direction = if (ma_bullish || rsi > MOMENTUM_RSI_BULLISH) && rsi >= MOMENTUM_RSI_BEARISH {
        MomentumDirection::Bullish
    } else if (ma_bearish || rsi < MOMENTUM_RSI_BEARISH) && rsi <= MOMENTUM_RSI_BULLISH {
        MomentumDirection::Bearish
    } else {
        MomentumDirection::Neutral
    };

    let strength = match direction {
        MomentumDirection::Bullish if rsi >= MOMENTUM_RSI_STRONG_BULLISH && macd_confirms_up => {
            MomentumStrength::Strong
        }
        MomentumDirection::Bearish if rsi <= MOMENTUM_RSI_STRONG_BEARISH && macd_confirms_down => {
            MomentumStrength::Strong
        }
        MomentumDirection::Neutral => MomentumStrength::Weak,
        _ if ma_bullish || ma_bearish => MomentumStrength::Moderate,
        _ => MomentumStrength::Weak,
    };

    MomentumState { direction, strength }
}

/// MA-stack ordering (20 over 50 over 200, or the reverse) gives the trend
/// direction; a flat or inverted stack is ranging.
fn classify_trend(indicators: &DailyIndicators) -> TrendState {
    match (indicators.sma_20, indicators.sma_50, indicators.sma_200) {
        (Some(s20), Some(s50), Some(s200)) if s20 > s50 && s50 > s200 => TrendState::Uptrend,
        (Some(s20), Some(s50), Some(s200)) if s20 < s50 && s50 < s200 => TrendState::Downtrend,
        (Some(s20), Some(s50), None) if s20 > s50 => TrendState::Uptrend,
        (Some(s20), Some(s50), None) if s20 < s50 => TrendState::Downtrend,
        _ => TrendState::Ranging,
    }
}

fn classify_volume(indicators: &DailyIndicators) -> VolumeState {
    match indicators.volume_ratio {
        Some(r) if r >= VOLUME_SURGE_RATIO => VolumeState::Surge,
        Some(r) if r >= VOLUME_ABOVE_AVERAGE_RATIO => VolumeState::AboveAverage,
        Some(r) if r <= VOLUME_BELOW_AVERAGE_RATIO => VolumeState::BelowAverage,
        Some(_) => VolumeState::Normal,
        None => VolumeState::Normal,
    }
}

/// Maps a day's numeric indicators (plus percentiles/comparatives, carried
/// for future threshold refinement but not yet consulted directly) to the
/// closed semantic-state enums.
pub fn classify_semantic_state(
    indicators: &DailyIndicators,
    _percentiles: &IndicatorPercentiles,
    _comparative: &ComparativeFeatures,
) -> SemanticState {
    SemanticState {
        risk_regime: classify_risk_regime(indicators),
        momentum: classify_momentum(indicators),
        trend: classify_trend(indicators),
        volume: classify_volume(indicators),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn indicators_with(atr_pct: Option<f64>, uncertainty: Option<f64>) -> DailyIndicators {
        DailyIndicators {
            atr_pct,
            uncertainty_score: uncertainty,
            ..Default::default()
        }
    }

    #[test]
    fn extreme_atr_drives_extreme_risk_regime() {
        let indicators = indicators_with(Some(8.0), Some(10.0));
        assert_eq!(classify_risk_regime(&indicators), RiskRegime::Extreme);
    }

    #[test]
    fn low_readings_are_low_risk() {
        let indicators = indicators_with(Some(0.5), Some(5.0));
        assert_eq!(classify_risk_regime(&indicators), RiskRegime::Low);
    }

    #[test]
    fn uptrend_requires_full_ma_stack_ordering() {
        let indicators = DailyIndicators {
            sma_20: Some(110.0),
            sma_50: Some(105.0),
            sma_200: Some(100.0),
            ..Default::default()
        };
        assert_eq!(classify_trend(&indicators), TrendState::Uptrend);
    }

    #[test]
    fn missing_ma_stack_is_ranging() {
        let indicators = DailyIndicators::default();
        assert_eq!(classify_trend(&indicators), TrendState::Ranging);
    }

    #[test]
    fn volume_surge_threshold() {
        let indicators = DailyIndicators {
            volume_ratio: Some(2.5),
            ..Default::default()
        };
        assert_eq!(classify_volume(&indicators), VolumeState::Surge);
    }

    #[test]
    fn strong_bullish_momentum_needs_rsi_and_macd_confirmation() {
        let indicators = DailyIndicators {
            sma_20: Some(110.0),
            sma_50: Some(100.0),
            rsi_14: Some(75.0),
            macd_histogram: Some(0.5),
            ..Default::default()
        };
        let momentum = classify_momentum(&indicators);
        assert_eq!(momentum.direction, MomentumDirection::Bullish);
        assert_eq!(momentum.strength, MomentumStrength::Strong);
    }
}

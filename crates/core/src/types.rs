use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Stable opaque integer id for a master symbol record (Symbol registry, §3.1).
///
/// The sole cross-table foreign reference; display symbols must never be used
/// in its place.
pub type MasterId = i64;

/// The trading date a record *describes*, resolved in the configured timezone.
/// Distinct from any system timestamp column — see Timekeeping (§4.7).
pub type BusinessDate = NaiveDate;

/// A master symbol record.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Symbol {
    pub id: MasterId,
    pub company_name: String,
    pub exchange: String,
    pub currency: String,
    pub sector: Option<String>,
    pub industry: Option<String>,
    pub active: bool,
}

/// `surface-type` discriminant for a symbol alias (§3.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SurfaceType {
    Display,
    ExternalVendorA,
    ExternalVendorB,
    AnalystVendor,
}

impl SurfaceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SurfaceType::Display => "display",
            SurfaceType::ExternalVendorA => "external-vendor-a",
            SurfaceType::ExternalVendorB => "external-vendor-b",
            SurfaceType::AnalystVendor => "analyst-vendor",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "display" => Some(SurfaceType::Display),
            "external-vendor-a" => Some(SurfaceType::ExternalVendorA),
            "external-vendor-b" => Some(SurfaceType::ExternalVendorB),
            "analyst-vendor" => Some(SurfaceType::AnalystVendor),
            _ => None,
        }
    }
}

/// A (master-id, surface-symbol, surface-type, primary-flag) tuple.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolAlias {
    pub master_id: MasterId,
    pub surface_symbol: String,
    pub surface_type: String,
    pub is_primary: bool,
}

/// One daily OHLCV observation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// The raw time-series record for one (display-symbol, business-date) — §3.2.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSeries {
    pub display_symbol: String,
    /// The business date the series describes — must equal `bars.last().date`.
    pub business_date: BusinessDate,
    /// Ascending by observation date; up to ~365 daily observations.
    pub bars: Vec<Bar>,
    /// Opaque metadata document (sector, industry, market cap, ...).
    pub metadata: serde_json::Value,
    pub earliest_observation: Option<NaiveDate>,
    pub latest_observation: Option<NaiveDate>,
    pub row_count: usize,
    /// System timestamp of the fetch, not a business date.
    pub fetched_at: DateTime<Utc>,
    pub source_tag: String,
    /// System timestamp: when the cached row should be considered stale.
    pub expires_at: DateTime<Utc>,
}

/// Daily indicators for one (symbol, date) — §3.3.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DailyIndicators {
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: Option<f64>,
    pub volume: Option<f64>,
    pub sma_20: Option<f64>,
    pub sma_50: Option<f64>,
    pub sma_200: Option<f64>,
    pub rsi_14: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub macd_histogram: Option<f64>,
    pub bb_upper: Option<f64>,
    pub bb_middle: Option<f64>,
    pub bb_lower: Option<f64>,
    pub atr_14: Option<f64>,
    pub atr_pct: Option<f64>,
    pub vwap: Option<f64>,
    pub volume_sma: Option<f64>,
    pub volume_ratio: Option<f64>,
    pub uncertainty_score: Option<f64>,
    pub price_to_vwap_pct: Option<f64>,
}

/// Indicator percentiles for one (symbol, date, lookback-days) — §3.3.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct IndicatorPercentiles {
    pub lookback_days: i32,
    pub rsi_14_percentile: Option<f64>,
    pub atr_pct_percentile: Option<f64>,
    pub volume_ratio_percentile: Option<f64>,
    pub uncertainty_percentile: Option<f64>,
    /// Fraction of the lookback window with RSI(14) > 70.
    pub rsi_overbought_frequency: Option<f64>,
    /// Fraction of the lookback window with RSI(14) < 30.
    pub rsi_oversold_frequency: Option<f64>,
}

/// Comparative features for one (symbol, date) — §3.3.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ComparativeFeatures {
    pub daily_return: Option<f64>,
    pub weekly_return: Option<f64>,
    pub monthly_return: Option<f64>,
    pub ytd_return: Option<f64>,
    pub volatility_30d: Option<f64>,
    pub volatility_90d: Option<f64>,
    pub sharpe_30d: Option<f64>,
    pub sharpe_90d: Option<f64>,
    pub max_drawdown_30d: Option<f64>,
    pub max_drawdown_90d: Option<f64>,
    pub relative_strength: Option<f64>,
}

/// RiskRegime ∈ {LOW, MODERATE, HIGH, EXTREME} (§4.3a).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RiskRegime {
    Low,
    Moderate,
    High,
    Extreme,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MomentumDirection {
    Bullish,
    Bearish,
    Neutral,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MomentumStrength {
    Strong,
    Moderate,
    Weak,
}

/// MomentumState = (direction, strength) (§4.3a).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct MomentumState {
    pub direction: MomentumDirection,
    pub strength: MomentumStrength,
}

/// TrendState ∈ {UPTREND, DOWNTREND, RANGING} (§4.3a).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TrendState {
    Uptrend,
    Downtrend,
    Ranging,
}

/// VolumeState ∈ {SURGE, ABOVE_AVERAGE, NORMAL, BELOW_AVERAGE} (§4.3a).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VolumeState {
    Surge,
    AboveAverage,
    Normal,
    BelowAverage,
}

/// The semantic classification bundle for one (symbol, date) (§4.3a).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticState {
    pub risk_regime: RiskRegime,
    pub momentum: MomentumState,
    pub trend: TrendState,
    pub volume: VolumeState,
}

/// Artifact lifecycle status (§3.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactStatus {
    Pending,
    Completed,
    Failed,
}

impl ArtifactStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactStatus::Pending => "pending",
            ArtifactStatus::Completed => "completed",
            ArtifactStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ArtifactStatus::Pending),
            "completed" => Some(ArtifactStatus::Completed),
            "failed" => Some(ArtifactStatus::Failed),
            _ => None,
        }
    }
}

/// The precomputed per-symbol-per-day artifact served to front-ends (§3.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub display_symbol: String,
    pub business_date: BusinessDate,
    pub narrative: Option<String>,
    pub payload: serde_json::Value,
    pub generation_latency_ms: Option<i64>,
    pub chart_blob_ref: Option<String>,
    pub status: ArtifactStatus,
    pub error_message: Option<String>,
    pub computed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub document_ref: Option<String>,
}

/// One row of the reference-data side-stream (§3.5). Produced by an external,
/// out-of-scope ingest loop; the core only reads this table.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ReferenceDataPoint {
    pub trading_date: NaiveDate,
    pub source_stock_code: String,
    pub surface_symbol: String,
    pub metric_code: String,
    pub numeric_value: Option<f64>,
    pub text_value: Option<String>,
    pub source_object_ref: String,
}

/// A watchlist entry (§3.6).
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WatchlistItem {
    pub user_id: String,
    pub symbol: String,
    pub added_at: DateTime<Utc>,
}

/// Job-status log status for on-demand report jobs (§3.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Requested,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Requested => "requested",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "requested" => Some(JobStatus::Requested),
            "processing" => Some(JobStatus::Processing),
            "completed" => Some(JobStatus::Completed),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

/// A replace-only merge of two price sequences: never shrinks the cached
/// sequence (Design Notes §9, "Monotonic data in cached reads").
pub fn merge_monotonic(cached: Vec<Bar>, incoming: Vec<Bar>) -> Vec<Bar> {
    if incoming.len() >= cached.len() {
        incoming
    } else {
        cached
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_monotonic_never_shrinks() {
        let bar = |d: i64| Bar {
            date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(d),
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            volume: 1.0,
        };
        let cached = vec![bar(0), bar(1), bar(2)];
        let shorter = vec![bar(0), bar(1)];
        assert_eq!(merge_monotonic(cached.clone(), shorter).len(), 3);

        let longer = vec![bar(0), bar(1), bar(2), bar(3)];
        assert_eq!(merge_monotonic(cached, longer).len(), 4);
    }
}

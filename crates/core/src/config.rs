use crate::error::{PrecomputeError, Result};
use std::time::Duration;

/// Process-wide configuration, read once from the environment at startup and
/// validated before any request or run is served (§4.6 "Initialization",
/// §7 "config-missing").
///
/// Every field here corresponds to a variable in §6.6's configuration
/// surface. There is no default for anything security- or
/// correctness-relevant (DSN, credentials, timezone): a missing value aborts
/// startup rather than silently falling back.
#[derive(Debug, Clone)]
pub struct Config {
    /// IANA zone name the whole system resolves business dates in (§4.7).
    pub timezone: String,
    pub database_url: String,
    pub market_data_api_base: String,
    pub market_data_api_key: String,
    /// Max requests/minute the fetcher issues against the provider.
    pub market_data_rate_limit_per_minute: u32,
    pub object_store_bucket: String,
    /// Shared secret gating watchlist write endpoints (Read API §4.6).
    pub api_shared_secret: Option<String>,
    pub workers_concurrent: usize,
    /// Wall-clock budget for one worker message; §4.4/§5.
    pub worker_budget: Duration,
    /// Fraction of `worker_budget` reserved for finalization (>= 0.2 per §4.4).
    pub worker_finalization_margin: f64,
    pub default_lookback_days: i32,
    pub max_redeliveries: u32,
    /// Reference index comparative features are measured against (§4.3).
    pub benchmark_symbol: String,
    /// Risk-free rate fed into the Sharpe-ratio calculation (§4.3).
    pub risk_free_rate: f64,
    /// Whole-run wall-clock budget the controller's phase barriers are cut from (§4.5).
    pub run_budget: Duration,
}

impl Config {
    /// Loads configuration from the process environment, calling
    /// `dotenvy::dotenv()` first so a local `.env` can seed development runs
    /// — mirrors the teacher's CLI/server startup sequence.
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut missing = Vec::new();
        let required = |name: &str, missing: &mut Vec<String>| -> String {
            match std::env::var(name) {
                Ok(v) if !v.is_empty() => v,
                _ => {
                    missing.push(name.to_string());
                    String::new()
                }
            }
        };

        let timezone = required("PRECOMPUTE_TIMEZONE", &mut missing);
        let database_url = required("DATABASE_URL", &mut missing);
        let market_data_api_base = required("MARKET_DATA_API_BASE", &mut missing);
        let market_data_api_key = required("MARKET_DATA_API_KEY", &mut missing);
        let object_store_bucket = required("OBJECT_STORE_BUCKET", &mut missing);

        if !missing.is_empty() {
            return Err(PrecomputeError::ConfigMissing(format!(
                "required environment variables not set: {}",
                missing.join(", ")
            )));
        }

        // Validate the timezone resolves to a real IANA zone before anything
        // else starts — a typo here must not surface later as a silent UTC
        // fallback.
        timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|_| PrecomputeError::ConfigMissing(format!("invalid PRECOMPUTE_TIMEZONE: {timezone}")))?;

        let workers_concurrent = std::env::var("WORKERS_CONCURRENT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(8);

        let worker_budget_secs: u64 = std::env::var("WORKER_BUDGET_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(120);

        let market_data_rate_limit_per_minute = std::env::var("MARKET_DATA_RATE_LIMIT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(500);

        let default_lookback_days = std::env::var("DEFAULT_LOOKBACK_DAYS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(365);

        let max_redeliveries = std::env::var("MAX_REDELIVERIES")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(3);

        let api_shared_secret = std::env::var("API_SHARED_SECRET").ok().filter(|s| !s.is_empty());

        let benchmark_symbol = std::env::var("BENCHMARK_SYMBOL").unwrap_or_else(|_| "SPY".to_string());
        let risk_free_rate = std::env::var("RISK_FREE_RATE")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0.04);
        let run_budget_secs: u64 = std::env::var("RUN_BUDGET_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(1800);

        Ok(Self {
            timezone,
            database_url,
            market_data_api_base,
            market_data_api_key,
            market_data_rate_limit_per_minute,
            object_store_bucket,
            api_shared_secret,
            workers_concurrent,
            worker_budget: Duration::from_secs(worker_budget_secs),
            worker_finalization_margin: 0.2,
            default_lookback_days,
            max_redeliveries,
            benchmark_symbol,
            risk_free_rate,
            run_budget: Duration::from_secs(run_budget_secs),
        })
    }

    pub fn tz(&self) -> chrono_tz::Tz {
        self.timezone
            .parse()
            .expect("timezone was validated during Config::load")
    }
}

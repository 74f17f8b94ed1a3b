mod rate_limiter;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use precompute_core::{Bar, FetchErrorKind, PrecomputeError, RawSeries, Result};
use rate_limiter::RateLimiter;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

/// Resolves a display symbol to whatever surface symbol the vendor expects
/// (§4.2 "Alias translation"). Backed by the repository's alias table in
/// production; a no-op identity resolver is enough for providers that use
/// the display symbol directly.
#[async_trait]
pub trait AliasResolver: Send + Sync {
    async fn vendor_symbol(&self, display_symbol: &str) -> Result<String>;
}

pub struct IdentityAliasResolver;

#[async_trait]
impl AliasResolver for IdentityAliasResolver {
    async fn vendor_symbol(&self, display_symbol: &str) -> Result<String> {
        Ok(display_symbol.to_string())
    }
}

/// Produces the raw time-series record for one (master-id, display-symbol) —
/// the Fetcher component's whole contract (§4.2).
#[async_trait]
pub trait MarketDataFetcher: Send + Sync {
    async fn fetch_series(&self, display_symbol: &str, lookback_days: i64) -> Result<RawSeries>;
}

/// Replaces non-finite floats with an absent-value sentinel (`None`) before
/// they cross the fetcher boundary — enforced because the JSON persistence
/// layer downstream rejects NaN/Infinity (§4.2, §7, §9).
pub fn finite_or_absent(value: f64) -> Option<f64> {
    if value.is_finite() {
        Some(value)
    } else {
        None
    }
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

#[derive(Debug, Deserialize)]
struct AggregateBarResponse {
    #[serde(rename = "t")]
    timestamp_ms: i64,
    #[serde(rename = "o")]
    open: f64,
    #[serde(rename = "h")]
    high: f64,
    #[serde(rename = "l")]
    low: f64,
    #[serde(rename = "c")]
    close: f64,
    #[serde(rename = "v")]
    volume: f64,
}

#[derive(Debug, Deserialize)]
struct AggregatesResponse {
    #[serde(default)]
    results: Vec<AggregateBarResponse>,
}

#[derive(Debug, Deserialize)]
struct TickerDetailsResponse {
    #[serde(default)]
    results: Option<serde_json::Value>,
}

/// HTTP implementation of [`MarketDataFetcher`] against a Polygon-shaped
/// market-data API: OHLCV aggregates endpoint plus a ticker-details metadata
/// endpoint, both rate-limited and retried on 429.
pub struct HttpMarketDataFetcher {
    api_base: String,
    api_key: String,
    client: Client,
    rate_limiter: RateLimiter,
    alias_resolver: std::sync::Arc<dyn AliasResolver>,
}

impl HttpMarketDataFetcher {
    pub fn new(api_base: String, api_key: String, rate_limit_per_minute: u32) -> Self {
        Self::with_alias_resolver(
            api_base,
            api_key,
            rate_limit_per_minute,
            std::sync::Arc::new(IdentityAliasResolver),
        )
    }

    pub fn with_alias_resolver(
        api_base: String,
        api_key: String,
        rate_limit_per_minute: u32,
        alias_resolver: std::sync::Arc<dyn AliasResolver>,
    ) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(90))
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            api_base,
            api_key,
            client,
            rate_limiter: RateLimiter::new(rate_limit_per_minute as usize, Duration::from_secs(60)),
            alias_resolver,
        }
    }

    async fn send_request(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        let request = builder.build().map_err(|e| PrecomputeError::Fetch {
            kind: FetchErrorKind::Transport,
            retryable: false,
            cause: e.to_string(),
        })?;

        for attempt in 0..3u32 {
            self.rate_limiter.acquire().await;
            let req_clone = request.try_clone().ok_or_else(|| PrecomputeError::Fetch {
                kind: FetchErrorKind::Transport,
                retryable: false,
                cause: "request body is not clonable for retry".to_string(),
            })?;

            let response = self.client.execute(req_clone).await.map_err(|e| {
                let kind = if e.is_timeout() {
                    FetchErrorKind::Timeout
                } else {
                    FetchErrorKind::Transport
                };
                PrecomputeError::Fetch {
                    kind,
                    retryable: true,
                    cause: e.to_string(),
                }
            })?;

            if response.status().as_u16() != 429 {
                return Ok(response);
            }

            let wait_secs = 15u64;
            tracing::warn!(attempt, wait_secs, "provider rate-limited the fetcher, backing off");
            tokio::time::sleep(Duration::from_secs(wait_secs)).await;
        }

        Err(PrecomputeError::Fetch {
            kind: FetchErrorKind::RateLimit,
            retryable: true,
            cause: "rate limited by provider after 3 retries".to_string(),
        })
    }

    async fn fetch_aggregates(&self, vendor_symbol: &str, lookback_days: i64) -> Result<Vec<Bar>> {
        let to = Utc::now();
        let from = to - chrono::Duration::days(lookback_days);
        let url = format!(
            "{}/v2/aggs/ticker/{}/range/1/day/{}/{}",
            self.api_base,
            vendor_symbol,
            from.format("%Y-%m-%d"),
            to.format("%Y-%m-%d")
        );

        let response = self
            .send_request(
                self.client
                    .get(&url)
                    .query(&[("apiKey", self.api_key.as_str()), ("adjusted", "true")]),
            )
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(PrecomputeError::Fetch {
                kind: FetchErrorKind::Empty,
                retryable: false,
                cause: format!("no aggregates for {vendor_symbol}"),
            });
        }
        if !response.status().is_success() {
            return Err(PrecomputeError::Fetch {
                kind: FetchErrorKind::Transport,
                retryable: true,
                cause: format!("HTTP {}", response.status()),
            });
        }

        let body: AggregatesResponse = response.json().await.map_err(|e| PrecomputeError::Fetch {
            kind: FetchErrorKind::Transport,
            retryable: true,
            cause: e.to_string(),
        })?;

        if body.results.is_empty() {
            return Err(PrecomputeError::Fetch {
                kind: FetchErrorKind::Empty,
                retryable: false,
                cause: format!("provider returned zero bars for {vendor_symbol}"),
            });
        }

        let mut bars: Vec<Bar> = body
            .results
            .into_iter()
            .map(|r| Bar {
                date: DateTime::from_timestamp_millis(r.timestamp_ms)
                    .map(|dt| dt.date_naive())
                    .unwrap_or_else(|| Utc::now().date_naive()),
                open: finite_or_zero(r.open),
                high: finite_or_zero(r.high),
                low: finite_or_zero(r.low),
                close: finite_or_zero(r.close),
                // NaN/Infinity volume is replaced at the absent-value
                // sentinel (0.0 for an additive OHLCV quantity) rather than
                // propagated — see scenario 6 ("Non-finite value").
                volume: finite_or_zero(r.volume),
            })
            .collect();

        bars.sort_by_key(|b| b.date);

        let has_duplicate_dates = bars.windows(2).any(|w| w[0].date == w[1].date);
        if has_duplicate_dates {
            return Err(PrecomputeError::Fetch {
                kind: FetchErrorKind::Empty,
                retryable: false,
                cause: format!("duplicate observation dates in {vendor_symbol} series"),
            });
        }

        Ok(bars)
    }

    async fn fetch_metadata(&self, vendor_symbol: &str) -> serde_json::Value {
        let url = format!("{}/v3/reference/tickers/{}", self.api_base, vendor_symbol);
        let result = self
            .send_request(self.client.get(&url).query(&[("apiKey", self.api_key.as_str())]))
            .await;

        match result {
            Ok(response) if response.status().is_success() => response
                .json::<TickerDetailsResponse>()
                .await
                .ok()
                .and_then(|r| r.results)
                .unwrap_or(serde_json::Value::Null),
            _ => serde_json::Value::Null,
        }
    }
}

#[async_trait]
impl MarketDataFetcher for HttpMarketDataFetcher {
    async fn fetch_series(&self, display_symbol: &str, lookback_days: i64) -> Result<RawSeries> {
        let vendor_symbol = self.alias_resolver.vendor_symbol(display_symbol).await?;

        let (bars_result, metadata) =
            tokio::join!(self.fetch_aggregates(&vendor_symbol, lookback_days), self.fetch_metadata(&vendor_symbol));
        let bars = bars_result?;

        let earliest = bars.first().map(|b| b.date);
        let latest = bars.last().map(|b| b.date);
        let business_date = latest.unwrap_or_else(|| Utc::now().date_naive());
        let now = Utc::now();

        Ok(RawSeries {
            display_symbol: display_symbol.to_string(),
            business_date,
            row_count: bars.len(),
            bars,
            metadata,
            earliest_observation: earliest,
            latest_observation: latest,
            fetched_at: now,
            source_tag: "market-data-provider".to_string(),
            // Cache-expiry is finalized by the repository at write time
            // (it needs the configured clock, not the fetcher's wall clock);
            // this is a conservative placeholder overwritten on store.
            expires_at: now + chrono::Duration::hours(16),
        })
    }
}

pub fn business_date_from_bars(bars: &[Bar]) -> Option<NaiveDate> {
    bars.last().map(|b| b.date)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finite_or_absent_replaces_nan_and_infinity() {
        assert_eq!(finite_or_absent(f64::NAN), None);
        assert_eq!(finite_or_absent(f64::INFINITY), None);
        assert_eq!(finite_or_absent(f64::NEG_INFINITY), None);
        assert_eq!(finite_or_absent(1.5), Some(1.5));
    }

    #[test]
    fn finite_or_zero_replaces_non_finite_with_zero() {
        assert_eq!(finite_or_zero(f64::NAN), 0.0);
        assert_eq!(finite_or_zero(f64::INFINITY), 0.0);
        assert_eq!(finite_or_zero(3.0), 3.0);
    }
}

use crate::db::Database;
use crate::tables;
use chrono::Utc;
use precompute_core::{
    Artifact, ArtifactStatus, Bar, BusinessDate, ComparativeFeatures, Clock, DailyIndicators, IndicatorPercentiles,
    JobStatus, MasterId, PrecomputeError, RawSeries, ReferenceDataPoint, Result, WatchlistItem,
};
use sqlx::Row;

/// Sole owner of the SQL surface (§4.1). Every query goes through one of
/// these methods; no caller elsewhere in the workspace opens its own
/// connection or embeds a table name.
pub struct Repository {
    db: Database,
}

impl Repository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }

    /// Resolves a surface symbol to its master id via the alias table.
    pub async fn resolve(&self, surface_symbol: &str) -> Result<MasterId> {
        let row = sqlx::query(&format!(
            "SELECT master_id FROM {} WHERE surface_symbol = ?",
            tables::SYMBOL_ALIASES
        ))
        .bind(surface_symbol)
        .fetch_optional(self.db.pool())
        .await
        .map_err(|e| PrecomputeError::Database(e.to_string()))?;

        match row {
            Some(row) => Ok(row.try_get::<i64, _>("master_id").map_err(|e| PrecomputeError::Database(e.to_string()))?),
            None => Err(PrecomputeError::NotFound(format!("no alias for surface symbol {surface_symbol}"))),
        }
    }

    /// Joins master symbols to their primary alias for every active symbol.
    pub async fn list_active_symbols(&self) -> Result<Vec<(MasterId, String)>> {
        let query = format!(
            "SELECT s.id as master_id, a.surface_symbol as display_symbol
             FROM {symbols} s
             JOIN {aliases} a ON a.master_id = s.id
             WHERE s.active = 1 AND a.is_primary = 1
             ORDER BY s.id",
            symbols = tables::SYMBOLS,
            aliases = tables::SYMBOL_ALIASES,
        );

        let rows = sqlx::query(&query)
            .fetch_all(self.db.pool())
            .await
            .map_err(|e| PrecomputeError::Database(e.to_string()))?;

        rows.into_iter()
            .map(|row| {
                let master_id: i64 = row.try_get("master_id").map_err(|e| PrecomputeError::Database(e.to_string()))?;
                let display_symbol: String =
                    row.try_get("display_symbol").map_err(|e| PrecomputeError::Database(e.to_string()))?;
                Ok((master_id, display_symbol))
            })
            .collect()
    }

    /// (display_symbol, company_name) for every active symbol (§4.6 `search`),
    /// meant to be loaded once at process start rather than per request.
    pub async fn list_symbol_directory(&self) -> Result<Vec<(String, String)>> {
        let query = format!(
            "SELECT a.surface_symbol as display_symbol, s.company_name as company_name
             FROM {symbols} s
             JOIN {aliases} a ON a.master_id = s.id
             WHERE s.active = 1 AND a.is_primary = 1
             ORDER BY s.id",
            symbols = tables::SYMBOLS,
            aliases = tables::SYMBOL_ALIASES,
        );

        let rows = sqlx::query(&query)
            .fetch_all(self.db.pool())
            .await
            .map_err(|e| PrecomputeError::Database(e.to_string()))?;

        rows.into_iter()
            .map(|row| {
                let display_symbol: String =
                    row.try_get("display_symbol").map_err(|e| PrecomputeError::Database(e.to_string()))?;
                let company_name: String =
                    row.try_get("company_name").map_err(|e| PrecomputeError::Database(e.to_string()))?;
                Ok((display_symbol, company_name))
            })
            .collect()
    }

    /// Upserts the raw series keyed by (display_symbol, business_date).
    /// `fetched_at`/`expires_at` are resolved from `clock`, not trusted from
    /// the caller, so cache expiry always reflects the configured timezone.
    pub async fn store_raw(&self, clock: &dyn Clock, mut series: RawSeries) -> Result<()> {
        if series.bars.is_empty() {
            return Err(PrecomputeError::InvariantViolation(format!(
                "refusing to store an empty bar sequence for {}",
                series.display_symbol
            )));
        }

        series.fetched_at = clock.now_utc();
        series.expires_at = clock.next_business_day_0800();

        let bars_json =
            serde_json::to_string(&series.bars).map_err(|e| PrecomputeError::OperationFailed(e.to_string()))?;

        let result = sqlx::query(&format!(
            "INSERT INTO {table} (display_symbol, business_date, bars_json, metadata_json,
                earliest_observation, latest_observation, row_count, fetched_at, source_tag, expires_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(display_symbol, business_date) DO UPDATE SET
                bars_json = excluded.bars_json,
                metadata_json = excluded.metadata_json,
                earliest_observation = excluded.earliest_observation,
                latest_observation = excluded.latest_observation,
                row_count = excluded.row_count,
                fetched_at = excluded.fetched_at,
                source_tag = excluded.source_tag,
                expires_at = excluded.expires_at",
            table = tables::RAW_SERIES,
        ))
        .bind(&series.display_symbol)
        .bind(series.business_date)
        .bind(&bars_json)
        .bind(series.metadata.to_string())
        .bind(series.earliest_observation)
        .bind(series.latest_observation)
        .bind(series.row_count as i64)
        .bind(series.fetched_at.to_rfc3339())
        .bind(&series.source_tag)
        .bind(series.expires_at.to_rfc3339())
        .execute(self.db.pool())
        .await
        .map_err(|e| PrecomputeError::Database(e.to_string()))?;

        fail_if_no_rows_affected(result.rows_affected(), "store_raw")
    }

    /// Reads back the raw bar sequence for (display_symbol, business_date) —
    /// the prerequisite check the controller's barrier relies on (§3.3, §4.5).
    pub async fn read_raw_bars(&self, display_symbol: &str, business_date: BusinessDate) -> Result<Vec<Bar>> {
        let row = sqlx::query(&format!(
            "SELECT bars_json FROM {} WHERE display_symbol = ? AND business_date = ?",
            tables::RAW_SERIES
        ))
        .bind(display_symbol)
        .bind(business_date)
        .fetch_optional(self.db.pool())
        .await
        .map_err(|e| PrecomputeError::Database(e.to_string()))?;

        let Some(row) = row else {
            return Err(PrecomputeError::NotFound(format!(
                "no raw series for {display_symbol} on {business_date}"
            )));
        };

        let bars_json: String = row.try_get("bars_json").map_err(|e| PrecomputeError::Database(e.to_string()))?;
        serde_json::from_str(&bars_json).map_err(|e| PrecomputeError::OperationFailed(e.to_string()))
    }

    async fn store_payload(&self, table: &str, display_symbol: &str, business_date: BusinessDate, payload: &str) -> Result<()> {
        // Parent-raw-record prerequisite is enforced at the call site (worker,
        // §4.5), not here — a foreign key on business_date would require a
        // parent table keyed identically, which raw_series already is; this
        // repository trusts the controller's barrier rather than re-deriving it.
        let result = sqlx::query(&format!(
            "INSERT INTO {table} (display_symbol, business_date, payload_json)
             VALUES (?, ?, ?)
             ON CONFLICT(display_symbol, business_date) DO UPDATE SET payload_json = excluded.payload_json"
        ))
        .bind(display_symbol)
        .bind(business_date)
        .bind(payload)
        .execute(self.db.pool())
        .await
        .map_err(|e| PrecomputeError::Database(e.to_string()))?;

        fail_if_no_rows_affected(result.rows_affected(), "store_payload")
    }

    pub async fn store_indicators(&self, display_symbol: &str, business_date: BusinessDate, indicators: &DailyIndicators) -> Result<()> {
        let payload = serde_json::to_string(indicators).map_err(|e| PrecomputeError::OperationFailed(e.to_string()))?;
        self.store_payload(tables::DAILY_INDICATORS, display_symbol, business_date, &payload).await
    }

    pub async fn store_percentiles(
        &self,
        display_symbol: &str,
        business_date: BusinessDate,
        percentiles: &IndicatorPercentiles,
    ) -> Result<()> {
        let payload = serde_json::to_string(percentiles).map_err(|e| PrecomputeError::OperationFailed(e.to_string()))?;
        let result = sqlx::query(&format!(
            "INSERT INTO {table} (display_symbol, business_date, lookback_days, payload_json)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(display_symbol, business_date, lookback_days) DO UPDATE SET payload_json = excluded.payload_json",
            table = tables::INDICATOR_PERCENTILES,
        ))
        .bind(display_symbol)
        .bind(business_date)
        .bind(percentiles.lookback_days)
        .bind(&payload)
        .execute(self.db.pool())
        .await
        .map_err(|e| PrecomputeError::Database(e.to_string()))?;

        fail_if_no_rows_affected(result.rows_affected(), "store_percentiles")
    }

    pub async fn store_comparatives(
        &self,
        display_symbol: &str,
        business_date: BusinessDate,
        comparative: &ComparativeFeatures,
    ) -> Result<()> {
        let payload = serde_json::to_string(comparative).map_err(|e| PrecomputeError::OperationFailed(e.to_string()))?;
        self.store_payload(tables::COMPARATIVE_FEATURES, display_symbol, business_date, &payload).await
    }

    /// Upserts an artifact, advancing its status per §3.4's lifecycle.
    pub async fn upsert_artifact(&self, artifact: &Artifact) -> Result<()> {
        let payload = serde_json::to_string(&artifact.payload).map_err(|e| PrecomputeError::OperationFailed(e.to_string()))?;

        let result = sqlx::query(&format!(
            "INSERT INTO {table} (display_symbol, business_date, narrative, payload_json,
                generation_latency_ms, chart_blob_ref, status, error_message, computed_at, expires_at, document_ref)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(display_symbol, business_date) DO UPDATE SET
                narrative = excluded.narrative,
                payload_json = excluded.payload_json,
                generation_latency_ms = excluded.generation_latency_ms,
                chart_blob_ref = excluded.chart_blob_ref,
                status = excluded.status,
                error_message = excluded.error_message,
                computed_at = excluded.computed_at,
                expires_at = excluded.expires_at,
                document_ref = excluded.document_ref",
            table = tables::ARTIFACTS,
        ))
        .bind(&artifact.display_symbol)
        .bind(artifact.business_date)
        .bind(&artifact.narrative)
        .bind(&payload)
        .bind(artifact.generation_latency_ms)
        .bind(&artifact.chart_blob_ref)
        .bind(artifact.status.as_str())
        .bind(&artifact.error_message)
        .bind(artifact.computed_at.to_rfc3339())
        .bind(artifact.expires_at.to_rfc3339())
        .bind(&artifact.document_ref)
        .execute(self.db.pool())
        .await
        .map_err(|e| PrecomputeError::Database(e.to_string()))?;

        fail_if_no_rows_affected(result.rows_affected(), "upsert_artifact")
    }

    pub async fn read_artifact(&self, display_symbol: &str, business_date: BusinessDate) -> Result<Artifact> {
        let row = sqlx::query(&format!(
            "SELECT * FROM {} WHERE display_symbol = ? AND business_date = ?",
            tables::ARTIFACTS
        ))
        .bind(display_symbol)
        .bind(business_date)
        .fetch_optional(self.db.pool())
        .await
        .map_err(|e| PrecomputeError::Database(e.to_string()))?;

        let Some(row) = row else {
            return Err(PrecomputeError::NotFound(format!(
                "no artifact for {display_symbol} on {business_date}"
            )));
        };

        row_to_artifact(&row)
    }

    /// Top-K symbols by a comparative-features metric for one business date
    /// (§4.6 `rankings`). The derived tables hold an opaque JSON payload per
    /// row rather than one SQL column per metric (§3.3), so ranking sorts in
    /// memory after the read rather than pushing an `ORDER BY` into the
    /// query; the candidate set is one business date's worth of symbols,
    /// never the whole table.
    pub async fn rank_by_comparative_metric(
        &self,
        business_date: BusinessDate,
        metric: &str,
        limit: usize,
    ) -> Result<Vec<(String, f64)>> {
        let rows = sqlx::query(&format!(
            "SELECT display_symbol, payload_json FROM {} WHERE business_date = ?",
            tables::COMPARATIVE_FEATURES
        ))
        .bind(business_date)
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| PrecomputeError::Database(e.to_string()))?;

        let mut ranked: Vec<(String, f64)> = Vec::new();
        for row in rows {
            let display_symbol: String = row.try_get("display_symbol").map_err(|e| PrecomputeError::Database(e.to_string()))?;
            let payload_json: String = row.try_get("payload_json").map_err(|e| PrecomputeError::Database(e.to_string()))?;
            let features: ComparativeFeatures =
                serde_json::from_str(&payload_json).map_err(|e| PrecomputeError::OperationFailed(e.to_string()))?;
            if let Some(value) = metric_value(&features, metric) {
                ranked.push((display_symbol, value));
            }
        }

        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(limit);
        Ok(ranked)
    }

    /// Read-only lookup into the reference-data side-stream (§3.5). Absence
    /// is `None`, never an error — the independent producer may simply not
    /// have written yet.
    pub async fn read_reference_data(&self, trading_date: BusinessDate, source_stock_code: &str) -> Result<Vec<ReferenceDataPoint>> {
        let rows = sqlx::query_as::<_, ReferenceDataPoint>(&format!(
            "SELECT trading_date, source_stock_code, surface_symbol, metric_code, numeric_value, text_value, source_object_ref
             FROM {} WHERE trading_date = ? AND source_stock_code = ?",
            tables::REFERENCE_DATA,
        ))
        .bind(trading_date)
        .bind(source_stock_code)
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| PrecomputeError::Database(e.to_string()))?;

        Ok(rows)
    }

    pub async fn record_job(&self, clock: &dyn Clock, job_id: &str, symbol: &str, business_date: BusinessDate) -> Result<()> {
        let now = clock.now_utc().to_rfc3339();
        let result = sqlx::query(&format!(
            "INSERT INTO {} (job_id, symbol, business_date, status, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            tables::JOBS,
        ))
        .bind(job_id)
        .bind(symbol)
        .bind(business_date)
        .bind(JobStatus::Requested.as_str())
        .bind(&now)
        .bind(&now)
        .execute(self.db.pool())
        .await
        .map_err(|e| PrecomputeError::Database(e.to_string()))?;

        fail_if_no_rows_affected(result.rows_affected(), "record_job")
    }

    pub async fn advance_job(&self, clock: &dyn Clock, job_id: &str, status: JobStatus) -> Result<()> {
        let result = sqlx::query(&format!("UPDATE {} SET status = ?, updated_at = ? WHERE job_id = ?", tables::JOBS))
            .bind(status.as_str())
            .bind(clock.now_utc().to_rfc3339())
            .bind(job_id)
            .execute(self.db.pool())
            .await
            .map_err(|e| PrecomputeError::Database(e.to_string()))?;

        fail_if_no_rows_affected(result.rows_affected(), "advance_job")
    }

    pub async fn read_job(&self, job_id: &str) -> Result<JobStatus> {
        let row = sqlx::query(&format!("SELECT status FROM {} WHERE job_id = ?", tables::JOBS))
            .bind(job_id)
            .fetch_optional(self.db.pool())
            .await
            .map_err(|e| PrecomputeError::Database(e.to_string()))?;

        let Some(row) = row else {
            return Err(PrecomputeError::NotFound(format!("no job {job_id}")));
        };
        let status: String = row.try_get("status").map_err(|e| PrecomputeError::Database(e.to_string()))?;
        JobStatus::from_str(&status).ok_or_else(|| PrecomputeError::SchemaMismatch(format!("unknown job status {status}")))
    }

    pub async fn add_watchlist_item(&self, user_id: &str, symbol: &str) -> Result<()> {
        let result = sqlx::query(&format!(
            "INSERT OR IGNORE INTO {} (user_id, symbol, added_at) VALUES (?, ?, ?)",
            tables::WATCHLIST,
        ))
        .bind(user_id)
        .bind(symbol)
        .bind(Utc::now().to_rfc3339())
        .execute(self.db.pool())
        .await
        .map_err(|e| PrecomputeError::Database(e.to_string()))?;

        // INSERT OR IGNORE legitimately affects zero rows when the item
        // already exists — that's idempotent success, not a failure.
        let _ = result.rows_affected();
        Ok(())
    }

    pub async fn remove_watchlist_item(&self, user_id: &str, symbol: &str) -> Result<()> {
        sqlx::query(&format!("DELETE FROM {} WHERE user_id = ? AND symbol = ?", tables::WATCHLIST))
            .bind(user_id)
            .bind(symbol)
            .execute(self.db.pool())
            .await
            .map_err(|e| PrecomputeError::Database(e.to_string()))?;
        Ok(())
    }

    pub async fn list_watchlist(&self, user_id: &str) -> Result<Vec<WatchlistItem>> {
        let rows = sqlx::query_as::<_, WatchlistItem>(&format!(
            "SELECT user_id, symbol, added_at FROM {} WHERE user_id = ? ORDER BY added_at DESC",
            tables::WATCHLIST,
        ))
        .bind(user_id)
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| PrecomputeError::Database(e.to_string()))?;

        Ok(rows)
    }
}

/// Known rankable metric names for `rank_by_comparative_metric` (§4.6).
/// Unrecognized names yield `None` for every row, which callers surface as an
/// empty ranking rather than a SQL-level error.
fn metric_value(features: &ComparativeFeatures, metric: &str) -> Option<f64> {
    match metric {
        "daily_return" => features.daily_return,
        "weekly_return" => features.weekly_return,
        "monthly_return" => features.monthly_return,
        "ytd_return" => features.ytd_return,
        "volatility_30d" => features.volatility_30d,
        "volatility_90d" => features.volatility_90d,
        "sharpe_30d" => features.sharpe_30d,
        "sharpe_90d" => features.sharpe_90d,
        "relative_strength" => features.relative_strength,
        _ => None,
    }
}

fn fail_if_no_rows_affected(rows_affected: u64, operation: &str) -> Result<()> {
    if rows_affected == 0 {
        Err(PrecomputeError::OperationFailed(format!("{operation} affected zero rows")))
    } else {
        Ok(())
    }
}

fn row_to_artifact(row: &sqlx::sqlite::SqliteRow) -> Result<Artifact> {
    let db_err = |e: sqlx::Error| PrecomputeError::Database(e.to_string());
    let payload_json: String = row.try_get("payload_json").map_err(db_err)?;
    let computed_at: String = row.try_get("computed_at").map_err(db_err)?;
    let expires_at: String = row.try_get("expires_at").map_err(db_err)?;
    let status: String = row.try_get("status").map_err(db_err)?;

    Ok(Artifact {
        display_symbol: row.try_get("display_symbol").map_err(db_err)?,
        business_date: row.try_get("business_date").map_err(db_err)?,
        narrative: row.try_get("narrative").map_err(db_err)?,
        payload: serde_json::from_str(&payload_json).map_err(|e| PrecomputeError::OperationFailed(e.to_string()))?,
        generation_latency_ms: row.try_get("generation_latency_ms").map_err(db_err)?,
        chart_blob_ref: row.try_get("chart_blob_ref").map_err(db_err)?,
        status: ArtifactStatus::from_str(&status)
            .ok_or_else(|| PrecomputeError::SchemaMismatch(format!("unknown artifact status {status}")))?,
        error_message: row.try_get("error_message").map_err(db_err)?,
        computed_at: chrono::DateTime::parse_from_rfc3339(&computed_at)
            .map_err(|e| PrecomputeError::SchemaMismatch(e.to_string()))?
            .with_timezone(&Utc),
        expires_at: chrono::DateTime::parse_from_rfc3339(&expires_at)
            .map_err(|e| PrecomputeError::SchemaMismatch(e.to_string()))?
            .with_timezone(&Utc),
        document_ref: row.try_get("document_ref").map_err(db_err)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use precompute_core::FixedInstantClock;

    async fn setup() -> Repository {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        Repository::new(db)
    }

    async fn seed_symbol(repo: &Repository, master_id: i64, display_symbol: &str) {
        sqlx::query("INSERT INTO symbols (id, company_name, exchange, currency, active) VALUES (?, ?, ?, ?, 1)")
            .bind(master_id)
            .bind(format!("{display_symbol} Inc."))
            .bind("NASDAQ")
            .bind("USD")
            .execute(repo.db().pool())
            .await
            .unwrap();
        sqlx::query("INSERT INTO symbol_aliases (master_id, surface_symbol, surface_type, is_primary) VALUES (?, ?, 'display', 1)")
            .bind(master_id)
            .bind(display_symbol)
            .execute(repo.db().pool())
            .await
            .unwrap();
    }

    fn test_clock() -> FixedInstantClock {
        use chrono::TimeZone;
        FixedInstantClock {
            instant: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
            zone: chrono_tz::America::New_York,
        }
    }

    fn sample_series(display_symbol: &str, date: NaiveDate) -> RawSeries {
        RawSeries {
            display_symbol: display_symbol.to_string(),
            business_date: date,
            bars: vec![Bar {
                date,
                open: 100.0,
                high: 101.0,
                low: 99.0,
                close: 100.5,
                volume: 1_000_000.0,
            }],
            metadata: serde_json::json!({"sector": "Technology"}),
            earliest_observation: Some(date),
            latest_observation: Some(date),
            row_count: 1,
            fetched_at: Utc::now(),
            source_tag: "test".to_string(),
            expires_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn resolve_finds_master_id_for_alias() {
        let repo = setup().await;
        seed_symbol(&repo, 42, "AAPL").await;
        assert_eq!(repo.resolve("AAPL").await.unwrap(), 42);
    }

    #[tokio::test]
    async fn resolve_unknown_symbol_is_not_found() {
        let repo = setup().await;
        assert!(matches!(repo.resolve("NOPE").await, Err(PrecomputeError::NotFound(_))));
    }

    #[tokio::test]
    async fn list_active_symbols_excludes_inactive() {
        let repo = setup().await;
        seed_symbol(&repo, 1, "AAPL").await;
        sqlx::query("INSERT INTO symbols (id, company_name, exchange, currency, active) VALUES (2, 'Old Co', 'NYSE', 'USD', 0)")
            .execute(repo.db().pool())
            .await
            .unwrap();
        sqlx::query("INSERT INTO symbol_aliases (master_id, surface_symbol, surface_type, is_primary) VALUES (2, 'OLD', 'display', 1)")
            .execute(repo.db().pool())
            .await
            .unwrap();

        let active = repo.list_active_symbols().await.unwrap();
        assert_eq!(active, vec![(1, "AAPL".to_string())]);
    }

    #[tokio::test]
    async fn list_symbol_directory_carries_company_name() {
        let repo = setup().await;
        seed_symbol(&repo, 1, "AAPL").await;

        let directory = repo.list_symbol_directory().await.unwrap();
        assert_eq!(directory, vec![("AAPL".to_string(), "AAPL Inc.".to_string())]);
    }

    #[tokio::test]
    async fn store_raw_then_read_round_trips_bars() {
        let repo = setup().await;
        let clock = test_clock();
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        repo.store_raw(&clock, sample_series("AAPL", date)).await.unwrap();

        let bars = repo.read_raw_bars("AAPL", date).await.unwrap();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].close, 100.5);
    }

    #[tokio::test]
    async fn store_raw_rejects_empty_bar_sequence() {
        let repo = setup().await;
        let clock = test_clock();
        let mut series = sample_series("AAPL", NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        series.bars.clear();
        assert!(matches!(
            repo.store_raw(&clock, series).await,
            Err(PrecomputeError::InvariantViolation(_))
        ));
    }

    #[tokio::test]
    async fn read_raw_bars_missing_is_not_found() {
        let repo = setup().await;
        let result = repo.read_raw_bars("AAPL", NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()).await;
        assert!(matches!(result, Err(PrecomputeError::NotFound(_))));
    }

    #[tokio::test]
    async fn store_and_read_artifact_round_trips() {
        let repo = setup().await;
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let artifact = Artifact {
            display_symbol: "AAPL".to_string(),
            business_date: date,
            narrative: Some("steady uptrend".to_string()),
            payload: serde_json::json!({"rsi": 55.0}),
            generation_latency_ms: Some(120),
            chart_blob_ref: None,
            status: ArtifactStatus::Completed,
            error_message: None,
            computed_at: Utc::now(),
            expires_at: Utc::now(),
            document_ref: None,
        };
        repo.upsert_artifact(&artifact).await.unwrap();

        let fetched = repo.read_artifact("AAPL", date).await.unwrap();
        assert_eq!(fetched.status, ArtifactStatus::Completed);
        assert_eq!(fetched.narrative.as_deref(), Some("steady uptrend"));
    }

    #[tokio::test]
    async fn job_lifecycle_records_and_advances() {
        let repo = setup().await;
        let clock = test_clock();
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        repo.record_job(&clock, "job-1", "AAPL", date).await.unwrap();
        assert_eq!(repo.read_job("job-1").await.unwrap(), JobStatus::Requested);

        repo.advance_job(&clock, "job-1", JobStatus::Completed).await.unwrap();
        assert_eq!(repo.read_job("job-1").await.unwrap(), JobStatus::Completed);
    }

    #[tokio::test]
    async fn watchlist_add_remove_round_trips() {
        let repo = setup().await;
        repo.add_watchlist_item("user-1", "AAPL").await.unwrap();
        repo.add_watchlist_item("user-1", "MSFT").await.unwrap();
        // Adding the same item twice is idempotent, not an error.
        repo.add_watchlist_item("user-1", "AAPL").await.unwrap();

        let items = repo.list_watchlist("user-1").await.unwrap();
        assert_eq!(items.len(), 2);

        repo.remove_watchlist_item("user-1", "AAPL").await.unwrap();
        let items = repo.list_watchlist("user-1").await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].symbol, "MSFT");
    }

    #[tokio::test]
    async fn rank_by_comparative_metric_sorts_descending_and_truncates() {
        let repo = setup().await;
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();

        for (symbol, sharpe) in [("AAPL", 1.2), ("MSFT", 2.5), ("TSLA", 0.4)] {
            let features = ComparativeFeatures {
                daily_return: None,
                weekly_return: None,
                monthly_return: None,
                ytd_return: None,
                volatility_30d: None,
                volatility_90d: None,
                sharpe_30d: Some(sharpe),
                sharpe_90d: None,
                max_drawdown_30d: None,
                max_drawdown_90d: None,
                relative_strength: None,
            };
            repo.store_comparatives(symbol, date, &features).await.unwrap();
        }

        let top = repo.rank_by_comparative_metric(date, "sharpe_30d", 2).await.unwrap();
        assert_eq!(top, vec![("MSFT".to_string(), 2.5), ("AAPL".to_string(), 1.2)]);
    }

    #[tokio::test]
    async fn rank_by_comparative_metric_unknown_metric_is_empty() {
        let repo = setup().await;
        let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
        let features = ComparativeFeatures {
            daily_return: Some(1.0),
            weekly_return: None,
            monthly_return: None,
            ytd_return: None,
            volatility_30d: None,
            volatility_90d: None,
            sharpe_30d: None,
            sharpe_90d: None,
            max_drawdown_30d: None,
            max_drawdown_90d: None,
            relative_strength: None,
        };
        repo.store_comparatives("AAPL", date, &features).await.unwrap();

        let ranked = repo.rank_by_comparative_metric(date, "not_a_metric", 5).await.unwrap();
        assert!(ranked.is_empty());
    }

    #[tokio::test]
    async fn reference_data_absence_is_empty_not_error() {
        let repo = setup().await;
        let rows = repo
            .read_reference_data(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(), "XNAS:AAPL")
            .await
            .unwrap();
        assert!(rows.is_empty());
    }
}

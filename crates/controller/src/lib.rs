use precompute_core::{BusinessDate, Clock, Config, MasterId, Result};
use queue::{Phase, WorkMessage, WorkQueue};
use repository::Repository;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Run-level outcome (§4.5 step 5): `failed` only when nothing completed at
/// all, `partial` when at least one symbol failed either phase, `completed`
/// when every symbol cleared both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Completed,
    Partial,
    Failed,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub correlation_id: String,
    pub business_date: BusinessDate,
    pub status: RunStatus,
    pub raw_completed: Vec<String>,
    pub raw_failed: Vec<String>,
    pub derived_completed: Vec<String>,
    pub derived_failed: Vec<String>,
}

pub struct ControllerContext {
    pub repository: Arc<Repository>,
    pub queue: Arc<dyn WorkQueue>,
    pub clock: Arc<dyn Clock>,
    pub config: Arc<Config>,
}

const BARRIER_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Drives one nightly run end-to-end: enumerate symbols, fan out the raw
/// phase, wait for the barrier, fan out the derived phase for whatever
/// cleared it, wait again, and emit the run-level status (§4.5). The
/// controller never bounds concurrency itself — the worker pool's own
/// concurrency cap is the single bound for the pipeline — so every message in
/// a phase is emitted immediately; backpressure is the queue's job.
pub async fn run_once(ctx: &ControllerContext, correlation_id: String) -> Result<RunReport> {
    let business_date = ctx.clock.business_date();
    tracing::info!(correlation_id = %correlation_id, %business_date, "starting nightly run");

    let symbols = ctx.repository.list_active_symbols().await?;
    let phase_timeout = ctx.config.run_budget.mul_f64(1.0 - ctx.config.worker_finalization_margin);
    let master_by_symbol: HashMap<String, MasterId> = symbols.iter().map(|(id, s)| (s.clone(), *id)).collect();
    let all_symbols: Vec<String> = symbols.into_iter().map(|(_, s)| s).collect();

    for symbol in &all_symbols {
        enqueue(ctx, Phase::Raw, master_by_symbol[symbol], symbol, business_date, &correlation_id).await?;
    }

    let raw_completed = wait_for_raw_barrier(ctx, &all_symbols, business_date, phase_timeout).await;
    let raw_failed: Vec<String> = all_symbols.iter().filter(|s| !raw_completed.contains(*s)).cloned().collect();
    for symbol in &raw_failed {
        tracing::warn!(correlation_id = %correlation_id, symbol, "raw phase did not complete before the barrier timeout");
    }

    for symbol in &raw_completed {
        enqueue(ctx, Phase::Derived, master_by_symbol[symbol], symbol, business_date, &correlation_id).await?;
    }

    let derived_completed = wait_for_derived_barrier(ctx, &raw_completed, business_date, phase_timeout).await;
    let derived_failed: Vec<String> = raw_completed.iter().filter(|s| !derived_completed.contains(*s)).cloned().collect();
    for symbol in &derived_failed {
        tracing::warn!(correlation_id = %correlation_id, symbol, "derived phase did not complete before the barrier timeout");
    }

    let status = if derived_completed.is_empty() {
        RunStatus::Failed
    } else if raw_failed.is_empty() && derived_failed.is_empty() {
        RunStatus::Completed
    } else {
        RunStatus::Partial
    };

    tracing::info!(
        correlation_id = %correlation_id,
        %business_date,
        ?status,
        completed = derived_completed.len(),
        raw_failed = raw_failed.len(),
        derived_failed = derived_failed.len(),
        "nightly run finished"
    );

    Ok(RunReport {
        correlation_id,
        business_date,
        status,
        raw_completed,
        raw_failed,
        derived_completed,
        derived_failed,
    })
}

async fn enqueue(
    ctx: &ControllerContext,
    phase: Phase,
    master_id: MasterId,
    display_symbol: &str,
    business_date: BusinessDate,
    correlation_id: &str,
) -> Result<()> {
    ctx.queue
        .enqueue(WorkMessage {
            phase,
            symbol: display_symbol.to_string(),
            master_id,
            business_date,
            correlation_id: correlation_id.to_string(),
        })
        .await
}

/// Polls the raw table for (symbol, D) presence until every symbol is
/// accounted for or `timeout` elapses — the "polling the raw table" barrier
/// option named in §4.5.
async fn wait_for_raw_barrier(ctx: &ControllerContext, symbols: &[String], business_date: BusinessDate, timeout: Duration) -> Vec<String> {
    let deadline = Instant::now() + timeout;
    let mut remaining: HashSet<String> = symbols.iter().cloned().collect();
    let mut completed = Vec::new();

    while !remaining.is_empty() {
        let mut confirmed = Vec::new();
        for symbol in &remaining {
            if ctx.repository.read_raw_bars(symbol, business_date).await.is_ok() {
                confirmed.push(symbol.clone());
            }
        }
        for symbol in confirmed {
            remaining.remove(&symbol);
            completed.push(symbol);
        }

        if remaining.is_empty() || Instant::now() >= deadline {
            break;
        }
        tokio::time::sleep(BARRIER_POLL_INTERVAL).await;
    }

    completed
}

/// Same barrier pattern over the artifact table for Phase B: a symbol counts
/// once its artifact row reaches `completed` (§3.4 lifecycle).
async fn wait_for_derived_barrier(ctx: &ControllerContext, symbols: &[String], business_date: BusinessDate, timeout: Duration) -> Vec<String> {
    let deadline = Instant::now() + timeout;
    let mut remaining: HashSet<String> = symbols.iter().cloned().collect();
    let mut completed = Vec::new();

    while !remaining.is_empty() {
        let mut confirmed = Vec::new();
        for symbol in &remaining {
            if let Ok(artifact) = ctx.repository.read_artifact(symbol, business_date).await {
                if artifact.status == precompute_core::ArtifactStatus::Completed {
                    confirmed.push(symbol.clone());
                }
            }
        }
        for symbol in confirmed {
            remaining.remove(&symbol);
            completed.push(symbol);
        }

        if remaining.is_empty() || Instant::now() >= deadline {
            break;
        }
        tokio::time::sleep(BARRIER_POLL_INTERVAL).await;
    }

    completed
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeZone, Utc};
    use precompute_core::FixedInstantClock;
    use queue::InProcessQueue;
    use repository::Database;
    use worker::{process_message, WorkerContext};

    async fn seed(repo: &Repository, master_id: i64, symbol: &str) {
        sqlx::query("INSERT INTO symbols (id, company_name, exchange, currency, active) VALUES (?, ?, 'NASDAQ', 'USD', 1)")
            .bind(master_id)
            .bind(format!("{symbol} Inc."))
            .execute(repo.db().pool())
            .await
            .unwrap();
        sqlx::query("INSERT INTO symbol_aliases (master_id, surface_symbol, surface_type, is_primary) VALUES (?, ?, 'display', 1)")
            .bind(master_id)
            .bind(symbol)
            .execute(repo.db().pool())
            .await
            .unwrap();
    }

    fn test_config() -> Config {
        Config {
            timezone: "America/New_York".to_string(),
            database_url: "sqlite::memory:".to_string(),
            market_data_api_base: "https://example.test".to_string(),
            market_data_api_key: "key".to_string(),
            market_data_rate_limit_per_minute: 500,
            object_store_bucket: "bucket".to_string(),
            api_shared_secret: None,
            workers_concurrent: 4,
            worker_budget: Duration::from_secs(30),
            worker_finalization_margin: 0.2,
            default_lookback_days: 5,
            max_redeliveries: 3,
            benchmark_symbol: "SPY".to_string(),
            risk_free_rate: 0.04,
            run_budget: Duration::from_secs(5),
        }
    }

    /// No worker pool is running in this test, so neither phase's barrier
    /// will ever see a raw/derived row land — a direct exercise of the
    /// "zero symbols completed" failure branch (§4.5, §8).
    #[tokio::test]
    async fn a_run_with_no_worker_draining_the_queue_is_marked_failed() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let repository = Arc::new(Repository::new(db));
        seed(&repository, 1, "AAPL").await;

        let queue: Arc<dyn WorkQueue> = Arc::new(InProcessQueue::new(Duration::from_millis(50), 1));
        let clock: Arc<dyn Clock> = Arc::new(FixedInstantClock {
            instant: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
            zone: chrono_tz::America::New_York,
        });
        let mut config = test_config();
        config.run_budget = Duration::from_millis(200);
        let ctx = ControllerContext { repository, queue, clock, config: Arc::new(config) };

        let report = run_once(&ctx, "run-1".to_string()).await.unwrap();
        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(report.business_date, NaiveDate::from_ymd_opt(2024, 6, 1).unwrap());
        assert!(report.raw_completed.is_empty());
    }

    /// Drains the queue inline (no worker pool) between the two phases to
    /// exercise the full happy path deterministically.
    #[tokio::test]
    async fn a_run_where_the_queue_is_fully_drained_completes() {
        let db = Database::connect("sqlite::memory:").await.unwrap();
        let repository = Arc::new(Repository::new(db));
        seed(&repository, 1, "AAPL").await;

        let queue: Arc<dyn WorkQueue> = Arc::new(InProcessQueue::new(Duration::from_secs(30), 3));
        let clock: Arc<dyn Clock> = Arc::new(FixedInstantClock {
            instant: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
            zone: chrono_tz::America::New_York,
        });
        let mut config = test_config();
        config.run_budget = Duration::from_secs(2);
        let config = Arc::new(config);

        let ctx = ControllerContext {
            repository: Arc::clone(&repository),
            queue: Arc::clone(&queue),
            clock: Arc::clone(&clock),
            config: Arc::clone(&config),
        };

        let worker_repository = Repository::new(repository.db().clone());
        let worker_ctx = WorkerContext {
            repository: worker_repository,
            fetcher: Arc::new(StubFetcher),
            clock: Arc::clone(&clock),
            chart_store: Arc::new(worker::LocalChartStore::new(std::env::temp_dir().join("controller-test-charts")).unwrap()),
            config: Arc::clone(&config),
        };

        let run = tokio::spawn(async move { run_once(&ctx, "run-2".to_string()).await.unwrap() });

        // Drain raw, then derived, inline — standing in for a separately
        // running worker pool, which the controller neither knows about nor
        // depends on directly.
        loop {
            if let Some(delivery) = queue.receive().await {
                let outcome = process_message(&delivery.message, &worker_ctx).await;
                if outcome == worker::WorkOutcome::Completed {
                    queue.ack(delivery.id).await.unwrap();
                } else {
                    queue.nack(delivery.id).await.unwrap();
                }
            } else if run.is_finished() {
                break;
            } else {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        }

        let report = run.await.unwrap();
        assert_eq!(report.status, RunStatus::Completed);
        assert_eq!(report.derived_completed, vec!["AAPL".to_string()]);
    }

    struct StubFetcher;

    #[async_trait::async_trait]
    impl fetcher::MarketDataFetcher for StubFetcher {
        async fn fetch_series(&self, display_symbol: &str, _lookback_days: i64) -> precompute_core::Result<precompute_core::RawSeries> {
            let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
            let now = Utc::now();
            Ok(precompute_core::RawSeries {
                display_symbol: display_symbol.to_string(),
                business_date: date,
                earliest_observation: Some(date - chrono::Duration::days(4)),
                latest_observation: Some(date),
                row_count: 5,
                bars: (0..5)
                    .map(|i| precompute_core::Bar {
                        date: date - chrono::Duration::days(4 - i),
                        open: 100.0,
                        high: 101.0,
                        low: 99.0,
                        close: 100.5,
                        volume: 1_000_000.0,
                    })
                    .collect(),
                metadata: serde_json::Value::Null,
                fetched_at: now,
                source_tag: "stub".to_string(),
                expires_at: now,
            })
        }
    }
}

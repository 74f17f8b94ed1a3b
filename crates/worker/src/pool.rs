use crate::context::WorkerContext;
use crate::pipeline::{process_message, WorkOutcome};
use queue::WorkQueue;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Semaphore};
use tokio::task::JoinHandle;

const EMPTY_QUEUE_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// Drains a [`WorkQueue`] with a bounded pool of concurrent tasks — the
/// single concurrency cap for the whole pipeline (§4.4 "Concurrency", §5).
/// Modeled on the data-loader's `Arc<Semaphore>` + `Arc<AtomicU64>` fan-out,
/// generalized from a one-shot symbol list to a continuously draining queue.
pub struct WorkerPool {
    queue: Arc<dyn WorkQueue>,
    context: Arc<WorkerContext>,
    concurrency: usize,
}

#[derive(Debug, Default)]
pub struct PoolStats {
    pub completed: u64,
    pub failed: u64,
}

impl WorkerPool {
    pub fn new(queue: Arc<dyn WorkQueue>, context: Arc<WorkerContext>, concurrency: usize) -> Self {
        Self { queue, context, concurrency }
    }

    /// Runs until `shutdown` fires. In-flight messages are allowed to finish;
    /// no new ones are dispatched afterward — the same "cancellation does not
    /// cascade to in-flight work" discipline the controller follows (§5).
    pub async fn run_until(&self, mut shutdown: oneshot::Receiver<()>) -> PoolStats {
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let completed = Arc::new(AtomicU64::new(0));
        let failed = Arc::new(AtomicU64::new(0));
        let mut in_flight: Vec<JoinHandle<()>> = Vec::new();

        loop {
            if shutdown.try_recv().is_ok() {
                break;
            }

            let Some(delivery) = self.queue.receive().await else {
                tokio::select! {
                    _ = tokio::time::sleep(EMPTY_QUEUE_POLL_INTERVAL) => {}
                    _ = &mut shutdown => break,
                }
                continue;
            };

            let permit = Arc::clone(&semaphore).acquire_owned().await.expect("semaphore is never closed");
            let queue = Arc::clone(&self.queue);
            let context = Arc::clone(&self.context);
            let completed = Arc::clone(&completed);
            let failed = Arc::clone(&failed);

            in_flight.retain(|handle| !handle.is_finished());
            in_flight.push(tokio::spawn(async move {
                let _permit = permit;
                let outcome = process_message(&delivery.message, &context).await;
                match outcome {
                    WorkOutcome::Completed => {
                        completed.fetch_add(1, Ordering::Relaxed);
                        let _ = queue.ack(delivery.id).await;
                    }
                    WorkOutcome::FailedRetry(reason) => {
                        tracing::warn!(
                            correlation_id = %delivery.message.correlation_id,
                            symbol = %delivery.message.symbol,
                            reason,
                            "message failed, returning to queue"
                        );
                        let _ = queue.nack(delivery.id).await;
                    }
                    WorkOutcome::FailedTerminal(reason) => {
                        failed.fetch_add(1, Ordering::Relaxed);
                        tracing::error!(
                            correlation_id = %delivery.message.correlation_id,
                            symbol = %delivery.message.symbol,
                            reason,
                            "message failed terminally"
                        );
                        let _ = queue.ack(delivery.id).await;
                    }
                }
            }));
        }

        for handle in in_flight {
            let _ = handle.await;
        }

        PoolStats {
            completed: completed.load(Ordering::Relaxed),
            failed: failed.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object_store::LocalChartStore;
    use async_trait::async_trait;
    use chrono::{NaiveDate, TimeZone, Utc};
    use fetcher::MarketDataFetcher;
    use precompute_core::{Bar, FixedInstantClock, RawSeries};
    use queue::{InProcessQueue, Phase, WorkMessage};
    use repository::{Database, Repository};

    struct StubFetcher;

    #[async_trait]
    impl MarketDataFetcher for StubFetcher {
        async fn fetch_series(&self, display_symbol: &str, _lookback_days: i64) -> precompute_core::Result<RawSeries> {
            let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
            let now = Utc::now();
            Ok(RawSeries {
                display_symbol: display_symbol.to_string(),
                business_date: date,
                earliest_observation: Some(date),
                latest_observation: Some(date),
                row_count: 1,
                bars: vec![Bar { date, open: 1.0, high: 1.0, low: 1.0, close: 1.0, volume: 1.0 }],
                metadata: serde_json::Value::Null,
                fetched_at: now,
                source_tag: "stub".to_string(),
                expires_at: now,
            })
        }
    }

    fn test_config() -> precompute_core::Config {
        precompute_core::Config {
            timezone: "America/New_York".to_string(),
            database_url: "sqlite::memory:".to_string(),
            market_data_api_base: "https://example.test".to_string(),
            market_data_api_key: "key".to_string(),
            market_data_rate_limit_per_minute: 500,
            object_store_bucket: "bucket".to_string(),
            api_shared_secret: None,
            workers_concurrent: 2,
            worker_budget: Duration::from_secs(30),
            worker_finalization_margin: 0.2,
            default_lookback_days: 60,
            max_redeliveries: 3,
            benchmark_symbol: "SPY".to_string(),
            risk_free_rate: 0.04,
            run_budget: Duration::from_secs(300),
        }
    }

    #[tokio::test]
    async fn drains_a_single_enqueued_message_and_acks_on_completion() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::connect("sqlite::memory:").await.unwrap();
        sqlx::query("INSERT INTO symbols (id, company_name, exchange, currency, active) VALUES (1, 'Apple Inc.', 'NASDAQ', 'USD', 1)")
            .execute(db.pool())
            .await
            .unwrap();
        sqlx::query("INSERT INTO symbol_aliases (master_id, surface_symbol, surface_type, is_primary) VALUES (1, 'AAPL', 'display', 1)")
            .execute(db.pool())
            .await
            .unwrap();

        let queue: Arc<dyn WorkQueue> = Arc::new(InProcessQueue::new(Duration::from_secs(30), 3));
        queue
            .enqueue(WorkMessage {
                phase: Phase::Raw,
                symbol: "AAPL".to_string(),
                master_id: 1,
                business_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
                correlation_id: "run-1".to_string(),
            })
            .await
            .unwrap();

        let context = Arc::new(WorkerContext {
            repository: Repository::new(db),
            fetcher: Arc::new(StubFetcher),
            clock: Arc::new(FixedInstantClock {
                instant: Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap(),
                zone: chrono_tz::America::New_York,
            }),
            chart_store: Arc::new(LocalChartStore::new(dir.path()).unwrap()),
            config: Arc::new(test_config()),
        });

        let pool = WorkerPool::new(Arc::clone(&queue), context, 2);
        let (tx, rx) = oneshot::channel();

        let drain = tokio::spawn(async move { pool.run_until(rx).await });
        tokio::time::sleep(Duration::from_millis(100)).await;
        let _ = tx.send(());
        let stats = drain.await.unwrap();

        assert_eq!(stats.completed, 1);
        assert_eq!(queue.len().await, 0);
    }
}

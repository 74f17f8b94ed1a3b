use chrono::{Datelike, NaiveDate, TimeZone};
use controller::{run_once, ControllerContext};
use fetcher::HttpMarketDataFetcher;
use precompute_core::{Clock, Config, FixedInstantClock, FixedZoneClock};
use queue::{InProcessQueue, WorkQueue};
use repository::{Database, Repository};
use std::sync::Arc;
use worker::{LocalChartStore, WorkerContext, WorkerPool};

fn usage() -> ! {
    eprintln!(
        "usage: controller [--business-date YYYY-MM-DD]\n\n\
         Runs one nightly precompute cycle. With no flags, the business date is\n\
         resolved from the current wall-clock time in the configured timezone.\n\
         --business-date replays a single past date instead, for operational backfill."
    );
    std::process::exit(1);
}

fn parse_args() -> Option<NaiveDate> {
    let mut args = std::env::args().skip(1);
    let mut business_date = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--business-date" => {
                let value = args.next().unwrap_or_else(|| usage());
                business_date = Some(NaiveDate::parse_from_str(&value, "%Y-%m-%d").unwrap_or_else(|_| {
                    eprintln!("invalid --business-date: {value}");
                    usage()
                }));
            }
            "--help" | "-h" => usage(),
            other => {
                eprintln!("unrecognized argument: {other}");
                usage()
            }
        }
    }

    business_date
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let replay_date = parse_args();
    let config = Arc::new(Config::load()?);

    let database = Database::connect(&config.database_url).await?;
    let repository = Arc::new(Repository::new(database));

    let clock: Arc<dyn Clock> = match replay_date {
        Some(date) => {
            let zone = config.tz();
            let instant = zone
                .with_ymd_and_hms(date.year(), date.month(), date.day(), 8, 0, 0)
                .single()
                .ok_or_else(|| anyhow::anyhow!("ambiguous local time for replay date {date}"))?
                .with_timezone(&chrono::Utc);
            Arc::new(FixedInstantClock { instant, zone })
        }
        None => Arc::new(FixedZoneClock::new(config.tz())),
    };

    let queue: Arc<dyn WorkQueue> = Arc::new(InProcessQueue::new(config.worker_budget, config.max_redeliveries));

    let fetcher = Arc::new(HttpMarketDataFetcher::new(
        config.market_data_api_base.clone(),
        config.market_data_api_key.clone(),
        config.market_data_rate_limit_per_minute,
    ));

    let chart_store = Arc::new(LocalChartStore::new(
        std::env::var("CHART_STORE_ROOT").unwrap_or_else(|_| "./chart-store".to_string()),
    )?);

    let worker_database = Database::connect(&config.database_url).await?;
    let worker_context = Arc::new(WorkerContext {
        repository: Repository::new(worker_database),
        fetcher,
        clock: Arc::clone(&clock),
        chart_store,
        config: Arc::clone(&config),
    });

    let pool = WorkerPool::new(Arc::clone(&queue), worker_context, config.workers_concurrent);
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let pool_handle = tokio::spawn(async move { pool.run_until(shutdown_rx).await });

    let correlation_id = uuid::Uuid::new_v4().to_string();
    let ctx = ControllerContext {
        repository,
        queue,
        clock,
        config,
    };

    let report = run_once(&ctx, correlation_id).await?;

    let _ = shutdown_tx.send(());
    let stats = pool_handle.await?;

    tracing::info!(
        correlation_id = %report.correlation_id,
        business_date = %report.business_date,
        status = ?report.status,
        raw_failed = report.raw_failed.len(),
        derived_completed = report.derived_completed.len(),
        derived_failed = report.derived_failed.len(),
        pool_completed = stats.completed,
        pool_failed = stats.failed,
        "run report"
    );

    if report.status == controller::RunStatus::Failed {
        std::process::exit(1);
    }

    Ok(())
}

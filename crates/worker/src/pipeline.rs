use crate::context::WorkerContext;
use crate::object_store::report_key;
use analytics::{classify_semantic_state, compute_comparative_features, compute_daily_indicators, compute_indicator_percentiles};
use chrono::{DateTime, Utc};
use precompute_core::{Artifact, ArtifactStatus, Bar, DailyIndicators, PrecomputeError};
use queue::{Phase, WorkMessage};

/// The worker's per-message state machine outcome (§4.4 states 3-5; state 2
/// "processing" is the artifact row this module writes along the way, not a
/// distinct return value).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkOutcome {
    Completed,
    /// Queue should redeliver; do not ack.
    FailedRetry(String),
    /// Terminal failure; ack so the message does not loop forever.
    FailedTerminal(String),
}

/// Drives one message to completion, enforcing the worker's wall-clock
/// budget: the context's configured margin is reserved so a timeout can
/// still finalize the artifact row before the environment kills the process
/// (§4.4 "Timeouts").
pub async fn process_message(message: &WorkMessage, ctx: &WorkerContext) -> WorkOutcome {
    let work_budget = ctx.config.worker_budget.mul_f64(1.0 - ctx.config.worker_finalization_margin);

    match tokio::time::timeout(work_budget, run_phase(message, ctx)).await {
        Ok(outcome) => outcome,
        Err(_) => {
            tracing::warn!(
                correlation_id = %message.correlation_id,
                symbol = %message.symbol,
                phase = ?message.phase,
                "worker deadline exceeded"
            );
            handle_timeout(message, ctx).await
        }
    }
}

async fn run_phase(message: &WorkMessage, ctx: &WorkerContext) -> WorkOutcome {
    match message.phase {
        Phase::Raw => run_raw_phase(message, ctx).await,
        Phase::Derived => run_derived_phase(message, ctx).await,
    }
}

async fn run_raw_phase(message: &WorkMessage, ctx: &WorkerContext) -> WorkOutcome {
    let series = match ctx
        .fetcher
        .fetch_series(&message.symbol, ctx.config.default_lookback_days as i64)
        .await
    {
        Ok(series) => series,
        Err(err) => return classify(err),
    };

    match ctx.repository.store_raw(ctx.clock.as_ref(), series).await {
        Ok(()) => WorkOutcome::Completed,
        Err(err) => classify(err),
    }
}

/// A `derived` message for (symbol, D) must not be processed before the raw
/// record for (symbol, D) exists (§4.4 "Ordering discipline"). The check is
/// the repository read itself: `NotFound` means the raw phase has not
/// committed yet, so this message goes back on the queue rather than failing
/// the run.
async fn run_derived_phase(message: &WorkMessage, ctx: &WorkerContext) -> WorkOutcome {
    let started = ctx.clock.now_utc();

    let bars = match ctx.repository.read_raw_bars(&message.symbol, message.business_date).await {
        Ok(bars) => bars,
        Err(PrecomputeError::NotFound(_)) => {
            return WorkOutcome::FailedRetry("raw record not yet present for this business date".to_string());
        }
        Err(err) => return classify(err),
    };

    if let Err(err) = mark_pending(message, ctx, started).await {
        return classify(err);
    }

    match compute_and_store(message, ctx, &bars).await {
        Ok(payload) => {
            let artifact = completed_artifact(message, ctx, started, payload).await;
            match ctx.repository.upsert_artifact(&artifact).await {
                Ok(()) => WorkOutcome::Completed,
                Err(err) => classify(err),
            }
        }
        Err(err) => {
            if err.is_retryable() {
                return WorkOutcome::FailedRetry(err.to_string());
            }
            let reason = err.to_string();
            let artifact = failed_artifact(message, ctx, started, &reason);
            let _ = ctx.repository.upsert_artifact(&artifact).await;
            WorkOutcome::FailedTerminal(reason)
        }
    }
}

async fn compute_and_store(
    message: &WorkMessage,
    ctx: &WorkerContext,
    bars: &[Bar],
) -> precompute_core::Result<serde_json::Value> {
    let indicators = compute_daily_indicators(bars);
    let history = indicator_history(bars);
    let percentiles = compute_indicator_percentiles(&history, ctx.config.default_lookback_days);

    // Best-effort: a benchmark fetch failure should not sink the symbol's
    // own derived phase, it just leaves the comparative features absent.
    let benchmark_bars = ctx
        .fetcher
        .fetch_series(&ctx.config.benchmark_symbol, ctx.config.default_lookback_days as i64)
        .await
        .map(|series| series.bars)
        .unwrap_or_default();
    let comparative = compute_comparative_features(bars, &benchmark_bars, ctx.config.risk_free_rate);

    let semantic_state = classify_semantic_state(&indicators, &percentiles, &comparative);

    ctx.repository.store_indicators(&message.symbol, message.business_date, &indicators).await?;
    ctx.repository
        .store_percentiles(&message.symbol, message.business_date, &percentiles)
        .await?;
    ctx.repository
        .store_comparatives(&message.symbol, message.business_date, &comparative)
        .await?;

    Ok(serde_json::json!({
        "indicators": indicators,
        "percentiles": percentiles,
        "comparative": comparative,
        "semantic_state": semantic_state,
    }))
}

/// Indicators are a function of the observations up to and including each
/// day, so the lookback history percentiles are ranked against is built by
/// re-running the pure indicator computation over every growing prefix of
/// the series rather than requiring a dedicated history table.
fn indicator_history(bars: &[Bar]) -> Vec<DailyIndicators> {
    (1..=bars.len()).map(|end| compute_daily_indicators(&bars[..end])).collect()
}

async fn mark_pending(message: &WorkMessage, ctx: &WorkerContext, now: DateTime<Utc>) -> precompute_core::Result<()> {
    let artifact = Artifact {
        display_symbol: message.symbol.clone(),
        business_date: message.business_date,
        narrative: None,
        payload: serde_json::Value::Null,
        generation_latency_ms: None,
        chart_blob_ref: None,
        status: ArtifactStatus::Pending,
        error_message: None,
        computed_at: now,
        expires_at: ctx.clock.next_business_day_0800(),
        document_ref: None,
    };
    ctx.repository.upsert_artifact(&artifact).await
}

async fn completed_artifact(message: &WorkMessage, ctx: &WorkerContext, started: DateTime<Utc>, payload: serde_json::Value) -> Artifact {
    let now = ctx.clock.now_utc();
    let latency_ms = (now - started).num_milliseconds().max(0);
    let blob_ref = write_chart_blob(message, ctx, &payload, now).await;

    Artifact {
        display_symbol: message.symbol.clone(),
        business_date: message.business_date,
        narrative: None,
        payload,
        generation_latency_ms: Some(latency_ms),
        chart_blob_ref: blob_ref.clone(),
        status: ArtifactStatus::Completed,
        error_message: None,
        computed_at: now,
        expires_at: ctx.clock.next_business_day_0800(),
        document_ref: blob_ref,
    }
}

/// Writing the rendered blob is best-effort: losing the chart reference does
/// not invalidate a completed artifact, since the structured payload is
/// already durable in the artifact row itself.
async fn write_chart_blob(message: &WorkMessage, ctx: &WorkerContext, payload: &serde_json::Value, now: DateTime<Utc>) -> Option<String> {
    let key = report_key(&message.symbol, message.business_date, now.timestamp());
    let bytes = serde_json::to_vec(payload).ok()?;
    match ctx.chart_store.put(&key, bytes).await {
        Ok(()) => Some(key),
        Err(err) => {
            tracing::warn!(correlation_id = %message.correlation_id, symbol = %message.symbol, %err, "failed to write chart blob");
            None
        }
    }
}

fn failed_artifact(message: &WorkMessage, ctx: &WorkerContext, started: DateTime<Utc>, reason: &str) -> Artifact {
    let now = ctx.clock.now_utc();
    Artifact {
        display_symbol: message.symbol.clone(),
        business_date: message.business_date,
        narrative: None,
        payload: serde_json::Value::Null,
        generation_latency_ms: Some((now - started).num_milliseconds().max(0)),
        chart_blob_ref: None,
        status: ArtifactStatus::Failed,
        error_message: Some(reason.to_string()),
        computed_at: now,
        expires_at: ctx.clock.next_business_day_0800(),
        document_ref: None,
    }
}

async fn handle_timeout(message: &WorkMessage, ctx: &WorkerContext) -> WorkOutcome {
    if message.phase == Phase::Derived {
        let artifact = failed_artifact(message, ctx, ctx.clock.now_utc(), "timeout");
        let _ = ctx.repository.upsert_artifact(&artifact).await;
    }
    WorkOutcome::FailedTerminal("timeout".to_string())
}

fn classify(err: PrecomputeError) -> WorkOutcome {
    if err.is_retryable() {
        WorkOutcome::FailedRetry(err.to_string())
    } else {
        WorkOutcome::FailedTerminal(err.to_string())
    }
}

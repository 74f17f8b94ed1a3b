//! Read endpoints: nightly report lookup, symbol search, derived rankings.
//!
//! None of these handlers ever trigger computation. `get_report` fails fast
//! when the artifact is missing or not yet `completed` (§4.6) rather than
//! falling back to a live fetch.

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use precompute_core::{ArtifactStatus, Clock, FixedZoneClock, PrecomputeError};
use serde::{Deserialize, Serialize};

use crate::{ApiResponse, AppError, AppState};

#[derive(Deserialize, utoipa::IntoParams)]
pub struct ReportQuery {
    /// Business date in `YYYY-MM-DD`. Defaults to the server's current
    /// business date when omitted.
    #[serde(default)]
    pub date: Option<String>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct ReportResponse {
    pub symbol: String,
    pub business_date: String,
    pub narrative: Option<String>,
    pub payload: serde_json::Value,
    pub chart_blob_ref: Option<String>,
    pub computed_at: String,
}

#[derive(Deserialize, utoipa::IntoParams)]
pub struct SearchQuery {
    pub q: String,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct SearchResult {
    pub symbol: String,
    pub name: String,
}

#[derive(Deserialize, utoipa::IntoParams)]
pub struct RankingsQuery {
    pub metric: String,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Serialize, utoipa::ToSchema)]
pub struct RankingEntry {
    pub symbol: String,
    pub value: f64,
}

/// Resolves "today" through the configured zone rather than reading the wall
/// clock directly — around local midnight a naked UTC read disagrees with the
/// business date the controller wrote under.
fn current_business_date(state: &AppState) -> NaiveDate {
    FixedZoneClock::new(state.config.tz()).business_date()
}

pub fn symbol_routes() -> Router<AppState> {
    Router::new()
        .route("/api/report/:symbol", get(get_report))
        .route("/api/symbols/search", get(search_symbols))
        .route("/api/rankings", get(get_rankings))
}

#[utoipa::path(
    get,
    path = "/api/report/{symbol}",
    params(("symbol" = String, Path, description = "Stock ticker symbol"), ReportQuery),
    responses(
        (status = 200, description = "Completed nightly report for the symbol"),
        (status = 404, description = "No completed report for this symbol/date")
    ),
    tag = "reports"
)]
async fn get_report(
    State(state): State<AppState>,
    Path(symbol): Path<String>,
    Query(query): Query<ReportQuery>,
) -> Result<Json<ApiResponse<ReportResponse>>, AppError> {
    let business_date = match query.date {
        Some(ref d) => NaiveDate::parse_from_str(d, "%Y-%m-%d")
            .map_err(|_| anyhow::anyhow!("invalid date, expected YYYY-MM-DD"))?,
        None => current_business_date(&state),
    };

    let artifact = state.repository.read_artifact(&symbol, business_date).await?;

    if artifact.status != ArtifactStatus::Completed {
        return Err(AppError(
            PrecomputeError::NotFound(format!("report for {symbol} on {business_date} is not completed")).into(),
        ));
    }

    Ok(Json(ApiResponse::success(ReportResponse {
        symbol: artifact.display_symbol,
        business_date: business_date.to_string(),
        narrative: artifact.narrative,
        payload: artifact.payload,
        chart_blob_ref: artifact.chart_blob_ref,
        computed_at: artifact.computed_at.to_rfc3339(),
    })))
}

#[utoipa::path(
    get,
    path = "/api/symbols/search",
    params(SearchQuery),
    responses((status = 200, description = "Symbols matching the query")),
    tag = "reports"
)]
async fn search_symbols(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<ApiResponse<Vec<SearchResult>>>, AppError> {
    let q = query.q.trim().to_uppercase();
    if q.is_empty() {
        return Ok(Json(ApiResponse::success(Vec::new())));
    }

    let limit = query.limit.unwrap_or(20).min(50);

    let results: Vec<SearchResult> = state
        .search_index
        .iter()
        .filter(|(symbol, name)| symbol.to_uppercase().contains(&q) || name.to_uppercase().contains(&q))
        .take(limit)
        .map(|(symbol, name)| SearchResult { symbol: symbol.clone(), name: name.clone() })
        .collect();

    Ok(Json(ApiResponse::success(results)))
}

#[utoipa::path(
    get,
    path = "/api/rankings",
    params(RankingsQuery),
    responses((status = 200, description = "Top symbols by a comparative-features metric")),
    tag = "reports"
)]
async fn get_rankings(
    State(state): State<AppState>,
    Query(query): Query<RankingsQuery>,
) -> Result<Json<ApiResponse<Vec<RankingEntry>>>, AppError> {
    let business_date = match query.date {
        Some(ref d) => NaiveDate::parse_from_str(d, "%Y-%m-%d")
            .map_err(|_| anyhow::anyhow!("invalid date, expected YYYY-MM-DD"))?,
        None => current_business_date(&state),
    };
    let limit = query.limit.unwrap_or(20).min(100);

    let ranked = state.repository.rank_by_comparative_metric(business_date, &query.metric, limit).await?;

    Ok(Json(ApiResponse::success(
        ranked.into_iter().map(|(symbol, value)| RankingEntry { symbol, value }).collect(),
    )))
}

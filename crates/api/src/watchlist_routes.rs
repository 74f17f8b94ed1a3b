//! Watchlist CRUD (§3.6, §4.6). Reads are open; mutation routes are mounted
//! behind `auth::shared_secret_middleware` in `lib.rs`.

use axum::{
    extract::{Path, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;

use crate::{ApiResponse, AppError, AppState};

#[derive(Serialize, utoipa::ToSchema)]
pub struct WatchlistItemResponse {
    pub user_id: String,
    pub symbol: String,
    pub added_at: String,
}

pub fn read_routes() -> Router<AppState> {
    Router::new().route("/api/watchlist/:user_id", get(list_watchlist))
}

#[utoipa::path(
    get,
    path = "/api/watchlist/{user_id}",
    params(("user_id" = String, Path, description = "Watchlist owner")),
    responses((status = 200, description = "Items on the user's watchlist")),
    tag = "watchlist"
)]
pub async fn list_watchlist(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<ApiResponse<Vec<WatchlistItemResponse>>>, AppError> {
    let items = state.repository.list_watchlist(&user_id).await?;

    Ok(Json(ApiResponse::success(
        items
            .into_iter()
            .map(|item| WatchlistItemResponse {
                user_id: item.user_id,
                symbol: item.symbol,
                added_at: item.added_at.to_rfc3339(),
            })
            .collect(),
    )))
}

#[utoipa::path(
    post,
    path = "/api/watchlist/{user_id}/{symbol}",
    params(
        ("user_id" = String, Path, description = "Watchlist owner"),
        ("symbol" = String, Path, description = "Stock ticker symbol")
    ),
    responses((status = 200, description = "Symbol added to the watchlist")),
    tag = "watchlist"
)]
pub async fn add_watchlist_item(
    State(state): State<AppState>,
    Path((user_id, symbol)): Path<(String, String)>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    state.repository.add_watchlist_item(&user_id, &symbol).await?;
    Ok(Json(ApiResponse::success(())))
}

#[utoipa::path(
    delete,
    path = "/api/watchlist/{user_id}/{symbol}",
    params(
        ("user_id" = String, Path, description = "Watchlist owner"),
        ("symbol" = String, Path, description = "Stock ticker symbol")
    ),
    responses((status = 200, description = "Symbol removed from the watchlist")),
    tag = "watchlist"
)]
pub async fn remove_watchlist_item(
    State(state): State<AppState>,
    Path((user_id, symbol)): Path<(String, String)>,
) -> Result<Json<ApiResponse<()>>, AppError> {
    state.repository.remove_watchlist_item(&user_id, &symbol).await?;
    Ok(Json(ApiResponse::success(())))
}

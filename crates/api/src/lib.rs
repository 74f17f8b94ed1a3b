pub mod auth;
pub mod request_id;
pub mod security_headers;
pub mod symbol_routes;
pub mod watchlist_routes;

use axum::{
    http::StatusCode,
    middleware,
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use precompute_core::Config;
use repository::Repository;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

/// Process-wide state shared across every handler. Cloning is cheap — every
/// field is an `Arc` (or already `Clone`-cheap), matching the teacher's own
/// `AppState` shape in `analysis-orchestrator`/`api-server`.
#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<Repository>,
    pub config: Arc<Config>,
    /// Small, static in-memory search index loaded once at startup (§4.6
    /// `search`) — never re-queried from the database per request.
    pub search_index: Arc<Vec<(String, String)>>,
}

/// Uniform response envelope for every JSON endpoint.
#[derive(Serialize, utoipa::ToSchema)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self { success: true, data }
    }
}

/// Maps every handler error to a JSON body with an appropriate status code.
/// `PrecomputeMissing` (§4.6 `report`'s fail-fast contract) is the one case
/// that must not collapse to a generic 500.
pub struct AppError(pub anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = if self.0.downcast_ref::<precompute_core::PrecomputeError>().is_some_and(|e| {
            matches!(e, precompute_core::PrecomputeError::NotFound(_))
        }) {
            StatusCode::NOT_FOUND
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };

        (status, Json(json!({ "success": false, "error": self.0.to_string() }))).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

#[derive(OpenApi)]
#[openapi(paths(
    symbol_routes::get_report,
    symbol_routes::search_symbols,
    symbol_routes::get_rankings,
    watchlist_routes::list_watchlist,
    watchlist_routes::add_watchlist_item,
    watchlist_routes::remove_watchlist_item,
))]
struct ApiDoc;

async fn health() -> &'static str {
    "ok"
}

/// Builds the full router: ambient middleware (request id, security headers,
/// tracing) wraps every route; the shared-secret gate wraps only the
/// watchlist write routes (§4.6 "Ambient request handling").
pub fn build_router(state: AppState) -> Router {
    let write_routes = Router::new()
        .route("/api/watchlist/:user_id/:symbol", axum::routing::post(watchlist_routes::add_watchlist_item))
        .route("/api/watchlist/:user_id/:symbol", axum::routing::delete(watchlist_routes::remove_watchlist_item))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::shared_secret_middleware));

    Router::new()
        .route("/health", get(health))
        .merge(symbol_routes::symbol_routes())
        .merge(watchlist_routes::read_routes())
        .merge(write_routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(middleware::from_fn(security_headers::security_headers_middleware))
        .layer(middleware::from_fn(request_id::request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Loads configuration, connects the repository, and serves the router —
/// the teacher's `api-server::run_server` startup sequence generalized to
/// this crate's smaller state.
pub async fn run_server() -> anyhow::Result<()> {
    let config = Arc::new(Config::load()?);
    let database = repository::Database::connect(&config.database_url).await?;
    let repository = Arc::new(Repository::new(database));

    let search_index = Arc::new(build_search_index(&repository).await?);

    let state = AppState {
        repository,
        config: Arc::clone(&config),
        search_index,
    };

    let addr = std::env::var("API_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "read API listening");

    axum::serve(listener, build_router(state)).await?;
    Ok(())
}

async fn build_search_index(repository: &Repository) -> anyhow::Result<Vec<(String, String)>> {
    Ok(repository.list_symbol_directory().await?)
}

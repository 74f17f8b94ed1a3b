use crate::AppState;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Gates watchlist write endpoints behind a single shared secret (§4.6). Read
/// endpoints (`report`, `search`, `rankings`) never pass through this
/// middleware — there is no per-user session model, so one header is the
/// whole access-control surface.
pub async fn shared_secret_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let expected = state.config.api_shared_secret.as_deref().ok_or(AuthError::NotConfigured)?;

    let provided = extract_shared_secret(&headers).ok_or(AuthError::MissingSecret)?;
    if provided != expected {
        tracing::warn!("rejected watchlist write: shared secret did not match");
        return Err(AuthError::InvalidSecret);
    }

    Ok(next.run(request).await)
}

fn extract_shared_secret(headers: &HeaderMap) -> Option<String> {
    headers
        .get("X-Api-Secret")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

#[derive(Debug)]
pub enum AuthError {
    NotConfigured,
    MissingSecret,
    InvalidSecret,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AuthError::NotConfigured => (
                StatusCode::FORBIDDEN,
                "Watchlist write endpoints are disabled: no API_SHARED_SECRET configured.",
            ),
            AuthError::MissingSecret => (
                StatusCode::UNAUTHORIZED,
                "Missing shared secret. Provide via X-Api-Secret header.",
            ),
            AuthError::InvalidSecret => (StatusCode::FORBIDDEN, "Invalid shared secret."),
        };

        (status, Json(json!({ "success": false, "error": message }))).into_response()
    }
}

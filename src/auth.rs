use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use http::StatusCode;

use crate::util::{error_response, AppState};

/// Outcome of checking an `Authorization` header against the configured key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    /// No key configured, or the token matched.
    Allowed,
    Missing,
    Invalid,
}

/// Compare a bearer header against `api_key`. An empty key disables the check.
pub fn verify_bearer(api_key: &str, header: Option<&str>) -> Verification {
    if api_key.is_empty() {
        return Verification::Allowed;
    }
    match header.map(str::trim).filter(|h| !h.is_empty()) {
        None => Verification::Missing,
        Some(h) => {
            let token = h.strip_prefix("Bearer ").unwrap_or(h).trim();
            if token == api_key {
                Verification::Allowed
            } else {
                Verification::Invalid
            }
        }
    }
}

/// Axum middleware rejecting requests whose bearer token does not match `APIKEY`.
pub async fn require_api_key(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Response {
    let header = req
        .headers()
        .get(http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());
    match verify_bearer(&state.config.api_key, header) {
        Verification::Allowed => next.run(req).await,
        Verification::Missing => error_response(
            StatusCode::UNAUTHORIZED,
            "Missing or invalid Authorization header",
        ),
        Verification::Invalid => {
            tracing::warn!(path = %req.uri().path(), "rejected request with invalid API key");
            error_response(StatusCode::UNAUTHORIZED, "Invalid API key")
        }
    }
}

use axum::extract::{Request, State};
use axum::http::header::HOST;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::AppError;
use crate::state::AppState;

pub async fn enforce_trusted_hosts(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if state.config.allows_any_host() {
        return next.run(request).await;
    }

    let host = request
        .headers()
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .or_else(|| request.uri().host())
        .unwrap_or_default();

    if !state.config.is_trusted_host(host) {
        tracing::warn!(host, "Rejected request for untrusted host");
        return AppError::BadRequest("Invalid host header.".to_string()).into_response();
    }
    next.run(request).await
}

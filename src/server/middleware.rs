//! Request middleware: request IDs and API key checks

use axum::{
    extract::{Request, State},
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{info_span, warn, Instrument};
use uuid::Uuid;

use crate::server::state::AppState;

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const API_KEY_HEADER: &str = "x-api-key";

/// Tag every request with a fresh UUID, run it inside a span carrying that
/// ID and echo it back in the response headers. Handler logs, including
/// error responses, are emitted inside the span.
pub async fn request_id(request: Request, next: Next) -> Response {
    let id = Uuid::new_v4();

    let span = info_span!(
        "request",
        request_id = %id,
        method = %request.method(),
        path = %request.uri().path(),
    );

    let mut response = next.run(request).instrument(span).await;

    if let Ok(value) = HeaderValue::from_str(&id.to_string()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Reject requests whose X-API-KEY header does not match the configured key
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let presented = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    if !state.accepts_key(presented) {
        warn!("Rejected request to {}: bad API key", request.uri().path());
        return (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
    }

    next.run(request).await
}

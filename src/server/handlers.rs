use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::discovery::{DiscoveryError, Endpoint, ServiceStatus};
use crate::server::middleware::{request_id, require_api_key};
use crate::server::state::AppState;

/// Query parameters of `GET /v1/urls`
#[derive(Debug, Default, Deserialize)]
pub struct UrlsQuery {
    #[serde(default)]
    pub print: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Discovery failure mapped onto an HTTP response
#[derive(Debug)]
pub struct ApiError(DiscoveryError);

impl From<DiscoveryError> for ApiError {
    fn from(err: DiscoveryError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            DiscoveryError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        error!("Request failed: {}", self.0);

        let body = ErrorResponse {
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

/// Health check endpoint
pub async fn health() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}

/// Every endpoint: routed URLs, host ports, service ports and configured
pub async fn list_urls(
    State(state): State<AppState>,
    Query(query): Query<UrlsQuery>,
) -> ApiResult<Vec<Endpoint>> {
    let cancel = state.request_token();
    let endpoints = state.discovery.extract_all(query.print, &cancel).await?;
    Ok(Json(endpoints))
}

pub async fn list_traefik_urls(State(state): State<AppState>) -> ApiResult<Vec<Endpoint>> {
    let cancel = state.request_token();
    Ok(Json(state.discovery.extract_urls(&cancel).await?))
}

pub async fn list_host_ports(State(state): State<AppState>) -> ApiResult<Vec<Endpoint>> {
    let cancel = state.request_token();
    Ok(Json(state.discovery.extract_host_ports(&cancel).await?))
}

pub async fn list_service_ports(State(state): State<AppState>) -> ApiResult<Vec<Endpoint>> {
    let cancel = state.request_token();
    Ok(Json(state.discovery.extract_service_ports(&cancel).await?))
}

/// `{name: url}` for a known service key, `{}` otherwise
pub async fn service_status(
    State(state): State<AppState>,
    Path(service): Path<String>,
) -> ApiResult<ServiceStatus> {
    let cancel = state.request_token();
    let status = state.discovery.service_status(&service, &cancel).await?;
    Ok(Json(status.unwrap_or_default()))
}

/// Restart every allocation of a job
pub async fn restart_service(
    State(state): State<AppState>,
    Path(service): Path<String>,
) -> ApiResult<&'static str> {
    let cancel = state.request_token();
    let restarted = state
        .discovery
        .restart_service_allocations(&service, &cancel)
        .await?;
    info!("Restarted {} allocation(s) of {}", restarted, service);
    Ok(Json("OK"))
}

/// Create the Axum router
pub fn create_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/v1/services/{service}/alloc-restart", post(restart_service))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_api_key,
        ));

    Router::new()
        .route("/health", get(health))
        .route("/v1/urls", get(list_urls))
        .route("/v1/urls/traefik", get(list_traefik_urls))
        .route("/v1/urls/hosts", get(list_host_ports))
        .route("/v1/urls/services", get(list_service_ports))
        .route("/v1/services/{service}/status", get(service_status))
        .merge(protected)
        .layer(
            ServiceBuilder::new()
                .layer(middleware::from_fn(request_id))
                .layer(TraceLayer::new_for_http()),
        )
        .with_state(state)
}

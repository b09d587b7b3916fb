// Copyright © 2026 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::error_handler::{core_error_parts, handle_any_error, validation_error, ApiError};
use crate::handlers::ApiHandlers;
use crate::models::{
    CountQuery, CountResponse, ExecuteRequest, HealthResponse, PutRequest, RecordResponse,
};
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;
use std::time::Duration;
use tiergate_core::{CoreError, MetricsExporter};
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use validator::Validate;

/// Per-request deadline in milliseconds, relative to arrival.
pub const REQUEST_TIMEOUT_HEADER: &str = "x-request-timeout-ms";

const MAX_BODY_BYTES: usize = 1024 * 1024;
const OPENMETRICS_CONTENT_TYPE: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

#[derive(Clone)]
pub struct AppState {
    pub handlers: Arc<ApiHandlers>,
}

pub fn create_router(handlers: Arc<ApiHandlers>) -> Router {
    let app_state = AppState { handlers };

    Router::new()
        .route(
            "/api/v1/kv/{key}",
            get(handle_get).put(handle_put).delete(handle_delete),
        )
        .route("/api/v1/execute", post(handle_execute))
        .route("/api/v1/count", get(handle_count))
        .route("/health", get(handle_health))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .with_state(app_state)
}

/// Served on its own port so scrapes never queue behind client traffic.
pub fn create_metrics_router(metrics: Arc<MetricsExporter>) -> Router {
    Router::new()
        .route("/metrics", get(handle_metrics))
        .with_state(metrics)
}

fn request_timeout(handlers: &ApiHandlers, headers: &HeaderMap) -> Result<Duration, ApiError> {
    let Some(raw) = headers.get(REQUEST_TIMEOUT_HEADER) else {
        return Ok(handlers.default_timeout());
    };

    let millis: u64 = raw
        .to_str()
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .ok_or_else(|| {
            core_error_parts(CoreError::InvalidInput(format!(
                "{} must be a whole number of milliseconds",
                REQUEST_TIMEOUT_HEADER
            )))
        })?;
    Ok(Duration::from_millis(millis))
}

async fn handle_get(
    State(state): State<AppState>,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> Result<Json<RecordResponse>, ApiError> {
    let timeout = request_timeout(&state.handlers, &headers)?;
    state
        .handlers
        .get(key, timeout)
        .await
        .map(Json)
        .map_err(core_error_parts)
}

async fn handle_put(
    State(state): State<AppState>,
    Path(key): Path<String>,
    headers: HeaderMap,
    Json(req): Json<PutRequest>,
) -> Result<Json<RecordResponse>, ApiError> {
    req.validate().map_err(validation_error)?;
    let timeout = request_timeout(&state.handlers, &headers)?;

    state
        .handlers
        .put(key, req, timeout)
        .await
        .map(Json)
        .map_err(core_error_parts)
}

async fn handle_delete(
    State(state): State<AppState>,
    Path(key): Path<String>,
    headers: HeaderMap,
) -> Result<Json<RecordResponse>, ApiError> {
    let timeout = request_timeout(&state.handlers, &headers)?;
    state
        .handlers
        .delete(key, timeout)
        .await
        .map(Json)
        .map_err(core_error_parts)
}

async fn handle_execute(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ExecuteRequest>,
) -> Result<Json<RecordResponse>, ApiError> {
    req.validate().map_err(validation_error)?;
    let timeout = request_timeout(&state.handlers, &headers)?;

    tracing::debug!("execute {} {}", req.operation, req.key);

    state
        .handlers
        .execute(req, timeout)
        .await
        .map(Json)
        .map_err(core_error_parts)
}

async fn handle_count(
    State(state): State<AppState>,
    Query(query): Query<CountQuery>,
) -> Result<Json<CountResponse>, ApiError> {
    state
        .handlers
        .count(query.value)
        .await
        .map(Json)
        .map_err(core_error_parts)
}

async fn handle_health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(state.handlers.health())
}

async fn handle_metrics(State(metrics): State<Arc<MetricsExporter>>) -> Response {
    match metrics.render() {
        Ok(body) => ([(header::CONTENT_TYPE, OPENMETRICS_CONTENT_TYPE)], body).into_response(),
        Err(e) => handle_any_error(e),
    }
}

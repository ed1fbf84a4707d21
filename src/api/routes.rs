//! API route definitions.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::state::AppState;
use crate::storage::SqliteStore;

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(list_metrics))
        .route("/logs", get(list_logs))
        .route("/incidents", get(list_incidents))
}

#[derive(Debug, Deserialize)]
struct LimitQuery {
    limit: Option<usize>,
}

/// Default and inclusive bounds for a `limit` parameter.
struct LimitBounds {
    default: usize,
    min: usize,
    max: usize,
}

const METRICS_LIMIT: LimitBounds = LimitBounds { default: 300, min: 10, max: 2000 };
const LOGS_LIMIT: LimitBounds = LimitBounds { default: 200, min: 10, max: 2000 };
const INCIDENTS_LIMIT: LimitBounds = LimitBounds { default: 50, min: 1, max: 200 };

impl LimitBounds {
    fn resolve(&self, requested: Option<usize>) -> Result<usize, ApiError> {
        let limit = requested.unwrap_or(self.default);
        if limit < self.min || limit > self.max {
            return Err(ApiError::InvalidLimit {
                limit,
                min: self.min,
                max: self.max,
            });
        }
        Ok(limit)
    }
}

#[derive(Debug)]
enum ApiError {
    InvalidLimit { limit: usize, min: usize, max: usize },
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::InvalidLimit { limit, min, max } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(json!({
                    "error": format!("limit must be between {} and {}, got {}", min, max, limit)
                })),
            )
                .into_response(),
            ApiError::Internal(e) => {
                tracing::error!("API storage error: {:#}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "storage unavailable" })),
                )
                    .into_response()
            }
        }
    }
}

/// Run a blocking store query off the async executor.
async fn query<T, F>(store: SqliteStore, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&SqliteStore) -> anyhow::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || f(&store))
        .await
        .map_err(|e| ApiError::Internal(e.into()))?
        .map_err(ApiError::Internal)
}

fn listing<T: Serialize>(items: Vec<T>) -> Json<Value> {
    Json(json!({
        "meta": { "total": items.len() },
        "data": items,
    }))
}

async fn health() -> Json<Value> {
    Json(json!({
        "data": {
            "status": "ok",
            "version": env!("CARGO_PKG_VERSION")
        },
        "meta": {
            "timestamp": chrono::Utc::now().to_rfc3339()
        }
    }))
}

async fn list_metrics(
    State(state): State<AppState>,
    Query(q): Query<LimitQuery>,
) -> Result<Json<Value>, ApiError> {
    let limit = METRICS_LIMIT.resolve(q.limit)?;
    let metrics = query(state.store, move |s| s.recent_metrics(limit)).await?;
    Ok(listing(metrics))
}

async fn list_logs(
    State(state): State<AppState>,
    Query(q): Query<LimitQuery>,
) -> Result<Json<Value>, ApiError> {
    let limit = LOGS_LIMIT.resolve(q.limit)?;
    let logs = query(state.store, move |s| s.recent_logs(limit)).await?;
    Ok(listing(logs))
}

async fn list_incidents(
    State(state): State<AppState>,
    Query(q): Query<LimitQuery>,
) -> Result<Json<Value>, ApiError> {
    let limit = INCIDENTS_LIMIT.resolve(q.limit)?;
    let incidents = query(state.store, move |s| s.recent_incidents(limit)).await?;
    Ok(listing(incidents))
}

//! HTTP route handlers for the txlog server.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::StatusCode;

use super::error::ApiError;
use super::metrics::Metrics;
use super::request::{ReadParams, SubmitRequest};
use super::response::{LatestResponse, ReadResponse, SubmitResponse};
use crate::TxLog;
use crate::reader::TxRead;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub log: Arc<TxLog>,
    pub metrics: Arc<Metrics>,
}

/// Handle POST /api/v1/txlog/submit
pub async fn handle_submit(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<SubmitResponse>, ApiError> {
    let request = SubmitRequest::from_body(&body)
        .inspect_err(|_| {
            state.metrics.txlog_submit_errors_total.inc();
        })?;
    let count = request.events.len();

    let submitted = state
        .log
        .submit(request.events)
        .await
        .inspect_err(|_| {
            state.metrics.txlog_submit_errors_total.inc();
        })?;

    state.metrics.txlog_submitted_transactions_total.inc();
    state
        .metrics
        .txlog_submitted_events_total
        .inc_by(count as u64);
    Ok(Json(SubmitResponse::success(submitted)))
}

/// Handle GET /api/v1/txlog/read
///
/// Returns up to `limit` transactions after `after`. The response's
/// `nextAfter` is the value to pass on the following call.
pub async fn handle_read(
    State(state): State<AppState>,
    Query(params): Query<ReadParams>,
) -> Result<Json<ReadResponse>, ApiError> {
    let limit = params.limit()?;
    let after = params.after();

    let mut iter = state.log.read_after(after).await?;
    let mut transactions = Vec::new();
    while transactions.len() < limit {
        match iter.next().await? {
            Some(tx) => transactions.push(tx),
            None => break,
        }
    }

    state
        .metrics
        .txlog_read_transactions_total
        .inc_by(transactions.len() as u64);

    Ok(Json(ReadResponse::success(
        transactions,
        iter.resume_point(),
    )))
}

/// Handle GET /api/v1/txlog/latest
pub async fn handle_latest(
    State(state): State<AppState>,
) -> Result<Json<LatestResponse>, ApiError> {
    let latest = state.log.latest().await?;
    Ok(Json(LatestResponse::success(latest)))
}

/// Handle GET /metrics
pub async fn handle_metrics(State(state): State<AppState>) -> String {
    state.metrics.encode()
}

/// Handle GET /-/healthy
pub async fn handle_healthy() -> (StatusCode, &'static str) {
    (StatusCode::OK, "OK")
}

/// Handle GET /-/ready
///
/// Reads the allocation counter to confirm the store is reachable.
pub async fn handle_ready(State(state): State<AppState>) -> (StatusCode, &'static str) {
    match state.log.latest().await {
        Ok(_) => (StatusCode::OK, "OK"),
        Err(err) => {
            tracing::warn!(error = %err, "readiness check failed");
            (StatusCode::SERVICE_UNAVAILABLE, "Not Ready")
        }
    }
}

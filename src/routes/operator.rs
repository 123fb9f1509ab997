//! Operator diagnostics, mounted only when an operator key is configured.
//!
//! - `POST /api/operator/open?target=KEY`: actuate without a token
//! - `GET /api/operator/diag/{target}`: actuate and return the raw result
//! - `GET /api/operator/activity`: recent actuation attempts

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::error_response;
use crate::activity::ActivityKind;
use crate::service::into_outcome;
use crate::AppState;

/// Query parameters for `POST /api/operator/open`.
#[derive(Deserialize)]
pub struct OpenQuery {
    pub target: String,
}

/// `POST /api/operator/open?target=KEY`: switch the relay on, no token needed.
///
/// Status codes follow the redeem endpoint: 200, 400, or 502.
pub async fn open(State(state): State<AppState>, Query(query): Query<OpenQuery>) -> Response {
    let caps = &state.capabilities;
    let (target, result) = match caps.actuate_unchecked(&query.target).await {
        Ok(pair) => pair,
        Err(e) => return error_response(&e),
    };
    info!(target = %target.key, succeeded = result.succeeded, "operator open");
    state
        .activity_log
        .log(
            caps.now_ms(),
            ActivityKind::OperatorOpen,
            &target.key,
            result.code(),
            result.protocol,
        )
        .await;

    match into_outcome(result) {
        Ok(result) => {
            Json(json!({ "ok": true, "target": target.key, "result": result })).into_response()
        }
        Err(e) => error_response(&e),
    }
}

/// `GET /api/operator/diag/{target}`: actuate and echo everything.
///
/// Always `200` once the target resolves; the caller reads `result.succeeded`.
pub async fn diag(State(state): State<AppState>, Path(target): Path<String>) -> Response {
    let caps = &state.capabilities;
    let (target, result) = match caps.actuate_unchecked(&target).await {
        Ok(pair) => pair,
        Err(e) => return error_response(&e),
    };
    state
        .activity_log
        .log(
            caps.now_ms(),
            ActivityKind::OperatorDiag,
            &target.key,
            result.code(),
            result.protocol,
        )
        .await;
    Json(json!({
        "target": target.key,
        "device_id": target.device_id,
        "result": result,
    }))
    .into_response()
}

/// Query parameters for `GET /api/operator/activity`.
#[derive(Deserialize)]
pub struct ActivityQuery {
    /// Return entries with `id > since_id`. Defaults to 0 (all entries).
    #[serde(default)]
    pub since_id: u64,
    /// Maximum number of entries to return. Defaults to 50, max 200.
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Filter by kind (`redeem`, `operator_open`, `operator_diag`).
    pub kind: Option<String>,
}

fn default_limit() -> usize {
    50
}

/// `GET /api/operator/activity`: read recent journal entries.
///
/// An unrecognised `kind` is a `400`, not an unfiltered listing.
pub async fn activity(
    State(state): State<AppState>,
    Query(query): Query<ActivityQuery>,
) -> Response {
    let kind = match query.kind.as_deref() {
        None => None,
        Some(raw) => match ActivityKind::from_str_opt(raw) {
            Some(kind) => Some(kind),
            None => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(json!({
                        "ok": false,
                        "code": "invalid_kind",
                        "error": format!("unknown activity kind {raw:?}"),
                    })),
                )
                    .into_response()
            }
        },
    };
    let entries = state
        .activity_log
        .read_since(query.since_id, query.limit.min(200), kind)
        .await;
    Json(json!({ "entries": entries })).into_response()
}

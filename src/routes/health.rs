//! Unauthenticated health-check endpoint.

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::actuation::Actuator;
use crate::AppState;

/// `GET /health`: liveness probe.
///
/// Reports whether the upstream credential is configured, the upstream base
/// address, and the configured timezone, plus uptime and replay-record count.
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let caps = &state.capabilities;
    Json(json!({
        "ok": true,
        "has_api_key": caps.actuator().has_credential(),
        "base_url": caps.actuator().base_url(),
        "tz": state.config.server.timezone,
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.start_time.elapsed().as_secs(),
        "targets": caps.registry().len(),
        "replay_records": caps.replay_guard().len().await,
    }))
}

//! Target listing.

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::AppState;

/// `GET /api/targets`: configured door relays as `{key, name}` pairs.
///
/// Device identifiers stay server-side.
pub async fn list(State(state): State<AppState>) -> Json<Value> {
    let targets: Vec<_> = state.capabilities.registry().iter().collect();
    Json(json!({ "targets": targets }))
}

//! `GET /open/{target}/{issued_at}/{signature}`: redeem a capability token.

use axum::{
    extract::{Path, State},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{info, warn};

use super::error_response;
use crate::activity::ActivityKind;
use crate::service::CapabilityError;
use crate::AppState;

/// Verify, consume, and actuate.
///
/// # Responses
///
/// - `200 OK`: relay switched on; body carries the actuation result
/// - `401 Unauthorized`: `invalid_signature`, `expired`, or `already_used`
/// - `400 Bad Request`: `unknown_target` or `missing_credential`
/// - `502 Bad Gateway`: `upstream_failure`, with the upstream result attached
///
/// An `issued_at` segment that is not a decimal integer cannot carry a valid
/// signature and is reported as `invalid_signature`.
pub async fn redeem(
    State(state): State<AppState>,
    Path((target, issued_at, signature)): Path<(String, String, String)>,
) -> Response {
    let caps = &state.capabilities;
    let outcome = match issued_at.parse::<u64>() {
        Ok(issued_at) => caps.redeem(&target, issued_at, &signature).await,
        Err(_) => Err(CapabilityError::InvalidSignature),
    };

    let (code, protocol) = match &outcome {
        Ok(result) => ("ok", result.protocol),
        Err(e) => (e.code(), e.actuation().and_then(|r| r.protocol)),
    };
    // Only configured targets are journaled.
    if caps.registry().get(&target).is_some() {
        state
            .activity_log
            .log(caps.now_ms(), ActivityKind::Redeem, &target, code, protocol)
            .await;
    }

    match outcome {
        Ok(result) => {
            info!(%target, ?protocol, "token redeemed");
            Json(json!({ "ok": true, "target": target, "result": result })).into_response()
        }
        Err(e) => {
            warn!(%target, code = e.code(), "redeem rejected");
            error_response(&e)
        }
    }
}

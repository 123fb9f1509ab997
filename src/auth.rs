//! Operator authentication.
//!
//! The diagnostics endpoints actuate relays without a capability token, so
//! they sit behind a separate pre-shared operator key sent as
//! `Authorization: Bearer <key>`. End-user tokens are never accepted here.

use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Axum middleware that rejects requests without a valid `Authorization: Bearer`
/// header. The expected key is injected via the [`OperatorKey`] extension.
///
/// Unlike a capability token, the operator key is reusable and not bound to a
/// target or time window, so it is compared directly instead of being
/// verified and consumed.
///
/// # Error responses
///
/// - `401 Unauthorized`: header missing or malformed
/// - `403 Forbidden`: key present but invalid
/// - `500 Internal Server Error`: [`OperatorKey`] extension not found (misconfiguration)
pub async fn require_operator_key(request: Request, next: Next) -> Response {
    let Some(OperatorKey(expected)) = request.extensions().get::<OperatorKey>().cloned() else {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"ok": false, "code": "server_misconfigured", "error": "Server configuration error"})),
        )
            .into_response();
    };

    let provided = request
        .headers()
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "));

    let Some(provided) = provided else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({"ok": false, "code": "unauthorized", "error": "Missing or invalid Authorization header"})),
        )
            .into_response();
    };

    if !constant_time_eq(expected.as_bytes(), provided.as_bytes()) {
        return (
            StatusCode::FORBIDDEN,
            Json(json!({"ok": false, "code": "forbidden", "error": "Invalid operator key"})),
        )
            .into_response();
    }

    next.run(request).await
}

/// Constant-time byte comparison.
///
/// Always iterates over the full length of `expected` regardless of `provided`
/// length, so response times do not reveal the key length.
pub fn constant_time_eq(expected: &[u8], provided: &[u8]) -> bool {
    let mut diff = u8::from(expected.len() != provided.len());
    for (i, &e) in expected.iter().enumerate() {
        let p = provided.get(i).copied().unwrap_or(0xff);
        diff |= e ^ p;
    }
    diff == 0
}

/// Extension type carrying the expected operator key.
#[derive(Clone)]
pub struct OperatorKey(pub String);

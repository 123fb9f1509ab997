//! HTTP route handlers.
//!
//! Each sub-module corresponds to an endpoint group. The operator routes are
//! mounted only when an operator key is configured and sit behind
//! [`crate::auth::require_operator_key`]; everything else is public.
//!
//! Failures share one status mapping (see [`status_for`]) and one body shape:
//! `{"ok": false, "code": "<code>", "error": "<message>"}`, plus `"result"`
//! when an upstream call was made.

pub mod health;
pub mod operator;
pub mod redeem;
pub mod targets;
pub mod tokens;

use axum::{
    extract::{MatchedPath, Request},
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use serde_json::json;
use tower_http::trace::TraceLayer;
use tracing::Span;

use crate::auth::{self, OperatorKey};
use crate::service::CapabilityError;
use crate::AppState;

/// Build the full application router.
pub fn router(state: AppState) -> Router {
    let mut app = Router::new()
        .route("/health", get(health::health))
        .route("/api/targets", get(targets::list))
        .route("/gen/{target}", get(tokens::generate))
        .route("/t/{target}", get(tokens::smart_link))
        .route(
            "/open/{target}/{issued_at}/{signature}",
            get(redeem::redeem),
        );

    if let Some(key) = state.config.operator_key() {
        let operator_routes = Router::new()
            .route("/api/operator/open", post(operator::open))
            .route("/api/operator/diag/{target}", get(operator::diag))
            .route("/api/operator/activity", get(operator::activity))
            .layer(middleware::from_fn(auth::require_operator_key))
            .layer(Extension(OperatorKey(key.to_string())));
        app = app.merge(operator_routes);
    }

    app.layer(TraceLayer::new_for_http().make_span_with(request_span))
        .with_state(state)
}

/// Request span keyed by the route template. Redeem paths carry live
/// signatures, so the raw URI is never recorded.
fn request_span(request: &Request) -> Span {
    let route = request
        .extensions()
        .get::<MatchedPath>()
        .map_or("<unmatched>", MatchedPath::as_str);
    tracing::debug_span!("request", method = %request.method(), route)
}

/// HTTP status for each failure kind.
pub fn status_for(err: &CapabilityError) -> StatusCode {
    match err {
        CapabilityError::InvalidSignature
        | CapabilityError::Expired
        | CapabilityError::AlreadyUsed => StatusCode::UNAUTHORIZED,
        CapabilityError::UnknownTarget(_) | CapabilityError::MissingCredential => {
            StatusCode::BAD_REQUEST
        }
        CapabilityError::UpstreamFailure(_) => StatusCode::BAD_GATEWAY,
    }
}

/// Structured JSON body for a [`CapabilityError`].
pub fn error_response(err: &CapabilityError) -> Response {
    let mut body = json!({
        "ok": false,
        "code": err.code(),
        "error": err.to_string(),
    });
    if let Some(result) = err.actuation() {
        body["result"] = json!(result);
    }
    (status_for(err), Json(body)).into_response()
}

//! Token issuance endpoints.
//!
//! - `GET /gen/{target}`: mint a token and return it with its redeem URL
//! - `GET /t/{target}`: mint a token and redirect straight to its redeem URL

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::info;

use super::error_response;
use crate::service::TOKEN_VALIDITY_MS;
use crate::token::Token;
use crate::AppState;

/// `GET /gen/{target}`: issue a token.
///
/// # Errors
///
/// - `400 Bad Request` with `{"code":"unknown_target"}`
pub async fn generate(
    State(state): State<AppState>,
    Path(target): Path<String>,
    headers: HeaderMap,
) -> Response {
    let token = match state.capabilities.request_token(&target) {
        Ok(token) => token,
        Err(e) => return error_response(&e),
    };
    info!(target = %token.target, "token issued");
    let url = format!(
        "{}{}",
        public_base(state.config.server.public_url.as_deref(), &headers),
        redeem_path(&token)
    );
    Json(json!({
        "ok": true,
        "target": token.target,
        "issued_at": token.issued_at,
        "expires_at": token.issued_at.saturating_add(TOKEN_VALIDITY_MS),
        "signature": token.signature,
        "url": url,
    }))
    .into_response()
}

/// `GET /t/{target}`: issue a token and answer `302 Found` to its redeem path.
///
/// # Errors
///
/// - `404 Not Found` with body `unknown_target`
pub async fn smart_link(State(state): State<AppState>, Path(target): Path<String>) -> Response {
    match state.capabilities.request_token(&target) {
        Ok(token) => {
            info!(target = %token.target, "token issued via redirect");
            (StatusCode::FOUND, [(header::LOCATION, redeem_path(&token))]).into_response()
        }
        Err(e) => (StatusCode::NOT_FOUND, e.code()).into_response(),
    }
}

/// Relative redeem path for a token.
pub fn redeem_path(token: &Token) -> String {
    format!(
        "/open/{}/{}/{}",
        token.target, token.issued_at, token.signature
    )
}

/// Scheme and host that redeem links should point at.
///
/// A configured public URL wins; otherwise `X-Forwarded-Proto` (default
/// `http`) and the `Host` header are used.
fn public_base(public_url: Option<&str>, headers: &HeaderMap) -> String {
    if let Some(url) = public_url {
        return url.trim_end_matches('/').to_string();
    }
    let header_str = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
    let scheme = header_str("x-forwarded-proto").unwrap_or("http");
    let host = header_str("host").unwrap_or("localhost");
    format!("{scheme}://{host}")
}

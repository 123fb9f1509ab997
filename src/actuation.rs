//! Relay actuation against the cloud control plane.
//!
//! [`ActuationClient`] switches a relay on with a two-tier protocol:
//!
//! 1. **Primary**: generation-1 relay control, form-encoded POST to
//!    `{base_url}{primary_path}` with `id`, `auth_key`, `channel`, `turn=on`.
//!    Success is `{"isok": true}` in the response body.
//! 2. **Fallback**: generation-2 RPC, JSON POST to `{base_url}{fallback_path}`
//!    calling `Switch.Set` with `{id: channel, on: true}`. Any 2xx is success.
//!
//! The fallback is attempted only when [`classify_primary_failure`] reports
//! [`UpstreamSignal::WrongDeviceType`] or [`UpstreamSignal::Unauthorized`].
//! Network errors, timeouts, and every other failure are returned as-is.
//! There are no retries beyond that one fallback.

use std::future::Future;
use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::config::UpstreamConfig;

/// Body fragments the cloud uses when a generation-1 command hits a
/// generation-2 device.
const WRONG_DEVICE_TYPE_MARKERS: &[&str] = &["wrong_type", "wrong device type"];

/// Which upstream command shape produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Protocol {
    Primary,
    Fallback,
}

/// Failure categories surfaced in an [`ActuationResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActuationErrorKind {
    MissingCredential,
    UpstreamFailure,
}

/// Closed classification of a failed primary response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamSignal {
    WrongDeviceType,
    Unauthorized,
    Other,
}

/// Outcome of one end-to-end actuation attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActuationResult {
    pub succeeded: bool,
    /// Protocol of the last call made; absent when no call was made.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<Protocol>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upstream_payload: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ActuationErrorKind>,
    /// Transport error text (timeout, connection refused, ...).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ActuationResult {
    fn success(protocol: Protocol, status: u16, payload: Value) -> Self {
        Self {
            succeeded: true,
            protocol: Some(protocol),
            upstream_status: Some(status),
            upstream_payload: Some(payload),
            error_kind: None,
            detail: None,
        }
    }

    fn rejected(protocol: Protocol, status: u16, payload: Value) -> Self {
        Self {
            succeeded: false,
            protocol: Some(protocol),
            upstream_status: Some(status),
            upstream_payload: Some(payload),
            error_kind: Some(ActuationErrorKind::UpstreamFailure),
            detail: None,
        }
    }

    fn transport(protocol: Protocol, detail: String) -> Self {
        Self {
            succeeded: false,
            protocol: Some(protocol),
            upstream_status: None,
            upstream_payload: None,
            error_kind: Some(ActuationErrorKind::UpstreamFailure),
            detail: Some(detail),
        }
    }

    /// `"ok"` or the snake_case failure code.
    pub fn code(&self) -> &'static str {
        match (self.succeeded, self.error_kind) {
            (true, _) => "ok",
            (false, Some(ActuationErrorKind::MissingCredential)) => "missing_credential",
            (false, _) => "upstream_failure",
        }
    }

    pub fn missing_credential() -> Self {
        Self {
            succeeded: false,
            protocol: None,
            upstream_status: None,
            upstream_payload: None,
            error_kind: Some(ActuationErrorKind::MissingCredential),
            detail: None,
        }
    }
}

/// Anything that can switch a device's relay on.
pub trait Actuator: Send + Sync {
    fn actuate(&self, device_id: &str) -> impl Future<Output = ActuationResult> + Send;

    /// Whether an upstream credential is configured.
    fn has_credential(&self) -> bool;
}

/// Map a failed primary response onto an [`UpstreamSignal`].
///
/// All upstream error-text matching lives here.
pub fn classify_primary_failure(status: u16, body: &str) -> UpstreamSignal {
    if status == 401 {
        return UpstreamSignal::Unauthorized;
    }
    let lower = body.to_ascii_lowercase();
    if WRONG_DEVICE_TYPE_MARKERS.iter().any(|m| lower.contains(m)) {
        return UpstreamSignal::WrongDeviceType;
    }
    UpstreamSignal::Other
}

/// HTTP client for the cloud relay API.
pub struct ActuationClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    channel: u32,
    primary_path: String,
    fallback_path: String,
    timeout: Duration,
}

impl ActuationClient {
    pub fn new(config: &UpstreamConfig) -> Result<Self, reqwest::Error> {
        let timeout = Duration::from_millis(config.timeout_ms);
        let http = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.credential().map(ToString::to_string),
            channel: config.channel,
            primary_path: config.primary_path.clone(),
            fallback_path: config.fallback_path.clone(),
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn primary(&self, device_id: &str, api_key: &str) -> Result<(u16, String), String> {
        let channel = self.channel.to_string();
        let form = [
            ("id", device_id),
            ("auth_key", api_key),
            ("channel", channel.as_str()),
            ("turn", "on"),
        ];
        let resp = self
            .http
            .post(format!("{}{}", self.base_url, self.primary_path))
            .form(&form)
            .send()
            .await
            .map_err(|e| self.describe(&e))?;
        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(|e| self.describe(&e))?;
        Ok((status, body))
    }

    async fn fallback(&self, device_id: &str, api_key: &str) -> Result<(u16, String), String> {
        let body = json!({
            "id": device_id,
            "auth_key": api_key,
            "method": "Switch.Set",
            "params": { "id": self.channel, "on": true },
        });
        let resp = self
            .http
            .post(format!("{}{}", self.base_url, self.fallback_path))
            .json(&body)
            .send()
            .await
            .map_err(|e| self.describe(&e))?;
        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(|e| self.describe(&e))?;
        Ok((status, body))
    }

    fn describe(&self, e: &reqwest::Error) -> String {
        if e.is_timeout() {
            format!("timed out after {}ms", self.timeout.as_millis())
        } else {
            e.to_string()
        }
    }
}

impl Actuator for ActuationClient {
    async fn actuate(&self, device_id: &str) -> ActuationResult {
        let Some(api_key) = self.api_key.as_deref() else {
            warn!(device_id, "actuation refused: upstream credential not configured");
            return ActuationResult::missing_credential();
        };

        let (status, body) = match self.primary(device_id, api_key).await {
            Ok(r) => r,
            Err(detail) => {
                warn!(device_id, %detail, "primary relay call failed");
                return ActuationResult::transport(Protocol::Primary, detail);
            }
        };
        let payload = parse_payload(&body);
        if payload.get("isok").and_then(Value::as_bool) == Some(true) {
            info!(device_id, status, protocol = "primary", "relay switched on");
            return ActuationResult::success(Protocol::Primary, status, payload);
        }

        match classify_primary_failure(status, &body) {
            UpstreamSignal::Other => {
                warn!(device_id, status, "primary relay call rejected");
                return ActuationResult::rejected(Protocol::Primary, status, payload);
            }
            signal => info!(device_id, status, ?signal, "primary rejected, trying fallback"),
        }

        match self.fallback(device_id, api_key).await {
            Ok((status, body)) if (200..300).contains(&status) => {
                info!(device_id, status, protocol = "fallback", "relay switched on");
                ActuationResult::success(Protocol::Fallback, status, parse_payload(&body))
            }
            Ok((status, body)) => {
                warn!(device_id, status, "fallback relay call rejected");
                ActuationResult::rejected(Protocol::Fallback, status, parse_payload(&body))
            }
            Err(detail) => {
                warn!(device_id, %detail, "fallback relay call failed");
                ActuationResult::transport(Protocol::Fallback, detail)
            }
        }
    }

    fn has_credential(&self) -> bool {
        self.api_key.is_some()
    }
}

/// Upstream bodies are usually JSON; anything else is kept verbatim as a string.
fn parse_payload(body: &str) -> Value {
    serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string()))
}

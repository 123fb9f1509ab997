//! Configuration loading and defaults.
//!
//! Configuration is resolved in order of precedence (highest wins):
//!
//! 1. **Environment variables**: `DOORLINK_LISTEN`, `PORT`,
//!    `DOORLINK_PUBLIC_URL`, `DOORLINK_TIMEZONE`, `DOORLINK_UPSTREAM_URL`,
//!    `DOORLINK_UPSTREAM_KEY`, `DOORLINK_TOKEN_SECRET`, `DOORLINK_OPERATOR_KEY`
//! 2. **Config file**: path via `--config <path>`, or `doorlink.toml` in CWD
//! 3. **Compiled defaults**: see each field's default value below
//!
//! The TOML file mirrors the struct hierarchy:
//!
//! ```toml
//! [server]
//! listen = "0.0.0.0:10000"
//! public_url = "https://door.example.com"   # optional
//! timezone = "Europe/Rome"
//!
//! [upstream]
//! base_url = "https://shelly-api-eu.shelly.cloud"
//! api_key = "cloud-auth-key"
//! timeout_ms = 10000
//!
//! [token]
//! secret = "long-random-string"
//! sweep_interval_secs = 60
//!
//! # Optional: omit to disable the operator diagnostics endpoints
//! [operator]
//! api_key = "operator-secret"
//!
//! [logging]
//! level = "info"
//!
//! [[targets]]
//! key = "scala-door"
//! device_id = "3494547a1075"
//! name = "Scala Apartment Door"
//! ```

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;

/// Errors raised while resolving configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid PORT value {0:?}")]
    InvalidPort(String),
    #[error("duplicate target key {0:?}")]
    DuplicateTarget(String),
    #[error("target {0:?} has an empty key or device id")]
    IncompleteTarget(String),
}

/// Top-level configuration, deserialized from TOML.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub token: TokenConfig,
    /// Optional operator credential; diagnostics routes exist only when set.
    pub operator: Option<OperatorConfig>,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Door relays that tokens can be minted for. Empty means the built-in table.
    #[serde(default)]
    pub targets: Vec<TargetConfig>,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Socket address to bind (default `0.0.0.0:10000`).
    #[serde(default = "default_listen")]
    pub listen: String,
    /// Externally visible base URL used in redeem links. When unset the link
    /// is derived from the request's `Host` header.
    pub public_url: Option<String>,
    /// Reported by `/health` only.
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

/// Cloud control plane the relay commands are sent to.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Cloud auth key. Override with `DOORLINK_UPSTREAM_KEY`. Unset or empty
    /// makes every actuation fail with `missing_credential`.
    pub api_key: Option<String>,
    /// Per-call timeout in milliseconds (default 10 000).
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Relay channel switched on (default 0).
    #[serde(default)]
    pub channel: u32,
    /// Generation-1 relay control path.
    #[serde(default = "default_primary_path")]
    pub primary_path: String,
    /// Generation-2 RPC path.
    #[serde(default = "default_fallback_path")]
    pub fallback_path: String,
}

/// Token signing settings.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    /// HMAC secret. Defaults to `"changeme"` which triggers a startup warning.
    #[serde(default = "default_secret")]
    pub secret: String,
    /// Seconds between replay-record sweeps (default 60).
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,
}

/// Operator-only credential guarding the diagnostics endpoints.
#[derive(Debug, Clone, Deserialize)]
pub struct OperatorConfig {
    pub api_key: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// tracing filter level (default `info`). Overridden by `RUST_LOG` env var.
    #[serde(default = "default_log_level")]
    pub level: String,
}

/// One `[[targets]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    pub key: String,
    pub device_id: String,
    pub name: String,
}

/// Placeholder secret shipped as the default.
pub const DEFAULT_SECRET: &str = "changeme";

const BUILTIN_TARGETS: &[(&str, &str, &str)] = &[
    ("leonina-door", "3494547a9395", "Leonina — Apartment Door"),
    ("leonina-building-door", "34945479fbbe", "Leonina — Building Door"),
    ("scala-door", "3494547a1075", "Scala — Apartment Door"),
    ("scala-building-door", "3494547745ee", "Scala — Building Door"),
    ("ottavia-door", "3494547a887d", "Ottavia — Apartment Door"),
    ("ottavia-building-door", "3494547ab62b", "Ottavia — Building Door"),
    ("viale-trastevere-door", "34945479fa35", "Viale Trastevere — Apartment Door"),
    (
        "viale-trastevere-building-door",
        "34945479fd73",
        "Viale Trastevere — Building Door",
    ),
    ("arenula-building-door", "3494547ab05e", "Arenula — Building Door"),
];

fn default_listen() -> String {
    "0.0.0.0:10000".to_string()
}
fn default_timezone() -> String {
    "Europe/Rome".to_string()
}
fn default_base_url() -> String {
    "https://shelly-api-eu.shelly.cloud".to_string()
}
fn default_timeout_ms() -> u64 {
    10_000
}
fn default_primary_path() -> String {
    "/device/relay/control".to_string()
}
fn default_fallback_path() -> String {
    "/device/rpc".to_string()
}
fn default_secret() -> String {
    DEFAULT_SECRET.to_string()
}
fn default_sweep_interval() -> u64 {
    60
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            public_url: None,
            timezone: default_timezone(),
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            timeout_ms: default_timeout_ms(),
            channel: 0,
            primary_path: default_primary_path(),
            fallback_path: default_fallback_path(),
        }
    }
}

impl Default for TokenConfig {
    fn default() -> Self {
        Self {
            secret: default_secret(),
            sweep_interval_secs: default_sweep_interval(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl UpstreamConfig {
    /// The cloud key, treating an empty string as unset.
    pub fn credential(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.is_empty())
    }
}

impl Config {
    /// Load configuration with the precedence chain: env vars > file > defaults.
    ///
    /// If `path` is `Some`, reads that file. Otherwise looks for
    /// `doorlink.toml` in the current directory, falling back to compiled
    /// defaults.
    pub fn load(path: Option<&str>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None if Path::new("doorlink.toml").exists() => Self::from_file("doorlink.toml")?,
            None => Config::default(),
        };
        config.apply_env(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document without touching the environment.
    pub fn from_toml(content: &str, origin: &str) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: origin.to_string(),
            source,
        })
    }

    fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_string(),
            source,
        })?;
        Self::from_toml(&content, path)
    }

    fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(listen) = var("DOORLINK_LISTEN") {
            self.server.listen = listen;
        } else if let Some(port) = var("PORT") {
            let port: u16 = port
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidPort(port.clone()))?;
            self.server.listen = format!("0.0.0.0:{port}");
        }
        if let Some(url) = var("DOORLINK_PUBLIC_URL") {
            self.server.public_url = Some(url);
        }
        if let Some(tz) = var("DOORLINK_TIMEZONE") {
            self.server.timezone = tz;
        }
        if let Some(url) = var("DOORLINK_UPSTREAM_URL") {
            self.upstream.base_url = url;
        }
        if let Some(key) = var("DOORLINK_UPSTREAM_KEY") {
            self.upstream.api_key = Some(key);
        }
        if let Some(secret) = var("DOORLINK_TOKEN_SECRET") {
            self.token.secret = secret;
        }
        if let Some(key) = var("DOORLINK_OPERATOR_KEY") {
            self.operator = Some(OperatorConfig { api_key: key });
        }
        Ok(())
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for t in &self.targets {
            if t.key.is_empty() || t.device_id.is_empty() {
                return Err(ConfigError::IncompleteTarget(t.key.clone()));
            }
            if !seen.insert(t.key.as_str()) {
                return Err(ConfigError::DuplicateTarget(t.key.clone()));
            }
        }
        Ok(())
    }

    /// Configured targets, or the built-in door table when none are listed.
    pub fn resolved_targets(&self) -> Vec<TargetConfig> {
        if !self.targets.is_empty() {
            return self.targets.clone();
        }
        BUILTIN_TARGETS
            .iter()
            .map(|(key, device_id, name)| TargetConfig {
                key: (*key).to_string(),
                device_id: (*device_id).to_string(),
                name: (*name).to_string(),
            })
            .collect()
    }

    /// Operator key, treating an empty string as "diagnostics disabled".
    pub fn operator_key(&self) -> Option<&str> {
        self.operator
            .as_ref()
            .map(|o| o.api_key.as_str())
            .filter(|k| !k.is_empty())
    }
}

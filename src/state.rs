//! Shared application state passed to every handler via Axum's `State` extractor.

use std::sync::Arc;
use std::time::Instant;

use crate::activity::ActivityLog;
use crate::config::Config;
use crate::service::CapabilityService;

/// Shared application state for the doorlink server.
#[derive(Clone)]
pub struct AppState {
    /// Immutable configuration loaded at startup.
    pub config: Arc<Config>,
    /// Monotonic instant when the server started (for uptime calculation).
    pub start_time: Instant,
    /// Token issuance, verification, and relay actuation.
    pub capabilities: Arc<CapabilityService>,
    /// Recent actuation attempts.
    pub activity_log: Arc<ActivityLog>,
}

impl AppState {
    pub fn new(config: Config, capabilities: CapabilityService) -> Self {
        Self {
            config: Arc::new(config),
            start_time: Instant::now(),
            capabilities: Arc::new(capabilities),
            activity_log: Arc::new(ActivityLog::default()),
        }
    }
}

//! Single-use enforcement for redeemed token signatures.
//!
//! [`ReplayGuard`] remembers every consumed signature until its record
//! expires. The check and the insert happen under one lock, and [`sweep`]
//! takes the same lock, so two concurrent redemptions of one signature can
//! never both be admitted and a sweep cannot interleave between them.
//!
//! Sweeping only reclaims memory: an expired record is treated as absent by
//! [`try_consume`] whether or not it has been swept yet.
//!
//! [`sweep`]: ReplayGuard::sweep
//! [`try_consume`]: ReplayGuard::try_consume

use std::collections::HashMap;

use serde::Serialize;
use tokio::sync::Mutex;

/// Why a signature was not admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    /// The requested window is empty, so the record could never block reuse.
    Expired,
    /// A live record for this signature already exists.
    AlreadyUsed,
}

/// Outcome of [`ReplayGuard::try_consume`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Accepted,
    Rejected(RejectReason),
}

/// Consumed signatures mapped to the epoch-ms instant their record expires.
#[derive(Debug, Default)]
pub struct ReplayGuard {
    records: Mutex<HashMap<String, u64>>,
}

impl ReplayGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically admit `signature` once per validity window.
    pub async fn try_consume(&self, signature: &str, now: u64, window_ms: u64) -> Admission {
        if window_ms == 0 {
            return Admission::Rejected(RejectReason::Expired);
        }
        let mut records = self.records.lock().await;
        if let Some(&expires_at) = records.get(signature) {
            if expires_at > now {
                return Admission::Rejected(RejectReason::AlreadyUsed);
            }
        }
        records.insert(signature.to_string(), now.saturating_add(window_ms));
        Admission::Accepted
    }

    /// Drop every record whose expiry is at or before `now`. Returns how many were removed.
    pub async fn sweep(&self, now: u64) -> usize {
        let mut records = self.records.lock().await;
        let before = records.len();
        records.retain(|_, &mut expires_at| expires_at > now);
        before - records.len()
    }

    /// Number of records currently held, expired or not.
    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }

    pub async fn contains(&self, signature: &str) -> bool {
        self.records.lock().await.contains_key(signature)
    }
}

//! In-memory journal of actuation attempts.
//!
//! Every redemption and operator actuation appends one entry to a fixed-size
//! ring buffer. Old entries are silently dropped when the buffer is full, and
//! the journal starts empty on every restart.
//!
//! Entries carry monotonic IDs so a caller can ask for "everything since ID N"
//! without gaps.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::RwLock;

use crate::actuation::Protocol;

/// Default ring buffer capacity.
pub const DEFAULT_CAPACITY: usize = 200;

/// What triggered the actuation attempt.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    /// Token presented on the redeem endpoint.
    Redeem,
    /// Operator-triggered open without a token.
    OperatorOpen,
    /// Operator diagnostics call.
    OperatorDiag,
}

impl ActivityKind {
    /// Parse from the serde rename value (e.g. `"redeem"`, `"operator_open"`).
    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "redeem" => Some(Self::Redeem),
            "operator_open" => Some(Self::OperatorOpen),
            "operator_diag" => Some(Self::OperatorDiag),
            _ => None,
        }
    }
}

/// A single journal entry.
#[derive(Debug, Clone, Serialize)]
pub struct ActivityEntry {
    pub id: u64,
    /// Epoch milliseconds.
    pub timestamp: u64,
    pub kind: ActivityKind,
    pub target: String,
    /// `"ok"` or the failure code.
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<Protocol>,
}

/// Ring buffer of [`ActivityEntry`] values.
pub struct ActivityLog {
    entries: RwLock<VecDeque<ActivityEntry>>,
    next_id: AtomicU64,
    max_entries: usize,
}

impl ActivityLog {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::with_capacity(max_entries)),
            next_id: AtomicU64::new(1),
            max_entries,
        }
    }

    /// Append an entry and return the assigned ID.
    pub async fn log(
        &self,
        timestamp: u64,
        kind: ActivityKind,
        target: &str,
        code: &str,
        protocol: Option<Protocol>,
    ) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let entry = ActivityEntry {
            id,
            timestamp,
            kind,
            target: target.to_string(),
            code: code.to_string(),
            protocol,
        };

        let mut entries = self.entries.write().await;
        if entries.len() >= self.max_entries {
            entries.pop_front();
        }
        entries.push_back(entry);
        id
    }

    /// Entries with `id > since_id`, oldest first, optionally of one kind.
    pub async fn read_since(
        &self,
        since_id: u64,
        limit: usize,
        kind: Option<ActivityKind>,
    ) -> Vec<ActivityEntry> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|e| e.id > since_id)
            .filter(|e| kind.map_or(true, |k| e.kind == k))
            .take(limit)
            .cloned()
            .collect()
    }
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

//! Graph mirror of contract relationships
//!
//! - [`RelationshipMirror`]: projects each created record into the graph
//! - [`QueryMirror`]: answers location queries through the graph, then
//!   fetches the authoritative records from the ledger
//!
//! The mirror is eventually consistent with the ledger. Write failures are
//! counted in [`MirrorStats`] and surfaced on the health endpoint.

pub mod query;
pub mod relationship;

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

pub use query::QueryMirror;
pub use relationship::{content_hash, RelationshipMirror};

/// Counters for mirror writes
#[derive(Debug, Default)]
pub struct MirrorStats {
    ok: AtomicU64,
    failed: AtomicU64,
    last_error: Mutex<Option<String>>,
}

/// Point-in-time view of [`MirrorStats`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MirrorStatsSnapshot {
    pub successful_writes: u64,
    pub failed_writes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl MirrorStats {
    pub fn record_success(&self) {
        self.ok.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self, error: &str) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut last) = self.last_error.lock() {
            *last = Some(error.to_string());
        }
    }

    pub fn snapshot(&self) -> MirrorStatsSnapshot {
        MirrorStatsSnapshot {
            successful_writes: self.ok.load(Ordering::Relaxed),
            failed_writes: self.failed.load(Ordering::Relaxed),
            last_error: self.last_error.lock().ok().and_then(|l| l.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_snapshot() {
        let stats = MirrorStats::default();
        stats.record_success();
        stats.record_success();
        stats.record_failure("graph down");

        let snap = stats.snapshot();
        assert_eq!(snap.successful_writes, 2);
        assert_eq!(snap.failed_writes, 1);
        assert_eq!(snap.last_error.as_deref(), Some("graph down"));
    }
}

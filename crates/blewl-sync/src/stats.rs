//! Synchronizer statistics collection.
//!
//! Counters are updated from the message callback and the housekeeping tick
//! and read by the diagnostics dump.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// Collects and tracks synchronizer statistics.
#[derive(Debug, Default)]
pub struct SyncStatistics {
    /// Updates decoded and published.
    updates_applied: AtomicU64,

    /// Updates rejected as structurally invalid.
    updates_rejected: AtomicU64,

    /// Messages dropped because the topic did not match or the mode is read-only.
    messages_ignored: AtomicU64,

    /// Failed attempts to persist the current whitelist.
    persist_failures: AtomicU64,

    /// When the last update was applied.
    last_update: Mutex<Option<DateTime<Utc>>>,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatisticsSnapshot {
    pub updates_applied: u64,
    pub updates_rejected: u64,
    pub messages_ignored: u64,
    pub persist_failures: u64,
    pub last_update: Option<DateTime<Utc>>,
}

impl SyncStatistics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_applied(&self) {
        self.updates_applied.fetch_add(1, Ordering::Relaxed);
        *self.last_update.lock() = Some(Utc::now());
    }

    pub fn record_rejected(&self) {
        self.updates_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_ignored(&self) {
        self.messages_ignored.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_persist_failure(&self) {
        self.persist_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current statistics snapshot.
    pub fn snapshot(&self) -> StatisticsSnapshot {
        StatisticsSnapshot {
            updates_applied: self.updates_applied.load(Ordering::Relaxed),
            updates_rejected: self.updates_rejected.load(Ordering::Relaxed),
            messages_ignored: self.messages_ignored.load(Ordering::Relaxed),
            persist_failures: self.persist_failures.load(Ordering::Relaxed),
            last_update: *self.last_update.lock(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_statistics_collection() {
        let stats = SyncStatistics::new();
        assert_eq!(stats.snapshot(), StatisticsSnapshot::default());

        stats.record_applied();
        stats.record_applied();
        stats.record_rejected();
        stats.record_ignored();
        stats.record_persist_failure();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.updates_applied, 2);
        assert_eq!(snapshot.updates_rejected, 1);
        assert_eq!(snapshot.messages_ignored, 1);
        assert_eq!(snapshot.persist_failures, 1);
        assert!(snapshot.last_update.is_some());
    }
}

//! Sync status registry and upload statistics
//!
//! [`SyncStatus`] is the process-wide "currently syncing" set consumed by
//! status displays; it is injected explicitly rather than living in a
//! global. [`SyncStats`] counts completed uploads across batches.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashSet;

/// Concurrent set of target names with a live sync session.
#[derive(Debug, Default)]
pub struct SyncStatus {
    running: DashSet<String>,
}

impl SyncStatus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a target as syncing. Returns `false` if it already was.
    pub fn add_running_sync(&self, name: &str) -> bool {
        self.running.insert(name.to_string())
    }

    /// Clear a target's syncing mark. Returns `true` if it was present.
    pub fn remove_running_sync(&self, name: &str) -> bool {
        self.running.remove(name).is_some()
    }

    pub fn is_running(&self, name: &str) -> bool {
        self.running.contains(name)
    }

    /// "Any job currently running" query for status displays.
    pub fn is_any_running(&self) -> bool {
        !self.running.is_empty()
    }

    pub fn running_count(&self) -> usize {
        self.running.len()
    }
}

/// Upload counters.
#[derive(Debug, Default)]
pub struct SyncStats {
    successful_uploads: AtomicU64,
}

impl SyncStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_successful_upload(&self) {
        self.successful_uploads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn successful_uploads(&self) -> u64 {
        self.successful_uploads.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_set() {
        let status = SyncStatus::new();
        assert!(!status.is_any_running());

        assert!(status.add_running_sync("staging"));
        assert!(!status.add_running_sync("staging"));
        assert!(status.is_running("staging"));
        assert!(status.is_any_running());
        assert_eq!(status.running_count(), 1);

        assert!(status.remove_running_sync("staging"));
        assert!(!status.remove_running_sync("staging"));
        assert!(!status.is_any_running());
    }

    #[test]
    fn test_stats_counter() {
        let stats = SyncStats::new();
        assert_eq!(stats.successful_uploads(), 0);
        stats.register_successful_upload();
        stats.register_successful_upload();
        assert_eq!(stats.successful_uploads(), 2);
    }
}

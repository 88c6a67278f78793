// =============================================================================
// Leaderboard Cleanup Job — periodic TTL delete (spec.md §4.3 Cleanup)
// =============================================================================
//
// Thin periodic wrapper around `AnalyticalStore::cleanup_leaderboard`, in the
// idiom of `examples/original_source/leaderboard_cleanup.py`'s scheduler loop.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};

use crate::storage::AnalyticalStore;

pub struct LeaderboardCleanupJob {
    store: Arc<AnalyticalStore>,
    retention_minutes: i64,
}

impl LeaderboardCleanupJob {
    pub fn new(store: Arc<AnalyticalStore>, retention_minutes: i64) -> Self {
        Self { store, retention_minutes }
    }

    pub async fn run(&self, interval_minutes: u64) {
        let interval = std::time::Duration::from_secs(interval_minutes.max(1) * 60);
        loop {
            tokio::time::sleep(interval).await;
            let now_ms = Utc::now().timestamp_millis();
            match self.store.cleanup_leaderboard(now_ms, self.retention_minutes).await {
                Ok(()) => debug!(retention_minutes = self.retention_minutes, "leaderboard cleanup ran"),
                Err(e) => warn!(error = %e, "leaderboard cleanup failed"),
            }
        }
    }
}

// =============================================================================
// Leaderboard — gainer/loser batch synchronization and TTL cleanup (spec.md §4.3)
// =============================================================================

pub mod cleanup;
pub mod sync;

pub use cleanup::LeaderboardCleanupJob;
pub use sync::LeaderboardSynchronizer;

// =============================================================================
// LeaderboardEntry — one row per (batch, side, rank)
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::ticker::LeaderboardSide;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub symbol: String,
    pub last_price: f64,
    pub price_change: f64,
    pub price_change_percent: f64,
    pub side: LeaderboardSide,
    pub rank: u32,
    pub create_datetime: DateTime<Utc>,
    pub create_datetime_long: i64,
}

// =============================================================================
// Trade — append-only execution record
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{position::PositionSide, signal::Signal};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub model_id: String,
    pub symbol: String,
    pub signal: Signal,
    pub quantity: f64,
    pub price: f64,
    pub leverage: f64,
    pub side: PositionSide,
    /// Zero for entries; realized P&L for exits.
    pub pnl: f64,
    pub fee: f64,
    pub timestamp: DateTime<Utc>,
}

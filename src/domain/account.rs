// =============================================================================
// AccountValue / AccountValueHistory — periodic portfolio snapshots
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountValue {
    pub model_id: String,
    pub balance: f64,
    pub available_balance: f64,
    pub cross_wallet_balance: f64,
    pub cross_un_pnl: f64,
    pub account_alias: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Append-only variant of `AccountValue`; every cycle writes a new row here
/// instead of overwriting the "current" row.
pub type AccountValueHistory = AccountValue;

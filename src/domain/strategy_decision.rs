// =============================================================================
// StrategyDecision — per-decision audit record for the rule-engine variant
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{model::StrategyKind, signal::Signal};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyDecision {
    pub model_id: String,
    pub strategy_name: String,
    pub strategy_type: StrategyKind,
    pub signal: Signal,
    pub symbol: Option<String>,
    pub quantity: Option<f64>,
    pub leverage: Option<f64>,
    pub price: Option<f64>,
    pub stop_price: Option<f64>,
    pub justification: Option<String>,
    pub timestamp: DateTime<Utc>,
}

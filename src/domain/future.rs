// =============================================================================
// Future / ModelFuture — global and per-model symbol universe
// =============================================================================

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Future {
    pub symbol: String,
    pub contract_symbol: String,
    pub name: String,
    pub exchange: String,
    pub sort_order: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelFuture {
    pub model_id: String,
    pub symbol: String,
    pub contract_symbol: String,
    pub name: String,
    pub exchange: String,
    pub sort_order: i32,
}

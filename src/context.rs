// =============================================================================
// Shared market/account context types — spec.md §4.4, §4.6, §4.8
// =============================================================================
//
// These are the structures the decision engine and the trading engine speak
// to each other in: `MarketSymbolState` is the per-symbol market snapshot
// (§4.6 step 2), `Portfolio`/`AccountInfo` are the per-cycle accounting view
// (§4.8), `BuyCandidate` is a row in the buy-side candidate list (§4.4).
// Grounded in `examples/original_source/trade/ai/ai_trader.py`'s
// `market_state`/`portfolio`/`account_info` dict shapes and
// `trading_engine.py`'s `_build_account_info`/`_get_market_state`.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::Position;

/// A single indicator set for one timeframe (spec.md §4.6 step 2).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TimeframeIndicators {
    /// Simple moving averages keyed by period (5, 20, 60, 99).
    pub ma: HashMap<u32, f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub macd_histogram: Option<f64>,
    pub rsi: Option<f64>,
    pub vol: Option<f64>,
}

/// Per-symbol market snapshot fed to the decision engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketSymbolState {
    pub price: f64,
    pub contract_symbol: String,
    pub daily_volume: f64,
    pub change_24h: f64,
    /// Keyed by timeframe label, e.g. "1h", "4h", "1d".
    pub timeframes: HashMap<String, TimeframeIndicators>,
}

/// A buy-side candidate row (spec.md §4.4's `candidates` list).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuyCandidate {
    pub symbol: String,
    pub contract_symbol: String,
    pub price: f64,
    pub quote_volume: f64,
}

/// The per-cycle accounting view handed to the decision engine and the
/// executor (spec.md §4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Portfolio {
    pub positions: Vec<Position>,
    pub cash: f64,
    pub positions_value: f64,
    pub total_value: f64,
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
    pub margin_used: f64,
}

/// Account-level framing for prompts (spec.md §4.6 step 4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountInfo {
    pub initial_capital: f64,
    pub total_return: f64,
    pub current_time: DateTime<Utc>,
}

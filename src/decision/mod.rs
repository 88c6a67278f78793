// =============================================================================
// Decision Engine — buy/sell signal production (spec.md §4.4, §4.5)
// =============================================================================
//
// Two implementations share one contract: `llm::LlmDecisionEngine` (AI trade
// type) and `strategy::StrategyDecisionEngine` (strategy trade type). The
// trading engine (§4.6) picks one per model based on `Model::trade_type` and
// never branches on the concrete type itself.

pub mod llm;
pub mod strategy;

use std::collections::HashMap;

use async_trait::async_trait;

use crate::context::{AccountInfo, BuyCandidate, MarketSymbolState, Portfolio};
use crate::domain::Decision;

/// The outcome of one buy-side or sell-side decision call.
#[derive(Debug, Clone, Default)]
pub struct DecisionResult {
    /// Per-symbol decisions, keyed by symbol.
    pub decisions: HashMap<String, Decision>,
    pub prompt: Option<String>,
    pub raw_response: Option<String>,
    pub cot_trace: Option<String>,
    pub tokens: Option<u32>,
    /// `true` when the call short-circuited on empty input (no candidates,
    /// no positions) rather than actually invoking a provider or ruleset.
    pub skipped: bool,
}

impl DecisionResult {
    pub fn skipped() -> Self {
        Self { skipped: true, ..Default::default() }
    }
}

#[async_trait]
pub trait DecisionEngine: Send + Sync {
    async fn make_buy_decision(
        &self,
        model_id: &str,
        candidates: &[BuyCandidate],
        portfolio: &Portfolio,
        account_info: &AccountInfo,
        market_state: &HashMap<String, MarketSymbolState>,
    ) -> anyhow::Result<DecisionResult>;

    async fn make_sell_decision(
        &self,
        model_id: &str,
        portfolio: &Portfolio,
        account_info: &AccountInfo,
        market_state: &HashMap<String, MarketSymbolState>,
    ) -> anyhow::Result<DecisionResult>;
}

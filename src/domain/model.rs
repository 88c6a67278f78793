// =============================================================================
// Model — the tenant unit, plus its prompts and bound strategies
// =============================================================================

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeType {
    Ai,
    Strategy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SymbolSource {
    Leaderboard,
    Future,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Model {
    pub id: String,
    pub name: String,
    pub provider_id: Option<String>,
    pub model_name: Option<String>,
    pub initial_capital: f64,
    pub leverage: f64,
    pub max_positions: u32,
    pub auto_buy_enabled: bool,
    pub auto_sell_enabled: bool,
    pub trade_type: TradeType,
    pub symbol_source: SymbolSource,
    pub buy_batch_size: u32,
    pub sell_batch_size: u32,
    pub buy_interval_seconds: u64,
    pub sell_interval_seconds: u64,
    pub group_size: u32,
    pub account_alias: Option<String>,
    pub is_virtual: bool,
}

impl Model {
    /// Leverage is always at least 1, regardless of a misconfigured value.
    pub fn effective_leverage(&self, decision_leverage: Option<f64>) -> f64 {
        let candidate = if self.leverage >= 1.0 {
            self.leverage
        } else {
            decision_leverage.unwrap_or(1.0)
        };
        candidate.max(1.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelPrompt {
    pub model_id: String,
    pub buy_prompt: String,
    pub sell_prompt: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Strategy {
    pub id: String,
    pub name: String,
    pub kind: StrategyKind,
    pub strategy_context: String,
    /// Source text for the sandboxed expression AST (see `decision::strategy`).
    pub strategy_code: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelStrategy {
    pub model_id: String,
    pub strategy_id: String,
    pub kind: StrategyKind,
    pub priority: i64,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_model(leverage: f64) -> Model {
        Model {
            id: "m1".into(),
            name: "test".into(),
            provider_id: None,
            model_name: None,
            initial_capital: 10_000.0,
            leverage,
            max_positions: 3,
            auto_buy_enabled: true,
            auto_sell_enabled: true,
            trade_type: TradeType::Ai,
            symbol_source: SymbolSource::Leaderboard,
            buy_batch_size: 5,
            sell_batch_size: 5,
            buy_interval_seconds: 60,
            sell_interval_seconds: 60,
            group_size: 1,
            account_alias: None,
            is_virtual: true,
        }
    }

    #[test]
    fn effective_leverage_uses_model_value_when_set() {
        let m = sample_model(10.0);
        assert_eq!(m.effective_leverage(Some(5.0)), 10.0);
    }

    #[test]
    fn effective_leverage_falls_back_to_decision_then_one() {
        let m = sample_model(0.0);
        assert_eq!(m.effective_leverage(Some(5.0)), 5.0);
        assert_eq!(m.effective_leverage(None), 1.0);
    }
}

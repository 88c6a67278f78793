// =============================================================================
// Conversation — per-decision audit record for the LLM decision engine
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleType {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub model_id: String,
    pub user_prompt: String,
    pub ai_response: String,
    pub cot_trace: Option<String>,
    pub tokens: Option<u32>,
    pub cycle_type: CycleType,
    pub timestamp: DateTime<Utc>,
}

impl Conversation {
    /// Audit row recorded when the provider HTTP call itself fails — kept so
    /// the trail shows the attempt even though no decision was produced
    /// (grounded in the original source's error-path conversation logging).
    pub fn api_error(model_id: &str, cycle_type: CycleType, user_prompt: &str, error: &str) -> Self {
        Self {
            model_id: model_id.to_string(),
            user_prompt: user_prompt.to_string(),
            ai_response: format!("[api_error] {error}"),
            cot_trace: None,
            tokens: None,
            cycle_type,
            timestamp: Utc::now(),
        }
    }
}

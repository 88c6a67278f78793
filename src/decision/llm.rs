// =============================================================================
// LLM Decision Engine — AI trade-type buy/sell decisions (spec.md §4.4)
// =============================================================================
//
// Grounded field-for-field in
// `examples/original_source/trade/ai/ai_trader.py`: `_build_buy_prompt` /
// `_build_sell_prompt` for prompt shape, `_call_openai_api` /
// `_call_anthropic_api` / `_call_gemini_api` for the three provider wire
// formats, and `_parse_response` / `_stringify_cot_trace` for response
// handling. On any provider-call failure an `api_error` conversation row is
// recorded and the error is re-raised to the caller, matching the original's
// error-path logging.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::json;
use tracing::{debug, warn};

use crate::context::{AccountInfo, BuyCandidate, MarketSymbolState, Portfolio};
use crate::domain::{Conversation, CycleType, Decision, Model, ModelPrompt, Provider, ProviderType};
use crate::storage::RelationalStore;

use super::{DecisionEngine, DecisionResult};

pub struct LlmDecisionEngine {
    relational: Arc<RelationalStore>,
    client: reqwest::Client,
    provider: Provider,
    model: Model,
    prompt: ModelPrompt,
    prompt_market_symbol_limit: usize,
}

impl LlmDecisionEngine {
    pub fn new(
        relational: Arc<RelationalStore>,
        provider: Provider,
        model: Model,
        prompt: ModelPrompt,
        prompt_market_symbol_limit: usize,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .expect("failed to build reqwest client");
        Self { relational, client, provider, model, prompt, prompt_market_symbol_limit }
    }

    // -------------------------------------------------------------------------
    // Prompt construction
    // -------------------------------------------------------------------------

    fn build_buy_prompt(
        &self,
        candidates: &[BuyCandidate],
        market_state: &HashMap<String, MarketSymbolState>,
        portfolio: &Portfolio,
        account_info: &AccountInfo,
    ) -> String {
        let mut body = String::new();
        body.push_str("You are a professional cryptocurrency futures trader evaluating buy candidates ");
        body.push_str(match self.model.symbol_source {
            crate::domain::SymbolSource::Leaderboard => "from live movers list.\n\n",
            crate::domain::SymbolSource::Future => "from configured futures universe.\n\n",
        });
        body.push_str(&self.prompt.buy_prompt);
        body.push_str("\n\nCandidates:\n");

        for candidate in candidates.iter().take(self.prompt_market_symbol_limit.max(1)) {
            let indicators = market_state
                .get(&candidate.symbol)
                .map(|s| serde_json::to_string(&s.timeframes).unwrap_or_default())
                .unwrap_or_else(|| "{}".to_string());
            body.push_str(&format!(
                "- {} (contract {}): price={:.8}, quote_volume={:.2}, indicators={}\n",
                candidate.symbol, candidate.contract_symbol, candidate.price, candidate.quote_volume, indicators
            ));
        }

        body.push_str(&format!(
            "\nAccount: cash={:.2}, total_value={:.2}, margin_used={:.2}, occupied_slots={}, \
             max_positions={}, configured_leverage={}, initial_capital={:.2}, total_return={:.4}, as_of={}\n",
            portfolio.cash,
            portfolio.total_value,
            portfolio.margin_used,
            portfolio.positions.len(),
            self.model.max_positions,
            self.model.leverage,
            account_info.initial_capital,
            account_info.total_return,
            account_info.current_time.to_rfc3339(),
        ));

        body.push_str(
            "\nRespond with JSON only, of the form:\n\
             {\"cot_trace\": [\"...\"], \"decisions\": {\"SYMBOL\": {\"signal\": \"buy_to_enter|hold\", \
             \"quantity\": 0, \"leverage\": 0, \"confidence\": 0, \"risk_budget_pct\": 0, \
             \"profit_target\": 0, \"stop_loss\": 0, \"justification\": \"...\"}}}\n",
        );
        body
    }

    fn build_sell_prompt(
        &self,
        portfolio: &Portfolio,
        market_state: &HashMap<String, MarketSymbolState>,
        account_info: &AccountInfo,
    ) -> String {
        let mut body = String::new();
        body.push_str("You are a professional cryptocurrency futures trader evaluating open positions.\n\n");
        body.push_str(&self.prompt.sell_prompt);
        body.push_str("\n\nOpen positions:\n");

        for position in &portfolio.positions {
            let current_price = market_state.get(&position.symbol).map(|s| s.price);
            let pnl = position.unrealized_pnl(current_price);
            let sign = match position.position_side {
                crate::domain::PositionSide::Long => "+",
                crate::domain::PositionSide::Short => "-",
            };
            body.push_str(&format!(
                "- {} {} qty={:.8} avg_price={:.8} current_price={} leverage={:.1} pnl={}{:.2}\n",
                position.symbol,
                position.position_side,
                position.position_amt,
                position.avg_price,
                current_price.map(|p| format!("{p:.8}")).unwrap_or_else(|| "unknown".to_string()),
                position.leverage,
                sign,
                pnl.abs(),
            ));
        }

        body.push_str(&format!(
            "\nAccount: total_value={:.2}, margin_used={:.2}, as_of={}\n",
            portfolio.total_value, portfolio.margin_used, account_info.current_time.to_rfc3339(),
        ));

        body.push_str(
            "\nRespond with JSON only, of the form:\n\
             {\"cot_trace\": [\"...\"], \"decisions\": {\"SYMBOL\": {\"signal\": \
             \"close_position|stop_loss|take_profit|hold\", \"quantity\": 0, \"price\": 0, \
             \"stop_price\": 0, \"justification\": \"...\"}}}\n",
        );
        body
    }

    // -------------------------------------------------------------------------
    // Provider dispatch
    // -------------------------------------------------------------------------

    /// Dispatch to the provider's wire format; returns the raw text reply
    /// plus provider-reported token usage when the response carries it
    /// (spec.md §4.4: "Extract text and, if available, token usage").
    async fn call_provider(&self, prompt: &str) -> anyhow::Result<(String, Option<u32>)> {
        match self.provider.provider_type {
            ProviderType::Anthropic => self.call_anthropic(prompt).await,
            ProviderType::Gemini => self.call_gemini(prompt).await,
            ProviderType::Openai | ProviderType::AzureOpenai | ProviderType::Deepseek => {
                self.call_openai_compatible(prompt).await
            }
        }
    }

    async fn call_openai_compatible(&self, prompt: &str) -> anyhow::Result<(String, Option<u32>)> {
        let base = self.provider.api_url.trim_end_matches('/');
        let base = if base.ends_with("/v1") { base.to_string() } else { format!("{base}/v1") };
        let url = format!("{base}/chat/completions");
        let model_name = self.model.model_name.clone().unwrap_or_default();

        let body = json!({
            "model": model_name,
            "temperature": 0.7,
            "max_tokens": 2000,
            "messages": [
                {"role": "system", "content": "You are a professional cryptocurrency trader. Output JSON format only."},
                {"role": "user", "content": prompt},
            ],
        });

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.provider.api_key)
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        let value: serde_json::Value = resp.json().await?;
        if !status.is_success() {
            anyhow::bail!("provider {} returned {}: {}", self.provider.name, status, value);
        }
        let text = value["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("openai-compatible response missing choices[0].message.content"))?;
        Ok((text.to_string(), openai_compatible_tokens(&value)))
    }

    async fn call_anthropic(&self, prompt: &str) -> anyhow::Result<(String, Option<u32>)> {
        let url = format!("{}/v1/messages", self.provider.api_url.trim_end_matches('/'));
        let model_name = self.model.model_name.clone().unwrap_or_default();

        let body = json!({
            "model": model_name,
            "max_tokens": 2000,
            "system": "You are a professional cryptocurrency trader. Output JSON format only.",
            "messages": [{"role": "user", "content": prompt}],
        });

        let resp = self
            .client
            .post(&url)
            .header("x-api-key", &self.provider.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await?;
        let status = resp.status();
        let value: serde_json::Value = resp.json().await?;
        if !status.is_success() {
            anyhow::bail!("anthropic returned {}: {}", status, value);
        }
        let text = value["content"][0]["text"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("anthropic response missing content[0].text"))?;
        Ok((text.to_string(), anthropic_tokens(&value)))
    }

    async fn call_gemini(&self, prompt: &str) -> anyhow::Result<(String, Option<u32>)> {
        let model_name = self.model.model_name.clone().unwrap_or_default();
        let base = self.provider.api_url.trim_end_matches('/');
        let base = if base.ends_with("/v1") { base.to_string() } else { format!("{base}/v1") };
        let url = format!("{base}/{model_name}:generateContent?key={}", self.provider.api_key);
        // Gemini has no system role; the system instruction is prepended to
        // the user turn instead (matches `_call_gemini_api`).
        let combined = format!(
            "You are a professional cryptocurrency trader. Output JSON format only.\n\n{prompt}"
        );

        let body = json!({
            "contents": [{"role": "user", "parts": [{"text": combined}]}],
            "generationConfig": {"temperature": 0.7, "maxOutputTokens": 2000},
        });

        let resp = self.client.post(&url).json(&body).send().await?;
        let status = resp.status();
        let value: serde_json::Value = resp.json().await?;
        if !status.is_success() {
            anyhow::bail!("gemini returned {}: {}", status, value);
        }
        let text = value["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("gemini response missing candidates[0].content.parts[0].text"))?;
        Ok((text.to_string(), gemini_tokens(&value)))
    }

    // -------------------------------------------------------------------------
    // Response parsing
    // -------------------------------------------------------------------------

    /// Strip Markdown code fences and parse, accepting either
    /// `{"decisions": {...}, "cot_trace": ...}` or a bare decisions map.
    /// Malformed JSON yields an empty decision map rather than an error —
    /// matches `_parse_response`'s "degrade gracefully" behavior.
    fn parse_response(raw: &str) -> (HashMap<String, Decision>, Option<String>) {
        let stripped = strip_code_fence(raw);
        let value: serde_json::Value = match serde_json::from_str(&stripped) {
            Ok(v) => v,
            Err(e) => {
                warn!(error = %e, "failed to parse LLM response as JSON, using empty decisions");
                return (HashMap::new(), None);
            }
        };

        let (decisions_value, cot_trace_value) = if value.get("decisions").is_some() {
            (value["decisions"].clone(), value.get("cot_trace").cloned())
        } else {
            (value, None)
        };

        let decisions: HashMap<String, Decision> = decisions_value
            .as_object()
            .map(|obj| {
                obj.iter()
                    .filter_map(|(k, v)| {
                        serde_json::from_value::<Decision>(v.clone()).ok().map(|d| (k.clone(), d))
                    })
                    .collect()
            })
            .unwrap_or_default();

        (decisions, cot_trace_value.and_then(|v| stringify_cot_trace(&v)))
    }

    async fn persist_error(&self, cycle_type: CycleType, prompt: &str, error: &str) {
        let conversation = Conversation::api_error(&self.model.id, cycle_type, prompt, error);
        if let Err(e) = self.relational.insert_conversation(&conversation).await {
            warn!(error = %e, "failed to persist api_error conversation row");
        }
    }
}

#[async_trait]
impl DecisionEngine for LlmDecisionEngine {
    async fn make_buy_decision(
        &self,
        _model_id: &str,
        candidates: &[BuyCandidate],
        portfolio: &Portfolio,
        account_info: &AccountInfo,
        market_state: &HashMap<String, MarketSymbolState>,
    ) -> anyhow::Result<DecisionResult> {
        if candidates.is_empty() {
            return Ok(DecisionResult::skipped());
        }

        let prompt = self.build_buy_prompt(candidates, market_state, portfolio, account_info);

        let (raw, reported_tokens) = match self.call_provider(&prompt).await {
            Ok(r) => r,
            Err(e) => {
                self.persist_error(CycleType::Buy, &prompt, &e.to_string()).await;
                return Err(e);
            }
        };
        let tokens = reported_tokens.unwrap_or_else(|| estimate_tokens(&prompt));

        let (decisions, cot_trace) = Self::parse_response(&raw);
        let conversation = Conversation {
            model_id: self.model.id.clone(),
            user_prompt: prompt.clone(),
            ai_response: raw.clone(),
            cot_trace: cot_trace.clone(),
            tokens: Some(tokens),
            cycle_type: CycleType::Buy,
            timestamp: Utc::now(),
        };
        if let Err(e) = self.relational.insert_conversation(&conversation).await {
            warn!(error = %e, "failed to persist buy conversation row");
        }

        debug!(count = decisions.len(), "buy decisions parsed");
        Ok(DecisionResult {
            decisions,
            prompt: Some(prompt),
            raw_response: Some(raw),
            cot_trace,
            tokens: Some(tokens),
            skipped: false,
        })
    }

    async fn make_sell_decision(
        &self,
        _model_id: &str,
        portfolio: &Portfolio,
        account_info: &AccountInfo,
        market_state: &HashMap<String, MarketSymbolState>,
    ) -> anyhow::Result<DecisionResult> {
        if portfolio.positions.is_empty() {
            return Ok(DecisionResult::skipped());
        }

        let prompt = self.build_sell_prompt(portfolio, market_state, account_info);

        let (raw, reported_tokens) = match self.call_provider(&prompt).await {
            Ok(r) => r,
            Err(e) => {
                self.persist_error(CycleType::Sell, &prompt, &e.to_string()).await;
                return Err(e);
            }
        };
        let tokens = reported_tokens.unwrap_or_else(|| estimate_tokens(&prompt));

        let (decisions, cot_trace) = Self::parse_response(&raw);
        let conversation = Conversation {
            model_id: self.model.id.clone(),
            user_prompt: prompt.clone(),
            ai_response: raw.clone(),
            cot_trace: cot_trace.clone(),
            tokens: Some(tokens),
            cycle_type: CycleType::Sell,
            timestamp: Utc::now(),
        };
        if let Err(e) = self.relational.insert_conversation(&conversation).await {
            warn!(error = %e, "failed to persist sell conversation row");
        }

        Ok(DecisionResult {
            decisions,
            prompt: Some(prompt),
            raw_response: Some(raw),
            cot_trace,
            tokens: Some(tokens),
            skipped: false,
        })
    }
}

fn openai_compatible_tokens(value: &serde_json::Value) -> Option<u32> {
    value["usage"]["total_tokens"].as_u64().map(|t| t as u32)
}

fn anthropic_tokens(value: &serde_json::Value) -> Option<u32> {
    match (value["usage"]["input_tokens"].as_u64(), value["usage"]["output_tokens"].as_u64()) {
        (Some(input), Some(output)) => Some((input + output) as u32),
        _ => None,
    }
}

fn gemini_tokens(value: &serde_json::Value) -> Option<u32> {
    value["usageMetadata"]["totalTokenCount"].as_u64().map(|t| t as u32)
}

/// Strip a leading/trailing ```json / ``` fence, if present.
fn strip_code_fence(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_lang = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_lang.strip_suffix("```").unwrap_or(without_lang).trim().to_string()
}

/// `_stringify_cot_trace`: None→None; string→trimmed-or-None; array→join
/// non-empty trimmed strings by newline, stringifying non-string elements;
/// anything else→JSON-stringify or Display fallback.
fn stringify_cot_trace(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::Null => None,
        serde_json::Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() { None } else { Some(trimmed.to_string()) }
        }
        serde_json::Value::Array(items) => {
            let joined: Vec<String> = items
                .iter()
                .filter_map(|item| match item {
                    serde_json::Value::String(s) => {
                        let t = s.trim();
                        if t.is_empty() { None } else { Some(t.to_string()) }
                    }
                    other => Some(other.to_string()),
                })
                .collect();
            if joined.is_empty() { None } else { Some(joined.join("\n")) }
        }
        other => Some(other.to_string()),
    }
}

/// Fallback token estimate (char-count/4) used only when a provider response
/// carries no usage field; real replies prefer the provider-reported count.
fn estimate_tokens(text: &str) -> u32 {
    ((text.chars().count() as f64) / 4.0).ceil() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_code_fence_removes_json_fence() {
        let raw = "```json\n{\"a\":1}\n```";
        assert_eq!(strip_code_fence(raw), "{\"a\":1}");
    }

    #[test]
    fn strip_code_fence_removes_bare_fence() {
        let raw = "```\n{\"a\":1}\n```";
        assert_eq!(strip_code_fence(raw), "{\"a\":1}");
    }

    #[test]
    fn strip_code_fence_passthrough_without_fence() {
        assert_eq!(strip_code_fence("{\"a\":1}"), "{\"a\":1}");
    }

    #[test]
    fn parse_response_accepts_wrapped_shape() {
        let raw = r#"{"cot_trace": ["step one", "step two"], "decisions": {"BTCUSDT": {"signal": "buy_to_enter", "quantity": 0.01}}}"#;
        let (decisions, cot) = LlmDecisionEngine::parse_response(raw);
        assert_eq!(decisions.len(), 1);
        assert_eq!(cot, Some("step one\nstep two".to_string()));
    }

    #[test]
    fn parse_response_accepts_bare_decisions_map() {
        let raw = r#"{"BTCUSDT": {"signal": "hold"}}"#;
        let (decisions, cot) = LlmDecisionEngine::parse_response(raw);
        assert_eq!(decisions.len(), 1);
        assert_eq!(cot, None);
    }

    #[test]
    fn parse_response_degrades_to_empty_on_malformed_json() {
        let (decisions, cot) = LlmDecisionEngine::parse_response("not json at all");
        assert!(decisions.is_empty());
        assert_eq!(cot, None);
    }

    #[test]
    fn stringify_cot_trace_joins_array_skipping_blank() {
        let v = serde_json::json!(["  step one  ", "", "step two"]);
        assert_eq!(stringify_cot_trace(&v), Some("step one\nstep two".to_string()));
    }

    #[test]
    fn stringify_cot_trace_none_for_blank_string() {
        let v = serde_json::json!("   ");
        assert_eq!(stringify_cot_trace(&v), None);
    }

    #[test]
    fn stringify_cot_trace_stringifies_non_string_array_items() {
        let v = serde_json::json!([1, "step"]);
        assert_eq!(stringify_cot_trace(&v), Some("1\nstep".to_string()));
    }

    #[test]
    fn estimate_tokens_is_roughly_char_count_over_four() {
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcdefgh"), 2);
    }

    #[test]
    fn openai_compatible_tokens_reads_total_tokens() {
        let v = serde_json::json!({"usage": {"total_tokens": 123}});
        assert_eq!(openai_compatible_tokens(&v), Some(123));
    }

    #[test]
    fn openai_compatible_tokens_none_when_usage_absent() {
        let v = serde_json::json!({"choices": []});
        assert_eq!(openai_compatible_tokens(&v), None);
    }

    #[test]
    fn anthropic_tokens_sums_input_and_output() {
        let v = serde_json::json!({"usage": {"input_tokens": 40, "output_tokens": 60}});
        assert_eq!(anthropic_tokens(&v), Some(100));
    }

    #[test]
    fn anthropic_tokens_none_when_partial_usage() {
        let v = serde_json::json!({"usage": {"input_tokens": 40}});
        assert_eq!(anthropic_tokens(&v), None);
    }

    #[test]
    fn gemini_tokens_reads_total_token_count() {
        let v = serde_json::json!({"usageMetadata": {"totalTokenCount": 77}});
        assert_eq!(gemini_tokens(&v), Some(77));
    }
}

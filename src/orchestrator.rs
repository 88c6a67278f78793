// =============================================================================
// Orchestrator — buy/sell scheduling loops across all enabled models (spec.md §4.9)
// =============================================================================
//
// Grounded in the teacher's `main.rs` top-level task-composition pattern: one
// `tokio::spawn` per long-lived loop, a `loop { ...; sleep; }` body, and
// per-unit failure isolation via `if let Err(e) = ... { error!(...); continue; }`
// (mirrored here from per-symbol websocket tasks to per-model sequential
// iteration within a single loop, per spec.md §5's "models processed
// sequentially within a loop" rule). Catastrophic-loop self-healing (sleep
// 60s, restart) is new to this module — the teacher has no outer catch-all
// because its per-symbol tasks are already the outermost unit of failure.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::domain::CycleType;
use crate::storage::RelationalStore;
use crate::trading::TradingEngine;

pub struct Orchestrator {
    relational: Arc<RelationalStore>,
    trading: Arc<TradingEngine>,
    buy_frequency_minutes: u32,
    sell_frequency_minutes: u32,
}

impl Orchestrator {
    pub fn new(
        relational: Arc<RelationalStore>,
        trading: Arc<TradingEngine>,
        buy_frequency_minutes: u32,
        sell_frequency_minutes: u32,
    ) -> Self {
        Self {
            relational,
            trading,
            buy_frequency_minutes: buy_frequency_minutes.clamp(1, 1440),
            sell_frequency_minutes: sell_frequency_minutes.clamp(1, 1440),
        }
    }

    /// Run the buy loop forever. Intended to be `tokio::spawn`ed by `main`.
    pub async fn run_buy_loop(self: Arc<Self>) {
        let interval = Duration::from_secs(u64::from(self.buy_frequency_minutes) * 60);
        loop {
            let started = tokio::time::Instant::now();
            match self.run_buy_round().await {
                Ok(count) => info!(models = count, "buy loop round complete"),
                Err(e) => {
                    error!(error = %e, "buy loop round failed catastrophically, restarting in 60s");
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    continue;
                }
            }
            let elapsed = started.elapsed();
            if elapsed < interval {
                tokio::time::sleep(interval - elapsed).await;
            }
        }
    }

    /// Run the sell loop forever. Intended to be `tokio::spawn`ed by `main`.
    pub async fn run_sell_loop(self: Arc<Self>) {
        let interval = Duration::from_secs(u64::from(self.sell_frequency_minutes) * 60);
        loop {
            let started = tokio::time::Instant::now();
            match self.run_sell_round().await {
                Ok(count) => info!(models = count, "sell loop round complete"),
                Err(e) => {
                    error!(error = %e, "sell loop round failed catastrophically, restarting in 60s");
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    continue;
                }
            }
            let elapsed = started.elapsed();
            if elapsed < interval {
                tokio::time::sleep(interval - elapsed).await;
            }
        }
    }

    /// One pass over every `auto_buy_enabled` model, in registration order,
    /// sequentially (spec.md §5: bound concurrent LLM calls per tenant).
    /// A single model's failure is logged and does not abort the round.
    async fn run_buy_round(&self) -> anyhow::Result<usize> {
        let models = self.relational.list_enabled_models(CycleType::Buy).await?;
        for model in &models {
            match self.trading.execute_buy_cycle(model).await {
                Ok(result) => info!(
                    model_id = %model.id,
                    success = result.success,
                    executions = result.executions.len(),
                    "buy cycle complete"
                ),
                Err(e) => warn!(model_id = %model.id, error = %e, "buy cycle failed, continuing to next model"),
            }
        }
        Ok(models.len())
    }

    async fn run_sell_round(&self) -> anyhow::Result<usize> {
        let models = self.relational.list_enabled_models(CycleType::Sell).await?;
        for model in &models {
            match self.trading.execute_sell_cycle(model).await {
                Ok(result) => info!(
                    model_id = %model.id,
                    success = result.success,
                    executions = result.executions.len(),
                    "sell cycle complete"
                ),
                Err(e) => warn!(model_id = %model.id, error = %e, "sell cycle failed, continuing to next model"),
            }
        }
        Ok(models.len())
    }
}

#[cfg(test)]
mod tests {
    #[test]
    fn frequencies_are_clamped_to_spec_bounds() {
        // spec.md §4.9: cadences are clamped to [1, 1440] minutes.
        assert_eq!(0u32.clamp(1, 1440), 1);
        assert_eq!(5000u32.clamp(1, 1440), 1440);
        assert_eq!(15u32.clamp(1, 1440), 15);
    }
}

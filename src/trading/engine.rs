// =============================================================================
// Trading Engine — per-model buy/sell cycle orchestration (spec.md §4.6)
// =============================================================================
//
// Grounded in `examples/original_source/trading_engine.py`'s per-cycle
// sequence (resolve symbols -> build market state -> portfolio -> account
// info -> decision engine -> executor -> conversation/account-value
// snapshot) and `trade/ai/ai_trader.py`'s market-state construction from
// klines. Task-spawn shape borrowed from the teacher's `main.rs` strategy
// loop (one `TradingEngine` instance shared across every model's cycles).

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::RuntimeConfig;
use crate::context::{BuyCandidate, MarketSymbolState, Portfolio, TimeframeIndicators};
use crate::decision::llm::LlmDecisionEngine;
use crate::decision::strategy::StrategyDecisionEngine;
use crate::decision::DecisionEngine;
use crate::domain::{AccountValue, Model, SymbolSource, TradeType};
use crate::indicators::{ma, macd, rsi, vol};
use crate::market::MarketClient;
use crate::storage::{AnalyticalStore, RelationalStore};

use super::accounting;
use super::executor::{self, Execution};

/// Timeframe label -> Binance kline interval. Grounded in
/// `examples/original_source/market_data.py`'s `_get_timeframe_indicators`.
const TIMEFRAMES: &[&str] = &["1w", "1d", "4h", "1h", "15m", "5m", "1m"];
const MA_PERIODS: &[usize] = &[5, 20, 60, 99];
const RSI_PERIOD: usize = 14;

#[derive(Debug, Clone)]
pub struct CycleResult {
    pub success: bool,
    pub executions: Vec<Execution>,
}

pub struct TradingEngine {
    relational: Arc<RelationalStore>,
    analytical: Arc<AnalyticalStore>,
    market: Arc<dyn MarketClient>,
    config: Arc<RuntimeConfig>,
}

impl TradingEngine {
    pub fn new(
        relational: Arc<RelationalStore>,
        analytical: Arc<AnalyticalStore>,
        market: Arc<dyn MarketClient>,
        config: Arc<RuntimeConfig>,
    ) -> Self {
        Self { relational, analytical, market, config }
    }

    pub async fn execute_buy_cycle(&self, model: &Model) -> anyhow::Result<CycleResult> {
        let symbols = self.resolve_buy_universe(model).await?;
        let market_state = self.build_market_state(&symbols).await?;
        let candidates = build_candidates(&symbols, &market_state);
        let current_prices = price_map(&market_state);

        let portfolio = accounting::compute_portfolio(&self.relational, model, &current_prices).await?;
        let account_info = accounting::build_account_info(model, &portfolio);

        let result = match self.decision_engine_for(model).await? {
            Some(engine) => {
                engine.make_buy_decision(&model.id, &candidates, &portfolio, &account_info, &market_state).await?
            }
            None => return Ok(CycleResult { success: false, executions: vec![] }),
        };

        let mut executions = Vec::new();
        for (symbol, decision) in &result.decisions {
            match executor::execute(
                &self.relational,
                model,
                symbol,
                decision,
                &market_state,
                &portfolio,
                self.config.fee_rate,
            )
            .await
            {
                Ok(execution) => executions.push(execution),
                Err(e) => warn!(model_id = %model.id, symbol, error = %e, "buy execution failed"),
            }
        }

        self.snapshot_account_value(model, &portfolio).await;
        Ok(CycleResult { success: true, executions })
    }

    pub async fn execute_sell_cycle(&self, model: &Model) -> anyhow::Result<CycleResult> {
        let current_prices_seed = HashMap::new();
        let portfolio = accounting::compute_portfolio(&self.relational, model, &current_prices_seed).await?;
        if portfolio.positions.is_empty() {
            self.snapshot_account_value(model, &portfolio).await;
            return Ok(CycleResult { success: true, executions: vec![] });
        }

        let symbols: Vec<(String, String)> =
            portfolio.positions.iter().map(|p| (p.symbol.clone(), p.symbol.clone())).collect();
        let market_state = self.build_market_state(&symbols).await?;
        let current_prices = price_map(&market_state);

        // Re-derive the portfolio now that current prices are known, so
        // unrealized P&L and account info reflect real marks (spec.md §4.8
        // step 4).
        let portfolio = accounting::compute_portfolio(&self.relational, model, &current_prices).await?;
        let account_info = accounting::build_account_info(model, &portfolio);

        let result = match self.decision_engine_for(model).await? {
            Some(engine) => engine.make_sell_decision(&model.id, &portfolio, &account_info, &market_state).await?,
            None => return Ok(CycleResult { success: false, executions: vec![] }),
        };

        let mut executions = Vec::new();
        for (symbol, decision) in &result.decisions {
            match executor::execute(
                &self.relational,
                model,
                symbol,
                decision,
                &market_state,
                &portfolio,
                self.config.fee_rate,
            )
            .await
            {
                Ok(execution) => executions.push(execution),
                Err(e) => warn!(model_id = %model.id, symbol, error = %e, "sell execution failed"),
            }
        }

        self.snapshot_account_value(model, &portfolio).await;
        Ok(CycleResult { success: true, executions })
    }

    // -------------------------------------------------------------------------
    // Symbol universe resolution (spec.md §4.6 step 1)
    // -------------------------------------------------------------------------

    async fn resolve_buy_universe(&self, model: &Model) -> anyhow::Result<Vec<(String, String)>> {
        match model.symbol_source {
            SymbolSource::Leaderboard => {
                let (gainers, _losers) = self.analytical.latest_leaderboard().await?;
                let futures = self.relational.list_futures().await?;
                let contract_map: HashMap<String, String> =
                    futures.into_iter().map(|f| (f.symbol, f.contract_symbol)).collect();
                Ok(gainers
                    .into_iter()
                    .take(model.buy_batch_size.max(1) as usize)
                    .map(|entry| {
                        let contract = contract_map.get(&entry.symbol).cloned().unwrap_or_else(|| entry.symbol.clone());
                        (entry.symbol, contract)
                    })
                    .collect())
            }
            SymbolSource::Future => {
                let futures = self.relational.list_model_futures(&model.id).await?;
                Ok(futures
                    .into_iter()
                    .take(model.buy_batch_size.max(1) as usize)
                    .map(|f| (f.symbol, f.contract_symbol))
                    .collect())
            }
        }
    }

    // -------------------------------------------------------------------------
    // Market state (spec.md §4.6 step 2)
    // -------------------------------------------------------------------------

    async fn build_market_state(
        &self,
        symbols: &[(String, String)],
    ) -> anyhow::Result<HashMap<String, MarketSymbolState>> {
        let mut out = HashMap::new();
        for (symbol, contract_symbol) in symbols {
            let mut price = 0.0;
            let mut daily_volume = 0.0;
            let mut change_24h = 0.0;
            if let Ok(Some(ticker)) = self.analytical.get_latest_ticker(contract_symbol).await {
                price = ticker.last_price;
                daily_volume = ticker.quote_volume;
                change_24h = ticker.price_change_percent;
            }

            let mut timeframes = HashMap::new();
            for &label in TIMEFRAMES {
                let klines = match self.market.klines(contract_symbol, label, self.config.futures_kline_limit).await
                {
                    Ok(k) if !k.is_empty() => k,
                    Ok(_) => continue,
                    Err(e) => {
                        warn!(symbol, timeframe = label, error = %e, "kline fetch failed");
                        continue;
                    }
                };
                let closes: Vec<f64> = klines.iter().map(|k| k.close).collect();
                let volumes: Vec<f64> = klines.iter().map(|k| k.volume).collect();
                if price == 0.0 {
                    price = *closes.last().unwrap_or(&0.0);
                }

                let mut ma_values = HashMap::new();
                for &period in MA_PERIODS {
                    if let Some(v) = ma::current_ma_or_fallback(&closes, period) {
                        ma_values.insert(period as u32, v);
                    }
                }
                let macd_triple = macd::current_macd(&closes);
                let rsi_value = rsi::current_rsi(&closes, RSI_PERIOD).map(|(v, _)| v);
                let vol_value = vol::current_vol(&volumes);

                timeframes.insert(
                    label.to_string(),
                    TimeframeIndicators {
                        ma: ma_values,
                        macd: macd_triple.as_ref().map(|m| m.macd),
                        macd_signal: macd_triple.as_ref().map(|m| m.signal),
                        macd_histogram: macd_triple.as_ref().map(|m| m.histogram),
                        rsi: rsi_value,
                        vol: vol_value,
                    },
                );
            }

            out.insert(
                symbol.clone(),
                MarketSymbolState {
                    price,
                    contract_symbol: contract_symbol.clone(),
                    daily_volume,
                    change_24h,
                    timeframes,
                },
            );
        }
        Ok(out)
    }

    // -------------------------------------------------------------------------
    // Decision engine selection (spec.md §4.6 step 5)
    // -------------------------------------------------------------------------

    async fn decision_engine_for(&self, model: &Model) -> anyhow::Result<Option<Box<dyn DecisionEngine>>> {
        match model.trade_type {
            TradeType::Strategy => Ok(Some(Box::new(StrategyDecisionEngine::new(self.relational.clone())))),
            TradeType::Ai => {
                let Some(provider_id) = &model.provider_id else {
                    warn!(model_id = %model.id, "ai trade type without a provider_id, skipping cycle");
                    return Ok(None);
                };
                let Some(provider) = self.relational.get_provider(provider_id).await? else {
                    warn!(model_id = %model.id, provider_id, "provider not found, skipping cycle");
                    return Ok(None);
                };
                let Some(prompt) = self.relational.get_model_prompt(&model.id).await? else {
                    warn!(model_id = %model.id, "model prompt not found, skipping cycle");
                    return Ok(None);
                };
                Ok(Some(Box::new(LlmDecisionEngine::new(
                    self.relational.clone(),
                    provider,
                    model.clone(),
                    prompt,
                    self.config.prompt_market_symbol_limit,
                ))))
            }
        }
    }

    async fn snapshot_account_value(&self, model: &Model, portfolio: &Portfolio) {
        let snapshot = AccountValue {
            model_id: model.id.clone(),
            balance: portfolio.total_value,
            available_balance: portfolio.cash,
            cross_wallet_balance: portfolio.total_value,
            cross_un_pnl: portfolio.unrealized_pnl,
            account_alias: model.account_alias.clone(),
            timestamp: chrono::Utc::now(),
        };
        if let Err(e) = self.relational.insert_account_value(&snapshot).await {
            warn!(model_id = %model.id, error = %e, "failed to persist account value snapshot");
        } else {
            info!(model_id = %model.id, total_value = portfolio.total_value, "account value snapshotted");
        }
    }
}

fn build_candidates(
    symbols: &[(String, String)],
    market_state: &HashMap<String, MarketSymbolState>,
) -> Vec<BuyCandidate> {
    symbols
        .iter()
        .filter_map(|(symbol, contract_symbol)| {
            let state = market_state.get(symbol)?;
            if state.price <= 0.0 {
                return None;
            }
            Some(BuyCandidate {
                symbol: symbol.clone(),
                contract_symbol: contract_symbol.clone(),
                price: state.price,
                quote_volume: state.daily_volume,
            })
        })
        .collect()
}

fn price_map(market_state: &HashMap<String, MarketSymbolState>) -> HashMap<String, f64> {
    market_state.iter().map(|(symbol, state)| (symbol.clone(), state.price)).collect()
}

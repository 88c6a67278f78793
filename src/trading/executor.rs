// =============================================================================
// Order Executor — signal handling (spec.md §4.7)
// =============================================================================
//
// Grounded in the teacher's `execution.rs` (the `ExecutionResult`-per-symbol
// idiom, one outcome struct carrying either a success or a rejection message)
// and `position_engine.rs` (position mutation, volume-weighted average
// merge-on-add), generalized from single-tenant long-only spot positions to
// `(model, symbol, position_side)` LONG/SHORT with leverage and margin. There
// is no live order routing in this crate (spec.md Non-goals) so every path
// here is the teacher's "paper" path, now backed by the relational store
// instead of an in-memory ledger.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;

use crate::context::{MarketSymbolState, Portfolio};
use crate::domain::{Decision, Model, Position, PositionSide, Signal, Trade};
use crate::storage::RelationalStore;

const MIN_RISK_PCT: f64 = 0.01;
const MAX_RISK_PCT: f64 = 0.05;

/// One symbol's outcome from a trading cycle (spec.md §4.6's `executions`
/// array element).
#[derive(Debug, Clone)]
pub struct Execution {
    pub symbol: String,
    pub signal: Signal,
    pub quantity: Option<f64>,
    pub price: Option<f64>,
    pub pnl: Option<f64>,
    pub fee: Option<f64>,
    pub message: Option<String>,
    pub error: Option<String>,
}

impl Execution {
    fn rejected(symbol: &str, signal: Signal, error: impl Into<String>) -> Self {
        Self {
            symbol: symbol.to_string(),
            signal,
            quantity: None,
            price: None,
            pnl: None,
            fee: None,
            message: None,
            error: Some(error.into()),
        }
    }
}

/// Absent `risk_budget_pct` defaults to 3% before clamping, matching the
/// original source's `decision.get('risk_budget_pct', 3)`.
fn clamp_risk_pct(risk_budget_pct: Option<f64>) -> f64 {
    (risk_budget_pct.unwrap_or(3.0) / 100.0).clamp(MIN_RISK_PCT, MAX_RISK_PCT)
}

/// Execute one symbol's decision against the model's current portfolio.
/// Failures are returned as `Execution { error: Some(_), .. }`, never as
/// `Err` — one symbol's rejection must not abort the cycle (spec.md §4.6
/// step 6).
pub async fn execute(
    relational: &Arc<RelationalStore>,
    model: &Model,
    symbol: &str,
    decision: &Decision,
    market_state: &HashMap<String, MarketSymbolState>,
    portfolio: &Portfolio,
    fee_rate: f64,
) -> anyhow::Result<Execution> {
    let Some(signal) = decision.signal else {
        return Ok(Execution::rejected(symbol, Signal::Hold, "missing signal"));
    };

    match signal {
        Signal::Hold => Ok(Execution {
            symbol: symbol.to_string(),
            signal,
            quantity: None,
            price: None,
            pnl: None,
            fee: None,
            message: Some("hold".to_string()),
            error: None,
        }),
        Signal::BuyToEnter | Signal::SellToEnter => {
            execute_entry(relational, model, symbol, signal, decision, market_state, portfolio, fee_rate).await
        }
        Signal::ClosePosition | Signal::StopLoss | Signal::TakeProfit => {
            execute_exit(relational, model, symbol, signal, market_state, portfolio, fee_rate).await
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn execute_entry(
    relational: &Arc<RelationalStore>,
    model: &Model,
    symbol: &str,
    signal: Signal,
    decision: &Decision,
    market_state: &HashMap<String, MarketSymbolState>,
    portfolio: &Portfolio,
    fee_rate: f64,
) -> anyhow::Result<Execution> {
    let side = PositionSide::from_signal(signal).expect("entry signal always maps to a side");

    // Mirrors the original source's `existing_symbols` set: "new" means the
    // symbol itself is absent from the portfolio, regardless of side.
    let is_new = !portfolio.positions.iter().any(|p| p.symbol == symbol);
    if is_new && portfolio.positions.len() as u32 >= model.max_positions {
        return Ok(Execution::rejected(symbol, signal, "达到最大持仓数量，无法继续开仓"));
    }

    let price = match market_state.get(symbol).map(|s| s.price) {
        Some(price) if price > 0.0 => price,
        _ => return Ok(Execution::rejected(symbol, signal, "no valid price available")),
    };

    let leverage = model.effective_leverage(decision.leverage);
    let unit_cost = price * (1.0 + fee_rate);
    let max_affordable_qty = if unit_cost > 0.0 { portfolio.cash / unit_cost } else { 0.0 };
    let risk_pct = clamp_risk_pct(decision.risk_budget_pct);
    let risk_qty = if unit_cost > 0.0 { portfolio.cash * risk_pct / unit_cost } else { 0.0 };

    let qty = match decision.quantity {
        Some(q) if q > 0.0 && q <= max_affordable_qty => q,
        _ => {
            if risk_qty > 0.0 {
                max_affordable_qty.min(risk_qty)
            } else {
                max_affordable_qty
            }
        }
    };
    if qty <= 0.0 {
        return Ok(Execution::rejected(symbol, signal, "现金不足，无法买入"));
    }

    let required_margin = qty * price / leverage;
    let fee = qty * price * fee_rate;
    if required_margin + fee > portfolio.cash {
        return Ok(Execution::rejected(symbol, signal, "可用资金不足（含手续费）"));
    }

    let mut position = relational.get_position(&model.id, symbol, side).await?.unwrap_or(Position {
        model_id: model.id.clone(),
        symbol: symbol.to_string(),
        position_side: side,
        position_amt: 0.0,
        avg_price: 0.0,
        leverage,
        initial_margin: 0.0,
        unrealized_profit: 0.0,
    });
    position.merge_fill(qty, price, leverage);
    relational.upsert_position(&position).await?;

    relational
        .insert_trade(&Trade {
            model_id: model.id.clone(),
            symbol: symbol.to_string(),
            signal,
            quantity: qty,
            price,
            leverage,
            side,
            pnl: 0.0,
            fee,
            timestamp: Utc::now(),
        })
        .await?;

    Ok(Execution {
        symbol: symbol.to_string(),
        signal,
        quantity: Some(qty),
        price: Some(price),
        pnl: Some(0.0),
        fee: Some(fee),
        message: Some(format!("entered {side} {qty:.6} {symbol} @ {price:.4}, margin {required_margin:.4}")),
        error: None,
    })
}

async fn execute_exit(
    relational: &Arc<RelationalStore>,
    model: &Model,
    symbol: &str,
    signal: Signal,
    market_state: &HashMap<String, MarketSymbolState>,
    portfolio: &Portfolio,
    fee_rate: f64,
) -> anyhow::Result<Execution> {
    let Some(position) = portfolio.positions.iter().find(|p| p.symbol == symbol) else {
        return Ok(Execution::rejected(symbol, signal, "no open position for symbol"));
    };

    let current_price = match market_state.get(symbol).map(|s| s.price) {
        Some(price) if price > 0.0 => price,
        _ => return Ok(Execution::rejected(symbol, signal, "no valid price available")),
    };

    let qty = position.position_amt;
    let gross_pnl = match position.position_side {
        PositionSide::Long => (current_price - position.avg_price) * qty,
        PositionSide::Short => (position.avg_price - current_price) * qty,
    };
    let fee = qty * current_price * fee_rate;
    let net_pnl = gross_pnl - fee;

    relational.delete_position(&model.id, symbol, position.position_side).await?;
    relational.delete_future_if_unheld(symbol).await?;
    relational
        .insert_trade(&Trade {
            model_id: model.id.clone(),
            symbol: symbol.to_string(),
            signal,
            quantity: qty,
            price: current_price,
            leverage: position.leverage,
            side: position.position_side,
            pnl: net_pnl,
            fee,
            timestamp: Utc::now(),
        })
        .await?;

    Ok(Execution {
        symbol: symbol.to_string(),
        signal,
        quantity: Some(qty),
        price: Some(current_price),
        pnl: Some(net_pnl),
        fee: Some(fee),
        message: Some(format!("closed {qty:.6} {symbol} @ {current_price:.4}, net pnl {net_pnl:.4}")),
        error: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clamp_risk_pct_floors_at_one_percent() {
        assert_eq!(clamp_risk_pct(Some(0.0)), MIN_RISK_PCT);
    }

    #[test]
    fn clamp_risk_pct_defaults_to_three_percent_when_absent() {
        assert!((clamp_risk_pct(None) - 0.03).abs() < 1e-12);
    }

    #[test]
    fn clamp_risk_pct_caps_at_five_percent() {
        assert_eq!(clamp_risk_pct(Some(50.0)), MAX_RISK_PCT);
    }

    #[test]
    fn clamp_risk_pct_passes_through_mid_range() {
        assert!((clamp_risk_pct(Some(3.0)) - 0.03).abs() < 1e-12);
    }
}

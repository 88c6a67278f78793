// =============================================================================
// Accounting Ledger — portfolio computation (spec.md §4.8)
// =============================================================================
//
// Grounded in `examples/original_source/trading_engine.py`'s
// `_build_account_info`/portfolio computation and `position_engine.rs`'s
// per-side PnL sign convention, generalized to leveraged margin accounting.
// Produces the `cash + margin_used - realized_pnl = initial_capital` identity
// spec.md §8 requires.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;

use crate::context::{AccountInfo, Portfolio};
use crate::domain::Model;
use crate::storage::RelationalStore;

/// Build the per-cycle portfolio snapshot for `model`, given the latest known
/// price per symbol.
pub async fn compute_portfolio(
    relational: &Arc<RelationalStore>,
    model: &Model,
    current_prices: &HashMap<String, f64>,
) -> anyhow::Result<Portfolio> {
    let positions: Vec<_> = relational
        .list_positions(&model.id)
        .await?
        .into_iter()
        .filter(|p| p.position_amt != 0.0)
        .collect();
    let realized_pnl = relational.realized_pnl(&model.id).await?;

    let mut margin_used = 0.0;
    let mut unrealized_pnl = 0.0;
    let mut positions_value = 0.0;
    for position in &positions {
        margin_used += if position.initial_margin != 0.0 {
            position.initial_margin
        } else {
            position.position_amt.abs() * position.avg_price / position.leverage.max(1.0)
        };
        let current_price = current_prices.get(&position.symbol).copied();
        unrealized_pnl += position.unrealized_pnl(current_price);
        positions_value += position.position_amt.abs() * position.avg_price;
    }

    let cash = model.initial_capital + realized_pnl - margin_used;
    let total_value = model.initial_capital + realized_pnl + unrealized_pnl;

    Ok(Portfolio {
        positions,
        cash,
        positions_value,
        total_value,
        realized_pnl,
        unrealized_pnl,
        margin_used,
    })
}

/// Build account-level framing from a just-computed portfolio (spec.md §4.6
/// step 4): `total_return = (total_value/initial_capital - 1) * 100`.
pub fn build_account_info(model: &Model, portfolio: &Portfolio) -> AccountInfo {
    let total_return = if model.initial_capital > 0.0 {
        (portfolio.total_value / model.initial_capital - 1.0) * 100.0
    } else {
        0.0
    };
    AccountInfo { initial_capital: model.initial_capital, total_return, current_time: Utc::now() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Position, PositionSide};

    fn sample_model() -> Model {
        Model {
            id: "m1".into(),
            name: "t".into(),
            provider_id: None,
            model_name: None,
            initial_capital: 10_000.0,
            leverage: 10.0,
            max_positions: 3,
            auto_buy_enabled: true,
            auto_sell_enabled: true,
            trade_type: crate::domain::TradeType::Ai,
            symbol_source: crate::domain::SymbolSource::Leaderboard,
            buy_batch_size: 5,
            sell_batch_size: 5,
            buy_interval_seconds: 60,
            sell_interval_seconds: 60,
            group_size: 1,
            account_alias: None,
            is_virtual: false,
        }
    }

    fn sample_position() -> Position {
        Position {
            model_id: "m1".into(),
            symbol: "BTCUSDT".into(),
            position_side: PositionSide::Long,
            position_amt: 0.01,
            avg_price: 50_000.0,
            leverage: 10.0,
            initial_margin: 50.0,
            unrealized_profit: 0.0,
        }
    }

    #[test]
    fn account_info_total_return_zero_at_break_even() {
        let model = sample_model();
        let portfolio = Portfolio {
            positions: vec![],
            cash: model.initial_capital,
            positions_value: 0.0,
            total_value: model.initial_capital,
            realized_pnl: 0.0,
            unrealized_pnl: 0.0,
            margin_used: 0.0,
        };
        let info = build_account_info(&model, &portfolio);
        assert_eq!(info.total_return, 0.0);
    }

    #[test]
    fn account_info_total_return_reflects_gain() {
        let model = sample_model();
        let portfolio = Portfolio {
            positions: vec![sample_position()],
            cash: 9_950.0,
            positions_value: 500.0,
            total_value: 11_000.0,
            realized_pnl: 0.0,
            unrealized_pnl: 1_000.0,
            margin_used: 50.0,
        };
        let info = build_account_info(&model, &portfolio);
        assert!((info.total_return - 10.0).abs() < 1e-9);
    }
}

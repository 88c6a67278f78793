// =============================================================================
// Strategy Decision Engine — rule-based buy/sell decisions (spec.md §4.5)
// =============================================================================
//
// No direct teacher file backs this module; its idiom — small, pure,
// match-over-enum functions with colocated unit tests — is borrowed from
// `indicators::ema`/`indicators::rsi`. Each bound `Strategy.strategy_code` is
// a line-based `key: expression` program evaluated by `crate::expr` once per
// candidate (buy) or open position (sell); strategies run in
// `(priority DESC, created_at ASC)` order (the order `list_model_strategies`
// already returns), concatenating matches and de-duplicating by symbol so an
// earlier (higher-priority) strategy's decision for a symbol wins.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;

use crate::context::{AccountInfo, BuyCandidate, MarketSymbolState, Portfolio};
use crate::domain::{Decision, Position, PositionSide, Signal, Strategy, StrategyDecision, StrategyKind};
use crate::expr::{self, Env, Expr};
use crate::storage::RelationalStore;

use super::{DecisionEngine, DecisionResult};

/// A parsed strategy program: one required `condition`, one required
/// `signal`, and a handful of optional numeric/text fields.
struct StrategyProgram {
    name: String,
    kind: StrategyKind,
    condition: Expr,
    signal: Signal,
    quantity: Option<Expr>,
    leverage: Option<Expr>,
    risk_budget_pct: Option<Expr>,
    profit_target: Option<Expr>,
    stop_loss: Option<Expr>,
    price: Option<Expr>,
    stop_price: Option<Expr>,
    justification: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StrategyParseError {
    MissingField(&'static str),
    InvalidSignal(String),
    Expr(String),
}

impl std::fmt::Display for StrategyParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingField(name) => write!(f, "strategy program missing required field '{name}'"),
            Self::InvalidSignal(s) => write!(f, "unrecognized signal tag: {s}"),
            Self::Expr(e) => write!(f, "expression error: {e}"),
        }
    }
}

impl std::error::Error for StrategyParseError {}

fn parse_signal(tag: &str) -> Result<Signal, StrategyParseError> {
    match tag.trim() {
        "buy_to_enter" => Ok(Signal::BuyToEnter),
        "sell_to_enter" => Ok(Signal::SellToEnter),
        "close_position" => Ok(Signal::ClosePosition),
        "stop_loss" => Ok(Signal::StopLoss),
        "take_profit" => Ok(Signal::TakeProfit),
        "hold" => Ok(Signal::Hold),
        other => Err(StrategyParseError::InvalidSignal(other.to_string())),
    }
}

fn parse_program(strategy: &Strategy) -> Result<StrategyProgram, StrategyParseError> {
    let mut fields: HashMap<&'static str, String> = HashMap::new();
    for line in strategy.strategy_code.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else { continue };
        let key = key.trim();
        let canonical = match key {
            "condition" => "condition",
            "signal" => "signal",
            "quantity" => "quantity",
            "leverage" => "leverage",
            "risk_budget_pct" => "risk_budget_pct",
            "profit_target" => "profit_target",
            "stop_loss" => "stop_loss",
            "price" => "price",
            "stop_price" => "stop_price",
            "justification" => "justification",
            _ => continue,
        };
        fields.insert(canonical, value.trim().to_string());
    }

    let condition_src = fields.get("condition").ok_or(StrategyParseError::MissingField("condition"))?;
    let condition = expr::parse(condition_src).map_err(|e| StrategyParseError::Expr(e.to_string()))?;
    let signal_src = fields.get("signal").ok_or(StrategyParseError::MissingField("signal"))?;
    let signal = parse_signal(signal_src)?;

    let parse_opt = |key: &str| -> Result<Option<Expr>, StrategyParseError> {
        match fields.get(key) {
            Some(src) => expr::parse(src).map(Some).map_err(|e| StrategyParseError::Expr(e.to_string())),
            None => Ok(None),
        }
    };

    Ok(StrategyProgram {
        name: strategy.name.clone(),
        kind: strategy.kind,
        condition,
        signal,
        quantity: parse_opt("quantity")?,
        leverage: parse_opt("leverage")?,
        risk_budget_pct: parse_opt("risk_budget_pct")?,
        profit_target: parse_opt("profit_target")?,
        stop_loss: parse_opt("stop_loss")?,
        price: parse_opt("price")?,
        stop_price: parse_opt("stop_price")?,
        justification: fields.get("justification").cloned(),
    })
}

fn account_env(portfolio: &Portfolio, account_info: &AccountInfo) -> Env {
    let mut env = Env::new();
    env.insert("cash".into(), portfolio.cash);
    env.insert("total_value".into(), portfolio.total_value);
    env.insert("positions_value".into(), portfolio.positions_value);
    env.insert("margin_used".into(), portfolio.margin_used);
    env.insert("realized_pnl".into(), portfolio.realized_pnl);
    env.insert("unrealized_pnl".into(), portfolio.unrealized_pnl);
    env.insert("initial_capital".into(), account_info.initial_capital);
    env.insert("total_return".into(), account_info.total_return);
    env
}

fn market_env(state: Option<&MarketSymbolState>, mut env: Env) -> Env {
    let Some(state) = state else { return env };
    env.insert("price".into(), state.price);
    env.insert("daily_volume".into(), state.daily_volume);
    env.insert("change_24h".into(), state.change_24h);
    for (timeframe, indicators) in &state.timeframes {
        if let Some(rsi) = indicators.rsi {
            env.insert(format!("rsi_{timeframe}"), rsi);
        }
        if let Some(vol) = indicators.vol {
            env.insert(format!("vol_{timeframe}"), vol);
        }
        if let Some(macd) = indicators.macd {
            env.insert(format!("macd_{timeframe}"), macd);
        }
        if let Some(signal) = indicators.macd_signal {
            env.insert(format!("macd_signal_{timeframe}"), signal);
        }
        if let Some(hist) = indicators.macd_histogram {
            env.insert(format!("macd_histogram_{timeframe}"), hist);
        }
        for (period, value) in &indicators.ma {
            env.insert(format!("ma{period}_{timeframe}"), *value);
        }
    }
    env
}

fn position_env(position: &Position, current_price: Option<f64>, mut env: Env) -> Env {
    env.insert("position_amt".into(), position.position_amt);
    env.insert("avg_price".into(), position.avg_price);
    env.insert("leverage".into(), position.leverage);
    env.insert("initial_margin".into(), position.initial_margin);
    env.insert(
        "direction".into(),
        if position.position_side == PositionSide::Long { 1.0 } else { -1.0 },
    );
    let pnl = position.unrealized_pnl(current_price);
    env.insert("unrealized_pnl".into(), pnl);
    let basis = position.avg_price * position.position_amt / position.leverage.max(1.0);
    env.insert("unrealized_pnl_pct".into(), if basis > 0.0 { pnl / basis * 100.0 } else { 0.0 });
    env
}

fn eval_decision(program: &StrategyProgram, env: &Env, symbol: &str) -> Option<(Decision, StrategyDecision)> {
    let matched = expr::eval(&program.condition, env).ok().map(expr::is_truthy).unwrap_or(false);
    if !matched {
        return None;
    }
    let eval_opt = |e: &Option<Expr>| e.as_ref().and_then(|e| expr::eval(e, env).ok());

    let quantity = eval_opt(&program.quantity);
    let leverage = eval_opt(&program.leverage);
    let risk_budget_pct = eval_opt(&program.risk_budget_pct);
    let profit_target = eval_opt(&program.profit_target);
    let stop_loss = eval_opt(&program.stop_loss);
    let price = eval_opt(&program.price);
    let stop_price = eval_opt(&program.stop_price);

    let decision = Decision {
        signal: Some(program.signal),
        quantity,
        leverage,
        confidence: None,
        risk_budget_pct,
        profit_target,
        stop_loss,
        price,
        stop_price,
        justification: program.justification.clone(),
    };

    let audit = StrategyDecision {
        model_id: String::new(), // filled in by the caller
        strategy_name: program.name.clone(),
        strategy_type: program.kind,
        signal: program.signal,
        symbol: Some(symbol.to_string()),
        quantity,
        leverage,
        price,
        stop_price,
        justification: program.justification.clone(),
        timestamp: Utc::now(),
    };

    Some((decision, audit))
}

pub struct StrategyDecisionEngine {
    relational: Arc<RelationalStore>,
}

impl StrategyDecisionEngine {
    pub fn new(relational: Arc<RelationalStore>) -> Self {
        Self { relational }
    }

    async fn run_programs(
        &self,
        model_id: &str,
        kind: StrategyKind,
        symbols_env: Vec<(String, Env)>,
    ) -> anyhow::Result<DecisionResult> {
        let bound = self.relational.list_model_strategies(model_id, kind).await?;
        if bound.is_empty() || symbols_env.is_empty() {
            return Ok(DecisionResult::skipped());
        }

        let mut decisions: HashMap<String, Decision> = HashMap::new();
        let mut audit_rows: Vec<StrategyDecision> = Vec::new();

        for (strategy, _model_strategy) in &bound {
            let program = match parse_program(strategy) {
                Ok(p) => p,
                Err(e) => {
                    tracing::warn!(strategy = %strategy.name, error = %e, "skipping unparsable strategy");
                    continue;
                }
            };
            for (symbol, env) in &symbols_env {
                if decisions.contains_key(symbol) {
                    continue; // a higher-priority strategy already decided this symbol
                }
                if let Some((decision, mut audit)) = eval_decision(&program, env, symbol) {
                    audit.model_id = model_id.to_string();
                    decisions.insert(symbol.clone(), decision);
                    audit_rows.push(audit);
                }
            }
        }

        if !audit_rows.is_empty() {
            self.relational.insert_strategy_decisions(&audit_rows).await?;
        }

        Ok(DecisionResult { decisions, skipped: false, ..Default::default() })
    }
}

#[async_trait]
impl DecisionEngine for StrategyDecisionEngine {
    async fn make_buy_decision(
        &self,
        model_id: &str,
        candidates: &[BuyCandidate],
        portfolio: &Portfolio,
        account_info: &AccountInfo,
        market_state: &HashMap<String, MarketSymbolState>,
    ) -> anyhow::Result<DecisionResult> {
        if candidates.is_empty() {
            return Ok(DecisionResult::skipped());
        }
        let base_env = account_env(portfolio, account_info);
        let envs = candidates
            .iter()
            .map(|c| (c.symbol.clone(), market_env(market_state.get(&c.symbol), base_env.clone())))
            .collect();
        self.run_programs(model_id, StrategyKind::Buy, envs).await
    }

    async fn make_sell_decision(
        &self,
        model_id: &str,
        portfolio: &Portfolio,
        account_info: &AccountInfo,
        market_state: &HashMap<String, MarketSymbolState>,
    ) -> anyhow::Result<DecisionResult> {
        if portfolio.positions.is_empty() {
            return Ok(DecisionResult::skipped());
        }
        let base_env = account_env(portfolio, account_info);
        let envs = portfolio
            .positions
            .iter()
            .map(|p| {
                let state = market_state.get(&p.symbol);
                let current_price = state.map(|s| s.price);
                let env = market_env(state, base_env.clone());
                (p.symbol.clone(), position_env(p, current_price, env))
            })
            .collect();
        self.run_programs(model_id, StrategyKind::Sell, envs).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strategy(kind: StrategyKind, code: &str) -> Strategy {
        Strategy {
            id: "s1".into(),
            name: "rsi-dip".into(),
            kind,
            strategy_context: "".into(),
            strategy_code: code.to_string(),
        }
    }

    #[test]
    fn parses_buy_program() {
        let s = strategy(
            StrategyKind::Buy,
            "condition: rsi_1h < 30 && change_24h > 0\nsignal: buy_to_enter\nquantity: cash * 0.02 / price\nleverage: 5",
        );
        let program = parse_program(&s).unwrap();
        assert_eq!(program.signal, Signal::BuyToEnter);
        assert!(program.quantity.is_some());
        assert!(program.leverage.is_some());
    }

    #[test]
    fn missing_condition_is_an_error() {
        let s = strategy(StrategyKind::Buy, "signal: buy_to_enter");
        assert_eq!(parse_program(&s), Err(StrategyParseError::MissingField("condition")));
    }

    #[test]
    fn unrecognized_signal_is_an_error() {
        let s = strategy(StrategyKind::Buy, "condition: 1 > 0\nsignal: moon");
        assert!(matches!(parse_program(&s), Err(StrategyParseError::InvalidSignal(_))));
    }

    #[test]
    fn eval_decision_skips_when_condition_false() {
        let s = strategy(StrategyKind::Buy, "condition: rsi < 30\nsignal: buy_to_enter");
        let program = parse_program(&s).unwrap();
        let mut env = Env::new();
        env.insert("rsi".into(), 50.0);
        assert!(eval_decision(&program, &env, "BTCUSDT").is_none());
    }

    #[test]
    fn eval_decision_produces_decision_when_condition_true() {
        let s = strategy(
            StrategyKind::Buy,
            "condition: rsi < 30\nsignal: buy_to_enter\nquantity: 0.01\nleverage: 3",
        );
        let program = parse_program(&s).unwrap();
        let mut env = Env::new();
        env.insert("rsi".into(), 20.0);
        let (decision, audit) = eval_decision(&program, &env, "BTCUSDT").unwrap();
        assert_eq!(decision.signal, Some(Signal::BuyToEnter));
        assert_eq!(decision.quantity, Some(0.01));
        assert_eq!(audit.symbol, Some("BTCUSDT".to_string()));
    }
}

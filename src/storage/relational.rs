// =============================================================================
// Relational store — sqlx::MySqlPool-backed access to the tenant schema
// =============================================================================
//
// Grounded in `common/database/database_basic.py`'s per-entity modules
// (database_models.py, database_portfolios.py, database_strategys.py, ...).
// Every call is routed through `retry::with_retry` (spec.md §5); rows are
// mapped through small `*Row` structs (sqlx `FromRow`) rather than deriving
// `FromRow` directly on the domain types, since the domain types use
// Rust-native enums (`Signal`, `PositionSide`, ...) that do not map
// one-to-one onto MySQL column types.

use chrono::{DateTime, Utc};
use sqlx::mysql::MySqlPoolOptions;
use sqlx::{FromRow, MySqlPool, Row};

use crate::domain::{
    AccountValue, Conversation, CycleType, Future, Model, ModelFuture, ModelPrompt,
    ModelStrategy, Position, PositionSide, Provider, ProviderType, Strategy,
    StrategyDecision, StrategyKind, SymbolSource, Trade, TradeType,
};

use super::error::StorageError;
use super::retry::with_retry;

pub struct RelationalStore {
    pool: MySqlPool,
}

impl RelationalStore {
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = MySqlPoolOptions::new()
            .max_connections(20)
            .connect(database_url)
            .await
            .map_err(StorageError::classify)?;
        Ok(Self { pool })
    }

    // -------------------------------------------------------------------------
    // Model
    // -------------------------------------------------------------------------

    pub async fn list_enabled_models(&self, kind: CycleType) -> Result<Vec<Model>, StorageError> {
        let column = match kind {
            CycleType::Buy => "auto_buy_enabled",
            CycleType::Sell => "auto_sell_enabled",
        };
        let sql = format!(
            "SELECT id, name, provider_id, model_name, initial_capital, leverage, \
             max_positions, auto_buy_enabled, auto_sell_enabled, trade_type, symbol_source, \
             buy_batch_size, sell_batch_size, buy_interval_seconds, sell_interval_seconds, \
             group_size, account_alias, is_virtual \
             FROM models WHERE {column} = 1 ORDER BY id ASC"
        );
        let rows: Vec<ModelRow> = with_retry(|| sqlx::query_as::<_, ModelRow>(&sql).fetch_all(&self.pool))
            .await?;
        Ok(rows.into_iter().map(ModelRow::into_domain).collect())
    }

    pub async fn get_model_prompt(&self, model_id: &str) -> Result<Option<ModelPrompt>, StorageError> {
        let row: Option<(String, String)> = with_retry(|| {
            sqlx::query_as::<_, (String, String)>(
                "SELECT buy_prompt, sell_prompt FROM model_prompts WHERE model_id = ?",
            )
            .bind(model_id)
            .fetch_optional(&self.pool)
        })
        .await?;
        Ok(row.map(|(buy_prompt, sell_prompt)| ModelPrompt {
            model_id: model_id.to_string(),
            buy_prompt,
            sell_prompt,
        }))
    }

    pub async fn get_provider(&self, provider_id: &str) -> Result<Option<Provider>, StorageError> {
        let row: Option<ProviderRow> = with_retry(|| {
            sqlx::query_as::<_, ProviderRow>(
                "SELECT id, name, api_url, api_key, provider_type FROM providers WHERE id = ?",
            )
            .bind(provider_id)
            .fetch_optional(&self.pool)
        })
        .await?;
        row.map(ProviderRow::into_domain).transpose()
    }

    pub async fn list_model_futures(&self, model_id: &str) -> Result<Vec<ModelFuture>, StorageError> {
        let rows: Vec<ModelFutureRow> = with_retry(|| {
            sqlx::query_as::<_, ModelFutureRow>(
                "SELECT model_id, symbol, contract_symbol, name, exchange, sort_order \
                 FROM model_futures WHERE model_id = ? ORDER BY sort_order ASC",
            )
            .bind(model_id)
            .fetch_all(&self.pool)
        })
        .await?;
        Ok(rows.into_iter().map(ModelFutureRow::into_domain).collect())
    }

    pub async fn list_futures(&self) -> Result<Vec<Future>, StorageError> {
        let rows: Vec<FutureRow> = with_retry(|| {
            sqlx::query_as::<_, FutureRow>(
                "SELECT symbol, contract_symbol, name, exchange, sort_order \
                 FROM futures ORDER BY sort_order ASC",
            )
            .fetch_all(&self.pool)
        })
        .await?;
        Ok(rows.into_iter().map(FutureRow::into_domain).collect())
    }

    // -------------------------------------------------------------------------
    // Strategy / ModelStrategy — ordered priority DESC, created_at ASC (§4.5)
    // -------------------------------------------------------------------------

    pub async fn list_model_strategies(
        &self,
        model_id: &str,
        kind: StrategyKind,
    ) -> Result<Vec<(Strategy, ModelStrategy)>, StorageError> {
        let kind_str = strategy_kind_to_str(kind);
        let rows: Vec<ModelStrategyJoinRow> = with_retry(|| {
            sqlx::query_as::<_, ModelStrategyJoinRow>(
                "SELECT s.id, s.name, s.strategy_context, s.strategy_code, \
                        ms.model_id, ms.strategy_id, ms.kind, ms.priority, ms.created_at \
                 FROM model_strategies ms \
                 JOIN strategies s ON s.id = ms.strategy_id \
                 WHERE ms.model_id = ? AND ms.kind = ? \
                 ORDER BY ms.priority DESC, ms.created_at ASC",
            )
            .bind(model_id)
            .bind(kind_str)
            .fetch_all(&self.pool)
        })
        .await?;
        rows.into_iter().map(ModelStrategyJoinRow::into_domain).collect()
    }

    // -------------------------------------------------------------------------
    // Position — unique per (model, symbol, position_side)
    // -------------------------------------------------------------------------

    pub async fn list_positions(&self, model_id: &str) -> Result<Vec<Position>, StorageError> {
        let rows: Vec<PositionRow> = with_retry(|| {
            sqlx::query_as::<_, PositionRow>(
                "SELECT model_id, symbol, position_side, position_amt, avg_price, leverage, \
                 initial_margin, unrealized_profit \
                 FROM positions WHERE model_id = ? AND position_amt <> 0",
            )
            .bind(model_id)
            .fetch_all(&self.pool)
        })
        .await?;
        rows.into_iter().map(PositionRow::into_domain).collect()
    }

    pub async fn get_position(
        &self,
        model_id: &str,
        symbol: &str,
        side: PositionSide,
    ) -> Result<Option<Position>, StorageError> {
        let side_str = side.to_string();
        let row: Option<PositionRow> = with_retry(|| {
            sqlx::query_as::<_, PositionRow>(
                "SELECT model_id, symbol, position_side, position_amt, avg_price, leverage, \
                 initial_margin, unrealized_profit \
                 FROM positions WHERE model_id = ? AND symbol = ? AND position_side = ?",
            )
            .bind(model_id)
            .bind(symbol)
            .bind(&side_str)
            .fetch_optional(&self.pool)
        })
        .await?;
        row.map(PositionRow::into_domain).transpose()
    }

    /// Upsert: insert, or update on the `(model_id, symbol, position_side)`
    /// unique key. `position_amt = 0` is never persisted as a row — callers
    /// must route that case through `delete_position` instead (§3 invariant).
    pub async fn upsert_position(&self, position: &Position) -> Result<(), StorageError> {
        debug_assert!(position.position_amt != 0.0, "zero-amount positions must be deleted, not upserted");
        let side_str = position.position_side.to_string();
        with_retry(|| {
            sqlx::query(
                "INSERT INTO positions \
                 (model_id, symbol, position_side, position_amt, avg_price, leverage, \
                  initial_margin, unrealized_profit) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?) \
                 ON DUPLICATE KEY UPDATE position_amt = VALUES(position_amt), \
                   avg_price = VALUES(avg_price), leverage = VALUES(leverage), \
                   initial_margin = VALUES(initial_margin), \
                   unrealized_profit = VALUES(unrealized_profit)",
            )
            .bind(&position.model_id)
            .bind(&position.symbol)
            .bind(&side_str)
            .bind(position.position_amt)
            .bind(position.avg_price)
            .bind(position.leverage)
            .bind(position.initial_margin)
            .bind(position.unrealized_profit)
            .execute(&self.pool)
        })
        .await?;
        Ok(())
    }

    pub async fn delete_position(
        &self,
        model_id: &str,
        symbol: &str,
        side: PositionSide,
    ) -> Result<(), StorageError> {
        let side_str = side.to_string();
        with_retry(|| {
            sqlx::query("DELETE FROM positions WHERE model_id = ? AND symbol = ? AND position_side = ?")
                .bind(model_id)
                .bind(symbol)
                .bind(&side_str)
                .execute(&self.pool)
        })
        .await?;
        Ok(())
    }

    /// Drop `symbol`'s `futures` row once no model holds an open position in
    /// it any longer (§4.7: close/stop_loss/take_profit prune the
    /// Future-universe row alongside the Position, mirroring
    /// `database_portfolios.py`'s `close_position` count-then-delete).
    pub async fn delete_future_if_unheld(&self, symbol: &str) -> Result<(), StorageError> {
        let (remaining,): (i64,) = with_retry(|| {
            sqlx::query_as::<_, (i64,)>(
                "SELECT COUNT(*) FROM positions WHERE symbol = ? AND position_amt != 0",
            )
            .bind(symbol)
            .fetch_one(&self.pool)
        })
        .await?;
        if remaining == 0 {
            with_retry(|| sqlx::query("DELETE FROM futures WHERE symbol = ?").bind(symbol).execute(&self.pool))
                .await?;
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Trade — append-only
    // -------------------------------------------------------------------------

    pub async fn insert_trade(&self, trade: &Trade) -> Result<(), StorageError> {
        let side_str = trade.side.to_string();
        let signal_str = trade.signal.to_string();
        with_retry(|| {
            sqlx::query(
                "INSERT INTO trades \
                 (model_id, symbol, signal, quantity, price, leverage, side, pnl, fee, timestamp) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&trade.model_id)
            .bind(&trade.symbol)
            .bind(&signal_str)
            .bind(trade.quantity)
            .bind(trade.price)
            .bind(trade.leverage)
            .bind(&side_str)
            .bind(trade.pnl)
            .bind(trade.fee)
            .bind(trade.timestamp)
            .execute(&self.pool)
        })
        .await?;
        Ok(())
    }

    /// `SUM(Trade.pnl) for model` — spec.md §8 invariant 7.
    pub async fn realized_pnl(&self, model_id: &str) -> Result<f64, StorageError> {
        let row = with_retry(|| {
            sqlx::query("SELECT COALESCE(SUM(pnl), 0) AS total FROM trades WHERE model_id = ?")
                .bind(model_id)
                .fetch_one(&self.pool)
        })
        .await?;
        Ok(row.try_get::<f64, _>("total").unwrap_or(0.0))
    }

    // -------------------------------------------------------------------------
    // AccountValueHistory — append-only snapshot
    // -------------------------------------------------------------------------

    pub async fn insert_account_value(&self, snapshot: &AccountValue) -> Result<(), StorageError> {
        with_retry(|| {
            sqlx::query(
                "INSERT INTO account_value_history \
                 (model_id, balance, available_balance, cross_wallet_balance, cross_un_pnl, \
                  account_alias, timestamp) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&snapshot.model_id)
            .bind(snapshot.balance)
            .bind(snapshot.available_balance)
            .bind(snapshot.cross_wallet_balance)
            .bind(snapshot.cross_un_pnl)
            .bind(&snapshot.account_alias)
            .bind(snapshot.timestamp)
            .execute(&self.pool)
        })
        .await?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Conversation — LLM decision audit trail
    // -------------------------------------------------------------------------

    pub async fn insert_conversation(&self, conversation: &Conversation) -> Result<(), StorageError> {
        let cycle_str = cycle_type_to_str(conversation.cycle_type);
        with_retry(|| {
            sqlx::query(
                "INSERT INTO conversations \
                 (model_id, user_prompt, ai_response, cot_trace, tokens, type, timestamp) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(&conversation.model_id)
            .bind(&conversation.user_prompt)
            .bind(&conversation.ai_response)
            .bind(&conversation.cot_trace)
            .bind(conversation.tokens)
            .bind(cycle_str)
            .bind(conversation.timestamp)
            .execute(&self.pool)
        })
        .await?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // StrategyDecision — rule-engine audit trail, batch insert (§4.5)
    // -------------------------------------------------------------------------

    pub async fn insert_strategy_decisions(
        &self,
        decisions: &[StrategyDecision],
    ) -> Result<(), StorageError> {
        if decisions.is_empty() {
            return Ok(());
        }
        for decision in decisions {
            let kind_str = strategy_kind_to_str(decision.strategy_type);
            let signal_str = decision.signal.to_string();
            with_retry(|| {
                sqlx::query(
                    "INSERT INTO strategy_decisions \
                     (model_id, strategy_name, strategy_type, signal, symbol, quantity, \
                      leverage, price, stop_price, justification, timestamp) \
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                )
                .bind(&decision.model_id)
                .bind(&decision.strategy_name)
                .bind(kind_str)
                .bind(&signal_str)
                .bind(&decision.symbol)
                .bind(decision.quantity)
                .bind(decision.leverage)
                .bind(decision.price)
                .bind(decision.stop_price)
                .bind(&decision.justification)
                .bind(decision.timestamp)
                .execute(&self.pool)
            })
            .await?;
        }
        Ok(())
    }
}

fn cycle_type_to_str(kind: CycleType) -> &'static str {
    match kind {
        CycleType::Buy => "buy",
        CycleType::Sell => "sell",
    }
}

fn strategy_kind_to_str(kind: StrategyKind) -> &'static str {
    match kind {
        StrategyKind::Buy => "buy",
        StrategyKind::Sell => "sell",
    }
}

fn strategy_kind_from_str(s: &str) -> Result<StrategyKind, StorageError> {
    match s {
        "buy" => Ok(StrategyKind::Buy),
        "sell" => Ok(StrategyKind::Sell),
        other => Err(StorageError::Constraint(format!("invalid strategy kind: {other}"))),
    }
}

// =============================================================================
// Row types — mirror MySQL columns, converted into domain types
// =============================================================================

#[derive(FromRow)]
struct ModelRow {
    id: String,
    name: String,
    provider_id: Option<String>,
    model_name: Option<String>,
    initial_capital: f64,
    leverage: f64,
    max_positions: u32,
    auto_buy_enabled: bool,
    auto_sell_enabled: bool,
    trade_type: String,
    symbol_source: String,
    buy_batch_size: u32,
    sell_batch_size: u32,
    buy_interval_seconds: i64,
    sell_interval_seconds: i64,
    group_size: u32,
    account_alias: Option<String>,
    is_virtual: bool,
}

impl ModelRow {
    fn into_domain(self) -> Model {
        Model {
            id: self.id,
            name: self.name,
            provider_id: self.provider_id,
            model_name: self.model_name,
            initial_capital: self.initial_capital,
            leverage: self.leverage,
            max_positions: self.max_positions,
            auto_buy_enabled: self.auto_buy_enabled,
            auto_sell_enabled: self.auto_sell_enabled,
            trade_type: if self.trade_type == "strategy" { TradeType::Strategy } else { TradeType::Ai },
            symbol_source: if self.symbol_source == "future" {
                SymbolSource::Future
            } else {
                SymbolSource::Leaderboard
            },
            buy_batch_size: self.buy_batch_size,
            sell_batch_size: self.sell_batch_size,
            buy_interval_seconds: self.buy_interval_seconds.max(0) as u64,
            sell_interval_seconds: self.sell_interval_seconds.max(0) as u64,
            group_size: self.group_size,
            account_alias: self.account_alias,
            is_virtual: self.is_virtual,
        }
    }
}

#[derive(FromRow)]
struct ProviderRow {
    id: String,
    name: String,
    api_url: String,
    api_key: String,
    provider_type: String,
}

impl ProviderRow {
    fn into_domain(self) -> Result<Provider, StorageError> {
        let provider_type = match self.provider_type.as_str() {
            "openai" => ProviderType::Openai,
            "azure_openai" => ProviderType::AzureOpenai,
            "deepseek" => ProviderType::Deepseek,
            "anthropic" => ProviderType::Anthropic,
            "gemini" => ProviderType::Gemini,
            other => {
                return Err(StorageError::Constraint(format!("invalid provider_type: {other}")))
            }
        };
        Ok(Provider {
            id: self.id,
            name: self.name,
            api_url: self.api_url,
            api_key: self.api_key,
            provider_type,
        })
    }
}

#[derive(FromRow)]
struct ModelFutureRow {
    model_id: String,
    symbol: String,
    contract_symbol: String,
    name: String,
    exchange: String,
    sort_order: i32,
}

impl ModelFutureRow {
    fn into_domain(self) -> ModelFuture {
        ModelFuture {
            model_id: self.model_id,
            symbol: self.symbol,
            contract_symbol: self.contract_symbol,
            name: self.name,
            exchange: self.exchange,
            sort_order: self.sort_order,
        }
    }
}

#[derive(FromRow)]
struct FutureRow {
    symbol: String,
    contract_symbol: String,
    name: String,
    exchange: String,
    sort_order: i32,
}

impl FutureRow {
    fn into_domain(self) -> Future {
        Future {
            symbol: self.symbol,
            contract_symbol: self.contract_symbol,
            name: self.name,
            exchange: self.exchange,
            sort_order: self.sort_order,
        }
    }
}

#[derive(FromRow)]
struct ModelStrategyJoinRow {
    id: String,
    name: String,
    strategy_context: String,
    strategy_code: String,
    model_id: String,
    strategy_id: String,
    kind: String,
    priority: i64,
    created_at: DateTime<Utc>,
}

impl ModelStrategyJoinRow {
    fn into_domain(self) -> Result<(Strategy, ModelStrategy), StorageError> {
        let kind = strategy_kind_from_str(&self.kind)?;
        let strategy = Strategy {
            id: self.id,
            name: self.name,
            kind,
            strategy_context: self.strategy_context,
            strategy_code: self.strategy_code,
        };
        let model_strategy = ModelStrategy {
            model_id: self.model_id,
            strategy_id: self.strategy_id,
            kind,
            priority: self.priority,
            created_at: self.created_at,
        };
        Ok((strategy, model_strategy))
    }
}

#[derive(FromRow)]
struct PositionRow {
    model_id: String,
    symbol: String,
    position_side: String,
    position_amt: f64,
    avg_price: f64,
    leverage: f64,
    initial_margin: f64,
    unrealized_profit: f64,
}

impl PositionRow {
    fn into_domain(self) -> Result<Position, StorageError> {
        let position_side = match self.position_side.as_str() {
            "LONG" => PositionSide::Long,
            "SHORT" => PositionSide::Short,
            other => {
                return Err(StorageError::Constraint(format!("invalid position_side: {other}")))
            }
        };
        Ok(Position {
            model_id: self.model_id,
            symbol: self.symbol,
            position_side,
            position_amt: self.position_amt,
            avg_price: self.avg_price,
            leverage: self.leverage,
            initial_margin: self.initial_margin,
            unrealized_profit: self.unrealized_profit,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_type_round_trips() {
        assert_eq!(cycle_type_to_str(CycleType::Buy), "buy");
        assert_eq!(cycle_type_to_str(CycleType::Sell), "sell");
    }

    #[test]
    fn strategy_kind_round_trips() {
        assert_eq!(strategy_kind_to_str(StrategyKind::Buy), "buy");
        assert_eq!(strategy_kind_from_str("sell").unwrap(), StrategyKind::Sell);
        assert!(strategy_kind_from_str("bogus").is_err());
    }
}

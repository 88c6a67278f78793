// =============================================================================
// Domain model — the entities of §3, independent of any storage backend
// =============================================================================

pub mod account;
pub mod conversation;
pub mod future;
pub mod leaderboard;
pub mod model;
pub mod position;
pub mod provider;
pub mod signal;
pub mod strategy_decision;
pub mod ticker;
pub mod trade;

pub use account::{AccountValue, AccountValueHistory};
pub use conversation::{Conversation, CycleType};
pub use future::{Future, ModelFuture};
pub use leaderboard::LeaderboardEntry;
pub use model::{Model, ModelPrompt, ModelStrategy, Strategy, StrategyKind, SymbolSource, TradeType};
pub use position::{Position, PositionSide};
pub use provider::{Provider, ProviderType};
pub use signal::{Decision, Signal};
pub use strategy_decision::StrategyDecision;
pub use ticker::{LeaderboardSide, OpenPrice, Ticker};
pub use trade::Trade;

// =============================================================================
// Storage adapter — relational (sqlx/MySQL) + analytical (ClickHouse)
// =============================================================================

pub mod analytical;
pub mod error;
pub mod relational;
pub mod retry;

pub use analytical::AnalyticalStore;
pub use error::StorageError;
pub use relational::RelationalStore;

// =============================================================================
// Ticker — ingestion pipeline from raw market events into the wide store
// =============================================================================

pub mod ingester;

pub use ingester::TickerIngester;

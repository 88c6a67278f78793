// =============================================================================
// Market — exchange REST/WebSocket access for USDS-margined perpetual futures
// =============================================================================

pub mod client;
pub mod ticker_stream;

pub use client::{BinanceFuturesClient, Kline, MarketClient, Ticker24h};
pub use ticker_stream::{run_ticker_stream, RawTickerEvent};

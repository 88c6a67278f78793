// =============================================================================
// Ticker Ingester — raw market events → wide ticker rows (spec.md §4.1)
// =============================================================================
//
// Grounded in the teacher's market_data reconnect-loop idiom for the
// websocket side (see `market::ticker_stream`); the ingestion pipeline itself
// — filter by quote asset, dedupe a micro-batch to one row per symbol, carry
// forward the previously stored `open_price` untouched, recompute derived
// fields, upsert — is new code following spec.md §4.1 steps 2-6 and the §8
// invariant that ingestion never writes `open_price` (only the Price-Refresh
// Worker does).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use tracing::{debug, warn};

use crate::domain::{OpenPrice, Ticker};
use crate::market::RawTickerEvent;
use crate::storage::analytical::AnalyticalStore;

pub struct TickerIngester {
    store: Arc<AnalyticalStore>,
    quote_asset: String,
}

impl TickerIngester {
    pub fn new(store: Arc<AnalyticalStore>, quote_asset: String) -> Self {
        Self { store, quote_asset }
    }

    /// Ingest one micro-batch: filter to the configured quote asset, dedupe
    /// to the latest event per symbol, carry forward stored `open_price`,
    /// recompute derived fields, and upsert.
    pub async fn ingest_batch(&self, events: Vec<RawTickerEvent>) -> anyhow::Result<usize> {
        let mut latest: HashMap<String, RawTickerEvent> = HashMap::new();
        for event in events {
            if !event.symbol.ends_with(&self.quote_asset) {
                continue;
            }
            match latest.get(&event.symbol) {
                Some(existing) if existing.stats_close_time >= event.stats_close_time => {}
                _ => {
                    latest.insert(event.symbol.clone(), event);
                }
            }
        }

        if latest.is_empty() {
            return Ok(0);
        }

        let mut tickers = Vec::with_capacity(latest.len());
        for (symbol, event) in latest {
            let open_price = match self.store.get_open_price(&symbol).await {
                Ok(op) => op.unwrap_or(OpenPrice::Unset),
                Err(e) => {
                    warn!(symbol, error = %e, "failed to read stored open_price, treating as unset");
                    OpenPrice::Unset
                }
            };
            let event_time = Utc
                .timestamp_millis_opt(event.event_time)
                .single()
                .unwrap_or_else(Utc::now);
            let ticker = Ticker {
                symbol,
                event_time,
                last_price: event.last_price,
                open_price,
                high_price: event.high_price,
                low_price: event.low_price,
                base_volume: event.base_volume,
                quote_volume: event.quote_volume,
                first_trade_id: event.first_trade_id,
                last_trade_id: event.last_trade_id,
                trade_count: event.trade_count,
                price_change: 0.0,
                price_change_percent: 0.0,
                side: crate::domain::LeaderboardSide::None,
                change_percent_text: String::new(),
            }
            .with_recomputed_derived_fields();
            tickers.push(ticker);
        }

        let count = tickers.len();
        self.store.upsert_tickers(&tickers).await?;
        debug!(count, "ticker batch ingested");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(symbol: &str, stats_close_time: i64, last_price: f64) -> RawTickerEvent {
        RawTickerEvent {
            symbol: symbol.to_string(),
            event_time: stats_close_time,
            price_change: 0.0,
            price_change_percent: 0.0,
            last_price,
            open_price: 0.0,
            high_price: last_price,
            low_price: last_price,
            base_volume: 1.0,
            quote_volume: 1.0,
            stats_open_time: 0,
            stats_close_time,
            first_trade_id: 0,
            last_trade_id: 0,
            trade_count: 1,
        }
    }

    /// spec.md §4.1 step 2: dedupe keeps the row with the largest
    /// `stats_close_time`, not `event_time`.
    #[test]
    fn dedupe_keeps_largest_stats_close_time() {
        let events = vec![
            event("BTCUSDT", 100, 50_000.0),
            event("BTCUSDT", 200, 51_000.0),
            event("ETHBUSD", 100, 3_000.0),
        ];
        let mut latest: HashMap<String, RawTickerEvent> = HashMap::new();
        for e in events {
            if !e.symbol.ends_with("USDT") {
                continue;
            }
            match latest.get(&e.symbol) {
                Some(existing) if existing.stats_close_time >= e.stats_close_time => {}
                _ => {
                    latest.insert(e.symbol.clone(), e);
                }
            }
        }
        assert_eq!(latest.len(), 1);
        assert_eq!(latest["BTCUSDT"].last_price, 51_000.0);
    }
}

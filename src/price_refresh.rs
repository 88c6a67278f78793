// =============================================================================
// Price Refresh Worker — daily open_price backfill (spec.md §4.2)
// =============================================================================
//
// Grounded in `examples/original_source/price_refresh_service.py`:
// `refresh_price_for_symbol` fetches `interval="1d", limit=2` and takes
// `klines[0]` — the earlier of the two daily candles, i.e. yesterday's close
// under Binance's ascending-time kline ordering — as the new `open_price`.
// `refresh_prices_batch` chunks the work list into `max_per_minute`-sized
// batches, runs a batch concurrently, then sleeps 60s strictly *between*
// batches (never within one). `run_price_refresh_scheduler` runs once
// immediately, then loops on `interval_seconds`.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::domain::OpenPrice;
use crate::market::MarketClient;
use crate::storage::AnalyticalStore;

pub struct PriceRefreshWorker {
    analytical: Arc<AnalyticalStore>,
    market: Arc<dyn MarketClient>,
    max_per_minute: usize,
}

impl PriceRefreshWorker {
    pub fn new(
        analytical: Arc<AnalyticalStore>,
        market: Arc<dyn MarketClient>,
        max_per_minute: usize,
    ) -> Self {
        Self { analytical, market, max_per_minute }
    }

    /// Run the scheduler: refresh immediately, then every `interval_seconds`.
    pub async fn run(&self, interval_seconds: u64) {
        loop {
            if let Err(e) = self.refresh_all().await {
                warn!(error = %e, "price refresh cycle failed");
            }
            tokio::time::sleep(std::time::Duration::from_secs(interval_seconds)).await;
        }
    }

    /// One refresh cycle over every symbol whose stored `open_price` is
    /// unset or stale.
    pub async fn refresh_all(&self) -> anyhow::Result<(usize, usize)> {
        let today = Utc::now().date_naive();
        let symbols = self.analytical.list_symbols_needing_refresh(today).await?;
        if symbols.is_empty() {
            debug!("no symbols require an open_price refresh");
            return Ok((0, 0));
        }
        info!(count = symbols.len(), "refreshing open_price for symbols");
        self.refresh_batch(&symbols, today).await
    }

    /// Chunk `symbols` into `max_per_minute`-sized batches, running each
    /// batch's fetches concurrently and waiting 60s strictly between batches.
    async fn refresh_batch(
        &self,
        symbols: &[String],
        today: NaiveDate,
    ) -> anyhow::Result<(usize, usize)> {
        let mut success = 0usize;
        let mut failed = 0usize;
        let chunks: Vec<&[String]> = symbols.chunks(self.max_per_minute.max(1)).collect();
        let total_chunks = chunks.len();

        for (i, chunk) in chunks.into_iter().enumerate() {
            let results: Vec<anyhow::Result<()>> = stream::iter(chunk.iter())
                .map(|symbol| self.refresh_one(symbol, today))
                .buffer_unordered(chunk.len().max(1))
                .collect()
                .await;

            for r in results {
                match r {
                    Ok(()) => success += 1,
                    Err(e) => {
                        warn!(error = %e, "failed to refresh open_price for symbol");
                        failed += 1;
                    }
                }
            }

            if i + 1 < total_chunks {
                tokio::time::sleep(std::time::Duration::from_secs(60)).await;
            }
        }

        info!(success, failed, "price refresh cycle complete");
        Ok((success, failed))
    }

    async fn refresh_one(&self, symbol: &str, today: NaiveDate) -> anyhow::Result<()> {
        let klines = self.market.klines(symbol, "1d", 2).await?;
        let open_price_value = klines
            .first()
            .map(|k| k.close)
            .filter(|v| *v > 0.0)
            .ok_or_else(|| anyhow::anyhow!("no usable daily kline for {symbol}"))?;

        let mut ticker = self
            .analytical
            .get_latest_ticker(symbol)
            .await?
            .ok_or_else(|| anyhow::anyhow!("no stored ticker row for {symbol}"))?;
        ticker.open_price = OpenPrice::Set { value: open_price_value, as_of: today };
        ticker = ticker.with_recomputed_derived_fields();

        self.analytical.upsert_tickers(&[ticker]).await?;
        debug!(symbol, open_price = open_price_value, "open_price refreshed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn earlier_kline_close_is_the_new_open_price() {
        // klines[0] is the earlier of the two daily candles under Binance's
        // ascending-time ordering, matching refresh_price_for_symbol.
        let klines = vec![
            crate::market::Kline { open_time: 0, open: 1.0, high: 1.0, low: 1.0, close: 100.0, volume: 0.0, close_time: 0 },
            crate::market::Kline { open_time: 1, open: 1.0, high: 1.0, low: 1.0, close: 105.0, volume: 0.0, close_time: 0 },
        ];
        assert_eq!(klines.first().map(|k| k.close), Some(100.0));
    }
}

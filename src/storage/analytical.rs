// =============================================================================
// Analytical store — ClickHouse-backed wide tickers & leaderboard batches
// =============================================================================
//
// Grounded in `examples/original_source/database_clickhouse.py`: a pooled
// client against per-purpose tables (`market_ticker`, `leaderboard`,
// `market_klines_<interval>`), upserts expressed as DELETE-then-INSERT since
// ClickHouse's MergeTree engines have no `UPDATE` (spec.md §9), and no retry
// wrapper around the pool (the Python source's ClickHouse `_with_connection`
// is a bare acquire/release with no backoff, unlike the MySQL side).
//
// `update_price_date` has no nullable column here: it is stored as a signed
// epoch-day integer, with `i32::MIN` meaning "unset" — the storage-level
// encoding of spec.md §9's `(open_price=0, update_price_date=null)` sentinel
// pair. `OpenPrice` at the domain boundary is the only type callers see.

use chrono::{Datelike, NaiveDate, TimeZone, Utc};
use clickhouse::{Client, Row};
use serde::{Deserialize, Serialize};

use crate::domain::{LeaderboardEntry, LeaderboardSide, OpenPrice, Ticker};

const UNSET_EPOCH_DAY: i32 = i32::MIN;

pub struct AnalyticalStore {
    client: Client,
}

impl AnalyticalStore {
    pub fn new(url: &str, database: &str) -> Self {
        let client = Client::default().with_url(url).with_database(database);
        Self { client }
    }

    // -------------------------------------------------------------------------
    // Tickers
    // -------------------------------------------------------------------------

    /// Read the stored `(open_price, update_price_date)` for a symbol, if any
    /// row exists. Used by the ingester (step 4) and the price-refresh worker.
    pub async fn get_open_price(&self, symbol: &str) -> Result<Option<OpenPrice>, clickhouse::error::Error> {
        let rows = self
            .client
            .query(
                "SELECT open_price, update_price_date_epoch_day FROM market_ticker \
                 WHERE symbol = ? ORDER BY event_time DESC LIMIT 1",
            )
            .bind(symbol)
            .fetch_all::<OpenPriceRow>()
            .await?;
        Ok(rows.into_iter().next().map(OpenPriceRow::into_domain))
    }

    /// Upsert ticker rows via delete-then-insert within one logical op
    /// (spec.md §4.1 step 6, §9 Design Notes).
    pub async fn upsert_tickers(&self, tickers: &[Ticker]) -> Result<(), clickhouse::error::Error> {
        if tickers.is_empty() {
            return Ok(());
        }
        let symbols: Vec<&str> = tickers.iter().map(|t| t.symbol.as_str()).collect();
        let in_list = symbols
            .iter()
            .map(|s| format!("'{}'", s.replace('\'', "''")))
            .collect::<Vec<_>>()
            .join(",");
        self.client
            .query(&format!("ALTER TABLE market_ticker DELETE WHERE symbol IN ({in_list})"))
            .execute()
            .await?;

        let mut insert = self.client.insert("market_ticker")?;
        for ticker in tickers {
            insert.write(&TickerRow::from_domain(ticker)).await?;
        }
        insert.end().await
    }

    /// The latest stored row for a symbol, if any — used by the price-refresh
    /// worker to splice in a freshly fetched `open_price` (spec.md §4.2 step 4).
    pub async fn get_latest_ticker(&self, symbol: &str) -> Result<Option<Ticker>, clickhouse::error::Error> {
        let rows = self
            .client
            .query(
                "SELECT symbol, event_time, last_price, open_price, update_price_date_epoch_day, \
                        high_price, low_price, base_volume, quote_volume, first_trade_id, \
                        last_trade_id, trade_count, price_change, price_change_percent, side, \
                        change_percent_text \
                 FROM market_ticker WHERE symbol = ? ORDER BY event_time DESC LIMIT 1",
            )
            .bind(symbol)
            .fetch_all::<TickerRow>()
            .await?;
        Ok(rows.into_iter().next().map(TickerRow::into_domain))
    }

    /// Distinct symbols whose stored `open_price` is unset or dated before
    /// `today` — the price-refresh worker's per-cycle work list (spec.md
    /// §4.2 step 1).
    pub async fn list_symbols_needing_refresh(&self, today: NaiveDate) -> Result<Vec<String>, clickhouse::error::Error> {
        let today_epoch_day = today.num_days_from_ce();
        let rows = self
            .client
            .query(
                "SELECT symbol FROM ( \
                     SELECT symbol, update_price_date_epoch_day, \
                            row_number() OVER (PARTITION BY symbol ORDER BY event_time DESC) AS rn \
                     FROM market_ticker \
                 ) WHERE rn = 1 AND (update_price_date_epoch_day = ? OR update_price_date_epoch_day < ?)",
            )
            .bind(UNSET_EPOCH_DAY)
            .bind(today_epoch_day)
            .fetch_all::<SymbolRow>()
            .await?;
        Ok(rows.into_iter().map(|r| r.symbol).collect())
    }

    /// Latest-per-symbol tickers with a non-empty `side` — the leaderboard
    /// sync's gainer/loser source query (spec.md §4.3 steps 2-3).
    pub async fn latest_tickers_by_side(
        &self,
        side: LeaderboardSide,
        limit: usize,
    ) -> Result<Vec<Ticker>, clickhouse::error::Error> {
        let (predicate, order) = match side {
            LeaderboardSide::Gainer => ("price_change_percent > 0 AND side = 'gainer'", "DESC"),
            LeaderboardSide::Loser => ("price_change_percent < 0 AND side = 'loser'", "ASC"),
            LeaderboardSide::None => return Ok(Vec::new()),
        };
        let sql = format!(
            "SELECT symbol, event_time, last_price, open_price, update_price_date_epoch_day, \
                    high_price, low_price, base_volume, quote_volume, first_trade_id, \
                    last_trade_id, trade_count, price_change, price_change_percent, side, \
                    change_percent_text \
             FROM ( \
                 SELECT *, row_number() OVER (PARTITION BY symbol ORDER BY event_time DESC) AS rn \
                 FROM market_ticker \
             ) WHERE rn = 1 AND {predicate} \
             ORDER BY price_change_percent {order} \
             LIMIT {limit}"
        );
        let rows = self.client.query(&sql).fetch_all::<TickerRow>().await?;
        Ok(rows.into_iter().map(TickerRow::into_domain).collect())
    }

    // -------------------------------------------------------------------------
    // Leaderboard
    // -------------------------------------------------------------------------

    pub async fn append_leaderboard_batch(
        &self,
        entries: &[LeaderboardEntry],
    ) -> Result<(), clickhouse::error::Error> {
        if entries.is_empty() {
            return Ok(());
        }
        let mut insert = self.client.insert("leaderboard")?;
        for entry in entries {
            insert.write(&LeaderboardRow::from_domain(entry)).await?;
        }
        insert.end().await
    }

    /// Rows of the batch with the maximum `create_datetime_long`, split by
    /// side (spec.md §8 invariant 5). Readers pin a single batch this way.
    pub async fn latest_leaderboard(
        &self,
    ) -> Result<(Vec<LeaderboardEntry>, Vec<LeaderboardEntry>), clickhouse::error::Error> {
        let rows = self
            .client
            .query(
                "SELECT symbol, last_price, price_change, price_change_percent, side, rank, \
                        create_datetime, create_datetime_long \
                 FROM leaderboard \
                 WHERE create_datetime_long = (SELECT max(create_datetime_long) FROM leaderboard) \
                 ORDER BY side, rank ASC",
            )
            .fetch_all::<LeaderboardRow>()
            .await?;

        let mut gainers = Vec::new();
        let mut losers = Vec::new();
        for row in rows {
            let entry = row.into_domain();
            match entry.side {
                LeaderboardSide::Gainer => gainers.push(entry),
                LeaderboardSide::Loser => losers.push(entry),
                LeaderboardSide::None => {}
            }
        }
        gainers.sort_by(|a, b| b.price_change_percent.total_cmp(&a.price_change_percent));
        losers.sort_by(|a, b| a.price_change_percent.total_cmp(&b.price_change_percent));
        Ok((gainers, losers))
    }

    /// TTL delete: rows older than `retention_minutes` relative to `now`
    /// (spec.md §4.3 Cleanup).
    pub async fn cleanup_leaderboard(
        &self,
        now_ms: i64,
        retention_minutes: i64,
    ) -> Result<(), clickhouse::error::Error> {
        let cutoff = now_ms - retention_minutes * 60_000;
        self.client
            .query("ALTER TABLE leaderboard DELETE WHERE create_datetime_long < ?")
            .bind(cutoff)
            .execute()
            .await
    }
}

// =============================================================================
// Row types
// =============================================================================

#[derive(Row, Serialize, Deserialize)]
struct SymbolRow {
    symbol: String,
}

#[derive(Row, Serialize, Deserialize)]
struct OpenPriceRow {
    open_price: f64,
    update_price_date_epoch_day: i32,
}

impl OpenPriceRow {
    fn into_domain(self) -> OpenPrice {
        epoch_pair_to_open_price(self.open_price, self.update_price_date_epoch_day)
    }
}

#[derive(Row, Serialize, Deserialize)]
struct TickerRow {
    symbol: String,
    event_time: i64,
    last_price: f64,
    open_price: f64,
    update_price_date_epoch_day: i32,
    high_price: f64,
    low_price: f64,
    base_volume: f64,
    quote_volume: f64,
    first_trade_id: i64,
    last_trade_id: i64,
    trade_count: i64,
    price_change: f64,
    price_change_percent: f64,
    side: String,
    change_percent_text: String,
}

impl TickerRow {
    fn from_domain(ticker: &Ticker) -> Self {
        let (open_price, update_date) = ticker.open_price.to_storage_pair();
        Self {
            symbol: ticker.symbol.clone(),
            event_time: ticker.event_time.timestamp_millis(),
            last_price: ticker.last_price,
            open_price,
            update_price_date_epoch_day: update_date
                .map(|d| d.num_days_from_ce())
                .unwrap_or(UNSET_EPOCH_DAY),
            high_price: ticker.high_price,
            low_price: ticker.low_price,
            base_volume: ticker.base_volume,
            quote_volume: ticker.quote_volume,
            first_trade_id: ticker.first_trade_id,
            last_trade_id: ticker.last_trade_id,
            trade_count: ticker.trade_count,
            price_change: ticker.price_change,
            price_change_percent: ticker.price_change_percent,
            side: ticker.side.as_str().to_string(),
            change_percent_text: ticker.change_percent_text.clone(),
        }
    }

    fn into_domain(self) -> Ticker {
        let side = match self.side.as_str() {
            "gainer" => LeaderboardSide::Gainer,
            "loser" => LeaderboardSide::Loser,
            _ => LeaderboardSide::None,
        };
        Ticker {
            symbol: self.symbol,
            event_time: Utc.timestamp_millis_opt(self.event_time).single().unwrap_or_else(Utc::now),
            last_price: self.last_price,
            open_price: epoch_pair_to_open_price(self.open_price, self.update_price_date_epoch_day),
            high_price: self.high_price,
            low_price: self.low_price,
            base_volume: self.base_volume,
            quote_volume: self.quote_volume,
            first_trade_id: self.first_trade_id,
            last_trade_id: self.last_trade_id,
            trade_count: self.trade_count,
            price_change: self.price_change,
            price_change_percent: self.price_change_percent,
            side,
            change_percent_text: self.change_percent_text,
        }
    }
}

#[derive(Row, Serialize, Deserialize)]
struct LeaderboardRow {
    symbol: String,
    last_price: f64,
    price_change: f64,
    price_change_percent: f64,
    side: String,
    rank: u32,
    create_datetime: i64,
    create_datetime_long: i64,
}

impl LeaderboardRow {
    fn from_domain(entry: &LeaderboardEntry) -> Self {
        Self {
            symbol: entry.symbol.clone(),
            last_price: entry.last_price,
            price_change: entry.price_change,
            price_change_percent: entry.price_change_percent,
            side: entry.side.as_str().to_string(),
            rank: entry.rank,
            create_datetime: entry.create_datetime.timestamp_millis(),
            create_datetime_long: entry.create_datetime_long,
        }
    }

    fn into_domain(self) -> LeaderboardEntry {
        let side = match self.side.as_str() {
            "gainer" => LeaderboardSide::Gainer,
            "loser" => LeaderboardSide::Loser,
            _ => LeaderboardSide::None,
        };
        LeaderboardEntry {
            symbol: self.symbol,
            last_price: self.last_price,
            price_change: self.price_change,
            price_change_percent: self.price_change_percent,
            side,
            rank: self.rank,
            create_datetime: Utc
                .timestamp_millis_opt(self.create_datetime)
                .single()
                .unwrap_or_else(Utc::now),
            create_datetime_long: self.create_datetime_long,
        }
    }
}

fn epoch_pair_to_open_price(open_price: f64, epoch_day: i32) -> OpenPrice {
    if epoch_day == UNSET_EPOCH_DAY {
        return OpenPrice::Unset;
    }
    match NaiveDate::from_num_days_from_ce_opt(epoch_day) {
        Some(as_of) => OpenPrice::Set { value: open_price, as_of },
        None => OpenPrice::Unset,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn unset_sentinel_round_trips() {
        let op = epoch_pair_to_open_price(0.0, UNSET_EPOCH_DAY);
        assert_eq!(op, OpenPrice::Unset);
    }

    #[test]
    fn set_value_round_trips() {
        let date = NaiveDate::from_ymd_opt(2026, 7, 28).unwrap();
        let day = date.num_days_from_ce();
        let op = epoch_pair_to_open_price(42.5, day);
        assert_eq!(op, OpenPrice::Set { value: 42.5, as_of: date });
    }
}

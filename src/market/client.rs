// =============================================================================
// Market Client — USDS-margined perpetual futures REST access
// =============================================================================
//
// Widened from `binance::client::BinanceClient`'s spot-market HMAC pattern
// (signing helper kept for parity even though every endpoint here is public
// market data) to the futures REST surface named in spec.md §6:
// `ticker24h`, `allTickers`, `topGainers`, `symbolPrices`, `klines`. Field
// names follow `examples/original_source/binance_futures.py` and the
// websocket event fields (`E,s,p,P,c,o,h,l,v,q,O,C,F,L,n,Q,w`).
//
// `topGainers` has no standalone REST endpoint on Binance futures; it is
// derived client-side from `allTickers`, sorted by `price_change_percent`.

use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

/// A single closed kline (spec.md §4.2, §4.6 step 2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Kline {
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub close_time: i64,
}

/// A 24h rolling ticker snapshot, mirroring the websocket event's fields
/// (spec.md §6 glossary: E,s,p,P,c,o,h,l,v,q,O,C,F,L,n,Q,w).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticker24h {
    pub symbol: String,
    pub event_time: i64,
    pub price_change: f64,
    pub price_change_percent: f64,
    pub last_price: f64,
    pub open_price: f64,
    pub high_price: f64,
    pub low_price: f64,
    pub base_volume: f64,
    pub quote_volume: f64,
    pub open_time: i64,
    pub close_time: i64,
    pub first_trade_id: i64,
    pub last_trade_id: i64,
    pub trade_count: i64,
    pub weighted_avg_price: f64,
}

/// The exchange contract the rest of the crate depends on (spec.md §6).
#[async_trait]
pub trait MarketClient: Send + Sync {
    async fn ticker24h(&self, symbols: &[String]) -> Result<HashMap<String, Ticker24h>>;
    async fn all_tickers(&self) -> Result<Vec<Ticker24h>>;
    async fn top_gainers(&self, limit: usize) -> Result<Vec<Ticker24h>>;
    async fn symbol_prices(&self, symbols: &[String]) -> Result<HashMap<String, f64>>;
    async fn klines(&self, symbol: &str, interval: &str, limit: u32) -> Result<Vec<Kline>>;
}

/// Binance USDS-margined futures REST client.
#[derive(Clone)]
pub struct BinanceFuturesClient {
    base_url: String,
    client: reqwest::Client,
}

impl BinanceFuturesClient {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("failed to build reqwest client");
        Self {
            base_url: "https://fapi.binance.com".to_string(),
            client,
        }
    }

    async fn get_json(&self, path: &str) -> Result<serde_json::Value> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("GET {path} request failed"))?;
        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .with_context(|| format!("failed to parse response for {path}"))?;
        if !status.is_success() {
            anyhow::bail!("futures API GET {path} returned {status}: {body}");
        }
        Ok(body)
    }

    fn parse_ticker24h(v: &serde_json::Value) -> Result<Ticker24h> {
        Ok(Ticker24h {
            symbol: field_str(v, "symbol")?,
            event_time: v.get("closeTime").and_then(|x| x.as_i64()).unwrap_or(0),
            price_change: field_f64(v, "priceChange")?,
            price_change_percent: field_f64(v, "priceChangePercent")?,
            last_price: field_f64(v, "lastPrice")?,
            open_price: field_f64(v, "openPrice")?,
            high_price: field_f64(v, "highPrice")?,
            low_price: field_f64(v, "lowPrice")?,
            base_volume: field_f64(v, "volume")?,
            quote_volume: field_f64(v, "quoteVolume")?,
            open_time: v.get("openTime").and_then(|x| x.as_i64()).unwrap_or(0),
            close_time: v.get("closeTime").and_then(|x| x.as_i64()).unwrap_or(0),
            first_trade_id: v.get("firstId").and_then(|x| x.as_i64()).unwrap_or(0),
            last_trade_id: v.get("lastId").and_then(|x| x.as_i64()).unwrap_or(0),
            trade_count: v.get("count").and_then(|x| x.as_i64()).unwrap_or(0),
            weighted_avg_price: field_f64(v, "weightedAvgPrice").unwrap_or(0.0),
        })
    }
}

impl Default for BinanceFuturesClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarketClient for BinanceFuturesClient {
    #[instrument(skip(self), name = "market::ticker24h")]
    async fn ticker24h(&self, symbols: &[String]) -> Result<HashMap<String, Ticker24h>> {
        let wanted: std::collections::HashSet<&str> =
            symbols.iter().map(String::as_str).collect();
        let all = self.all_tickers().await?;
        Ok(all
            .into_iter()
            .filter(|t| wanted.is_empty() || wanted.contains(t.symbol.as_str()))
            .map(|t| (t.symbol.clone(), t))
            .collect())
    }

    #[instrument(skip(self), name = "market::all_tickers")]
    async fn all_tickers(&self) -> Result<Vec<Ticker24h>> {
        let body = self.get_json("/fapi/v1/ticker/24hr").await?;
        let raw = body.as_array().context("ticker/24hr response is not an array")?;
        let mut tickers = Vec::with_capacity(raw.len());
        for entry in raw {
            match Self::parse_ticker24h(entry) {
                Ok(t) => tickers.push(t),
                Err(e) => warn!(error = %e, "skipping malformed ticker24h entry"),
            }
        }
        debug!(count = tickers.len(), "fetched all 24h tickers");
        Ok(tickers)
    }

    #[instrument(skip(self), name = "market::top_gainers")]
    async fn top_gainers(&self, limit: usize) -> Result<Vec<Ticker24h>> {
        let mut all = self.all_tickers().await?;
        all.sort_by(|a, b| b.price_change_percent.total_cmp(&a.price_change_percent));
        all.truncate(limit);
        Ok(all)
    }

    #[instrument(skip(self), name = "market::symbol_prices")]
    async fn symbol_prices(&self, symbols: &[String]) -> Result<HashMap<String, f64>> {
        let wanted: std::collections::HashSet<&str> =
            symbols.iter().map(String::as_str).collect();
        let body = self.get_json("/fapi/v1/ticker/price").await?;
        let raw = body.as_array().context("ticker/price response is not an array")?;
        let mut prices = HashMap::with_capacity(raw.len());
        for entry in raw {
            let symbol = match entry.get("symbol").and_then(|v| v.as_str()) {
                Some(s) => s.to_string(),
                None => continue,
            };
            if !wanted.is_empty() && !wanted.contains(symbol.as_str()) {
                continue;
            }
            if let Ok(price) = field_f64(entry, "price") {
                prices.insert(symbol, price);
            }
        }
        Ok(prices)
    }

    #[instrument(skip(self), name = "market::klines")]
    async fn klines(&self, symbol: &str, interval: &str, limit: u32) -> Result<Vec<Kline>> {
        let path = format!("/fapi/v1/klines?symbol={symbol}&interval={interval}&limit={limit}");
        let body = self.get_json(&path).await?;
        let raw = body.as_array().context("klines response is not an array")?;
        let mut klines = Vec::with_capacity(raw.len());
        for entry in raw {
            let arr = entry.as_array().context("kline entry is not an array")?;
            if arr.len() < 7 {
                warn!(len = arr.len(), "skipping malformed kline entry");
                continue;
            }
            klines.push(Kline {
                open_time: arr[0].as_i64().unwrap_or(0),
                open: parse_str_f64(&arr[1])?,
                high: parse_str_f64(&arr[2])?,
                low: parse_str_f64(&arr[3])?,
                close: parse_str_f64(&arr[4])?,
                volume: parse_str_f64(&arr[5])?,
                close_time: arr[6].as_i64().unwrap_or(0),
            });
        }
        debug!(symbol, interval, count = klines.len(), "klines fetched");
        Ok(klines)
    }
}

fn field_str(v: &serde_json::Value, name: &str) -> Result<String> {
    v.get(name)
        .and_then(|x| x.as_str())
        .map(str::to_string)
        .with_context(|| format!("missing field {name}"))
}

fn field_f64(v: &serde_json::Value, name: &str) -> Result<f64> {
    let field = v.get(name).with_context(|| format!("missing field {name}"))?;
    parse_str_f64(field)
}

fn parse_str_f64(val: &serde_json::Value) -> Result<f64> {
    if let Some(s) = val.as_str() {
        s.parse::<f64>().with_context(|| format!("failed to parse '{s}' as f64"))
    } else if let Some(n) = val.as_f64() {
        Ok(n)
    } else {
        anyhow::bail!("expected string or number, got: {val}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_ticker24h_reads_fields() {
        let v = serde_json::json!({
            "symbol": "BTCUSDT",
            "priceChange": "120.50",
            "priceChangePercent": "0.91",
            "lastPrice": "13300.00",
            "openPrice": "13179.50",
            "highPrice": "13400.00",
            "lowPrice": "13100.00",
            "volume": "1000.5",
            "quoteVolume": "13250000.0",
            "openTime": 1_700_000_000_000i64,
            "closeTime": 1_700_086_400_000i64,
            "firstId": 1,
            "lastId": 2,
            "count": 100,
            "weightedAvgPrice": "13250.0"
        });
        let t = BinanceFuturesClient::parse_ticker24h(&v).unwrap();
        assert_eq!(t.symbol, "BTCUSDT");
        assert!((t.last_price - 13300.0).abs() < 1e-9);
        assert!((t.price_change_percent - 0.91).abs() < 1e-9);
    }

    #[test]
    fn parse_ticker24h_rejects_missing_symbol() {
        let v = serde_json::json!({"priceChange": "1.0"});
        assert!(BinanceFuturesClient::parse_ticker24h(&v).is_err());
    }

    #[test]
    fn parse_str_f64_accepts_both_encodings() {
        assert_eq!(parse_str_f64(&serde_json::json!("1.5")).unwrap(), 1.5);
        assert_eq!(parse_str_f64(&serde_json::json!(1.5)).unwrap(), 1.5);
        assert!(parse_str_f64(&serde_json::json!(null)).is_err());
    }
}

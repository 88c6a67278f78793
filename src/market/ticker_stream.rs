// =============================================================================
// Ticker Stream — all-market 24h mini-ticker WebSocket consumer
// =============================================================================
//
// Reconnect-loop idiom lifted directly from
// `market_data::candle_buffer::run_kline_stream`: connect, split, read in a
// loop matching on Text/Err/None, return `Result<()>` on disconnect so the
// caller owns the backoff-and-reconnect policy (spec.md §4.1 step 1).
//
// Subscribes to Binance's combined all-market ticker array stream
// (`!ticker@arr`); each message is a JSON array of per-symbol events with
// fields `E,s,p,P,c,o,h,l,v,q,O,C,F,L,n,Q,w` (spec.md §6 glossary).

use anyhow::{Context, Result};
use futures_util::StreamExt;
use tokio_tungstenite::connect_async;
use tracing::{debug, error, info, warn};

/// One decoded element of the `!ticker@arr` stream.
#[derive(Debug, Clone)]
pub struct RawTickerEvent {
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
    pub stats_open_time: i64,
    pub stats_close_time: i64,
    pub first_trade_id: i64,
    pub last_trade_id: i64,
    pub trade_count: i64,
}

/// Connect to the all-market ticker WebSocket and invoke `on_batch` once per
/// received message (one message carries the whole market's ticker array).
///
/// Runs until the stream disconnects or errors, then returns so the caller
/// can apply its own reconnect-with-backoff policy, same contract as
/// `run_kline_stream`.
pub async fn run_ticker_stream<F>(mut on_batch: F) -> Result<()>
where
    F: FnMut(Vec<RawTickerEvent>),
{
    let url = "wss://fstream.binance.com/ws/!ticker@arr";
    info!(url, "connecting to all-market ticker WebSocket");

    let (ws_stream, _response) = connect_async(url)
        .await
        .context("failed to connect to ticker WebSocket")?;

    info!("all-market ticker WebSocket connected");
    let (_write, mut read) = ws_stream.split();

    loop {
        match read.next().await {
            Some(Ok(msg)) => {
                if let tokio_tungstenite::tungstenite::Message::Text(text) = msg {
                    match parse_ticker_array(&text) {
                        Ok(events) => {
                            debug!(count = events.len(), "ticker batch received");
                            on_batch(events);
                        }
                        Err(e) => warn!(error = %e, "failed to parse ticker batch"),
                    }
                }
            }
            Some(Err(e)) => {
                error!(error = %e, "ticker WebSocket read error");
                return Err(e.into());
            }
            None => {
                warn!("ticker WebSocket stream ended");
                return Ok(());
            }
        }
    }
}

fn parse_ticker_array(text: &str) -> Result<Vec<RawTickerEvent>> {
    let root: serde_json::Value =
        serde_json::from_str(text).context("failed to parse ticker JSON")?;
    let arr = root.as_array().context("ticker message is not an array")?;
    let mut events = Vec::with_capacity(arr.len());
    for entry in arr {
        match parse_ticker_event(entry) {
            Ok(e) => events.push(e),
            Err(e) => warn!(error = %e, "skipping malformed ticker event"),
        }
    }
    Ok(events)
}

fn parse_ticker_event(v: &serde_json::Value) -> Result<RawTickerEvent> {
    Ok(RawTickerEvent {
        symbol: v["s"].as_str().context("missing field s")?.to_uppercase(),
        event_time: v["E"].as_i64().context("missing field E")?,
        price_change: parse_num(&v["p"], "p")?,
        price_change_percent: parse_num(&v["P"], "P")?,
        last_price: parse_num(&v["c"], "c")?,
        open_price: parse_num(&v["o"], "o")?,
        high_price: parse_num(&v["h"], "h")?,
        low_price: parse_num(&v["l"], "l")?,
        base_volume: parse_num(&v["v"], "v")?,
        quote_volume: parse_num(&v["q"], "q")?,
        stats_open_time: v["O"].as_i64().unwrap_or(0),
        stats_close_time: v["C"].as_i64().unwrap_or(0),
        first_trade_id: v["F"].as_i64().unwrap_or(0),
        last_trade_id: v["L"].as_i64().unwrap_or(0),
        trade_count: v["n"].as_i64().unwrap_or(0),
    })
}

fn parse_num(val: &serde_json::Value, name: &str) -> Result<f64> {
    match val {
        serde_json::Value::String(s) => {
            s.parse::<f64>().with_context(|| format!("failed to parse {name} as f64: {s}"))
        }
        serde_json::Value::Number(n) => {
            n.as_f64().with_context(|| format!("field {name} is not a valid f64"))
        }
        _ => anyhow::bail!("field {name} has unexpected JSON type"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event_json() -> serde_json::Value {
        serde_json::json!({
            "e": "24hrTicker", "E": 1700000000000i64, "s": "BTCUSDT",
            "p": "120.50", "P": "0.91", "c": "13300.00", "o": "13179.50",
            "h": "13400.00", "l": "13100.00", "v": "1000.5", "q": "13250000.0",
            "O": 1699913600000i64, "C": 1700000000000i64,
            "F": 100, "L": 200, "n": 101
        })
    }

    #[test]
    fn parses_single_event() {
        let ev = parse_ticker_event(&sample_event_json()).unwrap();
        assert_eq!(ev.symbol, "BTCUSDT");
        assert!((ev.last_price - 13300.0).abs() < 1e-9);
        assert_eq!(ev.trade_count, 101);
    }

    #[test]
    fn parses_array_skipping_malformed() {
        let good = sample_event_json();
        let bad = serde_json::json!({"s": "ETHUSDT"}); // missing required fields
        let text = serde_json::to_string(&serde_json::json!([good, bad])).unwrap();
        let events = parse_ticker_array(&text).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].symbol, "BTCUSDT");
    }

    #[test]
    fn rejects_non_array_payload() {
        assert!(parse_ticker_array(r#"{"not":"an array"}"#).is_err());
    }
}

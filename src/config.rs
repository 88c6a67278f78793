// =============================================================================
// Runtime configuration — environment-derived settings (spec.md §6)
// =============================================================================
//
// Every field has a default so the process runs sanely with an empty
// environment, mirroring the teacher's "every field is additive" philosophy
// (see the former `runtime_config.rs`), but sourced from `std::env::var`
// instead of a reloadable JSON file — spec.md treats *configuration loading*
// itself as an external collaborator, not the values it must recognize.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

fn default_fee_rate() -> f64 {
    0.001
}

fn default_buy_frequency_minutes() -> u32 {
    15
}

fn default_sell_frequency_minutes() -> u32 {
    15
}

fn default_leaderboard_sync_interval_seconds() -> u64 {
    2
}

fn default_leaderboard_retention_minutes() -> i64 {
    5
}

fn default_leaderboard_cleanup_interval_minutes() -> u64 {
    2
}

fn default_leaderboard_top_n() -> usize {
    10
}

fn default_price_refresh_interval_seconds() -> u64 {
    3600
}

fn default_price_refresh_max_per_minute() -> usize {
    1000
}

fn default_prompt_market_symbol_limit() -> usize {
    5
}

fn default_futures_kline_limit() -> u32 {
    120
}

fn default_futures_quote_asset() -> String {
    "USDT".to_string()
}

/// Process-wide settings recognized per spec.md §6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_fee_rate")]
    pub fee_rate: f64,

    #[serde(default = "default_buy_frequency_minutes")]
    pub buy_frequency_minutes: u32,
    #[serde(default = "default_sell_frequency_minutes")]
    pub sell_frequency_minutes: u32,

    #[serde(default = "default_leaderboard_sync_interval_seconds")]
    pub leaderboard_sync_interval_seconds: u64,
    #[serde(default = "default_leaderboard_retention_minutes")]
    pub leaderboard_retention_minutes: i64,
    #[serde(default = "default_leaderboard_cleanup_interval_minutes")]
    pub leaderboard_cleanup_interval_minutes: u64,
    #[serde(default = "default_leaderboard_top_n")]
    pub leaderboard_top_n: usize,

    #[serde(default = "default_price_refresh_interval_seconds")]
    pub price_refresh_interval_seconds: u64,
    #[serde(default = "default_price_refresh_max_per_minute")]
    pub price_refresh_max_per_minute: usize,

    #[serde(default = "default_prompt_market_symbol_limit")]
    pub prompt_market_symbol_limit: usize,

    #[serde(default = "default_futures_kline_limit")]
    pub futures_kline_limit: u32,
    #[serde(default = "default_futures_quote_asset")]
    pub futures_quote_asset: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            fee_rate: default_fee_rate(),
            buy_frequency_minutes: default_buy_frequency_minutes(),
            sell_frequency_minutes: default_sell_frequency_minutes(),
            leaderboard_sync_interval_seconds: default_leaderboard_sync_interval_seconds(),
            leaderboard_retention_minutes: default_leaderboard_retention_minutes(),
            leaderboard_cleanup_interval_minutes: default_leaderboard_cleanup_interval_minutes(),
            leaderboard_top_n: default_leaderboard_top_n(),
            price_refresh_interval_seconds: default_price_refresh_interval_seconds(),
            price_refresh_max_per_minute: default_price_refresh_max_per_minute(),
            prompt_market_symbol_limit: default_prompt_market_symbol_limit(),
            futures_kline_limit: default_futures_kline_limit(),
            futures_quote_asset: default_futures_quote_asset(),
        }
    }
}

impl RuntimeConfig {
    /// Build from `std::env::var`, falling back to defaults and logging a
    /// warning for every unset or unparsable variable.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        cfg.fee_rate = env_f64("FEE_RATE", cfg.fee_rate);
        cfg.buy_frequency_minutes =
            env_u32("BUY_FREQUENCY_MINUTES", cfg.buy_frequency_minutes).clamp(1, 1440);
        cfg.sell_frequency_minutes =
            env_u32("SELL_FREQUENCY_MINUTES", cfg.sell_frequency_minutes).clamp(1, 1440);
        cfg.leaderboard_sync_interval_seconds = env_u64(
            "LEADERBOARD_SYNC_INTERVAL_SECONDS",
            cfg.leaderboard_sync_interval_seconds,
        );
        cfg.leaderboard_retention_minutes = env_i64(
            "LEADERBOARD_RETENTION_MINUTES",
            cfg.leaderboard_retention_minutes,
        );
        cfg.leaderboard_cleanup_interval_minutes = env_u64(
            "LEADERBOARD_CLEANUP_INTERVAL_MINUTES",
            cfg.leaderboard_cleanup_interval_minutes,
        );
        cfg.leaderboard_top_n = env_usize("LEADERBOARD_TOP_N", cfg.leaderboard_top_n);
        cfg.price_refresh_interval_seconds = env_u64(
            "PRICE_REFRESH_INTERVAL_SECONDS",
            cfg.price_refresh_interval_seconds,
        );
        cfg.price_refresh_max_per_minute = env_usize(
            "PRICE_REFRESH_MAX_PER_MINUTE",
            cfg.price_refresh_max_per_minute,
        );
        cfg.prompt_market_symbol_limit = env_usize(
            "PROMPT_MARKET_SYMBOL_LIMIT",
            cfg.prompt_market_symbol_limit,
        );
        cfg.futures_kline_limit = env_u32("FUTURES_KLINE_LIMIT", cfg.futures_kline_limit);
        cfg.futures_quote_asset =
            std::env::var("FUTURES_QUOTE_ASSET").unwrap_or(cfg.futures_quote_asset);

        info!(
            fee_rate = cfg.fee_rate,
            buy_frequency_minutes = cfg.buy_frequency_minutes,
            sell_frequency_minutes = cfg.sell_frequency_minutes,
            leaderboard_top_n = cfg.leaderboard_top_n,
            "runtime config loaded from environment"
        );
        cfg
    }
}

fn env_f64(key: &str, default: f64) -> f64 {
    parse_env(key, default)
}
fn env_u32(key: &str, default: u32) -> u32 {
    parse_env(key, default)
}
fn env_u64(key: &str, default: u64) -> u64 {
    parse_env(key, default)
}
fn env_i64(key: &str, default: i64) -> i64 {
    parse_env(key, default)
}
fn env_usize(key: &str, default: usize) -> usize {
    parse_env(key, default)
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            warn!(key, raw, "failed to parse environment variable, using default");
            default
        }),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.fee_rate, 0.001);
        assert_eq!(cfg.leaderboard_sync_interval_seconds, 2);
        assert_eq!(cfg.leaderboard_retention_minutes, 5);
        assert_eq!(cfg.leaderboard_cleanup_interval_minutes, 2);
        assert_eq!(cfg.leaderboard_top_n, 10);
        assert_eq!(cfg.price_refresh_interval_seconds, 3600);
        assert_eq!(cfg.price_refresh_max_per_minute, 1000);
        assert_eq!(cfg.prompt_market_symbol_limit, 5);
        assert_eq!(cfg.futures_kline_limit, 120);
        assert_eq!(cfg.futures_quote_asset, "USDT");
    }

    #[test]
    fn parse_env_falls_back_on_bad_value() {
        std::env::set_var("TEST_PARSE_ENV_BAD", "not-a-number");
        let v: u32 = parse_env("TEST_PARSE_ENV_BAD", 42);
        assert_eq!(v, 42);
        std::env::remove_var("TEST_PARSE_ENV_BAD");
    }

    #[test]
    fn parse_env_reads_valid_value() {
        std::env::set_var("TEST_PARSE_ENV_OK", "7");
        let v: u32 = parse_env("TEST_PARSE_ENV_OK", 42);
        assert_eq!(v, 7);
        std::env::remove_var("TEST_PARSE_ENV_OK");
    }
}

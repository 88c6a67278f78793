// =============================================================================
// Ticker — wide 24h-rolling row per symbol, with the "unset open_price"
// sentinel modeled as a tagged variant at the domain boundary
// =============================================================================
//
// The analytical store's `open_price` column is non-nullable numeric, so
// storage encodes "unset" as the pair `(open_price=0, update_price_date=NULL)`
// (spec.md §9). Every consumer above the storage layer should only ever see
// `OpenPrice`, never the raw pair — that projection happens exclusively at
// the storage boundary (`storage::analytical`).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum OpenPrice {
    Unset,
    Set { value: f64, as_of: NaiveDate },
}

impl OpenPrice {
    /// Project to the storage pair: `(open_price, update_price_date)`.
    pub fn to_storage_pair(self) -> (f64, Option<NaiveDate>) {
        match self {
            Self::Unset => (0.0, None),
            Self::Set { value, as_of } => (value, Some(as_of)),
        }
    }

    /// Reconstruct from the storage pair, per spec.md §8 boundary: `open_price=0
    /// AND update_price_date=today` is "set to zero", not "unset" — it must not
    /// trigger a refetch within the same day.
    pub fn from_storage_pair(open_price: f64, update_price_date: Option<NaiveDate>) -> Self {
        match update_price_date {
            None => Self::Unset,
            Some(as_of) => Self::Set { value: open_price, as_of },
        }
    }

    pub fn value(self) -> f64 {
        match self {
            Self::Unset => 0.0,
            Self::Set { value, .. } => value,
        }
    }

    /// Whether the Price-Refresh Worker should refetch this symbol today:
    /// unset, or stale (set on an earlier date).
    pub fn is_stale(self, today: NaiveDate) -> bool {
        match self {
            Self::Unset => true,
            Self::Set { as_of, .. } => as_of < today,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LeaderboardSide {
    Gainer,
    Loser,
    #[serde(rename = "")]
    None,
}

impl LeaderboardSide {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gainer => "gainer",
            Self::Loser => "loser",
            Self::None => "",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticker {
    pub symbol: String,
    pub event_time: DateTime<Utc>,
    pub last_price: f64,
    pub open_price: OpenPrice,
    pub high_price: f64,
    pub low_price: f64,
    pub base_volume: f64,
    pub quote_volume: f64,
    pub first_trade_id: i64,
    pub last_trade_id: i64,
    pub trade_count: i64,
    pub price_change: f64,
    pub price_change_percent: f64,
    pub side: LeaderboardSide,
    pub change_percent_text: String,
}

impl Ticker {
    /// Recompute `price_change`, `price_change_percent`, `side` and
    /// `change_percent_text` per spec.md §4.1 step 5 / §8 invariant 3,
    /// preserving the given `open_price`.
    pub fn with_recomputed_derived_fields(mut self) -> Self {
        let (open_price, set) = match self.open_price {
            OpenPrice::Set { value, .. } if value > 0.0 => (value, true),
            _ => (0.0, false),
        };

        if set && self.last_price > 0.0 {
            self.price_change = self.last_price - open_price;
            self.price_change_percent = self.price_change / open_price * 100.0;
            self.side = if self.price_change_percent >= 0.0 {
                LeaderboardSide::Gainer
            } else {
                LeaderboardSide::Loser
            };
            self.change_percent_text = format!("{:.2}%", self.price_change_percent);
        } else {
            self.price_change = 0.0;
            self.price_change_percent = 0.0;
            self.side = LeaderboardSide::None;
            self.change_percent_text = String::new();
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 7, 28).unwrap()
    }

    #[test]
    fn unset_roundtrips_through_storage_pair() {
        let (p, d) = OpenPrice::Unset.to_storage_pair();
        assert_eq!(p, 0.0);
        assert_eq!(d, None);
        assert_eq!(OpenPrice::from_storage_pair(p, d), OpenPrice::Unset);
    }

    #[test]
    fn set_to_zero_is_not_unset() {
        let set_zero = OpenPrice::Set { value: 0.0, as_of: today() };
        let (p, d) = set_zero.to_storage_pair();
        assert_eq!(p, 0.0);
        assert_eq!(d, Some(today()));
        let reconstructed = OpenPrice::from_storage_pair(p, d);
        assert_eq!(reconstructed, set_zero);
        assert!(!reconstructed.is_stale(today()));
    }

    #[test]
    fn unset_is_always_stale() {
        assert!(OpenPrice::Unset.is_stale(today()));
    }

    #[test]
    fn set_yesterday_is_stale_today() {
        let yesterday = today().pred_opt().unwrap();
        let op = OpenPrice::Set { value: 100.0, as_of: yesterday };
        assert!(op.is_stale(today()));
    }

    #[test]
    fn set_today_is_not_stale() {
        let op = OpenPrice::Set { value: 100.0, as_of: today() };
        assert!(!op.is_stale(today()));
    }

    fn base_ticker(open: OpenPrice, last: f64) -> Ticker {
        Ticker {
            symbol: "BTCUSDT".into(),
            event_time: Utc::now(),
            last_price: last,
            open_price: open,
            high_price: 0.0,
            low_price: 0.0,
            base_volume: 0.0,
            quote_volume: 0.0,
            first_trade_id: 0,
            last_trade_id: 0,
            trade_count: 0,
            price_change: 0.0,
            price_change_percent: 0.0,
            side: LeaderboardSide::None,
            change_percent_text: String::new(),
        }
    }

    #[test]
    fn recompute_neutral_when_unset() {
        let t = base_ticker(OpenPrice::Unset, 100.0).with_recomputed_derived_fields();
        assert_eq!(t.price_change_percent, 0.0);
        assert_eq!(t.side, LeaderboardSide::None);
        assert_eq!(t.change_percent_text, "");
    }

    #[test]
    fn recompute_gainer() {
        let t = base_ticker(OpenPrice::Set { value: 90.0, as_of: today() }, 100.0)
            .with_recomputed_derived_fields();
        assert!((t.price_change_percent - 11.111_111_111).abs() < 1e-6);
        assert_eq!(t.side, LeaderboardSide::Gainer);
        assert_eq!(t.change_percent_text, "11.11%");
    }

    #[test]
    fn recompute_loser() {
        let t = base_ticker(OpenPrice::Set { value: 110.0, as_of: today() }, 100.0)
            .with_recomputed_derived_fields();
        assert!(t.price_change_percent < 0.0);
        assert_eq!(t.side, LeaderboardSide::Loser);
    }

    #[test]
    fn zero_boundary_is_gainer() {
        let t = base_ticker(OpenPrice::Set { value: 100.0, as_of: today() }, 100.0)
            .with_recomputed_derived_fields();
        assert_eq!(t.price_change_percent, 0.0);
        assert_eq!(t.side, LeaderboardSide::Gainer);
    }
}

// =============================================================================
// Position — unique per (model, symbol, position_side)
// =============================================================================
//
// `position_amt` is always stored as a positive magnitude here; direction is
// carried entirely by `PositionSide`. This differs from the Python source's
// signed `position_amt` column but preserves the invariant "zero amount iff
// the row is deleted" (§3) without needing callers to reason about sign.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PositionSide {
    Long,
    Short,
}

impl fmt::Display for PositionSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Long => write!(f, "LONG"),
            Self::Short => write!(f, "SHORT"),
        }
    }
}

impl PositionSide {
    /// +1 for LONG, -1 for SHORT — the sign multiplier used throughout P&L math.
    pub fn direction(self) -> f64 {
        match self {
            Self::Long => 1.0,
            Self::Short => -1.0,
        }
    }

    pub fn from_signal(signal: crate::domain::signal::Signal) -> Option<Self> {
        use crate::domain::signal::Signal;
        match signal {
            Signal::BuyToEnter => Some(Self::Long),
            Signal::SellToEnter => Some(Self::Short),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub model_id: String,
    pub symbol: String,
    pub position_side: PositionSide,
    pub position_amt: f64,
    pub avg_price: f64,
    pub leverage: f64,
    pub initial_margin: f64,
    /// Exchange-reported unrealized P&L, when available; 0.0 means "not
    /// reported" and callers should derive it from current price instead.
    pub unrealized_profit: f64,
}

impl Position {
    /// Merge an additional fill into this position by volume-weighted average
    /// price, accumulating `position_amt`. Used by buy_to_enter/sell_to_enter
    /// when a position already exists for (model, symbol, side).
    pub fn merge_fill(&mut self, fill_qty: f64, fill_price: f64, leverage: f64) {
        let total_amt = self.position_amt + fill_qty;
        if total_amt > 0.0 {
            self.avg_price =
                (self.avg_price * self.position_amt + fill_price * fill_qty) / total_amt;
        }
        self.position_amt = total_amt;
        self.leverage = leverage;
        self.initial_margin = self.position_amt * self.avg_price / self.leverage.max(1.0);
    }

    /// Unrealized P&L preferring the stored exchange value, falling back to
    /// mark-to-market against `current_price` when the stored value is zero
    /// and `current_price` is known (spec.md §4.8 step 4).
    pub fn unrealized_pnl(&self, current_price: Option<f64>) -> f64 {
        if self.unrealized_profit != 0.0 {
            return self.unrealized_profit;
        }
        match current_price {
            Some(price) => self.position_side.direction() * (price - self.avg_price) * self.position_amt,
            None => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(amt: f64, avg: f64) -> Position {
        Position {
            model_id: "m1".into(),
            symbol: "BTCUSDT".into(),
            position_side: PositionSide::Long,
            position_amt: amt,
            avg_price: avg,
            leverage: 10.0,
            initial_margin: amt * avg / 10.0,
            unrealized_profit: 0.0,
        }
    }

    #[test]
    fn merge_fill_computes_vwap() {
        let mut p = pos(0.01, 50_000.0);
        p.merge_fill(0.01, 51_000.0, 10.0);
        assert!((p.position_amt - 0.02).abs() < 1e-12);
        assert!((p.avg_price - 50_500.0).abs() < 1e-9);
    }

    #[test]
    fn unrealized_pnl_prefers_exchange_value() {
        let mut p = pos(0.01, 50_000.0);
        p.unrealized_profit = 12.34;
        assert_eq!(p.unrealized_pnl(Some(60_000.0)), 12.34);
    }

    #[test]
    fn unrealized_pnl_derives_from_current_price_for_long() {
        let p = pos(0.01, 50_000.0);
        let pnl = p.unrealized_pnl(Some(55_000.0));
        assert!((pnl - 50.0).abs() < 1e-9);
    }

    #[test]
    fn unrealized_pnl_derives_from_current_price_for_short() {
        let mut p = pos(0.01, 50_000.0);
        p.position_side = PositionSide::Short;
        let pnl = p.unrealized_pnl(Some(45_000.0));
        assert!((pnl - 50.0).abs() < 1e-9);
    }

    #[test]
    fn unrealized_pnl_zero_when_unknown() {
        let p = pos(0.01, 50_000.0);
        assert_eq!(p.unrealized_pnl(None), 0.0);
    }

    #[test]
    fn side_from_signal() {
        use crate::domain::signal::Signal;
        assert_eq!(PositionSide::from_signal(Signal::BuyToEnter), Some(PositionSide::Long));
        assert_eq!(PositionSide::from_signal(Signal::SellToEnter), Some(PositionSide::Short));
        assert_eq!(PositionSide::from_signal(Signal::Hold), None);
    }
}

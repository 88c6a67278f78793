// =============================================================================
// Signal — the closed sum type every decision engine speaks
// =============================================================================
//
// The Python source passes these around as bare strings ("buy_to_enter",
// "stop_loss", ...). Encoding them as a closed enum means an unrecognized
// tag becomes a deserialization error instead of a silently-ignored string.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Signal {
    BuyToEnter,
    SellToEnter,
    ClosePosition,
    StopLoss,
    TakeProfit,
    Hold,
}

impl Signal {
    /// `true` for signals that open or add to a position.
    pub fn is_entry(self) -> bool {
        matches!(self, Self::BuyToEnter | Self::SellToEnter)
    }

    /// `true` for signals that fully exit an existing position.
    pub fn is_exit(self) -> bool {
        matches!(self, Self::ClosePosition | Self::StopLoss | Self::TakeProfit)
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::BuyToEnter => "buy_to_enter",
            Self::SellToEnter => "sell_to_enter",
            Self::ClosePosition => "close_position",
            Self::StopLoss => "stop_loss",
            Self::TakeProfit => "take_profit",
            Self::Hold => "hold",
        };
        f.write_str(s)
    }
}

/// A per-symbol record produced by a decision engine.
///
/// Not every field is meaningful for every signal: `risk_budget_pct` only
/// matters for entries, `stop_price` only for exits. Absent numeric fields
/// are resolved by the executor (§4.7), never assumed to be zero.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Decision {
    pub signal: Option<Signal>,
    #[serde(default)]
    pub quantity: Option<f64>,
    #[serde(default)]
    pub leverage: Option<f64>,
    #[serde(default)]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub risk_budget_pct: Option<f64>,
    #[serde(default)]
    pub profit_target: Option<f64>,
    #[serde(default)]
    pub stop_loss: Option<f64>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub stop_price: Option<f64>,
    #[serde(default)]
    pub justification: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signal_display_matches_python_tags() {
        assert_eq!(Signal::BuyToEnter.to_string(), "buy_to_enter");
        assert_eq!(Signal::SellToEnter.to_string(), "sell_to_enter");
        assert_eq!(Signal::ClosePosition.to_string(), "close_position");
        assert_eq!(Signal::StopLoss.to_string(), "stop_loss");
        assert_eq!(Signal::TakeProfit.to_string(), "take_profit");
        assert_eq!(Signal::Hold.to_string(), "hold");
    }

    #[test]
    fn signal_classification() {
        assert!(Signal::BuyToEnter.is_entry());
        assert!(Signal::SellToEnter.is_entry());
        assert!(!Signal::Hold.is_entry());

        assert!(Signal::ClosePosition.is_exit());
        assert!(Signal::StopLoss.is_exit());
        assert!(Signal::TakeProfit.is_exit());
        assert!(!Signal::BuyToEnter.is_exit());
    }

    #[test]
    fn signal_serde_snake_case() {
        let json = serde_json::to_string(&Signal::BuyToEnter).unwrap();
        assert_eq!(json, "\"buy_to_enter\"");
        let back: Signal = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Signal::BuyToEnter);
    }

    #[test]
    fn unknown_signal_tag_is_rejected() {
        let err = serde_json::from_str::<Signal>("\"moon\"");
        assert!(err.is_err());
    }
}

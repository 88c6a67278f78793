// =============================================================================
// VOL — latest traded volume for a timeframe
// =============================================================================
//
// Not a price indicator at all: spec.md §4.6 step 2 lists VOL alongside
// MA/MACD/RSI as a per-timeframe field. Grounded in
// `examples/original_source/market_data.py`'s `_get_timeframe_indicators`
// (`vol = volumes[-1] if volumes else 0`) — the most recent kline's volume,
// not a rolling sum.

/// The most recent volume in the series, or `None` when there is none.
pub fn current_vol(volumes: &[f64]) -> Option<f64> {
    volumes.last().copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_last_volume() {
        let volumes = vec![1.0, 2.0, 3.0];
        assert_eq!(current_vol(&volumes), Some(3.0));
    }

    #[test]
    fn none_on_empty_series() {
        assert_eq!(current_vol(&[]), None);
    }
}

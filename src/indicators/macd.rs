// =============================================================================
// Moving Average Convergence Divergence (MACD)
// =============================================================================
//
// Standard 12/26/9 construction built directly on top of
// `indicators::ema::calculate_ema` (the teacher's own EMA function):
//
//   macd_line      = EMA(closes, 12) - EMA(closes, 26)
//   signal_line    = EMA(macd_line, 9)
//   histogram      = macd_line - signal_line

use super::ema::calculate_ema;

pub struct Macd {
    pub macd: f64,
    pub signal: f64,
    pub histogram: f64,
}

/// Compute the current MACD/signal/histogram triple, or `None` when there
/// isn't enough history for the 26-period EMA plus a 9-period signal EMA.
pub fn current_macd(closes: &[f64]) -> Option<Macd> {
    let ema12 = calculate_ema(closes, 12);
    let ema26 = calculate_ema(closes, 26);
    if ema12.is_empty() || ema26.is_empty() {
        return None;
    }

    // ema12 and ema26 start at different offsets (11 and 25 respectively);
    // align to the tail they share.
    let shared_len = ema12.len().min(ema26.len());
    let macd_line: Vec<f64> = ema12[ema12.len() - shared_len..]
        .iter()
        .zip(&ema26[ema26.len() - shared_len..])
        .map(|(a, b)| a - b)
        .collect();

    let signal_series = calculate_ema(&macd_line, 9);
    let signal = *signal_series.last()?;
    let macd = *macd_line.last()?;

    Some(Macd { macd, signal, histogram: macd - signal })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_on_insufficient_data() {
        let closes: Vec<f64> = (1..=20).map(|x| x as f64).collect();
        assert!(current_macd(&closes).is_none());
    }

    #[test]
    fn ascending_series_has_positive_histogram() {
        let closes: Vec<f64> = (1..=100).map(|x| x as f64).collect();
        let macd = current_macd(&closes).unwrap();
        assert!(macd.histogram > 0.0);
    }

    #[test]
    fn flat_series_has_zero_macd() {
        let closes = vec![100.0; 100];
        let macd = current_macd(&closes).unwrap();
        assert!(macd.macd.abs() < 1e-9);
        assert!(macd.histogram.abs() < 1e-9);
    }
}

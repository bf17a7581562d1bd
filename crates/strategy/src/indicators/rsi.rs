use common::{Error, Result};

use super::Series;

/// RSI (Relative Strength Index) with Wilder's smoothing, same as
/// TradingView / standard RSI.
///
/// Values lie in `[0, 100]`. The first `period` entries are `None`; at least
/// `period + 1` closes are required. A window with neither gains nor losses
/// reads 50.
pub fn rsi(closes: &[f64], period: usize) -> Result<Series> {
    if period < 2 {
        return Err(Error::config("RSI period must be >= 2"));
    }
    if closes.len() < period + 1 {
        return Err(Error::insufficient(period + 1, closes.len()));
    }

    let changes: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
    let initial = &changes[..period];

    // First average gain/loss over the initial `period` changes
    let mut avg_gain = initial.iter().filter(|&&c| c > 0.0).sum::<f64>() / period as f64;
    let mut avg_loss =
        initial.iter().filter(|&&c| c < 0.0).map(|c| c.abs()).sum::<f64>() / period as f64;

    let mut out: Series = vec![None; closes.len()];
    out[period] = Some(rsi_value(avg_gain, avg_loss));

    // Wilder smoothing over remaining changes
    for (j, &change) in changes.iter().enumerate().skip(period) {
        let gain = if change > 0.0 { change } else { 0.0 };
        let loss = if change < 0.0 { change.abs() } else { 0.0 };
        avg_gain = (avg_gain * (period - 1) as f64 + gain) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + loss) / period as f64;
        out[j + 1] = Some(rsi_value(avg_gain, avg_loss));
    }
    Ok(out)
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return if avg_gain == 0.0 { 50.0 } else { 100.0 };
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::last_value;

    #[test]
    fn rsi_errors_when_insufficient_data() {
        // Need at least period+1 = 15 values
        let prices = vec![100.0; 14];
        assert!(matches!(
            rsi(&prices, 14),
            Err(Error::InsufficientData { needed: 15, available: 14 })
        ));
    }

    #[test]
    fn rsi_first_value_at_period() {
        let prices: Vec<f64> = (0..15).map(|i| 100.0 + i as f64).collect();
        let out = rsi(&prices, 14).unwrap();
        assert!(out[13].is_none());
        assert!(out[14].is_some());
    }

    #[test]
    fn rsi_all_gains_returns_100() {
        let prices = vec![10.0, 11.0, 12.0, 13.0, 14.0];
        let value = last_value(&rsi(&prices, 3).unwrap()).unwrap();
        assert!((value - 100.0).abs() < 1e-6, "Expected ~100, got {value}");
    }

    #[test]
    fn rsi_all_losses_returns_0() {
        let prices = vec![14.0, 13.0, 12.0, 11.0, 10.0];
        let value = last_value(&rsi(&prices, 3).unwrap()).unwrap();
        assert!(value.abs() < 1e-6, "Expected ~0, got {value}");
    }

    #[test]
    fn rsi_flat_series_is_neutral() {
        let value = last_value(&rsi(&[7.0; 20], 14).unwrap()).unwrap();
        assert_eq!(value, 50.0);
    }

    #[test]
    fn rsi_known_series_stays_in_range() {
        let prices = vec![
            44.34, 44.09, 44.15, 43.61, 44.33, 44.83, 45.10, 45.15, 43.61, 44.33, 44.83, 45.10,
            45.15, 44.34, 44.09, 44.50, 45.20,
        ];
        let out = rsi(&prices, 14).unwrap();
        for v in out.iter().flatten() {
            assert!((0.0..=100.0).contains(v), "RSI out of range: {v}");
        }
    }
}

use common::{Error, Result};

use super::Series;

/// Exponential Moving Average.
///
/// Multiplier `k = 2 / (period + 1)`, seeded with the SMA of the first
/// `period` values. Entries `0..period-1` are `None`.
pub fn ema(values: &[f64], period: usize) -> Result<Series> {
    if period == 0 {
        return Err(Error::config("EMA period must be > 0"));
    }
    if values.len() < period {
        return Err(Error::insufficient(period, values.len()));
    }

    let k = 2.0 / (period as f64 + 1.0);
    let mut out: Series = vec![None; values.len()];

    let mut ema_val = values[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = Some(ema_val);

    for (i, &price) in values.iter().enumerate().skip(period) {
        ema_val = price * k + ema_val * (1.0 - k);
        out[i] = Some(ema_val);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ema_insufficient_data() {
        let err = ema(&[1.0, 2.0], 3).unwrap_err();
        assert!(matches!(err, Error::InsufficientData { needed: 3, available: 2 }));
    }

    #[test]
    fn ema_warm_up_is_undefined_and_seed_is_sma() {
        let out = ema(&[2.0, 4.0, 6.0, 8.0], 3).unwrap();
        assert_eq!(out.len(), 4);
        assert!(out[0].is_none() && out[1].is_none());
        assert!((out[2].unwrap() - 4.0).abs() < 1e-12);
        // k = 0.5 → 8*0.5 + 4*0.5
        assert!((out[3].unwrap() - 6.0).abs() < 1e-12);
    }

    #[test]
    fn ema_of_constant_series_is_constant() {
        let out = ema(&[5.0; 30], 10).unwrap();
        for v in out.iter().skip(9) {
            assert!((v.unwrap() - 5.0).abs() < 1e-12);
        }
    }
}

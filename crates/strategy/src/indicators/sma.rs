use common::{Error, Result};

use super::Series;

/// Simple Moving Average over a trailing window of `period` values.
pub fn sma(values: &[f64], period: usize) -> Result<Series> {
    if period == 0 {
        return Err(Error::config("SMA period must be > 0"));
    }
    if values.len() < period {
        return Err(Error::insufficient(period, values.len()));
    }

    let mut out: Series = vec![None; values.len()];
    let mut sum: f64 = values[..period].iter().sum();
    out[period - 1] = Some(sum / period as f64);

    for i in period..values.len() {
        sum += values[i] - values[i - period];
        out[i] = Some(sum / period as f64);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sma_rolls_over_window() {
        let out = sma(&[1.0, 2.0, 3.0, 4.0, 5.0], 2).unwrap();
        assert_eq!(out[0], None);
        assert_eq!(out[1], Some(1.5));
        assert_eq!(out[4], Some(4.5));
    }

    #[test]
    fn sma_rejects_short_input() {
        assert!(sma(&[1.0], 2).is_err());
    }
}

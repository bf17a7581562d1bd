use common::{Candle, Error, Result};

use super::atr::true_range;
use super::Series;

/// Directional movement readings, aligned with the input candles.
#[derive(Debug, Clone)]
pub struct Adx {
    pub plus_di: Series,
    pub minus_di: Series,
    /// First defined at index `2 * period - 1`.
    pub adx: Series,
}

/// Average Directional Index with Wilder smoothing.
pub fn adx(candles: &[Candle], period: usize) -> Result<Adx> {
    if period == 0 {
        return Err(Error::config("ADX period must be > 0"));
    }
    let needed = 2 * period;
    if candles.len() < needed {
        return Err(Error::insufficient(needed, candles.len()));
    }

    let n = candles.len();
    let tr = true_range(candles);
    let mut plus_dm = vec![0.0; n];
    let mut minus_dm = vec![0.0; n];
    for i in 1..n {
        let up = candles[i].high - candles[i - 1].high;
        let down = candles[i - 1].low - candles[i].low;
        if up > down && up > 0.0 {
            plus_dm[i] = up;
        }
        if down > up && down > 0.0 {
            minus_dm[i] = down;
        }
    }

    let p = period as f64;
    let mut out = Adx {
        plus_di: vec![None; n],
        minus_di: vec![None; n],
        adx: vec![None; n],
    };
    let mut dx: Series = vec![None; n];

    let (mut s_tr, mut s_plus, mut s_minus) = (0.0, 0.0, 0.0);
    for i in 1..n {
        let tr_i = tr[i].unwrap_or(0.0);
        if i <= period {
            s_tr += tr_i;
            s_plus += plus_dm[i];
            s_minus += minus_dm[i];
            if i < period {
                continue;
            }
        } else {
            s_tr = s_tr - s_tr / p + tr_i;
            s_plus = s_plus - s_plus / p + plus_dm[i];
            s_minus = s_minus - s_minus / p + minus_dm[i];
        }

        let (pdi, mdi) = if s_tr > 0.0 {
            (100.0 * s_plus / s_tr, 100.0 * s_minus / s_tr)
        } else {
            (0.0, 0.0)
        };
        out.plus_di[i] = Some(pdi);
        out.minus_di[i] = Some(mdi);
        dx[i] = Some(if pdi + mdi > 0.0 { 100.0 * (pdi - mdi).abs() / (pdi + mdi) } else { 0.0 });
    }

    let first = needed - 1;
    let seed: f64 = dx[period..=first].iter().map(|v| v.unwrap_or(0.0)).sum::<f64>() / p;
    out.adx[first] = Some(seed);
    let mut prev = seed;
    for i in (first + 1)..n {
        prev = (prev * (p - 1.0) + dx[i].unwrap_or(0.0)) / p;
        out.adx[i] = Some(prev);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::last_value;
    use chrono::Utc;

    fn bars(closes: &[f64]) -> Vec<Candle> {
        closes
            .iter()
            .map(|&c| Candle { open_time: Utc::now(), open: c, high: c + 1.0, low: c - 1.0, close: c, volume: 1.0 })
            .collect()
    }

    #[test]
    fn steady_uptrend_is_strong() {
        let closes: Vec<f64> = (0..60).map(|i| 100.0 + 2.0 * i as f64).collect();
        let out = adx(&bars(&closes), 14).unwrap();
        assert_eq!(out.adx[26], None);
        assert!(out.adx[27].is_some());
        assert!(last_value(&out.adx).unwrap() > 90.0);
        assert!(last_value(&out.plus_di).unwrap() > last_value(&out.minus_di).unwrap());
    }

    #[test]
    fn flat_market_has_no_trend_strength() {
        let out = adx(&bars(&[100.0; 40]), 14).unwrap();
        assert_eq!(last_value(&out.adx), Some(0.0));
    }

    #[test]
    fn choppy_market_stays_below_trend_threshold() {
        let closes: Vec<f64> = (0..80).map(|i| if i % 2 == 0 { 100.0 } else { 103.0 }).collect();
        let out = adx(&bars(&closes), 14).unwrap();
        assert!(last_value(&out.adx).unwrap() < 25.0);
    }

    #[test]
    fn needs_two_periods() {
        assert!(matches!(
            adx(&bars(&[1.0; 10]), 14),
            Err(Error::InsufficientData { needed: 28, available: 10 })
        ));
    }
}

use common::{Candle, Error, Result};

use super::Series;

/// True range per bar. The first bar has no previous close and is `None`.
pub fn true_range(candles: &[Candle]) -> Series {
    let mut out: Series = vec![None; candles.len()];
    for i in 1..candles.len() {
        let (c, prev_close) = (&candles[i], candles[i - 1].close);
        let range = (c.high - c.low)
            .max((c.high - prev_close).abs())
            .max((c.low - prev_close).abs());
        out[i] = Some(range);
    }
    out
}

/// Average True Range as the simple mean of the trailing `period` true
/// ranges. First defined at index `period`.
pub fn atr(candles: &[Candle], period: usize) -> Result<Series> {
    if period == 0 {
        return Err(Error::config("ATR period must be > 0"));
    }
    if candles.len() < period + 1 {
        return Err(Error::insufficient(period + 1, candles.len()));
    }

    let tr: Vec<f64> = true_range(candles).into_iter().map(|v| v.unwrap_or(0.0)).collect();
    let mut out: Series = vec![None; candles.len()];
    let mut sum: f64 = tr[1..=period].iter().sum();
    out[period] = Some(sum / period as f64);
    for i in (period + 1)..candles.len() {
        sum += tr[i] - tr[i - period];
        out[i] = Some(sum / period as f64);
    }
    Ok(out)
}

/// Latest ATR as a fraction of the latest close.
pub fn atr_pct(candles: &[Candle], period: usize) -> Result<Option<f64>> {
    let series = atr(candles, period)?;
    let close = candles[candles.len() - 1].close;
    Ok(super::last_value(&series).filter(|_| close > 0.0).map(|a| a / close))
}

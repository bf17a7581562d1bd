use common::{Error, Result};

use super::{rsi, Series};

/// Stochastic RSI output: %K and its `d_period` SMA, %D.
#[derive(Debug, Clone, PartialEq)]
pub struct StochRsi {
    pub k: Series,
    pub d: Series,
}

/// RSI normalised into `[0, 100]` by its min/max over the trailing
/// `stoch_period` RSI values.
///
/// %K is undefined where the RSI window is flat (max == min); %D is undefined
/// wherever any %K in its window is undefined.
pub fn stoch_rsi(
    closes: &[f64],
    rsi_period: usize,
    stoch_period: usize,
    d_period: usize,
) -> Result<StochRsi> {
    if stoch_period == 0 || d_period == 0 {
        return Err(Error::config("Stochastic RSI periods must be > 0"));
    }
    let needed = rsi_period + stoch_period + d_period - 1;
    if closes.len() < needed {
        return Err(Error::insufficient(needed, closes.len()));
    }

    let rsi_series = rsi(closes, rsi_period)?;
    let first_k = rsi_period + stoch_period - 1;

    let mut k: Series = vec![None; closes.len()];
    for i in first_k..closes.len() {
        let window = &rsi_series[i + 1 - stoch_period..=i];
        let values: Option<Vec<f64>> = window.iter().copied().collect();
        let Some(values) = values else { continue };

        let min = values.iter().copied().fold(f64::INFINITY, f64::min);
        let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let range = max - min;
        if range > f64::EPSILON {
            k[i] = Some(100.0 * (values[values.len() - 1] - min) / range);
        }
    }

    let mut d: Series = vec![None; closes.len()];
    for i in (first_k + d_period - 1)..closes.len() {
        let window: Option<Vec<f64>> = k[i + 1 - d_period..=i].iter().copied().collect();
        if let Some(window) = window {
            d[i] = Some(window.iter().sum::<f64>() / d_period as f64);
        }
    }

    Ok(StochRsi { k, d })
}

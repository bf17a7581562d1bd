use common::Direction;

/// Regular RSI divergence on the latest bar.
///
/// Bullish: the latest close is below the lowest close of the preceding
/// `lookback` bars while RSI prints above its value at that low. Bearish is
/// the mirror against the highest close. Missing RSI values or a short
/// history read as no divergence.
pub fn rsi_divergence(
    closes: &[f64],
    rsi: &[Option<f64>],
    lookback: usize,
    direction: Direction,
) -> bool {
    let n = closes.len().min(rsi.len());
    if lookback == 0 || n < lookback + 1 {
        return false;
    }
    let t = n - 1;
    let Some(rsi_now) = rsi[t] else { return false };

    let window = (t - lookback)..t;
    let extreme = match direction {
        Direction::Long => window.min_by(|&i, &j| closes[i].total_cmp(&closes[j])),
        Direction::Short => window.max_by(|&i, &j| closes[i].total_cmp(&closes[j])),
    };
    let Some(m) = extreme else { return false };
    let Some(rsi_then) = rsi[m] else { return false };

    match direction {
        Direction::Long => closes[t] < closes[m] && rsi_now > rsi_then,
        Direction::Short => closes[t] > closes[m] && rsi_now < rsi_then,
    }
}

use chrono::{DateTime, NaiveTime, Timelike, Utc};
use common::{Candle, Direction, Error, Result};

/// Mean of the trailing `window` volumes (the current bar included).
pub fn average_volume(volumes: &[f64], window: usize) -> Result<f64> {
    if window == 0 {
        return Err(Error::config("volume window must be > 0"));
    }
    if volumes.len() < window {
        return Err(Error::insufficient(window, volumes.len()));
    }
    let tail = &volumes[volumes.len() - window..];
    Ok(tail.iter().sum::<f64>() / window as f64)
}

/// True when the latest volume is at least `multiplier` × the rolling average.
pub fn volume_confirmed(volumes: &[f64], window: usize, multiplier: f64) -> Result<bool> {
    let avg = average_volume(volumes, window)?;
    let current = volumes[volumes.len() - 1];
    Ok(current >= avg * multiplier)
}

/// Candle body as a fraction of its open price.
pub fn candle_body_ratio(candle: &Candle) -> f64 {
    if candle.open == 0.0 {
        return 0.0;
    }
    (candle.close - candle.open).abs() / candle.open
}

/// Rejection wick in the signal direction: a long wants the lower wick
/// longer than the upper one and longer than 30% of the body; a short the
/// mirror.
pub fn wick_confirms(candle: &Candle, direction: Direction) -> bool {
    let body = (candle.close - candle.open).abs();
    let upper = candle.high - candle.open.max(candle.close);
    let lower = candle.open.min(candle.close) - candle.low;
    match direction {
        Direction::Long => lower > upper && lower > body * 0.3,
        Direction::Short => upper > lower && upper > body * 0.3,
    }
}

/// Daily UTC window, both ends inclusive. A window whose start is after its
/// end wraps past midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeWindow {
    /// Parse `HH:MM` bounds.
    pub fn parse(start: &str, end: &str) -> Result<Self> {
        let read = |raw: &str| {
            NaiveTime::parse_from_str(raw, "%H:%M")
                .map_err(|_| Error::config(format!("invalid time of day '{raw}', expected HH:MM")))
        };
        Ok(Self { start: read(start)?, end: read(end)? })
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        let t = at.time().with_second(0).and_then(|t| t.with_nanosecond(0)).unwrap_or(at.time());
        if self.start <= self.end {
            self.start <= t && t <= self.end
        } else {
            t >= self.start || t <= self.end
        }
    }
}

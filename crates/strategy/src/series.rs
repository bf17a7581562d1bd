use chrono::{DateTime, Utc};
use common::{Candle, Error, Result, Timeframe};

/// Time-ordered candles for one (symbol, timeframe) pair.
///
/// Strictly increasing `open_time`, no duplicates, at most `capacity`
/// candles retained (oldest evicted first).
#[derive(Debug, Clone)]
pub struct CandleSeries {
    pub symbol: String,
    pub timeframe: Timeframe,
    candles: Vec<Candle>,
    capacity: usize,
}

impl CandleSeries {
    pub const DEFAULT_CAPACITY: usize = 500;

    pub fn new(symbol: impl Into<String>, timeframe: Timeframe, capacity: usize) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe,
            candles: Vec::new(),
            capacity: capacity.max(1),
        }
    }

    /// Normalise raw rows: non-finite rows are dropped, the rest sorted by
    /// open time, duplicate timestamps collapsed keeping the last row seen.
    pub fn from_candles(
        symbol: impl Into<String>,
        timeframe: Timeframe,
        raw: Vec<Candle>,
        capacity: usize,
    ) -> Self {
        let mut candles: Vec<Candle> = raw.into_iter().filter(Candle::is_finite).collect();
        // stable sort keeps input order among equal timestamps
        candles.sort_by_key(|c| c.open_time);
        let mut deduped: Vec<Candle> = Vec::with_capacity(candles.len());
        for c in candles {
            match deduped.last_mut() {
                Some(last) if last.open_time == c.open_time => *last = c,
                _ => deduped.push(c),
            }
        }

        let mut series = Self::new(symbol, timeframe, capacity);
        series.candles = deduped;
        series.evict();
        series
    }

    /// Append a newly closed candle. Rejects candles not strictly newer
    /// than the current tail.
    pub fn push(&mut self, candle: Candle) -> Result<()> {
        if !candle.is_finite() {
            return Err(Error::InvalidCandle(format!(
                "{} {}: non-finite values at {}",
                self.symbol, self.timeframe, candle.open_time
            )));
        }
        if let Some(last) = self.candles.last() {
            if candle.open_time <= last.open_time {
                return Err(Error::InvalidCandle(format!(
                    "{} {}: {} is not after {}",
                    self.symbol, self.timeframe, candle.open_time, last.open_time
                )));
            }
        }
        self.candles.push(candle);
        self.evict();
        Ok(())
    }

    fn evict(&mut self) {
        if self.candles.len() > self.capacity {
            let excess = self.candles.len() - self.capacity;
            self.candles.drain(..excess);
        }
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    /// Candles fully closed at `now`; the in-progress bucket is excluded.
    pub fn closed_at(&self, now: DateTime<Utc>) -> &[Candle] {
        closed_before(&self.candles, self.timeframe, now)
    }

    pub fn latest_closed_at(&self, now: DateTime<Utc>) -> Option<&Candle> {
        self.closed_at(now).last()
    }
}

/// Prefix of `candles` whose close time is `<= t`. Input must be ordered.
pub fn closed_before(candles: &[Candle], timeframe: Timeframe, t: DateTime<Utc>) -> &[Candle] {
    let n = candles.partition_point(|c| c.close_time(timeframe) <= t);
    &candles[..n]
}

/// Last `n` candles of a slice.
pub fn tail(candles: &[Candle], n: usize) -> &[Candle] {
    &candles[candles.len().saturating_sub(n)..]
}

/// Higher-timeframe candles already closed at the primary decision time.
#[derive(Debug, Clone, Copy)]
pub struct TrendView<'a> {
    pub timeframe: Timeframe,
    pub candles: &'a [Candle],
}

/// What a strategy sees for one symbol on one evaluation: closed primary
/// candles, bounded by the strategy lookback, and optionally an aligned
/// higher-timeframe view that never looks past the primary decision time.
///
/// Live cycles and the backtest build views through the same constructors,
/// so both paths hand identical windows to the indicators.
#[derive(Debug, Clone, Copy)]
pub struct MarketView<'a> {
    pub timeframe: Timeframe,
    pub candles: &'a [Candle],
    pub trend: Option<TrendView<'a>>,
}

impl<'a> MarketView<'a> {
    /// Closed candles from `primary` as of `now`, limited to `lookback`.
    pub fn aligned(
        timeframe: Timeframe,
        primary: &'a [Candle],
        now: DateTime<Utc>,
        lookback: usize,
    ) -> Self {
        let closed = closed_before(primary, timeframe, now);
        Self {
            timeframe,
            candles: tail(closed, lookback),
            trend: None,
        }
    }

    /// Attach the higher-timeframe candles closed at or before this view's
    /// decision time.
    pub fn with_trend(mut self, timeframe: Timeframe, candles: &'a [Candle], lookback: usize) -> Self {
        let aligned = match self.decision_time() {
            Some(t) => closed_before(candles, timeframe, t),
            None => &candles[..0],
        };
        self.trend = Some(TrendView {
            timeframe,
            candles: tail(aligned, lookback),
        });
        self
    }

    /// Close time of the latest primary candle.
    pub fn decision_time(&self) -> Option<DateTime<Utc>> {
        self.last().map(|c| c.close_time(self.timeframe))
    }

    pub fn last(&self) -> Option<&'a Candle> {
        self.candles.last()
    }

    pub fn closes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.close).collect()
    }

    pub fn volumes(&self) -> Vec<f64> {
        self.candles.iter().map(|c| c.volume).collect()
    }

    pub fn trend_closes(&self) -> Option<Vec<f64>> {
        self.trend
            .map(|t| t.candles.iter().map(|c| c.close).collect())
    }
}

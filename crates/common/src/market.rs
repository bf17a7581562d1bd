use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{AlertPayload, Candle, Result, Timeframe};

/// Boundary to the market-data collaborator.
///
/// Implementations return candles ordered by `open_time`, oldest first. The
/// last candle may still be in progress; callers filter it out with
/// [`Candle::is_closed_at`]. Network or exchange failures surface as
/// `Error::DataUnavailable`.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// The most recent `limit` candles for a symbol/timeframe pair.
    async fn fetch_candles(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        limit: usize,
    ) -> Result<Vec<Candle>>;

    /// All candles whose open time falls in `[start, end)`. Used by the
    /// backtest entry point.
    async fn fetch_range(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>>;
}

/// Boundary to the alert delivery collaborator.
///
/// A failed delivery returns `Error::DeliveryFailure`. The orchestrator logs
/// and counts it; it never re-sends.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn deliver(&self, alert: &AlertPayload) -> Result<()>;

    /// Free-form operational text (status reports). Defaults to a no-op.
    async fn notify(&self, _text: &str) -> Result<()> {
        Ok(())
    }
}

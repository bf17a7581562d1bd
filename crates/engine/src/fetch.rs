use std::time::Duration;

use tracing::warn;

use common::{Candle, Error, MarketDataSource, Result, Timeframe};

/// Timeout and retry settings for market data requests.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after each failure.
    pub base_delay: Duration,
    /// Upper bound on a single request.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(5),
            timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(cfg: &common::Config) -> Self {
        Self {
            max_attempts: cfg.fetch_max_attempts.max(1),
            base_delay: cfg.fetch_retry_delay,
            timeout: cfg.fetch_timeout,
        }
    }
}

/// `fetch_candles` bounded by the policy timeout and retried with
/// exponential backoff. Exhausted retries surface as `DataUnavailable`.
pub async fn fetch_with_retry(
    source: &dyn MarketDataSource,
    symbol: &str,
    timeframe: Timeframe,
    limit: usize,
    policy: RetryPolicy,
) -> Result<Vec<Candle>> {
    let attempts = policy.max_attempts.max(1);
    let mut delay = policy.base_delay;
    let mut last_error = String::new();

    for attempt in 1..=attempts {
        match tokio::time::timeout(policy.timeout, source.fetch_candles(symbol, timeframe, limit)).await {
            Ok(Ok(candles)) => return Ok(candles),
            Ok(Err(e)) => last_error = e.to_string(),
            Err(_) => last_error = format!("timed out after {:?}", policy.timeout),
        }
        if attempt < attempts {
            warn!(
                symbol,
                timeframe = %timeframe,
                attempt,
                error = %last_error,
                retry_in = ?delay,
                "Candle fetch failed, retrying"
            );
            tokio::time::sleep(delay).await;
            delay = delay.saturating_mul(2);
        }
    }

    Err(Error::DataUnavailable(format!(
        "{symbol} {timeframe}: {last_error} (after {attempts} attempts)"
    )))
}

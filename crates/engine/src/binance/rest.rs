use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use reqwest::Client;
use serde::de::IgnoredAny;
use serde::Deserialize;
use tracing::debug;

use common::{Candle, Error, MarketDataSource, Result, Timeframe};

/// Binance caps a klines request at this many rows.
const MAX_KLINES_PER_REQUEST: usize = 1000;

/// Public REST kline source for Binance spot. No credentials needed.
pub struct BinanceMarketData {
    base_url: String,
    http: Client,
}

impl BinanceMarketData {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Other(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    async fn klines(&self, query: &[(&str, String)]) -> Result<Vec<Candle>> {
        let url = format!("{}/api/v3/klines", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| Error::DataUnavailable(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| Error::DataUnavailable(e.to_string()))?;
        if !status.is_success() {
            return Err(Error::DataUnavailable(format!("HTTP {status}: {body}")));
        }

        parse_klines(&body)
    }
}

#[async_trait]
impl MarketDataSource for BinanceMarketData {
    async fn fetch_candles(&self, symbol: &str, timeframe: Timeframe, limit: usize) -> Result<Vec<Candle>> {
        let limit = limit.clamp(1, MAX_KLINES_PER_REQUEST);
        debug!(symbol, timeframe = %timeframe, limit, "Fetching klines");
        self.klines(&[
            ("symbol", symbol.to_string()),
            ("interval", timeframe.as_str().to_string()),
            ("limit", limit.to_string()),
        ])
        .await
    }

    async fn fetch_range(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>> {
        let mut out: Vec<Candle> = Vec::new();
        let mut cursor = start;
        // end is exclusive
        let end_ms = end.timestamp_millis() - 1;

        while cursor < end {
            let page = self
                .klines(&[
                    ("symbol", symbol.to_string()),
                    ("interval", timeframe.as_str().to_string()),
                    ("startTime", cursor.timestamp_millis().to_string()),
                    ("endTime", end_ms.to_string()),
                    ("limit", MAX_KLINES_PER_REQUEST.to_string()),
                ])
                .await?;
            let Some(last) = page.last() else { break };
            cursor = last.open_time + timeframe.duration();
            let full = page.len() == MAX_KLINES_PER_REQUEST;
            out.extend(page);
            if !full {
                break;
            }
        }
        debug!(symbol, timeframe = %timeframe, count = out.len(), "Fetched kline range");
        Ok(out)
    }
}

// ─── Response types ───────────────────────────────────────────────────────────

/// One kline row: `[open_time, open, high, low, close, volume, close_time, ...]`.
#[derive(Deserialize)]
struct KlineRow(
    i64,
    String,
    String,
    String,
    String,
    String,
    i64,
    IgnoredAny,
    IgnoredAny,
    IgnoredAny,
    IgnoredAny,
    IgnoredAny,
);

fn parse_klines(body: &str) -> Result<Vec<Candle>> {
    let rows: Vec<KlineRow> = serde_json::from_str(body)?;
    rows.into_iter().map(KlineRow::into_candle).collect()
}

impl KlineRow {
    fn into_candle(self) -> Result<Candle> {
        let open_time = Utc
            .timestamp_millis_opt(self.0)
            .single()
            .ok_or_else(|| Error::InvalidCandle(format!("bad open time {}", self.0)))?;
        Ok(Candle {
            open_time,
            open: number(&self.1)?,
            high: number(&self.2)?,
            low: number(&self.3)?,
            close: number(&self.4)?,
            volume: number(&self.5)?,
        })
    }
}

fn number(raw: &str) -> Result<f64> {
    raw.parse::<f64>()
        .map_err(|e| Error::InvalidCandle(format!("'{raw}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_binance_kline_rows() {
        let body = r#"[
            [1499040000000,"0.01634790","0.80000000","0.01575800","0.01577100","148976.11427815",
             1499644799999,"2434.19055334",308,"1756.87402397","28.46694368","17928899.62484339"]
        ]"#;
        let candles = parse_klines(body).unwrap();
        assert_eq!(candles.len(), 1);
        let c = candles[0];
        assert_eq!(c.open_time.timestamp_millis(), 1_499_040_000_000);
        assert!((c.high - 0.8).abs() < 1e-12);
        assert!((c.volume - 148_976.114_278_15).abs() < 1e-6);
    }

    #[test]
    fn malformed_number_is_invalid_candle() {
        let body = r#"[[0,"x","1","1","1","1",0,"0",0,"0","0","0"]]"#;
        assert!(matches!(parse_klines(body), Err(Error::InvalidCandle(_))));
    }
}

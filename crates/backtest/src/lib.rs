//! Deterministic replay of historical candles through the live strategy
//! state machines, with simulated positions, a trade ledger and an equity
//! curve.

pub mod config;
pub mod report;
pub mod simulator;

pub use config::BacktestConfig;
pub use report::{BacktestReport, EquityPoint, Metrics, StrategyBreakdown, TradeRecord};
pub use simulator::{BacktestRequest, HistoricalData, Simulator};

use std::collections::BTreeMap;

use common::{MarketDataSource, Result, Timeframe};
use strategy::Strategy;
use tracing::info;

/// Fetch the requested range plus each strategy's warm-up window from
/// `source`, then replay it.
pub async fn run_backtest_from_source(
    source: &dyn MarketDataSource,
    mut strategies: Vec<Box<dyn Strategy>>,
    request: &BacktestRequest,
    config: BacktestConfig,
) -> Result<BacktestReport> {
    request.validate()?;
    let simulator = Simulator::new(config)?;

    // widest warm-up per series, so each is fetched once
    let mut warm_up: BTreeMap<(String, Timeframe), usize> = BTreeMap::new();
    for s in &strategies {
        for symbol in &request.symbols {
            let bars = warm_up.entry((symbol.clone(), s.timeframe())).or_default();
            *bars = (*bars).max(s.lookback());
            if let Some(tf) = s.trend_timeframe() {
                let bars = warm_up.entry((symbol.clone(), tf)).or_default();
                *bars = (*bars).max(s.trend_lookback());
            }
        }
    }

    let mut data = HistoricalData::new();
    for ((symbol, tf), bars) in warm_up {
        let from = request.start - tf.duration() * bars as i32;
        let candles = source.fetch_range(&symbol, tf, from, request.end).await?;
        info!(symbol = %symbol, timeframe = %tf, candles = candles.len(), from = %from, "History loaded");
        data.insert(&symbol, tf, candles);
    }

    simulator.run(&mut strategies, &data, request)
}

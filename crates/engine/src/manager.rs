use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::join_all;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use common::{
    AlertSink, Candle, EngineState, Error, MarketDataSource, Result, RiskProfile, Signal,
    StrategyStats, Timeframe,
};
use strategy::{build_strategy, CandleSeries, MarketView, Strategy, StrategyConfig};

use crate::alert::{build_alert, format_status};
use crate::fetch::{fetch_with_retry, RetryPolicy};

/// When and on what candles a strategy is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub interval: Duration,
    pub timeframe: Timeframe,
    pub trend_timeframe: Option<Timeframe>,
}

impl Schedule {
    /// Schedule matching a strategy's own timeframes.
    pub fn for_strategy(strategy: &dyn Strategy, interval: Duration) -> Self {
        Self {
            interval,
            timeframe: strategy.timeframe(),
            trend_timeframe: strategy.trend_timeframe(),
        }
    }
}

#[derive(Debug, Default)]
struct Health {
    fetch_errors: u64,
    skipped: u64,
    delivery_failures: u64,
    last_error: Option<String>,
}

impl Health {
    fn record(&mut self, e: &Error) {
        self.last_error = Some(e.to_string());
    }
}

/// One registered strategy. The mutex funnels every evaluation, parameter
/// reload and reset of the instance through a single holder.
struct Entry {
    id: String,
    profile: RiskProfile,
    schedule: Schedule,
    symbols: Vec<String>,
    enabled: AtomicBool,
    strategy: Mutex<Box<dyn Strategy>>,
    health: Mutex<Health>,
}

/// Outcome of one `run_cycle`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CycleReport {
    pub strategy_id: String,
    pub evaluated: usize,
    pub signals: Vec<Signal>,
    /// Symbols without enough history this cycle.
    pub skipped: usize,
    pub errors: usize,
    pub delivery_failures: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct StrategyStatus {
    pub id: String,
    pub profile: RiskProfile,
    pub enabled: bool,
    pub timeframe: Timeframe,
    pub trend_timeframe: Option<Timeframe>,
    pub interval_secs: u64,
    pub symbols: Vec<String>,
    pub stats: StrategyStats,
    /// Evaluation errors plus failed fetches.
    pub errors: u64,
    pub skipped: u64,
    pub delivery_failures: u64,
    pub last_error: Option<String>,
    /// Symbols per phase name.
    pub phases: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManagerStatus {
    pub engine_state: EngineState,
    pub total_signals: u64,
    pub strategies: Vec<StrategyStatus>,
}

/// Registry and orchestrator for all strategies.
///
/// Different strategies run fully in parallel; cycles of the same strategy
/// serialise on its mutex. Data is fetched before the mutex is taken so a
/// slow exchange never blocks a reload or status call.
pub struct StrategyManager {
    registry: RwLock<BTreeMap<String, Arc<Entry>>>,
    source: Arc<dyn MarketDataSource>,
    sink: Arc<dyn AlertSink>,
    retry: RetryPolicy,
    state: Arc<RwLock<EngineState>>,
    total_signals: AtomicU64,
}

impl StrategyManager {
    pub fn new(
        source: Arc<dyn MarketDataSource>,
        sink: Arc<dyn AlertSink>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            registry: RwLock::new(BTreeMap::new()),
            source,
            sink,
            retry,
            state: Arc::new(RwLock::new(EngineState::Stopped)),
            total_signals: AtomicU64::new(0),
        }
    }

    /// Shared engine state; scheduled cycles only run while `Running`.
    pub fn state(&self) -> Arc<RwLock<EngineState>> {
        self.state.clone()
    }

    pub fn sink(&self) -> Arc<dyn AlertSink> {
        self.sink.clone()
    }

    /// Register an enabled strategy. Fails with `DuplicateStrategyId` if the
    /// id is taken, `InvalidConfiguration` for an unusable schedule.
    pub async fn register(
        &self,
        strategy: Box<dyn Strategy>,
        schedule: Schedule,
        symbols: Vec<String>,
    ) -> Result<()> {
        self.insert(strategy, schedule, symbols, true).await
    }

    /// Build a strategy from its config section and register it.
    pub async fn register_from_config(&self, cfg: &StrategyConfig) -> Result<()> {
        let strategy = build_strategy(cfg)?;
        let schedule = Schedule::for_strategy(strategy.as_ref(), Duration::from_secs(cfg.interval_seconds));
        self.insert(strategy, schedule, cfg.symbols.clone(), cfg.enabled).await
    }

    async fn insert(
        &self,
        strategy: Box<dyn Strategy>,
        schedule: Schedule,
        symbols: Vec<String>,
        enabled: bool,
    ) -> Result<()> {
        let id = strategy.id().to_string();
        if schedule.interval.is_zero() {
            return Err(Error::config(format!("{id}: evaluation interval must be > 0")));
        }
        if schedule.timeframe != strategy.timeframe()
            || schedule.trend_timeframe != strategy.trend_timeframe()
        {
            return Err(Error::config(format!("{id}: schedule timeframes do not match the strategy")));
        }
        if symbols.is_empty() {
            return Err(Error::config(format!("{id}: no symbols")));
        }

        let mut registry = self.registry.write().await;
        if registry.contains_key(&id) {
            return Err(Error::DuplicateStrategyId(id));
        }
        info!(
            strategy = %id,
            profile = %strategy.profile(),
            timeframe = %schedule.timeframe,
            interval = ?schedule.interval,
            symbols = ?symbols,
            enabled,
            "Registered strategy"
        );
        let entry = Entry {
            id: id.clone(),
            profile: strategy.profile(),
            schedule,
            symbols,
            enabled: AtomicBool::new(enabled),
            strategy: Mutex::new(strategy),
            health: Mutex::new(Health::default()),
        };
        registry.insert(id, Arc::new(entry));
        Ok(())
    }

    async fn entry(&self, id: &str) -> Result<Arc<Entry>> {
        self.registry
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| Error::UnknownStrategy(id.to_string()))
    }

    /// Unregister a strategy. A cycle already in flight finishes on its own
    /// copy of the entry; later cycles and the schedule loop see `UnknownStrategy`.
    pub async fn remove(&self, id: &str) -> Result<()> {
        let entry = self
            .registry
            .write()
            .await
            .remove(id)
            .ok_or_else(|| Error::UnknownStrategy(id.to_string()))?;
        entry.enabled.store(false, Ordering::SeqCst);
        info!(strategy = %id, "Strategy removed");
        Ok(())
    }

    pub async fn strategy_ids(&self) -> Vec<String> {
        self.registry.read().await.keys().cloned().collect()
    }

    pub async fn schedule(&self, id: &str) -> Result<Schedule> {
        Ok(self.entry(id).await?.schedule)
    }

    /// Idempotent.
    pub async fn enable(&self, id: &str) -> Result<()> {
        let entry = self.entry(id).await?;
        if !entry.enabled.swap(true, Ordering::SeqCst) {
            info!(strategy = %id, "Strategy enabled");
        }
        Ok(())
    }

    /// Idempotent. Clears all per-symbol state so nothing armed or cooling
    /// down survives into a later enable.
    pub async fn disable(&self, id: &str) -> Result<()> {
        let entry = self.entry(id).await?;
        let was_enabled = entry.enabled.swap(false, Ordering::SeqCst);
        // waits for an in-flight evaluation to finish
        entry.strategy.lock().await.reset_all();
        if was_enabled {
            info!(strategy = %id, "Strategy disabled, state reset");
        }
        Ok(())
    }

    pub async fn is_enabled(&self, id: &str) -> Result<bool> {
        Ok(self.entry(id).await?.enabled.load(Ordering::SeqCst))
    }

    /// Swap in a new parameter set. Mutually exclusive with evaluation, so a
    /// cycle sees either the old or the new set in full. On error the old
    /// set stays active.
    pub async fn update_parameters(&self, id: &str, changes: &toml::Table) -> Result<()> {
        let entry = self.entry(id).await?;
        let mut strategy = entry.strategy.lock().await;
        match strategy.update_parameters(changes) {
            Ok(()) => {
                info!(strategy = %id, keys = ?changes.keys().collect::<Vec<_>>(), "Parameters updated");
                Ok(())
            }
            Err(e) => {
                warn!(strategy = %id, error = %e, "Parameter update rejected");
                Err(e)
            }
        }
    }

    pub async fn parameters(&self, id: &str) -> Result<toml::Table> {
        let entry = self.entry(id).await?;
        let strategy = entry.strategy.lock().await;
        Ok(strategy.parameters())
    }

    /// Evaluate every symbol of `id` against candles closed by now.
    pub async fn run_cycle(&self, id: &str) -> Result<CycleReport> {
        self.run_cycle_at(id, Utc::now()).await
    }

    /// `run_cycle` with an explicit clock; candles not closed at `now` are
    /// never shown to the strategy.
    pub async fn run_cycle_at(&self, id: &str, now: DateTime<Utc>) -> Result<CycleReport> {
        let entry = self.entry(id).await?;
        let mut report = CycleReport {
            strategy_id: id.to_string(),
            ..Default::default()
        };
        if !entry.enabled.load(Ordering::SeqCst) {
            debug!(strategy = %id, "Strategy disabled, cycle skipped");
            return Ok(report);
        }

        let (lookback, trend_lookback) = {
            let s = entry.strategy.lock().await;
            (s.lookback(), s.trend_lookback())
        };
        let schedule = entry.schedule;

        // fetch all symbols concurrently, one extra bar for the candle in progress
        let fetches = entry.symbols.iter().map(|symbol| async move {
            let primary = fetch_with_retry(
                self.source.as_ref(),
                symbol,
                schedule.timeframe,
                lookback + 1,
                self.retry,
            )
            .await?;
            let trend = match schedule.trend_timeframe {
                Some(tf) => Some(
                    fetch_with_retry(self.source.as_ref(), symbol, tf, trend_lookback + 1, self.retry)
                        .await?,
                ),
                None => None,
            };
            Ok::<(Vec<Candle>, Option<Vec<Candle>>), Error>((primary, trend))
        });
        let fetched = join_all(fetches).await;

        let mut signals = Vec::new();
        {
            let mut strategy = entry.strategy.lock().await;
            if !entry.enabled.load(Ordering::SeqCst) {
                debug!(strategy = %id, "Strategy disabled during fetch, cycle dropped");
                return Ok(report);
            }
            let mut health = entry.health.lock().await;

            for (symbol, data) in entry.symbols.iter().zip(fetched) {
                let (primary, trend) = match data {
                    Ok(d) => d,
                    Err(e) => {
                        warn!(strategy = %id, symbol = %symbol, error = %e, "Skipping symbol, no data");
                        health.fetch_errors += 1;
                        health.record(&e);
                        report.errors += 1;
                        continue;
                    }
                };

                let primary = CandleSeries::from_candles(symbol.as_str(), schedule.timeframe, primary, lookback + 1);
                let trend = match (schedule.trend_timeframe, trend) {
                    (Some(tf), Some(raw)) => Some(CandleSeries::from_candles(symbol.as_str(), tf, raw, trend_lookback + 1)),
                    _ => None,
                };
                let mut view = MarketView::aligned(schedule.timeframe, primary.candles(), now, lookback);
                if let Some(t) = &trend {
                    view = view.with_trend(t.timeframe, t.candles(), trend_lookback);
                }

                report.evaluated += 1;
                match strategy.evaluate(symbol, &view) {
                    Ok(Some(signal)) => {
                        info!(
                            strategy = %id,
                            symbol = %symbol,
                            direction = %signal.direction,
                            price = signal.price,
                            "Signal emitted"
                        );
                        signals.push(signal);
                    }
                    Ok(None) => {}
                    Err(e @ Error::InsufficientData { .. }) => {
                        warn!(strategy = %id, symbol = %symbol, error = %e, "Skipping symbol");
                        health.skipped += 1;
                        report.skipped += 1;
                    }
                    Err(e) => {
                        error!(strategy = %id, symbol = %symbol, error = %e, "Evaluation failed");
                        health.record(&e);
                        report.errors += 1;
                    }
                }
            }
        }

        // a failed delivery still counts as emitted: no re-send
        for signal in signals {
            let alert = build_alert(entry.profile, signal.clone());
            if let Err(e) = self.sink.deliver(&alert).await {
                warn!(strategy = %id, symbol = %signal.symbol, error = %e, "Alert delivery failed");
                let mut health = entry.health.lock().await;
                health.delivery_failures += 1;
                health.record(&e);
                report.delivery_failures += 1;
            }
            report.signals.push(signal);
        }
        self.total_signals
            .fetch_add(report.signals.len() as u64, Ordering::SeqCst);
        Ok(report)
    }

    pub fn total_signals(&self) -> u64 {
        self.total_signals.load(Ordering::SeqCst)
    }

    /// Snapshot of every strategy's flags and counters.
    pub async fn status(&self) -> ManagerStatus {
        let entries: Vec<Arc<Entry>> = self.registry.read().await.values().cloned().collect();
        let mut strategies = Vec::with_capacity(entries.len());

        for entry in entries {
            let (stats, phases) = {
                let s = entry.strategy.lock().await;
                let mut counts: BTreeMap<String, usize> = BTreeMap::new();
                for phase in s.phases().values() {
                    *counts.entry(phase.name().to_string()).or_default() += 1;
                }
                (s.statistics(), counts)
            };
            let health = entry.health.lock().await;
            strategies.push(StrategyStatus {
                id: entry.id.clone(),
                profile: entry.profile,
                enabled: entry.enabled.load(Ordering::SeqCst),
                timeframe: entry.schedule.timeframe,
                trend_timeframe: entry.schedule.trend_timeframe,
                interval_secs: entry.schedule.interval.as_secs(),
                symbols: entry.symbols.clone(),
                errors: stats.errors_count + health.fetch_errors,
                skipped: health.skipped,
                delivery_failures: health.delivery_failures,
                last_error: health.last_error.clone().or_else(|| stats.last_error.clone()),
                stats,
                phases,
            });
        }

        ManagerStatus {
            engine_state: *self.state.read().await,
            total_signals: self.total_signals(),
            strategies,
        }
    }

    /// Log the status report and pass it to the sink.
    pub async fn report_status(&self) {
        let text = format_status(&self.status().await);
        info!("Status report\n{text}");
        if let Err(e) = self.sink.notify(&text).await {
            warn!(error = %e, "Status report delivery failed");
        }
    }
}

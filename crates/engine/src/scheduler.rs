use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use common::{EngineState, Error, Result};

use crate::manager::StrategyManager;

/// Schedule tasks owned by the engine, keyed by strategy id.
#[derive(Default)]
pub struct Tasks {
    loops: BTreeMap<String, JoinHandle<()>>,
    status: Option<JoinHandle<()>>,
}

impl Tasks {
    pub fn len(&self) -> usize {
        self.loops.len() + usize::from(self.status.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True while the strategy's loop task is alive.
    pub fn is_scheduled(&self, id: &str) -> bool {
        self.loops.get(id).is_some_and(|h| !h.is_finished())
    }

    /// Start the loop for one strategy. A no-op if a live loop already exists.
    pub async fn spawn_strategy(&mut self, manager: &Arc<StrategyManager>, id: &str) -> Result<()> {
        if self.is_scheduled(id) {
            return Ok(());
        }
        let interval = manager.schedule(id).await?.interval;
        let handle = tokio::spawn(strategy_loop(manager.clone(), id.to_string(), interval));
        self.loops.insert(id.to_string(), handle);
        Ok(())
    }

    pub fn spawn_status(&mut self, manager: &Arc<StrategyManager>, every: Duration) {
        if let Some(old) = self.status.replace(tokio::spawn(status_loop(manager.clone(), every))) {
            old.abort();
        }
    }

    /// Abort one strategy loop. Returns whether a loop was running.
    pub fn abort(&mut self, id: &str) -> bool {
        match self.loops.remove(id) {
            Some(handle) => {
                handle.abort();
                true
            }
            None => false,
        }
    }

    pub fn abort_all(&mut self) {
        for (_, handle) in std::mem::take(&mut self.loops) {
            handle.abort();
        }
        if let Some(status) = self.status.take() {
            status.abort();
        }
    }
}

/// Spawn one timer task per registered strategy plus the status reporter.
///
/// Each strategy ticks on its own interval; a cycle that overruns its
/// interval swallows the missed ticks instead of queueing them.
pub async fn spawn_all(manager: Arc<StrategyManager>, status_interval: Duration) -> Tasks {
    let mut tasks = Tasks::default();
    for id in manager.strategy_ids().await {
        if let Err(e) = tasks.spawn_strategy(&manager, &id).await {
            warn!(strategy = %id, error = %e, "No schedule, not starting");
        }
    }
    tasks.spawn_status(&manager, status_interval);
    tasks
}

async fn strategy_loop(manager: Arc<StrategyManager>, id: String, interval: Duration) {
    info!(strategy = %id, interval = ?interval, "Strategy loop started");
    let state = manager.state();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;
        if *state.read().await != EngineState::Running {
            continue;
        }
        match manager.run_cycle(&id).await {
            Ok(report) if !report.signals.is_empty() || report.errors > 0 => info!(
                strategy = %id,
                evaluated = report.evaluated,
                signals = report.signals.len(),
                errors = report.errors,
                skipped = report.skipped,
                "Cycle complete"
            ),
            Ok(report) => debug!(strategy = %id, evaluated = report.evaluated, "Cycle complete"),
            Err(Error::UnknownStrategy(_)) => {
                warn!(strategy = %id, "Strategy no longer registered, loop exiting");
                return;
            }
            Err(e) => warn!(strategy = %id, error = %e, "Cycle failed"),
        }
    }
}

async fn status_loop(manager: Arc<StrategyManager>, every: Duration) {
    let state = manager.state();
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // first tick completes immediately; the startup report is sent by the caller
    ticker.tick().await;

    loop {
        ticker.tick().await;
        if *state.read().await == EngineState::Stopped {
            continue;
        }
        manager.report_status().await;
    }
}

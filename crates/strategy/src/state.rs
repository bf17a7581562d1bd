use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use common::{Candle, Direction, Error, Result, Signal, StrategyStats, Timeframe};
use serde::Serialize;

/// Phase of one (strategy, symbol) state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "phase", content = "direction", rename_all = "lowercase")]
pub enum Phase {
    /// No active setup.
    #[default]
    Idle,
    /// Precondition met, waiting for a trigger. `None` when the machine is
    /// armed for either direction.
    Armed(Option<Direction>),
    /// Emitted on the most recent bar.
    Signaled(Direction),
    /// Suppressing re-entry in this direction.
    Cooldown(Direction),
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Armed(_) => "armed",
            Phase::Signaled(_) => "signaled",
            Phase::Cooldown(_) => "cooldown",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Idle => write!(f, "idle"),
            Phase::Armed(None) => write!(f, "armed"),
            Phase::Armed(Some(d)) => write!(f, "armed {d}"),
            Phase::Signaled(d) => write!(f, "signaled {d}"),
            Phase::Cooldown(d) => write!(f, "cooldown {d}"),
        }
    }
}

/// Mutable record for one symbol, owned by exactly one strategy instance.
#[derive(Debug, Clone, Default)]
pub struct SymbolState {
    pub phase: Phase,
    /// Open time of the last bar processed; older or equal bars are ignored.
    pub last_bar: Option<DateTime<Utc>>,
    pub last_signal: Option<(Direction, DateTime<Utc>)>,
    /// Bars opening at or before this instant stay in cooldown.
    pub cooldown_until: Option<DateTime<Utc>>,
}

impl SymbolState {
    /// True when `bar` was already processed.
    pub fn seen(&self, bar: &Candle) -> bool {
        self.last_bar.is_some_and(|t| bar.open_time <= t)
    }
}

/// Per-symbol states of one strategy plus its counters.
#[derive(Debug, Default)]
pub struct StateBook {
    states: HashMap<String, SymbolState>,
    stats: StrategyStats,
}

impl StateBook {
    /// State for `symbol`, created Idle on first use.
    pub fn entry(&mut self, symbol: &str) -> &mut SymbolState {
        self.states.entry(symbol.to_string()).or_default()
    }

    pub fn get(&self, symbol: &str) -> Option<&SymbolState> {
        self.states.get(symbol)
    }

    pub fn phase(&self, symbol: &str) -> Phase {
        self.get(symbol).map(|s| s.phase).unwrap_or_default()
    }

    pub fn phases(&self) -> BTreeMap<String, Phase> {
        self.states
            .iter()
            .map(|(symbol, s)| (symbol.clone(), s.phase))
            .collect()
    }

    pub fn reset(&mut self, symbol: &str) {
        self.states.remove(symbol);
    }

    pub fn reset_all(&mut self) {
        self.states.clear();
    }

    pub fn stats(&self) -> StrategyStats {
        self.stats.clone()
    }

    /// Count the outcome of one evaluation. Warm-up shortfalls are a skip,
    /// not a strategy error.
    pub fn observe(&mut self, outcome: &Result<Option<Signal>>) {
        match outcome {
            Ok(Some(signal)) => self.stats.record_signal(signal),
            Ok(None) | Err(Error::InsufficientData { .. }) => {}
            Err(e) => self.stats.record_error(e),
        }
    }
}

/// Stop-loss and take-profit a fixed fraction away from `price`.
pub fn pct_levels(direction: Direction, price: f64, stop_pct: f64, target_pct: f64) -> (f64, f64) {
    match direction {
        Direction::Long => (price * (1.0 - stop_pct), price * (1.0 + target_pct)),
        Direction::Short => (price * (1.0 + stop_pct), price * (1.0 - target_pct)),
    }
}

/// Fields shared by every signal a strategy builds on a decision candle.
pub struct SignalDraft<'a> {
    pub strategy_id: &'a str,
    pub symbol: &'a str,
    pub timeframe: Timeframe,
    pub candle: &'a Candle,
    pub leverage: f64,
    pub max_hold_bars: usize,
}

impl SignalDraft<'_> {
    pub fn build(
        self,
        direction: Direction,
        stop_loss: f64,
        take_profit: f64,
        metadata: BTreeMap<String, f64>,
    ) -> Signal {
        Signal {
            strategy_id: self.strategy_id.to_string(),
            symbol: self.symbol.to_string(),
            direction,
            timeframe: self.timeframe,
            price: self.candle.close,
            timestamp: self.candle.close_time(self.timeframe),
            stop_loss,
            take_profit,
            leverage: self.leverage,
            max_hold_bars: Some(self.max_hold_bars),
            metadata,
        }
    }
}

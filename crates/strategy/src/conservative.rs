//! Golden / death cross of a fast and slow SMA.
//!
//! A cross emits and puts the symbol in cooldown for that direction. Further
//! crosses in the same direction (the SMAs touching and separating again)
//! are suppressed until an opposite cross occurs.
//!
//! With the ADX filter on, a cross only counts while ADX is above
//! `adx_threshold`; a cross in a weak trend is dropped like an unconfirmed one.

use std::collections::BTreeMap;
use std::sync::Arc;

use common::{Direction, Error, Result, RiskProfile, Signal, StrategyStats, Timeframe};
use toml::Table;
use tracing::{debug, info};

use crate::indicators::{adx, crossover, last_value, rsi, sma};
use crate::params::{ensure, int, merged, read_bool, read_f64, read_usize};
use crate::state::{Phase, SignalDraft, StateBook};
use crate::{MarketView, Strategy, DEFAULT_LOOKBACK};

#[derive(Debug, Clone, PartialEq)]
pub struct ConservativeParams {
    pub sma_fast: usize,
    pub sma_slow: usize,
    pub rsi_period: usize,
    /// Longs are skipped with RSI at or above this when confirmation is on.
    pub rsi_upper: f64,
    /// Shorts are skipped with RSI at or below this when confirmation is on.
    pub rsi_lower: f64,
    /// Stop distance beyond the slow SMA.
    pub stop_buffer_pct: f64,
    pub take_profit_pct: f64,
    pub leverage: f64,
    pub max_hold_period: usize,
    // filters
    pub rsi_confirmation: bool,
    pub adx_filter: bool,
    pub adx_period: usize,
    /// Trend strength a cross needs when the ADX filter is on.
    pub adx_threshold: f64,
}

impl Default for ConservativeParams {
    fn default() -> Self {
        Self {
            sma_fast: 50,
            sma_slow: 200,
            rsi_period: 14,
            rsi_upper: 60.0,
            rsi_lower: 40.0,
            stop_buffer_pct: 0.02,
            take_profit_pct: 0.05,
            leverage: 1.0,
            max_hold_period: 18,
            rsi_confirmation: false,
            adx_filter: false,
            adx_period: 14,
            adx_threshold: 25.0,
        }
    }
}

impl ConservativeParams {
    pub fn from_table(t: &Table) -> Result<Self> {
        let d = Self::default();
        let p = Self {
            sma_fast: read_usize(t, "sma_fast", d.sma_fast)?,
            sma_slow: read_usize(t, "sma_slow", d.sma_slow)?,
            rsi_period: read_usize(t, "rsi_period", d.rsi_period)?,
            rsi_upper: read_f64(t, "rsi_upper", d.rsi_upper)?,
            rsi_lower: read_f64(t, "rsi_lower", d.rsi_lower)?,
            stop_buffer_pct: read_f64(t, "stop_buffer_pct", d.stop_buffer_pct)?,
            take_profit_pct: read_f64(t, "take_profit_pct", d.take_profit_pct)?,
            leverage: read_f64(t, "leverage", d.leverage)?,
            max_hold_period: read_usize(t, "max_hold_period", d.max_hold_period)?,
            rsi_confirmation: read_bool(t, "rsi_confirmation", d.rsi_confirmation)?,
            adx_filter: read_bool(t, "adx_filter", d.adx_filter)?,
            adx_period: read_usize(t, "adx_period", d.adx_period)?,
            adx_threshold: read_f64(t, "adx_threshold", d.adx_threshold)?,
        };
        p.validate()?;
        Ok(p)
    }

    fn validate(&self) -> Result<()> {
        ensure(self.sma_fast >= 1 && self.sma_fast < self.sma_slow, || {
            format!("need 1 <= sma_fast ({}) < sma_slow ({})", self.sma_fast, self.sma_slow)
        })?;
        ensure(self.rsi_period >= 2, || "rsi_period must be >= 2".into())?;
        ensure(self.rsi_lower < self.rsi_upper, || "rsi_lower must be < rsi_upper".into())?;
        ensure(self.stop_buffer_pct > 0.0 && self.stop_buffer_pct < 1.0, || {
            "stop_buffer_pct must be in (0, 1)".into()
        })?;
        ensure(self.take_profit_pct > 0.0, || "take_profit_pct must be > 0".into())?;
        ensure(self.leverage >= 1.0, || "leverage must be >= 1".into())?;
        ensure(self.max_hold_period >= 1, || "max_hold_period must be >= 1".into())?;
        ensure(self.adx_period >= 1 && (0.0..100.0).contains(&self.adx_threshold), || {
            "adx_period must be >= 1 and adx_threshold within [0, 100)".into()
        })
    }

    pub fn to_table(&self) -> Table {
        let mut t = Table::new();
        t.insert("sma_fast".into(), int(self.sma_fast));
        t.insert("sma_slow".into(), int(self.sma_slow));
        t.insert("rsi_period".into(), int(self.rsi_period));
        t.insert("rsi_upper".into(), self.rsi_upper.into());
        t.insert("rsi_lower".into(), self.rsi_lower.into());
        t.insert("stop_buffer_pct".into(), self.stop_buffer_pct.into());
        t.insert("take_profit_pct".into(), self.take_profit_pct.into());
        t.insert("leverage".into(), self.leverage.into());
        t.insert("max_hold_period".into(), int(self.max_hold_period));
        t.insert("rsi_confirmation".into(), self.rsi_confirmation.into());
        t.insert("adx_filter".into(), self.adx_filter.into());
        t.insert("adx_period".into(), int(self.adx_period));
        t.insert("adx_threshold".into(), self.adx_threshold.into());
        t
    }

    /// Slow SMA on the last two bars.
    pub fn required_bars(&self) -> usize {
        let mut needed = self.sma_slow + 1;
        if self.rsi_confirmation {
            needed = needed.max(self.rsi_period + 1);
        }
        if self.adx_filter {
            needed = needed.max(2 * self.adx_period);
        }
        needed
    }

    /// Stop beyond the slow SMA, never on the wrong side of entry.
    fn levels(&self, direction: Direction, price: f64, slow: f64) -> (f64, f64) {
        let b = self.stop_buffer_pct;
        match direction {
            Direction::Long => (
                (slow * (1.0 - b)).min(price * (1.0 - b)),
                price * (1.0 + self.take_profit_pct),
            ),
            Direction::Short => (
                (slow * (1.0 + b)).max(price * (1.0 + b)),
                price * (1.0 - self.take_profit_pct),
            ),
        }
    }
}

pub struct ConservativeStrategy {
    id: String,
    timeframe: Timeframe,
    params: Arc<ConservativeParams>,
    book: StateBook,
}

impl ConservativeStrategy {
    pub fn new(id: impl Into<String>, timeframe: Timeframe, params: ConservativeParams) -> Self {
        Self {
            id: id.into(),
            timeframe,
            params: Arc::new(params),
            book: StateBook::default(),
        }
    }

    fn evaluate_bar(&mut self, symbol: &str, view: &MarketView<'_>) -> Result<Option<Signal>> {
        let params = Arc::clone(&self.params);
        let Some(bar) = view.last() else {
            return Err(Error::insufficient(params.required_bars(), 0));
        };
        if self.book.get(symbol).is_some_and(|s| s.seen(bar)) {
            return Ok(None);
        }

        let closes = view.closes();
        let needed = params.required_bars();
        if closes.len() < needed {
            return Err(Error::insufficient(needed, closes.len()));
        }
        let fast = sma(&closes, params.sma_fast)?;
        let slow = sma(&closes, params.sma_slow)?;
        let rsi_now = if params.rsi_confirmation {
            last_value(&rsi(&closes, params.rsi_period)?)
        } else {
            None
        };
        let adx_now = if params.adx_filter {
            last_value(&adx(view.candles, params.adx_period)?.adx)
        } else {
            None
        };
        let cross = crossover(&fast, &slow).direction();

        let state = self.book.entry(symbol);
        state.last_bar = Some(bar.open_time);

        let Some(direction) = cross else {
            if let Phase::Signaled(dir) = state.phase {
                state.phase = Phase::Cooldown(dir);
            }
            return Ok(None);
        };

        if matches!(state.phase, Phase::Signaled(d) | Phase::Cooldown(d) if d == direction) {
            debug!(strategy = %self.id, symbol, %direction, "Repeated cross suppressed");
            state.phase = Phase::Cooldown(direction);
            return Ok(None);
        }

        let confirmed = match (params.rsi_confirmation, direction, rsi_now) {
            (false, _, _) => true,
            (true, Direction::Long, Some(r)) => r < params.rsi_upper,
            (true, Direction::Short, Some(r)) => r > params.rsi_lower,
            (true, _, None) => false,
        } && (!params.adx_filter || adx_now.is_some_and(|a| a > params.adx_threshold));
        if !confirmed {
            // the opposite cross still ends any earlier cooldown
            state.phase = Phase::Idle;
            return Ok(None);
        }

        state.phase = Phase::Signaled(direction);
        state.last_signal = Some((direction, bar.close_time(self.timeframe)));

        let fast_now = last_value(&fast).unwrap_or(bar.close);
        let slow_now = last_value(&slow).unwrap_or(bar.close);
        info!(
            strategy = %self.id, symbol, %direction,
            sma_fast = fast_now, sma_slow = slow_now,
            "{}", if direction == Direction::Long { "Golden cross" } else { "Death cross" }
        );

        let (stop_loss, take_profit) = params.levels(direction, bar.close, slow_now);
        let mut metadata = BTreeMap::from([
            ("sma_fast".to_string(), fast_now),
            ("sma_slow".to_string(), slow_now),
        ]);
        if let Some(r) = rsi_now {
            metadata.insert("rsi".to_string(), r);
        }
        if let Some(a) = adx_now {
            metadata.insert("adx".to_string(), a);
        }
        let draft = SignalDraft {
            strategy_id: &self.id,
            symbol,
            timeframe: self.timeframe,
            candle: bar,
            leverage: params.leverage,
            max_hold_bars: params.max_hold_period,
        };
        Ok(Some(draft.build(direction, stop_loss, take_profit, metadata)))
    }
}

impl Strategy for ConservativeStrategy {
    fn id(&self) -> &str {
        &self.id
    }

    fn profile(&self) -> RiskProfile {
        RiskProfile::Conservative
    }

    fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    fn lookback(&self) -> usize {
        DEFAULT_LOOKBACK.max(self.params.required_bars())
    }

    fn evaluate(&mut self, symbol: &str, view: &MarketView<'_>) -> Result<Option<Signal>> {
        let outcome = self.evaluate_bar(symbol, view);
        self.book.observe(&outcome);
        outcome
    }

    fn update_parameters(&mut self, changes: &Table) -> Result<()> {
        let next = ConservativeParams::from_table(&merged(self.params.to_table(), changes))?;
        self.params = Arc::new(next);
        Ok(())
    }

    fn parameters(&self) -> Table {
        self.params.to_table()
    }

    fn reset(&mut self, symbol: &str) {
        self.book.reset(symbol);
    }

    fn reset_all(&mut self) {
        self.book.reset_all();
    }

    fn phase(&self, symbol: &str) -> Phase {
        self.book.phase(symbol)
    }

    fn phases(&self) -> BTreeMap<String, Phase> {
        self.book.phases()
    }

    fn statistics(&self) -> StrategyStats {
        self.book.stats()
    }
}

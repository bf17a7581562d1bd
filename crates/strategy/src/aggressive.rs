//! Momentum ignition on Stochastic RSI extremes.
//!
//! Idle → Armed when %K enters the oversold (long) or overbought (short)
//! zone. Armed → Signaled on a later bar where %K crosses %D in the armed
//! direction and the enabled filters pass. A failed filter keeps the setup
//! armed. After a signal the symbol sits in cooldown for `max_hold_period`
//! bars, ignoring new extremes, then returns to Idle.
//!
//! Optional filters: volume spike, RSI divergence, ATR volatility ceiling,
//! rejection wick on the signal bar and a daily UTC trading window checked
//! against the bar's close time.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{Direction, Error, Result, RiskProfile, Signal, StrategyStats, Timeframe};
use toml::Table;
use tracing::debug;

use crate::indicators::{
    atr_pct, cross, rsi, rsi_divergence, stoch_rsi, volume_confirmed, wick_confirms, Crossover,
    TimeWindow,
};
use crate::params::{ensure, int, merged, read_bool, read_f64, read_string, read_usize};
use crate::state::{pct_levels, Phase, SignalDraft, StateBook, SymbolState};
use crate::{MarketView, Strategy, DEFAULT_LOOKBACK};

const MIDLINE: f64 = 50.0;

#[derive(Debug, Clone, PartialEq)]
pub struct AggressiveParams {
    pub rsi_period: usize,
    pub stoch_period: usize,
    pub d_period: usize,
    pub oversold: f64,
    pub overbought: f64,
    pub volume_multiplier: f64,
    pub volume_window: usize,
    /// Cooldown length in bars after a signal; also the holding limit hint.
    pub max_hold_period: usize,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub leverage: f64,
    // filters
    pub volume_filter: bool,
    pub divergence_filter: bool,
    pub divergence_lookback: usize,
    pub volatility_filter: bool,
    /// Highest ATR / close accepted when the volatility filter is on.
    pub max_atr_pct: f64,
    pub atr_period: usize,
    pub wick_confirmation: bool,
    pub time_filter: bool,
    /// `HH:MM` UTC.
    pub time_start: String,
    pub time_end: String,
}

impl Default for AggressiveParams {
    fn default() -> Self {
        Self {
            rsi_period: 11,
            stoch_period: 8,
            d_period: 2,
            oversold: 10.0,
            overbought: 90.0,
            volume_multiplier: 2.0,
            volume_window: 20,
            max_hold_period: 3,
            stop_loss_pct: 0.008,
            take_profit_pct: 0.015,
            leverage: 3.0,
            volume_filter: true,
            divergence_filter: false,
            divergence_lookback: 14,
            volatility_filter: false,
            max_atr_pct: 0.018,
            atr_period: 14,
            wick_confirmation: false,
            time_filter: false,
            time_start: "09:30".into(),
            time_end: "16:00".into(),
        }
    }
}

impl AggressiveParams {
    pub fn from_table(t: &Table) -> Result<Self> {
        let d = Self::default();
        let p = Self {
            rsi_period: read_usize(t, "rsi_period", d.rsi_period)?,
            stoch_period: read_usize(t, "stoch_period", d.stoch_period)?,
            d_period: read_usize(t, "d_period", d.d_period)?,
            oversold: read_f64(t, "oversold", d.oversold)?,
            overbought: read_f64(t, "overbought", d.overbought)?,
            volume_multiplier: read_f64(t, "volume_multiplier", d.volume_multiplier)?,
            volume_window: read_usize(t, "volume_window", d.volume_window)?,
            max_hold_period: read_usize(t, "max_hold_period", d.max_hold_period)?,
            stop_loss_pct: read_f64(t, "stop_loss_pct", d.stop_loss_pct)?,
            take_profit_pct: read_f64(t, "take_profit_pct", d.take_profit_pct)?,
            leverage: read_f64(t, "leverage", d.leverage)?,
            volume_filter: read_bool(t, "volume_filter", d.volume_filter)?,
            divergence_filter: read_bool(t, "divergence_filter", d.divergence_filter)?,
            divergence_lookback: read_usize(t, "divergence_lookback", d.divergence_lookback)?,
            volatility_filter: read_bool(t, "volatility_filter", d.volatility_filter)?,
            max_atr_pct: read_f64(t, "max_atr_pct", d.max_atr_pct)?,
            atr_period: read_usize(t, "atr_period", d.atr_period)?,
            wick_confirmation: read_bool(t, "wick_confirmation", d.wick_confirmation)?,
            time_filter: read_bool(t, "time_filter", d.time_filter)?,
            time_start: read_string(t, "time_start", &d.time_start)?,
            time_end: read_string(t, "time_end", &d.time_end)?,
        };
        p.validate()?;
        Ok(p)
    }

    fn validate(&self) -> Result<()> {
        ensure(self.rsi_period >= 2, || "rsi_period must be >= 2".into())?;
        ensure(self.stoch_period >= 1 && self.d_period >= 1, || {
            "stoch_period and d_period must be >= 1".into()
        })?;
        ensure(
            0.0 <= self.oversold && self.oversold < self.overbought && self.overbought <= 100.0,
            || format!("need 0 <= oversold ({}) < overbought ({}) <= 100", self.oversold, self.overbought),
        )?;
        ensure(self.volume_multiplier > 0.0 && self.volume_window >= 1, || {
            "volume_multiplier must be > 0 and volume_window >= 1".into()
        })?;
        ensure(self.stop_loss_pct > 0.0 && self.stop_loss_pct < 1.0, || {
            "stop_loss_pct must be in (0, 1)".into()
        })?;
        ensure(self.take_profit_pct > 0.0, || "take_profit_pct must be > 0".into())?;
        ensure(self.leverage >= 1.0, || "leverage must be >= 1".into())?;
        ensure(self.max_hold_period >= 1, || "max_hold_period must be >= 1".into())?;
        ensure(self.divergence_lookback >= 1, || "divergence_lookback must be >= 1".into())?;
        ensure(self.max_atr_pct > 0.0 && self.atr_period >= 1, || {
            "max_atr_pct must be > 0 and atr_period >= 1".into()
        })?;
        self.window().map(|_| ())
    }

    fn window(&self) -> Result<TimeWindow> {
        TimeWindow::parse(&self.time_start, &self.time_end)
    }

    pub fn to_table(&self) -> Table {
        let mut t = Table::new();
        t.insert("rsi_period".into(), int(self.rsi_period));
        t.insert("stoch_period".into(), int(self.stoch_period));
        t.insert("d_period".into(), int(self.d_period));
        t.insert("oversold".into(), self.oversold.into());
        t.insert("overbought".into(), self.overbought.into());
        t.insert("volume_multiplier".into(), self.volume_multiplier.into());
        t.insert("volume_window".into(), int(self.volume_window));
        t.insert("max_hold_period".into(), int(self.max_hold_period));
        t.insert("stop_loss_pct".into(), self.stop_loss_pct.into());
        t.insert("take_profit_pct".into(), self.take_profit_pct.into());
        t.insert("leverage".into(), self.leverage.into());
        t.insert("volume_filter".into(), self.volume_filter.into());
        t.insert("divergence_filter".into(), self.divergence_filter.into());
        t.insert("divergence_lookback".into(), int(self.divergence_lookback));
        t.insert("volatility_filter".into(), self.volatility_filter.into());
        t.insert("max_atr_pct".into(), self.max_atr_pct.into());
        t.insert("atr_period".into(), int(self.atr_period));
        t.insert("wick_confirmation".into(), self.wick_confirmation.into());
        t.insert("time_filter".into(), self.time_filter.into());
        t.insert("time_start".into(), self.time_start.clone().into());
        t.insert("time_end".into(), self.time_end.clone().into());
        t
    }

    /// Closed bars needed for %K/%D on the last two bars plus enabled filters.
    pub fn required_bars(&self) -> usize {
        let mut needed = self.rsi_period + self.stoch_period + self.d_period;
        if self.volume_filter {
            needed = needed.max(self.volume_window);
        }
        if self.divergence_filter {
            needed = needed.max(self.rsi_period + self.divergence_lookback + 1);
        }
        if self.volatility_filter {
            needed = needed.max(self.atr_period + 1);
        }
        needed
    }

    fn zone(&self, k: f64) -> Option<Direction> {
        if k < self.oversold {
            Some(Direction::Long)
        } else if k > self.overbought {
            Some(Direction::Short)
        } else {
            None
        }
    }
}

/// Indicator readings for the decision bar.
#[derive(Debug, Clone, Copy, Default)]
struct Snapshot {
    k_prev: Option<f64>,
    d_prev: Option<f64>,
    k: Option<f64>,
    d: Option<f64>,
    rsi: Option<f64>,
    volume_ok: bool,
    volatility_ok: bool,
    in_window: bool,
    divergence_long: bool,
    divergence_short: bool,
    wick_long: bool,
    wick_short: bool,
}

impl Snapshot {
    fn cross(&self) -> Crossover {
        match (self.k_prev, self.d_prev, self.k, self.d) {
            (Some(pk), Some(pd), Some(k), Some(d)) => cross(pk, pd, k, d),
            _ => Crossover::Neutral,
        }
    }

    fn filters_pass(&self, direction: Direction) -> bool {
        let (divergence, wick) = match direction {
            Direction::Long => (self.divergence_long, self.wick_long),
            Direction::Short => (self.divergence_short, self.wick_short),
        };
        self.volume_ok && self.volatility_ok && self.in_window && divergence && wick
    }
}

pub struct AggressiveStrategy {
    id: String,
    timeframe: Timeframe,
    params: Arc<AggressiveParams>,
    book: StateBook,
}

impl AggressiveStrategy {
    pub fn new(id: impl Into<String>, timeframe: Timeframe, params: AggressiveParams) -> Self {
        Self {
            id: id.into(),
            timeframe,
            params: Arc::new(params),
            book: StateBook::default(),
        }
    }

    fn snapshot(params: &AggressiveParams, view: &MarketView<'_>) -> Result<Snapshot> {
        let closes = view.closes();
        let needed = params.required_bars();
        if closes.len() < needed {
            return Err(Error::insufficient(needed, closes.len()));
        }
        let t = closes.len() - 1;

        let srsi = stoch_rsi(&closes, params.rsi_period, params.stoch_period, params.d_period)?;
        let rsi_series = rsi(&closes, params.rsi_period)?;

        let volume_ok = if params.volume_filter {
            volume_confirmed(&view.volumes(), params.volume_window, params.volume_multiplier)?
        } else {
            true
        };
        let (divergence_long, divergence_short) = if params.divergence_filter {
            (
                rsi_divergence(&closes, &rsi_series, params.divergence_lookback, Direction::Long),
                rsi_divergence(&closes, &rsi_series, params.divergence_lookback, Direction::Short),
            )
        } else {
            (true, true)
        };
        let volatility_ok = if params.volatility_filter {
            atr_pct(view.candles, params.atr_period)?.is_some_and(|pct| pct <= params.max_atr_pct)
        } else {
            true
        };
        let in_window = match view.decision_time() {
            Some(at) if params.time_filter => params.window()?.contains(at),
            _ => true,
        };
        let bar = &view.candles[t];
        let (wick_long, wick_short) = if params.wick_confirmation {
            (wick_confirms(bar, Direction::Long), wick_confirms(bar, Direction::Short))
        } else {
            (true, true)
        };

        Ok(Snapshot {
            k_prev: srsi.k[t - 1],
            d_prev: srsi.d[t - 1],
            k: srsi.k[t],
            d: srsi.d[t],
            rsi: rsi_series[t],
            volume_ok,
            volatility_ok,
            in_window,
            divergence_long,
            divergence_short,
            wick_long,
            wick_short,
        })
    }

    fn evaluate_bar(&mut self, symbol: &str, view: &MarketView<'_>) -> Result<Option<Signal>> {
        let params = Arc::clone(&self.params);
        let Some(bar) = view.last() else {
            return Err(Error::insufficient(params.required_bars(), 0));
        };
        if self.book.get(symbol).is_some_and(|s| s.seen(bar)) {
            return Ok(None);
        }

        let snap = Self::snapshot(&params, view)?;

        let state = self.book.entry(symbol);
        let before = state.phase;
        let fired = step(&params, self.timeframe, state, bar.open_time, &snap);
        state.last_bar = Some(bar.open_time);
        if state.phase != before {
            debug!(strategy = %self.id, symbol, from = %before, to = %state.phase, "Phase change");
        }
        let Some(direction) = fired else {
            return Ok(None);
        };
        state.last_signal = Some((direction, bar.close_time(self.timeframe)));

        let (stop_loss, take_profit) =
            pct_levels(direction, bar.close, params.stop_loss_pct, params.take_profit_pct);
        let mut metadata = BTreeMap::new();
        for (key, value) in [("stoch_k", snap.k), ("stoch_d", snap.d), ("rsi", snap.rsi)] {
            if let Some(v) = value {
                metadata.insert(key.to_string(), v);
            }
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

/// Advance one symbol's machine by one bar. Returns the direction emitted.
fn step(
    params: &AggressiveParams,
    timeframe: Timeframe,
    state: &mut SymbolState,
    bar_open: DateTime<Utc>,
    snap: &Snapshot,
) -> Option<Direction> {
    if let Phase::Signaled(dir) | Phase::Cooldown(dir) = state.phase {
        if state.cooldown_until.is_some_and(|until| bar_open <= until) {
            state.phase = Phase::Cooldown(dir);
            return None;
        }
        state.phase = Phase::Idle;
        state.cooldown_until = None;
    }

    // %K undefined (flat RSI window): nothing to read this bar
    let k = snap.k?;
    let zone = params.zone(k);

    match state.phase {
        Phase::Armed(Some(dir)) => {
            if snap.cross().direction() == Some(dir) {
                if !snap.filters_pass(dir) {
                    return None;
                }
                state.phase = Phase::Signaled(dir);
                state.cooldown_until =
                    Some(bar_open + timeframe.duration() * params.max_hold_period as i32);
                return Some(dir);
            }
            state.phase = match (zone, dir) {
                (Some(z), _) => Phase::Armed(Some(z)),
                (None, Direction::Long) if k >= MIDLINE => Phase::Idle,
                (None, Direction::Short) if k <= MIDLINE => Phase::Idle,
                (None, _) => Phase::Armed(Some(dir)),
            };
            None
        }
        _ => {
            if let Some(z) = zone {
                state.phase = Phase::Armed(Some(z));
            }
            None
        }
    }
}

impl Strategy for AggressiveStrategy {
    fn id(&self) -> &str {
        &self.id
    }

    fn profile(&self) -> RiskProfile {
        RiskProfile::Aggressive
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
        let next = AggressiveParams::from_table(&merged(self.params.to_table(), changes))?;
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{candles, replay, t0};

    fn snap(k_prev: f64, d_prev: f64, k: f64, d: f64) -> Snapshot {
        Snapshot {
            k_prev: Some(k_prev),
            d_prev: Some(d_prev),
            k: Some(k),
            d: Some(d),
            rsi: Some(40.0),
            volume_ok: true,
            volatility_ok: true,
            in_window: true,
            divergence_long: true,
            divergence_short: true,
            wick_long: true,
            wick_short: true,
        }
    }

    fn bar(i: i32) -> DateTime<Utc> {
        t0() + Timeframe::M5.duration() * i
    }

    /// (bar, snapshot) script driven through `step`; returns emissions.
    fn drive(params: &AggressiveParams, state: &mut SymbolState, script: &[(i32, Snapshot)]) -> Vec<(i32, Direction)> {
        script
            .iter()
            .filter_map(|(i, s)| step(params, Timeframe::M5, state, bar(*i), s).map(|d| (*i, d)))
            .collect()
    }

    #[test]
    fn oversold_then_bullish_cross_emits_once_then_cools_down() {
        let params = AggressiveParams::default(); // max_hold_period = 3
        let mut state = SymbolState::default();
        let script = [
            (9, snap(30.0, 35.0, 20.0, 25.0)),
            (10, snap(20.0, 25.0, 8.0, 14.0)),  // %K enters oversold
            (11, snap(8.0, 14.0, 5.0, 6.5)),    // still below %D
            (12, snap(5.0, 6.5, 12.0, 8.5)),    // %K crosses above %D
            (13, snap(12.0, 8.5, 4.0, 8.0)),    // back in oversold
            (14, snap(4.0, 8.0, 9.0, 6.5)),     // another bullish cross
            (15, snap(9.0, 6.5, 3.0, 6.0)),
        ];
        let fired = drive(&params, &mut state, &script);
        assert_eq!(fired, vec![(12, Direction::Long)]);
        assert_eq!(state.phase, Phase::Cooldown(Direction::Long));

        // cooldown over after three bars: oversold arms again
        let later = drive(&params, &mut state, &[(16, snap(3.0, 6.0, 2.0, 2.5))]);
        assert!(later.is_empty());
        assert_eq!(state.phase, Phase::Armed(Some(Direction::Long)));
    }

    #[test]
    fn cross_on_the_arming_bar_does_not_fire() {
        let params = AggressiveParams::default();
        let mut state = SymbolState::default();
        // prev k <= d and k > d, with k already oversold
        let fired = drive(&params, &mut state, &[(1, snap(2.0, 3.0, 5.0, 4.0))]);
        assert!(fired.is_empty());
        assert_eq!(state.phase, Phase::Armed(Some(Direction::Long)));
    }

    #[test]
    fn failed_volume_filter_stays_armed() {
        let params = AggressiveParams::default();
        let mut state = SymbolState::default();
        let mut quiet = snap(5.0, 6.5, 12.0, 8.5);
        quiet.volume_ok = false;
        let fired = drive(&params, &mut state, &[(1, snap(20.0, 25.0, 8.0, 14.0)), (2, quiet)]);
        assert!(fired.is_empty());
        assert_eq!(state.phase, Phase::Armed(Some(Direction::Long)));
    }

    #[test]
    fn overbought_bearish_cross_emits_short() {
        let params = AggressiveParams::default();
        let mut state = SymbolState::default();
        let fired = drive(
            &params,
            &mut state,
            &[(1, snap(80.0, 75.0, 95.0, 88.0)), (2, snap(95.0, 88.0, 85.0, 90.0))],
        );
        assert_eq!(fired, vec![(2, Direction::Short)]);
    }

    #[test]
    fn setup_disarms_at_midline() {
        let params = AggressiveParams::default();
        let mut state = SymbolState::default();
        drive(
            &params,
            &mut state,
            &[(1, snap(20.0, 25.0, 8.0, 14.0)), (2, snap(60.0, 55.0, 55.0, 57.0))],
        );
        assert_eq!(state.phase, Phase::Idle);
    }

    fn sine(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| 100.0 + 5.0 * (i as f64 * std::f64::consts::TAU / 40.0).sin())
            .collect()
    }

    fn unfiltered() -> AggressiveStrategy {
        let params = AggressiveParams { volume_filter: false, ..Default::default() };
        AggressiveStrategy::new("aggr", Timeframe::M5, params)
    }

    #[test]
    fn replay_never_signals_inside_cooldown() {
        let mut s = unfiltered();
        let data = candles(Timeframe::M5, &sine(400));
        let signals = replay(&mut s, "BTCUSDT", &data);
        assert!(!signals.is_empty());
        for pair in signals.windows(2) {
            assert!(pair[1].0 - pair[0].0 > 3, "signals at {} and {}", pair[0].0, pair[1].0);
        }
        assert_eq!(s.statistics().signals_generated, signals.len() as u64);
        assert_eq!(s.statistics().errors_count, 0);
    }

    #[test]
    fn signal_carries_levels_and_decision_time() {
        let mut s = unfiltered();
        let data = candles(Timeframe::M5, &sine(400));
        let (i, sig) = replay(&mut s, "BTCUSDT", &data).remove(0);
        assert_eq!(sig.timestamp, data[i].close_time(Timeframe::M5));
        assert_eq!(sig.price, data[i].close);
        match sig.direction {
            Direction::Long => assert!(sig.stop_loss < sig.price && sig.take_profit > sig.price),
            Direction::Short => assert!(sig.stop_loss > sig.price && sig.take_profit < sig.price),
        }
        assert_eq!(sig.leverage, 3.0);
        assert!(sig.metadata.contains_key("stoch_k"));
    }

    #[test]
    fn re_evaluating_the_same_bar_is_a_noop() {
        let mut s = unfiltered();
        let data = candles(Timeframe::M5, &sine(400));
        let (i, _) = replay(&mut s, "BTCUSDT", &data).remove(0);

        let mut again = unfiltered();
        let now = data[i].close_time(Timeframe::M5);
        let view = MarketView::aligned(Timeframe::M5, &data[..=i], now, again.lookback());
        // warm the machine up to just before the signal bar
        replay(&mut again, "BTCUSDT", &data[..i]);
        assert!(again.evaluate("BTCUSDT", &view).unwrap().is_some());
        assert!(again.evaluate("BTCUSDT", &view).unwrap().is_none());
    }

    #[test]
    fn insufficient_history_is_an_error_without_state() {
        let mut s = unfiltered();
        let data = candles(Timeframe::M5, &sine(10));
        let view = MarketView::aligned(Timeframe::M5, &data, t0() + chrono::Duration::days(1), 200);
        assert!(matches!(s.evaluate("BTCUSDT", &view), Err(Error::InsufficientData { .. })));
        assert!(s.phases().is_empty());
    }

    #[test]
    fn invalid_update_keeps_previous_parameters() {
        let mut s = unfiltered();
        let before = s.parameters();
        let bad: Table = toml::from_str("oversold = 95.0\noverbought = 90.0").unwrap();
        assert!(matches!(s.update_parameters(&bad), Err(Error::InvalidConfiguration(_))));
        assert_eq!(s.parameters(), before);

        let good: Table = toml::from_str("oversold = 15.0\noverbought = 85\nunknown = 1").unwrap();
        s.update_parameters(&good).unwrap();
        let after = s.parameters();
        assert_eq!(after["oversold"].as_float(), Some(15.0));
        assert_eq!(after["overbought"].as_float(), Some(85.0));
        assert!(!after.contains_key("unknown"));
    }

    #[test]
    fn failed_volatility_or_window_keeps_setup_armed() {
        let params = AggressiveParams::default();
        for tweak in [
            (|s: &mut Snapshot| s.volatility_ok = false) as fn(&mut Snapshot),
            |s: &mut Snapshot| s.in_window = false,
            |s: &mut Snapshot| s.wick_long = false,
        ] {
            let mut state = SymbolState::default();
            let mut blocked = snap(5.0, 6.5, 12.0, 8.5);
            tweak(&mut blocked);
            let fired = drive(&params, &mut state, &[(1, snap(20.0, 25.0, 8.0, 14.0)), (2, blocked)]);
            assert!(fired.is_empty());
            assert_eq!(state.phase, Phase::Armed(Some(Direction::Long)));
        }
    }

    #[test]
    fn volatility_ceiling_blocks_signals() {
        let data = candles(Timeframe::M5, &sine(400));
        let calm = AggressiveParams { volume_filter: false, volatility_filter: true, ..Default::default() };
        let mut s = AggressiveStrategy::new("aggr", Timeframe::M5, calm);
        assert!(!replay(&mut s, "BTCUSDT", &data).is_empty());

        let strict = AggressiveParams {
            volume_filter: false,
            volatility_filter: true,
            max_atr_pct: 0.001,
            ..Default::default()
        };
        let mut s = AggressiveStrategy::new("aggr", Timeframe::M5, strict);
        assert!(replay(&mut s, "BTCUSDT", &data).is_empty());
    }

    #[test]
    fn wickless_bars_fail_wick_confirmation() {
        let params = AggressiveParams { volume_filter: false, wick_confirmation: true, ..Default::default() };
        let mut s = AggressiveStrategy::new("aggr", Timeframe::M5, params);
        let data = candles(Timeframe::M5, &sine(400));
        assert!(replay(&mut s, "BTCUSDT", &data).is_empty());
    }

    #[test]
    fn signals_respect_the_trading_window() {
        let data = candles(Timeframe::M5, &sine(400));
        let window = TimeWindow::parse("06:00", "12:00").unwrap();
        let all = replay(&mut unfiltered(), "BTCUSDT", &data);
        assert!(all.iter().any(|(_, sig)| !window.contains(sig.timestamp)));

        let params = AggressiveParams {
            volume_filter: false,
            time_filter: true,
            time_start: "06:00".into(),
            time_end: "12:00".into(),
            ..Default::default()
        };
        let mut s = AggressiveStrategy::new("aggr", Timeframe::M5, params);
        for (_, sig) in replay(&mut s, "BTCUSDT", &data) {
            assert!(window.contains(sig.timestamp), "signal at {}", sig.timestamp);
        }
    }

    #[test]
    fn zero_holding_period_and_bad_window_are_rejected() {
        for bad in ["max_hold_period = 0", "time_start = '25:00'", "max_atr_pct = 0.0"] {
            let t: Table = toml::from_str(bad).unwrap();
            assert!(
                matches!(AggressiveParams::from_table(&t), Err(Error::InvalidConfiguration(_))),
                "{bad} accepted"
            );
        }
    }
}

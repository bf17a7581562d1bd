//! EMA crossover filtered by RSI momentum and a higher-timeframe trend.
//!
//! The machine is permanently armed. A signal needs, on the same bar, a
//! fast/slow EMA cross, RSI on the matching side of its threshold and the
//! trend filter agreeing. A failed condition drops that cross; since the
//! cross is edge-triggered, a lasting EMA order never signals twice.
//!
//! Optional filters: volume spike, minimum candle body, RSI divergence and a
//! daily UTC session checked against the bar's close time.

use std::collections::BTreeMap;
use std::sync::Arc;

use common::{Direction, Error, Result, RiskProfile, Signal, StrategyStats, Timeframe};
use toml::Table;
use tracing::debug;

use crate::indicators::{
    candle_body_ratio, crossover, ema, last_value, rsi, rsi_divergence, volume_confirmed, Series,
    TimeWindow,
};
use crate::params::{ensure, int, merged, read_bool, read_f64, read_string, read_usize};
use crate::state::{pct_levels, Phase, SignalDraft, StateBook};
use crate::{MarketView, Strategy, DEFAULT_LOOKBACK};

/// How the higher-timeframe trend is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendMode {
    /// Primary close above (long) / below (short) the trend EMA.
    Price,
    /// Trend EMA rising (long) / falling (short) on its last bar.
    Slope,
}

impl TrendMode {
    fn as_str(self) -> &'static str {
        match self {
            TrendMode::Price => "price",
            TrendMode::Slope => "slope",
        }
    }
}

impl std::str::FromStr for TrendMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "price" => Ok(TrendMode::Price),
            "slope" => Ok(TrendMode::Slope),
            other => Err(Error::config(format!("trend_mode must be 'price' or 'slope', got '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModerateParams {
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub rsi_period: usize,
    pub rsi_bullish: f64,
    pub rsi_bearish: f64,
    pub trend_ema: usize,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub leverage: f64,
    pub max_hold_period: usize,
    // filters
    pub trend_mode: TrendMode,
    /// Volume multiple of the 20-bar mean required; 0 disables.
    pub volume_spike: f64,
    /// Minimum candle body as a fraction of open; 0 disables.
    pub min_candle_body: f64,
    pub session_filter: bool,
    /// `HH:MM` UTC.
    pub session_start: String,
    pub session_end: String,
    pub divergence_filter: bool,
    pub divergence_lookback: usize,
}

const VOLUME_WINDOW: usize = 20;

impl Default for ModerateParams {
    fn default() -> Self {
        Self {
            ema_fast: 8,
            ema_slow: 34,
            rsi_period: 14,
            rsi_bullish: 50.0,
            rsi_bearish: 50.0,
            trend_ema: 50,
            stop_loss_pct: 0.015,
            take_profit_pct: 0.0375,
            leverage: 2.0,
            max_hold_period: 16,
            trend_mode: TrendMode::Price,
            volume_spike: 0.0,
            min_candle_body: 0.0,
            session_filter: false,
            session_start: "12:00".into(),
            session_end: "20:00".into(),
            divergence_filter: false,
            divergence_lookback: 14,
        }
    }
}

impl ModerateParams {
    pub fn from_table(t: &Table) -> Result<Self> {
        let d = Self::default();
        let p = Self {
            ema_fast: read_usize(t, "ema_fast", d.ema_fast)?,
            ema_slow: read_usize(t, "ema_slow", d.ema_slow)?,
            rsi_period: read_usize(t, "rsi_period", d.rsi_period)?,
            rsi_bullish: read_f64(t, "rsi_bullish", d.rsi_bullish)?,
            rsi_bearish: read_f64(t, "rsi_bearish", d.rsi_bearish)?,
            trend_ema: read_usize(t, "trend_ema", d.trend_ema)?,
            stop_loss_pct: read_f64(t, "stop_loss_pct", d.stop_loss_pct)?,
            take_profit_pct: read_f64(t, "take_profit_pct", d.take_profit_pct)?,
            leverage: read_f64(t, "leverage", d.leverage)?,
            max_hold_period: read_usize(t, "max_hold_period", d.max_hold_period)?,
            trend_mode: read_string(t, "trend_mode", d.trend_mode.as_str())?.parse()?,
            volume_spike: read_f64(t, "volume_spike", d.volume_spike)?,
            min_candle_body: read_f64(t, "min_candle_body", d.min_candle_body)?,
            session_filter: read_bool(t, "session_filter", d.session_filter)?,
            session_start: read_string(t, "session_start", &d.session_start)?,
            session_end: read_string(t, "session_end", &d.session_end)?,
            divergence_filter: read_bool(t, "divergence_filter", d.divergence_filter)?,
            divergence_lookback: read_usize(t, "divergence_lookback", d.divergence_lookback)?,
        };
        p.validate()?;
        Ok(p)
    }

    fn validate(&self) -> Result<()> {
        ensure(self.ema_fast >= 1 && self.ema_fast < self.ema_slow, || {
            format!("need 1 <= ema_fast ({}) < ema_slow ({})", self.ema_fast, self.ema_slow)
        })?;
        ensure(self.rsi_period >= 2, || "rsi_period must be >= 2".into())?;
        ensure(
            (0.0..=100.0).contains(&self.rsi_bullish) && (0.0..=100.0).contains(&self.rsi_bearish),
            || "rsi thresholds must be within [0, 100]".into(),
        )?;
        ensure(self.trend_ema >= 2, || "trend_ema must be >= 2".into())?;
        ensure(self.stop_loss_pct > 0.0 && self.stop_loss_pct < 1.0, || {
            "stop_loss_pct must be in (0, 1)".into()
        })?;
        ensure(self.take_profit_pct > 0.0, || "take_profit_pct must be > 0".into())?;
        ensure(self.leverage >= 1.0, || "leverage must be >= 1".into())?;
        ensure(self.volume_spike >= 0.0 && self.min_candle_body >= 0.0, || {
            "volume_spike and min_candle_body must be >= 0".into()
        })?;
        ensure(self.max_hold_period >= 1, || "max_hold_period must be >= 1".into())?;
        ensure(self.divergence_lookback >= 1, || "divergence_lookback must be >= 1".into())?;
        self.session().map(|_| ())
    }

    fn session(&self) -> Result<TimeWindow> {
        TimeWindow::parse(&self.session_start, &self.session_end)
    }

    pub fn to_table(&self) -> Table {
        let mut t = Table::new();
        t.insert("ema_fast".into(), int(self.ema_fast));
        t.insert("ema_slow".into(), int(self.ema_slow));
        t.insert("rsi_period".into(), int(self.rsi_period));
        t.insert("rsi_bullish".into(), self.rsi_bullish.into());
        t.insert("rsi_bearish".into(), self.rsi_bearish.into());
        t.insert("trend_ema".into(), int(self.trend_ema));
        t.insert("stop_loss_pct".into(), self.stop_loss_pct.into());
        t.insert("take_profit_pct".into(), self.take_profit_pct.into());
        t.insert("leverage".into(), self.leverage.into());
        t.insert("max_hold_period".into(), int(self.max_hold_period));
        t.insert("trend_mode".into(), self.trend_mode.as_str().into());
        t.insert("volume_spike".into(), self.volume_spike.into());
        t.insert("min_candle_body".into(), self.min_candle_body.into());
        t.insert("session_filter".into(), self.session_filter.into());
        t.insert("session_start".into(), self.session_start.clone().into());
        t.insert("session_end".into(), self.session_end.clone().into());
        t.insert("divergence_filter".into(), self.divergence_filter.into());
        t.insert("divergence_lookback".into(), int(self.divergence_lookback));
        t
    }

    pub fn required_bars(&self) -> usize {
        let mut needed = (self.ema_slow + 1).max(self.rsi_period + 1);
        if self.volume_spike > 0.0 {
            needed = needed.max(VOLUME_WINDOW);
        }
        if self.divergence_filter {
            needed = needed.max(self.rsi_period + self.divergence_lookback + 1);
        }
        needed
    }

    /// Trend bars needed: the EMA plus one more bar for the slope.
    pub fn required_trend_bars(&self) -> usize {
        self.trend_ema + 1
    }
}

pub struct ModerateStrategy {
    id: String,
    timeframe: Timeframe,
    trend_timeframe: Timeframe,
    params: Arc<ModerateParams>,
    book: StateBook,
}

impl ModerateStrategy {
    pub fn new(
        id: impl Into<String>,
        timeframe: Timeframe,
        trend_timeframe: Timeframe,
        params: ModerateParams,
    ) -> Self {
        Self {
            id: id.into(),
            timeframe,
            trend_timeframe,
            params: Arc::new(params),
            book: StateBook::default(),
        }
    }

    fn trend_agrees(params: &ModerateParams, direction: Direction, close: f64, trend: &Series) -> bool {
        let n = trend.len();
        let (Some(last), Some(prev)) = (last_value(trend), n.checked_sub(2).and_then(|i| trend[i])) else {
            return false;
        };
        match (params.trend_mode, direction) {
            (TrendMode::Price, Direction::Long) => close > last,
            (TrendMode::Price, Direction::Short) => close < last,
            (TrendMode::Slope, Direction::Long) => last > prev,
            (TrendMode::Slope, Direction::Short) => last < prev,
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
        let trend_closes = view.trend_closes().unwrap_or_default();
        let trend_needed = params.required_trend_bars();
        if trend_closes.len() < trend_needed {
            return Err(Error::insufficient(trend_needed, trend_closes.len()));
        }

        let fast = ema(&closes, params.ema_fast)?;
        let slow = ema(&closes, params.ema_slow)?;
        let rsi_series = rsi(&closes, params.rsi_period)?;
        let trend = ema(&trend_closes, params.trend_ema)?;
        let rsi_now = last_value(&rsi_series);

        let direction = crossover(&fast, &slow).direction().filter(|&dir| {
            let momentum = match (dir, rsi_now) {
                (Direction::Long, Some(r)) => r > params.rsi_bullish,
                (Direction::Short, Some(r)) => r < params.rsi_bearish,
                (_, None) => false,
            };
            momentum && Self::trend_agrees(&params, dir, bar.close, &trend)
        });
        let direction = match direction {
            Some(dir) if params.volume_spike > 0.0 => {
                volume_confirmed(&view.volumes(), VOLUME_WINDOW, params.volume_spike)?.then_some(dir)
            }
            other => other,
        }
        .filter(|_| params.min_candle_body <= 0.0 || candle_body_ratio(bar) >= params.min_candle_body)
        .filter(|&dir| {
            !params.divergence_filter
                || rsi_divergence(&closes, &rsi_series, params.divergence_lookback, dir)
        });
        // session is judged at the bar's close, so live and backtest agree
        let direction = match (direction, view.decision_time()) {
            (Some(dir), Some(at)) if params.session_filter => {
                params.session()?.contains(at).then_some(dir)
            }
            (other, _) => other,
        };

        let state = self.book.entry(symbol);
        state.last_bar = Some(bar.open_time);
        let Some(direction) = direction else {
            state.phase = Phase::Armed(None);
            return Ok(None);
        };
        state.phase = Phase::Signaled(direction);
        state.last_signal = Some((direction, bar.close_time(self.timeframe)));
        debug!(strategy = %self.id, symbol, %direction, "EMA cross confirmed");

        let (stop_loss, take_profit) =
            pct_levels(direction, bar.close, params.stop_loss_pct, params.take_profit_pct);
        let mut metadata = BTreeMap::new();
        for (key, value) in [
            ("ema_fast", last_value(&fast)),
            ("ema_slow", last_value(&slow)),
            ("rsi", rsi_now),
            ("trend_ema", last_value(&trend)),
        ] {
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

impl Strategy for ModerateStrategy {
    fn id(&self) -> &str {
        &self.id
    }

    fn profile(&self) -> RiskProfile {
        RiskProfile::Moderate
    }

    fn timeframe(&self) -> Timeframe {
        self.timeframe
    }

    fn trend_timeframe(&self) -> Option<Timeframe> {
        Some(self.trend_timeframe)
    }

    fn lookback(&self) -> usize {
        DEFAULT_LOOKBACK.max(self.params.required_bars())
    }

    fn trend_lookback(&self) -> usize {
        DEFAULT_LOOKBACK.max(self.params.required_trend_bars())
    }

    fn evaluate(&mut self, symbol: &str, view: &MarketView<'_>) -> Result<Option<Signal>> {
        let outcome = self.evaluate_bar(symbol, view);
        self.book.observe(&outcome);
        outcome
    }

    fn update_parameters(&mut self, changes: &Table) -> Result<()> {
        let next = ModerateParams::from_table(&merged(self.params.to_table(), changes))?;
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

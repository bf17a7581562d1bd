use std::cmp::Reverse;
use std::collections::{BTreeMap, BinaryHeap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use common::{Candle, Direction, Error, Result, Signal, Timeframe};
use risk::{check_bracket, pnl, r_multiple, trail_stop, ExitReason};
use strategy::indicators::{atr, last_value};
use strategy::{CandleSeries, MarketView, Strategy};

use crate::config::BacktestConfig;
use crate::report::{breakdown_by_strategy, compute_metrics, BacktestReport, EquityPoint, TradeRecord};

/// Candle history keyed by symbol and timeframe.
#[derive(Debug, Clone, Default)]
pub struct HistoricalData {
    series: BTreeMap<(String, Timeframe), Vec<Candle>>,
}

impl HistoricalData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store raw rows, normalised the same way live series are.
    pub fn insert(&mut self, symbol: &str, timeframe: Timeframe, candles: Vec<Candle>) {
        let capacity = candles.len().max(1);
        let series = CandleSeries::from_candles(symbol, timeframe, candles, capacity);
        self.series
            .insert((symbol.to_string(), timeframe), series.candles().to_vec());
    }

    pub fn get(&self, symbol: &str, timeframe: Timeframe) -> &[Candle] {
        self.series
            .get(&(symbol.to_string(), timeframe))
            .map_or(&[], Vec::as_slice)
    }

    pub fn contains(&self, symbol: &str, timeframe: Timeframe) -> bool {
        self.series.contains_key(&(symbol.to_string(), timeframe))
    }
}

/// Symbols and time range to replay. Bars opening before `start` only warm
/// the strategies up; bars closing after `end` are never seen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestRequest {
    pub symbols: Vec<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl BacktestRequest {
    pub fn validate(&self) -> Result<()> {
        if self.symbols.is_empty() {
            return Err(Error::config("backtest needs at least one symbol"));
        }
        if self.start >= self.end {
            return Err(Error::config(format!(
                "backtest start {} is not before end {}",
                self.start, self.end
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct Position {
    direction: Direction,
    entry_time: DateTime<Utc>,
    entry_price: f64,
    /// Remaining size after any scale-outs.
    size: f64,
    /// Current stop; differs from `initial_stop` once trailed.
    stop_loss: f64,
    initial_stop: f64,
    take_profit: f64,
    max_hold: usize,
    bars_held: usize,
    /// Scale levels already taken.
    scaled: usize,
}

/// Replay position of one (strategy, symbol) pair. Holds at most one
/// simulated position.
struct Cursor<'a> {
    strategy: usize,
    strategy_id: String,
    symbol: &'a str,
    timeframe: Timeframe,
    candles: &'a [Candle],
    trend: Option<(Timeframe, &'a [Candle])>,
    next: usize,
    position: Option<Position>,
}

#[derive(Debug)]
struct Ledger {
    equity: f64,
    trades: Vec<TradeRecord>,
    curve: Vec<EquityPoint>,
    signals: usize,
    skipped: usize,
}

/// Deterministic single-threaded replay of historical candles through live
/// strategy instances.
///
/// Bars of every (strategy, symbol) pair are merged by close time, ties
/// broken by registration order, so the same inputs always produce the same
/// ledger. On each bar the open position is checked first (bracket, then
/// holding limit, then scale-outs and the trailing stop at the close), then
/// the strategy evaluates the bar.
pub struct Simulator {
    config: BacktestConfig,
}

impl Simulator {
    pub fn new(config: BacktestConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    /// Replay `request` through `strategies`. Every strategy is reset first.
    pub fn run(
        &self,
        strategies: &mut [Box<dyn Strategy>],
        data: &HistoricalData,
        request: &BacktestRequest,
    ) -> Result<BacktestReport> {
        request.validate()?;
        let mut ids = HashSet::new();
        for s in strategies.iter_mut() {
            if !ids.insert(s.id().to_string()) {
                return Err(Error::DuplicateStrategyId(s.id().to_string()));
            }
            s.reset_all();
        }

        let mut cursors = Vec::new();
        for (i, s) in strategies.iter().enumerate() {
            for symbol in &request.symbols {
                let tf = s.timeframe();
                let all = data.get(symbol, tf);
                if all.is_empty() {
                    warn!(strategy = %s.id(), symbol = %symbol, timeframe = %tf, "No history, pair not replayed");
                }
                let in_range = all.partition_point(|c| c.close_time(tf) <= request.end);
                cursors.push(Cursor {
                    strategy: i,
                    strategy_id: s.id().to_string(),
                    symbol,
                    timeframe: tf,
                    candles: &all[..in_range],
                    trend: s.trend_timeframe().map(|ttf| (ttf, data.get(symbol, ttf))),
                    next: 0,
                    position: None,
                });
            }
        }

        info!(
            strategies = ?strategies.iter().map(|s| s.id()).collect::<Vec<_>>(),
            symbols = ?request.symbols,
            start = %request.start,
            end = %request.end,
            "Backtest started"
        );

        let mut heap = BinaryHeap::new();
        for (ci, c) in cursors.iter().enumerate() {
            if let Some(first) = c.candles.first() {
                heap.push(Reverse((first.close_time(c.timeframe), ci)));
            }
        }

        let mut ledger = Ledger {
            equity: self.config.initial_equity,
            trades: Vec::new(),
            curve: vec![EquityPoint { time: request.start, equity: self.config.initial_equity }],
            signals: 0,
            skipped: 0,
        };

        while let Some(Reverse((now, ci))) = heap.pop() {
            let cursor = &mut cursors[ci];
            let idx = cursor.next;
            let candles = cursor.candles;
            let bar = candles[idx];
            cursor.next += 1;
            if let Some(next) = candles.get(cursor.next) {
                heap.push(Reverse((next.close_time(cursor.timeframe), ci)));
            }

            self.manage_position(cursor, idx, now, &mut ledger);

            let strategy = &mut strategies[cursor.strategy];
            let mut view = MarketView::aligned(cursor.timeframe, &candles[..=idx], now, strategy.lookback());
            if let Some((ttf, trend)) = cursor.trend {
                view = view.with_trend(ttf, trend, strategy.trend_lookback());
            }

            let signal = match strategy.evaluate(cursor.symbol, &view) {
                Ok(Some(signal)) => signal,
                Ok(None) => continue,
                Err(e @ Error::InsufficientData { .. }) => {
                    debug!(strategy = %cursor.strategy_id, symbol = %cursor.symbol, error = %e, "Warming up");
                    ledger.skipped += 1;
                    continue;
                }
                Err(e) => {
                    warn!(strategy = %cursor.strategy_id, symbol = %cursor.symbol, error = %e, "Evaluation failed");
                    ledger.skipped += 1;
                    continue;
                }
            };

            if bar.open_time < request.start {
                debug!(strategy = %cursor.strategy_id, symbol = %cursor.symbol, at = %now, "Warm-up signal discarded");
                continue;
            }
            ledger.signals += 1;
            self.on_signal(cursor, &signal, now, &mut ledger);
        }

        for cursor in cursors.iter_mut() {
            if let Some(last) = cursor.candles.last().copied() {
                if cursor.position.is_some() {
                    self.close(cursor, ExitReason::EndOfData, last.close, last.close_time(cursor.timeframe), &mut ledger);
                }
            }
        }

        let metrics = compute_metrics(
            &ledger.trades,
            &ledger.curve,
            self.config.initial_equity,
            ledger.signals,
            ledger.skipped,
        );
        info!(
            trades = metrics.total_trades,
            win_rate = metrics.win_rate,
            final_equity = metrics.final_equity,
            max_drawdown_pct = metrics.max_drawdown_pct,
            "Backtest finished"
        );

        Ok(BacktestReport {
            start: request.start,
            end: request.end,
            symbols: request.symbols.clone(),
            strategies: strategies.iter().map(|s| s.id().to_string()).collect(),
            config: self.config.clone(),
            per_strategy: breakdown_by_strategy(&ledger.trades),
            trades: ledger.trades,
            equity_curve: ledger.curve,
            metrics,
        })
    }

    /// Bracket first, holding limit second, then scale-outs and the trailing
    /// stop at the bar's close. Runs on every bar after entry.
    fn manage_position(&self, cursor: &mut Cursor<'_>, idx: usize, now: DateTime<Utc>, ledger: &mut Ledger) {
        let candles = cursor.candles;
        let bar = &candles[idx];
        let Some(pos) = cursor.position.as_mut() else { return };
        pos.bars_held += 1;

        let trailed = pos.stop_loss != pos.initial_stop;
        let exit = match check_bracket(pos.direction, pos.stop_loss, pos.take_profit, bar) {
            Some((ExitReason::StopLoss, price)) if trailed => Some((ExitReason::TrailingStop, price)),
            Some(hit) => Some(hit),
            None if pos.bars_held >= pos.max_hold => Some((ExitReason::Timeout, bar.close)),
            None => None,
        };
        if let Some((reason, price)) = exit {
            self.close(cursor, reason, price, now, ledger);
            return;
        }

        self.scale_out(cursor, bar.close, now, ledger);

        let Some(multiple) = self.config.trailing_stop_atr else { return };
        let period = self.config.atr_period;
        // no trailing until the ATR window is filled
        let Ok(series) = atr(&candles[idx.saturating_sub(period)..=idx], period) else { return };
        let (Some(range), Some(pos)) = (last_value(&series), cursor.position.as_mut()) else { return };
        let stop = trail_stop(pos.direction, pos.stop_loss, bar.close, range, multiple);
        if stop != pos.stop_loss {
            debug!(strategy = %cursor.strategy_id, symbol = %cursor.symbol, from = pos.stop_loss, to = stop, "Stop trailed");
            pos.stop_loss = stop;
        }
    }

    /// Take every configured profit level reached at `price`.
    fn scale_out(&self, cursor: &mut Cursor<'_>, price: f64, now: DateTime<Utc>, ledger: &mut Ledger) {
        let levels = &self.config.profit_scaling;
        loop {
            let Some(pos) = cursor.position.as_mut() else { return };
            let Some(level) = levels.get(pos.scaled) else { return };
            let reached = r_multiple(pos.direction, pos.entry_price, pos.initial_stop, price)
                .is_some_and(|r| r >= level.r_multiple);
            if !reached {
                return;
            }
            pos.scaled += 1;

            if level.close_fraction >= 1.0 {
                self.close(cursor, ExitReason::ScaleOut, price, now, ledger);
                return;
            }
            let part = pos.size * level.close_fraction;
            let snapshot = pos.clone();
            pos.size -= part;
            self.book(&cursor.strategy_id, cursor.symbol, &snapshot, part, ExitReason::ScaleOut, price, now, ledger);
        }
    }

    fn on_signal(&self, cursor: &mut Cursor<'_>, signal: &Signal, now: DateTime<Utc>, ledger: &mut Ledger) {
        match cursor.position.as_ref().map(|p| p.direction) {
            Some(held) if held == signal.direction => {
                debug!(strategy = %cursor.strategy_id, symbol = %cursor.symbol, "Already positioned, signal ignored");
                return;
            }
            Some(_) => self.close(cursor, ExitReason::OpposingSignal, signal.price, now, ledger),
            None => {}
        }

        let entry = self.config.fill_price(signal.price, signal.direction, true);
        let size = self
            .config
            .risk
            .position_size(ledger.equity, entry, signal.stop_loss, signal.leverage);
        if size <= 0.0 {
            warn!(
                strategy = %cursor.strategy_id,
                symbol = %cursor.symbol,
                equity = ledger.equity,
                entry,
                stop = signal.stop_loss,
                "Zero position size, signal not traded"
            );
            return;
        }

        debug!(
            strategy = %cursor.strategy_id,
            symbol = %cursor.symbol,
            direction = %signal.direction,
            entry,
            size,
            "Position opened"
        );
        cursor.position = Some(Position {
            direction: signal.direction,
            entry_time: now,
            entry_price: entry,
            size,
            stop_loss: signal.stop_loss,
            initial_stop: signal.stop_loss,
            take_profit: signal.take_profit,
            max_hold: signal
                .max_hold_bars
                .unwrap_or(self.config.default_max_hold_bars)
                .max(1),
            bars_held: 0,
            scaled: 0,
        });
    }

    fn close(
        &self,
        cursor: &mut Cursor<'_>,
        reason: ExitReason,
        price: f64,
        at: DateTime<Utc>,
        ledger: &mut Ledger,
    ) {
        let Some(pos) = cursor.position.take() else { return };
        self.book(&cursor.strategy_id, cursor.symbol, &pos, pos.size, reason, price, at, ledger);
    }

    /// Realize `size` units of `pos` at `price` and append the trade.
    #[allow(clippy::too_many_arguments)]
    fn book(
        &self,
        strategy_id: &str,
        symbol: &str,
        pos: &Position,
        size: f64,
        reason: ExitReason,
        price: f64,
        at: DateTime<Utc>,
        ledger: &mut Ledger,
    ) {
        let exit = self.config.fill_price(price, pos.direction, false);
        let realized = pnl(pos.direction, pos.entry_price, exit, size);
        ledger.equity += realized;

        let record = TradeRecord {
            id: ledger.trades.len() + 1,
            strategy_id: strategy_id.to_string(),
            symbol: symbol.to_string(),
            direction: pos.direction,
            entry_time: pos.entry_time,
            entry_price: pos.entry_price,
            exit_time: at,
            exit_price: exit,
            size,
            stop_loss: pos.stop_loss,
            take_profit: pos.take_profit,
            pnl: realized,
            return_pct: realized / (pos.entry_price * size),
            bars_held: pos.bars_held,
            exit_reason: reason,
        };
        debug!(
            strategy = %record.strategy_id,
            symbol = %record.symbol,
            reason = %reason,
            pnl = realized,
            equity = ledger.equity,
            "Position closed"
        );
        ledger.trades.push(record);
        ledger.curve.push(EquityPoint { time: at, equity: ledger.equity });
    }
}

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};

use backtest::{run_backtest_from_source, BacktestConfig, BacktestRequest, HistoricalData, Simulator};
use common::{Candle, Direction, Error, MarketDataSource, Result, Timeframe};
use risk::ExitReason;
use strategy::conservative::{ConservativeParams, ConservativeStrategy};
use strategy::moderate::{ModerateParams, ModerateStrategy};
use strategy::Strategy;

const TF: Timeframe = Timeframe::H4;
const BARS: usize = 120;

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn open_of(i: usize) -> DateTime<Utc> {
    t0() + TF.duration() * i as i32
}

fn close_of(i: usize) -> DateTime<Utc> {
    open_of(i + 1)
}

fn flat_bar(i: usize, close: f64) -> Candle {
    Candle { open_time: open_of(i), open: close, high: close, low: close, close, volume: 1_000.0 }
}

/// Flat at 100, a short rally from bar 40, then a steady slide from bar 46.
/// SMA5/SMA20: golden cross at bar 40 (close 100.2), death cross at bar 49
/// (close 99.2), nothing after.
fn cross_path() -> Vec<Candle> {
    (0..BARS)
        .map(|i| {
            let close = match i {
                0..=39 => 100.0,
                40..=45 => 100.0 + (i - 39) as f64 * 0.2,
                _ => 101.2 - (i - 45) as f64 * 0.5,
            };
            flat_bar(i, close)
        })
        .collect()
}

fn params(max_hold: usize) -> ConservativeParams {
    ConservativeParams {
        sma_fast: 5,
        sma_slow: 20,
        stop_buffer_pct: 0.1,
        take_profit_pct: 0.5,
        max_hold_period: max_hold,
        ..Default::default()
    }
}

fn strategy(id: &str, max_hold: usize) -> Box<dyn Strategy> {
    Box::new(ConservativeStrategy::new(id, TF, params(max_hold)))
}

fn data(candles: Vec<Candle>) -> HistoricalData {
    let mut data = HistoricalData::new();
    data.insert("BTCUSDT", TF, candles);
    data
}

fn request(start: DateTime<Utc>) -> BacktestRequest {
    BacktestRequest {
        symbols: vec!["BTCUSDT".into()],
        start,
        end: close_of(BARS - 1),
    }
}

fn run(strategies: &mut [Box<dyn Strategy>], data: &HistoricalData, config: BacktestConfig) -> backtest::BacktestReport {
    Simulator::new(config).unwrap().run(strategies, data, &request(t0())).unwrap()
}

#[test]
fn golden_then_death_cross_yields_two_trades() {
    let report = run(&mut [strategy("cons", 200)], &data(cross_path()), BacktestConfig::default());

    assert_eq!(report.trades.len(), 2);
    let (first, second) = (&report.trades[0], &report.trades[1]);

    assert_eq!(first.direction, Direction::Long);
    assert_eq!(first.entry_time, close_of(40));
    assert!((first.entry_price - 100.2).abs() < 1e-9);
    assert_eq!(first.exit_reason, ExitReason::OpposingSignal);
    assert_eq!(first.exit_time, close_of(49));
    assert!((first.exit_price - 99.2).abs() < 1e-9);
    assert!(first.pnl < 0.0);

    assert_eq!(second.direction, Direction::Short);
    assert_eq!(second.entry_time, first.exit_time);
    assert_eq!(second.exit_reason, ExitReason::EndOfData);
    assert_eq!(second.exit_time, close_of(BARS - 1));
    assert!(second.pnl > 0.0);

    let m = &report.metrics;
    assert_eq!(m.signals_emitted, 2);
    assert_eq!(m.wins, 1);
    assert_eq!(m.win_rate, 0.5);
    assert!((m.max_drawdown + first.pnl).abs() < 1e-9);
    assert!(m.max_drawdown_pct > 0.0);
    assert!(m.profit_factor.unwrap() > 1.0);
    assert!(m.volatility.unwrap() > 0.0);
    assert!(m.sharpe_ratio.is_some());
    assert!((m.final_equity - (10_000.0 + first.pnl + second.pnl)).abs() < 1e-9);

    // initial point plus one per close
    assert_eq!(report.equity_curve.len(), 3);
    assert_eq!(report.equity_curve[0].equity, 10_000.0);
}

#[test]
fn position_is_sized_from_stop_distance() {
    let report = run(&mut [strategy("cons", 200)], &data(cross_path()), BacktestConfig::default());
    let first = &report.trades[0];
    // 2% of 10k over the stop distance, well under 1x notional
    let expected = 200.0 / (first.entry_price - first.stop_loss);
    assert!((first.size - expected).abs() < 1e-9);
    assert!(first.size * first.entry_price <= 10_000.0);
}

#[test]
fn replay_is_deterministic() {
    let d = data(cross_path());
    let a = run(&mut [strategy("cons", 200)], &d, BacktestConfig::default());
    let b = run(&mut [strategy("cons", 200)], &d, BacktestConfig::default());
    assert_eq!(a.to_json().unwrap(), b.to_json().unwrap());

    // reusing the same instances resets their state first
    let mut reused = [strategy("cons", 200)];
    let c = run(&mut reused, &d, BacktestConfig::default());
    let again = run(&mut reused, &d, BacktestConfig::default());
    assert_eq!(c.trades, again.trades);
    assert_eq!(a.trades, c.trades);
}

/// Flat at 100 until bar 39, a one-point-per-bar rally to 120 at bar 59,
/// then a one-point slide. Bars span the close by half a point. SMA5/SMA20:
/// golden cross at bar 40 (close 101, stop 90.045), death cross at bar 67
/// (close 112).
fn rally_path() -> Vec<Candle> {
    (0..BARS)
        .map(|i| {
            let close = match i {
                0..=39 => 100.0,
                40..=59 => 100.0 + (i - 39) as f64,
                _ => 120.0 - (i - 59) as f64,
            };
            Candle { high: close + 0.5, low: close - 0.5, ..flat_bar(i, close) }
        })
        .collect()
}

#[test]
fn trailing_stop_locks_in_rally_profit() {
    let d = data(rally_path());
    let fixed = run(&mut [strategy("cons", 200)], &d, BacktestConfig::default());
    assert_eq!(fixed.trades[0].exit_reason, ExitReason::OpposingSignal);
    assert_eq!(fixed.trades[0].exit_time, close_of(67));

    let config = BacktestConfig { trailing_stop_atr: Some(2.5), ..Default::default() };
    let report = run(&mut [strategy("cons", 200)], &d, config);

    assert_eq!(report.trades.len(), 2);
    let first = &report.trades[0];
    assert_eq!(first.direction, Direction::Long);
    assert_eq!(first.entry_time, close_of(40));
    // ATR14 is 1.5 on the rally, so the stop settles at 120 - 3.75
    assert!((first.stop_loss - 116.25).abs() < 1e-9);
    assert_eq!(first.exit_reason, ExitReason::TrailingStop);
    assert_eq!(first.exit_time, close_of(63));
    // bar 63 opens through the stop
    assert_eq!(first.exit_price, 116.0);
    assert!(first.pnl > fixed.trades[0].pnl);

    assert_eq!(report.trades[1].direction, Direction::Short);
    assert_eq!(report.trades[1].entry_time, close_of(67));
    assert_eq!(report.trades[1].exit_reason, ExitReason::EndOfData);
}

#[test]
fn untrailed_stop_reports_plain_stop_loss() {
    let mut candles = rally_path();
    // a trail this wide never moves the stop
    candles[41] = flat_bar(41, 80.0);
    let config = BacktestConfig { trailing_stop_atr: Some(50.0), ..Default::default() };
    let report = run(&mut [strategy("cons", 200)], &data(candles), config);

    let first = &report.trades[0];
    assert_eq!(first.exit_reason, ExitReason::StopLoss);
    assert_eq!(first.exit_time, close_of(41));
}

#[test]
fn profit_scaling_closes_part_and_lets_the_rest_run() {
    let config = BacktestConfig {
        profit_scaling: vec![risk::ScaleLevel { r_multiple: 1.0, close_fraction: 0.5 }],
        ..Default::default()
    };
    let report = run(&mut [strategy("cons", 200)], &data(rally_path()), config);

    assert_eq!(report.trades.len(), 3);
    let (part, rest) = (&report.trades[0], &report.trades[1]);

    // 1R is 10.955 above the 101 entry; first close past it is bar 51
    assert_eq!(part.exit_reason, ExitReason::ScaleOut);
    assert_eq!(part.exit_time, close_of(51));
    assert_eq!(part.exit_price, 112.0);
    assert_eq!(part.entry_time, rest.entry_time);
    assert!((part.size - rest.size).abs() < 1e-9);
    let full = 200.0 / (101.0 - 90.045);
    assert!((part.size + rest.size - full).abs() < 1e-9);

    assert_eq!(rest.exit_reason, ExitReason::OpposingSignal);
    assert_eq!(rest.exit_time, close_of(67));
    assert_eq!(report.trades[2].direction, Direction::Short);

    let m = &report.metrics;
    assert_eq!(m.total_trades, 3);
    assert!((m.final_equity - (10_000.0 + report.trades.iter().map(|t| t.pnl).sum::<f64>())).abs() < 1e-9);
    assert_eq!(report.equity_curve.len(), 4);
}

#[test]
fn full_size_scale_level_closes_the_position() {
    let config = BacktestConfig {
        profit_scaling: vec![risk::ScaleLevel { r_multiple: 1.0, close_fraction: 1.0 }],
        ..Default::default()
    };
    let report = run(&mut [strategy("cons", 200)], &data(rally_path()), config);

    let first = &report.trades[0];
    assert_eq!(first.exit_reason, ExitReason::ScaleOut);
    assert_eq!(first.exit_time, close_of(51));
    // flat until the death cross opens the short
    assert_eq!(report.trades[1].entry_time, close_of(67));
}

#[test]
fn holding_limit_closes_by_timeout() {
    let report = run(&mut [strategy("cons", 3)], &data(cross_path()), BacktestConfig::default());

    assert_eq!(report.trades.len(), 2);
    assert_eq!(report.trades[0].exit_reason, ExitReason::Timeout);
    assert_eq!(report.trades[0].bars_held, 3);
    assert_eq!(report.trades[0].exit_time, close_of(43));
    assert_eq!(report.trades[1].direction, Direction::Short);
    assert_eq!(report.trades[1].exit_reason, ExitReason::Timeout);
}

#[test]
fn gap_through_stop_fills_at_open() {
    let mut candles = cross_path();
    candles[44] = flat_bar(44, 80.0);
    let report = run(&mut [strategy("cons", 200)], &data(candles), BacktestConfig::default());

    let first = &report.trades[0];
    assert_eq!(first.exit_reason, ExitReason::StopLoss);
    assert_eq!(first.exit_price, 80.0);
    assert_eq!(first.exit_time, close_of(44));
}

#[test]
fn warm_up_signals_do_not_trade() {
    let d = data(cross_path());
    let mut strategies = [strategy("cons", 200)];
    let report = Simulator::new(BacktestConfig::default())
        .unwrap()
        .run(&mut strategies, &d, &request(open_of(45)))
        .unwrap();

    assert_eq!(report.trades.len(), 1);
    assert_eq!(report.trades[0].direction, Direction::Short);
    assert_eq!(report.metrics.signals_emitted, 1);
}

#[test]
fn slippage_is_charged_on_both_legs() {
    let config = BacktestConfig { slippage_bps: 10.0, ..Default::default() };
    let report = run(&mut [strategy("cons", 200)], &data(cross_path()), config);

    let first = &report.trades[0];
    assert!((first.entry_price - 100.2 * 1.001).abs() < 1e-9);
    assert!((first.exit_price - 99.2 * 0.999).abs() < 1e-9);
}

#[test]
fn strategies_are_broken_down_separately() {
    let mut strategies = [strategy("slow-exit", 200), strategy("fast-exit", 3)];
    let report = run(&mut strategies, &data(cross_path()), BacktestConfig::default());

    assert_eq!(report.trades.len(), 4);
    assert_eq!(report.per_strategy.len(), 2);
    assert_eq!(report.per_strategy["slow-exit"].trades, 2);
    assert_eq!(report.per_strategy["fast-exit"].trades, 2);
    // the 3-bar exit closes first
    assert_eq!(report.trades[0].strategy_id, "fast-exit");
    let ids: Vec<usize> = report.trades.iter().map(|t| t.id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4]);
}

#[test]
fn duplicate_strategy_ids_are_rejected() {
    let mut strategies = [strategy("cons", 200), strategy("cons", 3)];
    let err = Simulator::new(BacktestConfig::default())
        .unwrap()
        .run(&mut strategies, &data(cross_path()), &request(t0()))
        .unwrap_err();
    assert!(matches!(err, Error::DuplicateStrategyId(_)));
}

#[test]
fn missing_history_produces_empty_report() {
    let report = run(&mut [strategy("cons", 200)], &HistoricalData::new(), BacktestConfig::default());
    assert!(report.trades.is_empty());
    assert_eq!(report.metrics.final_equity, 10_000.0);
}

fn bars_at(tf: Timeframe, first_open: DateTime<Utc>, closes: &[f64]) -> Vec<Candle> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| Candle {
            open_time: first_open + tf.duration() * i as i32,
            open: close,
            high: close,
            low: close,
            close,
            volume: 1_000.0,
        })
        .collect()
}

/// 15m breakout: flat at 100, then one point per bar from bar 30. EMA3/EMA8
/// cross up once, on bar 30, which closes at 07:45.
fn moderate_data(trend_closes: &[f64], last_trend_close: f64) -> HistoricalData {
    let primary: Vec<f64> = (0..60).map(|i| if i < 30 { 100.0 } else { 100.0 + (i - 29) as f64 }).collect();
    // 4h history ending with the 00:00 and 04:00 buckets
    let n = trend_closes.len();
    let mut trend: Vec<f64> = trend_closes.to_vec();
    trend.push(last_trend_close);
    let first_open = t0() - Timeframe::H4.duration() * (n as i32 - 1);

    let mut data = HistoricalData::new();
    data.insert("ETHUSDT", Timeframe::M15, bars_at(Timeframe::M15, t0(), &primary));
    data.insert("ETHUSDT", Timeframe::H4, bars_at(Timeframe::H4, first_open, &trend));
    data
}

fn moderate() -> Box<dyn Strategy> {
    let params = ModerateParams { ema_fast: 3, ema_slow: 8, rsi_period: 5, trend_ema: 3, ..Default::default() };
    Box::new(ModerateStrategy::new("mod", Timeframe::M15, Timeframe::H4, params))
}

fn run_moderate(data: &HistoricalData) -> backtest::BacktestReport {
    let req = BacktestRequest {
        symbols: vec!["ETHUSDT".into()],
        start: t0(),
        end: t0() + Timeframe::M15.duration() * 60,
    };
    Simulator::new(BacktestConfig::default()).unwrap().run(&mut [moderate()], data, &req).unwrap()
}

#[test]
fn moderate_trades_with_the_closed_4h_trend() {
    // the 04:00 bucket closes at 08:00, after the 07:45 cross, and must not
    // be seen; at 500 it would put price far below the trend EMA
    let report = run_moderate(&moderate_data(&[90.0, 91.0, 92.0, 93.0, 94.0, 95.0, 96.0], 500.0));

    assert_eq!(report.metrics.signals_emitted, 1);
    let first = &report.trades[0];
    assert_eq!(first.strategy_id, "mod");
    assert_eq!(first.direction, Direction::Long);
    assert_eq!(first.entry_time, t0() + Timeframe::M15.duration() * 31);
    assert_eq!(first.entry_price, 101.0);
}

#[test]
fn moderate_skips_the_cross_once_the_opposing_bucket_has_closed() {
    // same 500 close, but in the 00:00 bucket that closed at 04:00
    let report = run_moderate(&moderate_data(&[90.0, 91.0, 92.0, 93.0, 94.0, 95.0, 500.0], 96.0));
    assert!(report.trades.is_empty());
    assert_eq!(report.metrics.signals_emitted, 0);
}

#[test]
fn moderate_without_trend_history_never_trades() {
    let mut data = moderate_data(&[95.0], 96.0);
    data.insert("ETHUSDT", Timeframe::H4, Vec::new());
    let report = run_moderate(&data);
    assert!(report.trades.is_empty());
    assert!(report.metrics.skipped_evaluations > 0);
}

struct RangeSource {
    series: BTreeMap<Timeframe, Vec<Candle>>,
}

#[async_trait]
impl MarketDataSource for RangeSource {
    async fn fetch_candles(&self, _symbol: &str, _tf: Timeframe, _limit: usize) -> Result<Vec<Candle>> {
        Err(Error::DataUnavailable("range source only".into()))
    }

    async fn fetch_range(
        &self,
        _symbol: &str,
        timeframe: Timeframe,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Candle>> {
        Ok(self
            .series
            .get(&timeframe)
            .map(|all| all.iter().filter(|c| c.open_time >= start && c.open_time < end).copied().collect())
            .unwrap_or_default())
    }
}

#[tokio::test]
async fn source_entry_point_fetches_warm_up_history() {
    let source = RangeSource { series: BTreeMap::from([(TF, cross_path())]) };
    // range starts after the SMA20 warm-up; history before it is fetched too
    let req = BacktestRequest { start: open_of(30), ..request(t0()) };
    let report = run_backtest_from_source(&source, vec![strategy("cons", 200)], &req, BacktestConfig::default())
        .await
        .unwrap();

    assert_eq!(report.trades.len(), 2);
    assert_eq!(report.trades[0].entry_time, close_of(40));
    assert_eq!(report.start, open_of(30));
}

#[tokio::test]
async fn source_failure_aborts_the_run() {
    struct Down;

    #[async_trait]
    impl MarketDataSource for Down {
        async fn fetch_candles(&self, _: &str, _: Timeframe, _: usize) -> Result<Vec<Candle>> {
            Err(Error::DataUnavailable("down".into()))
        }
        async fn fetch_range(&self, _: &str, _: Timeframe, _: DateTime<Utc>, _: DateTime<Utc>) -> Result<Vec<Candle>> {
            Err(Error::DataUnavailable("down".into()))
        }
    }

    let err = run_backtest_from_source(&Down, vec![strategy("cons", 200)], &request(t0()), BacktestConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DataUnavailable(_)));
}

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use common::{Direction, Result};
use risk::{DrawdownTracker, ExitReason};

use crate::config::BacktestConfig;

/// One closed simulated position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Sequential within a run.
    pub id: usize,
    pub strategy_id: String,
    pub symbol: String,
    pub direction: Direction,
    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,
    pub exit_time: DateTime<Utc>,
    pub exit_price: f64,
    pub size: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub pnl: f64,
    /// PnL over entry notional.
    pub return_pct: f64,
    pub bars_held: usize,
    pub exit_reason: ExitReason,
}

impl TradeRecord {
    pub fn is_win(&self) -> bool {
        self.pnl > 0.0
    }

    pub fn is_loss(&self) -> bool {
        self.pnl < 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub time: DateTime<Utc>,
    pub equity: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyBreakdown {
    pub trades: usize,
    pub wins: usize,
    pub win_rate: f64,
    pub total_pnl: f64,
    pub profit_factor: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub total_trades: usize,
    pub wins: usize,
    pub losses: usize,
    /// Trades closed at exactly zero PnL; neither wins nor losses.
    pub breakeven: usize,
    /// Wins over all trades, break-even ones included.
    pub win_rate: f64,
    pub gross_profit: f64,
    pub gross_loss: f64,
    /// Gross profit over gross loss; `None` without any losing trade.
    pub profit_factor: Option<f64>,
    pub total_pnl: f64,
    pub total_return_pct: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub max_drawdown: f64,
    pub max_drawdown_pct: f64,
    /// Population standard deviation of per-trade returns; `None` under the
    /// same conditions as `sharpe_ratio`.
    pub volatility: Option<f64>,
    /// Mean per-trade return over its standard deviation, not annualised.
    /// `None` with fewer than two trades or zero dispersion.
    pub sharpe_ratio: Option<f64>,
    pub final_equity: f64,
    pub signals_emitted: usize,
    pub skipped_evaluations: usize,
}

/// Everything a run produces, in serializable form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestReport {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub symbols: Vec<String>,
    pub strategies: Vec<String>,
    pub config: BacktestConfig,
    pub trades: Vec<TradeRecord>,
    pub equity_curve: Vec<EquityPoint>,
    pub metrics: Metrics,
    pub per_strategy: BTreeMap<String, StrategyBreakdown>,
}

impl BacktestReport {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn profit_factor(gross_profit: f64, gross_loss: f64) -> Option<f64> {
    (gross_loss > 0.0).then(|| gross_profit / gross_loss)
}

/// (volatility, sharpe) of per-trade returns.
fn return_stats(trades: &[TradeRecord]) -> (Option<f64>, Option<f64>) {
    if trades.len() < 2 {
        return (None, None);
    }
    let n = trades.len() as f64;
    let mean = trades.iter().map(|t| t.return_pct).sum::<f64>() / n;
    let variance = trades.iter().map(|t| (t.return_pct - mean).powi(2)).sum::<f64>() / n;
    let std = variance.sqrt();
    if !(std > 0.0) || !std.is_finite() {
        return (None, None);
    }
    (Some(std), Some(mean / std))
}

fn ratio(n: usize, d: usize) -> f64 {
    if d == 0 {
        0.0
    } else {
        n as f64 / d as f64
    }
}

/// Summary over the ledger and equity curve. Counters the ledger cannot
/// reconstruct are passed in.
pub fn compute_metrics(
    trades: &[TradeRecord],
    equity_curve: &[EquityPoint],
    initial_equity: f64,
    signals_emitted: usize,
    skipped_evaluations: usize,
) -> Metrics {
    let wins: Vec<f64> = trades.iter().filter(|t| t.is_win()).map(|t| t.pnl).collect();
    let losses: Vec<f64> = trades.iter().filter(|t| t.is_loss()).map(|t| t.pnl).collect();
    let breakeven = trades.len() - wins.len() - losses.len();
    let gross_profit: f64 = wins.iter().sum();
    let gross_loss: f64 = -losses.iter().sum::<f64>();
    let total_pnl = gross_profit - gross_loss;

    let mut drawdown = DrawdownTracker::new(initial_equity);
    for point in equity_curve {
        drawdown.update(point.equity);
    }
    let final_equity = equity_curve.last().map_or(initial_equity, |p| p.equity);
    let (volatility, sharpe_ratio) = return_stats(trades);

    Metrics {
        total_trades: trades.len(),
        wins: wins.len(),
        losses: losses.len(),
        breakeven,
        win_rate: ratio(wins.len(), trades.len()),
        gross_profit,
        gross_loss,
        profit_factor: profit_factor(gross_profit, gross_loss),
        total_pnl,
        total_return_pct: total_pnl / initial_equity,
        avg_win: if wins.is_empty() { 0.0 } else { gross_profit / wins.len() as f64 },
        avg_loss: if losses.is_empty() { 0.0 } else { -gross_loss / losses.len() as f64 },
        max_drawdown: drawdown.max_drawdown,
        max_drawdown_pct: drawdown.max_drawdown_pct,
        volatility,
        sharpe_ratio,
        final_equity,
        signals_emitted,
        skipped_evaluations,
    }
}

pub fn breakdown_by_strategy(trades: &[TradeRecord]) -> BTreeMap<String, StrategyBreakdown> {
    let mut out: BTreeMap<String, (StrategyBreakdown, f64, f64)> = BTreeMap::new();
    for t in trades {
        let (b, profit, loss) = out.entry(t.strategy_id.clone()).or_default();
        b.trades += 1;
        b.total_pnl += t.pnl;
        if t.is_win() {
            b.wins += 1;
            *profit += t.pnl;
        } else if t.is_loss() {
            *loss -= t.pnl;
        }
    }
    out.into_iter()
        .map(|(id, (mut b, profit, loss))| {
            b.win_rate = ratio(b.wins, b.trades);
            b.profit_factor = profit_factor(profit, loss);
            (id, b)
        })
        .collect()
}

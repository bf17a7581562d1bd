use serde::{Deserialize, Serialize};

use common::{Candle, Direction};

/// Why a simulated position was closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    Timeout,
    OpposingSignal,
    EndOfData,
    /// Stop hit after it was trailed away from its initial level.
    TrailingStop,
    /// Partial close at a profit level; the rest stays open.
    ScaleOut,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::StopLoss => write!(f, "stop_loss"),
            ExitReason::TakeProfit => write!(f, "take_profit"),
            ExitReason::Timeout => write!(f, "timeout"),
            ExitReason::OpposingSignal => write!(f, "opposing_signal"),
            ExitReason::EndOfData => write!(f, "end_of_data"),
            ExitReason::TrailingStop => write!(f, "trailing_stop"),
            ExitReason::ScaleOut => write!(f, "scale_out"),
        }
    }
}

/// Check a stop-loss / take-profit bracket against one candle.
///
/// Returns the exit reason and fill price. A candle that opens through a
/// level fills at the open. When both levels fall inside the same candle the
/// stop-loss wins, since the intrabar order is unknown.
pub fn check_bracket(
    direction: Direction,
    stop_loss: f64,
    take_profit: f64,
    candle: &Candle,
) -> Option<(ExitReason, f64)> {
    match direction {
        Direction::Long => {
            if candle.open <= stop_loss {
                Some((ExitReason::StopLoss, candle.open))
            } else if candle.low <= stop_loss {
                Some((ExitReason::StopLoss, stop_loss))
            } else if candle.open >= take_profit {
                Some((ExitReason::TakeProfit, candle.open))
            } else if candle.high >= take_profit {
                Some((ExitReason::TakeProfit, take_profit))
            } else {
                None
            }
        }
        Direction::Short => {
            if candle.open >= stop_loss {
                Some((ExitReason::StopLoss, candle.open))
            } else if candle.high >= stop_loss {
                Some((ExitReason::StopLoss, stop_loss))
            } else if candle.open <= take_profit {
                Some((ExitReason::TakeProfit, candle.open))
            } else if candle.low <= take_profit {
                Some((ExitReason::TakeProfit, take_profit))
            } else {
                None
            }
        }
    }
}

/// Stop trailed `multiple × atr` behind `close`. Only ever moves in the
/// trade's favour.
pub fn trail_stop(direction: Direction, current: f64, close: f64, atr: f64, multiple: f64) -> f64 {
    let candidate = close - direction.sign() * multiple * atr;
    match direction {
        Direction::Long => current.max(candidate),
        Direction::Short => current.min(candidate),
    }
}

/// Partial exit taken once price has moved `r_multiple` times the initial
/// risk (entry to initial stop) in favour.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScaleLevel {
    pub r_multiple: f64,
    /// Fraction of the remaining size closed at this level.
    pub close_fraction: f64,
}

/// Favourable move from `entry` to `price` in units of initial risk.
/// `None` for a zero-risk position.
pub fn r_multiple(direction: Direction, entry: f64, initial_stop: f64, price: f64) -> Option<f64> {
    let risk = (entry - initial_stop).abs();
    (risk > 0.0).then(|| direction.sign() * (price - entry) / risk)
}

/// Realized PnL of `size` units from `entry` to `exit`.
pub fn pnl(direction: Direction, entry: f64, exit: f64, size: f64) -> f64 {
    direction.sign() * (exit - entry) * size
}

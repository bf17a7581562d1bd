//! Position sizing, bracket exits and drawdown tracking for simulated trades.

pub mod drawdown;
pub mod exits;

pub use drawdown::DrawdownTracker;
pub use exits::{check_bracket, pnl, r_multiple, trail_stop, ExitReason, ScaleLevel};

use serde::{Deserialize, Serialize};
use tracing::debug;

use common::{Error, Result};

/// User-configurable sizing limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Fraction of equity lost if the stop is hit (e.g. 0.02 = 2%).
    pub risk_per_trade: f64,
    /// Hard ceiling on notional / equity regardless of the signal's hint.
    pub max_leverage: f64,
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            risk_per_trade: 0.02,
            max_leverage: 5.0,
        }
    }
}

impl RiskConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.risk_per_trade > 0.0 && self.risk_per_trade <= 1.0) {
            return Err(Error::config(format!(
                "risk_per_trade must be in (0, 1], got {}",
                self.risk_per_trade
            )));
        }
        if !(self.max_leverage >= 1.0) {
            return Err(Error::config(format!(
                "max_leverage must be >= 1, got {}",
                self.max_leverage
            )));
        }
        Ok(())
    }

    /// Units to trade so that hitting `stop` loses `equity × risk_per_trade`,
    /// clipped so notional never exceeds `equity × min(leverage, max_leverage)`.
    ///
    /// Returns 0 for a zero stop distance or non-positive inputs.
    pub fn position_size(&self, equity: f64, entry: f64, stop: f64, leverage: f64) -> f64 {
        let distance = (entry - stop).abs();
        if !(equity > 0.0 && entry > 0.0 && distance > 0.0) || !distance.is_finite() {
            return 0.0;
        }
        let risk_amount = equity * self.risk_per_trade;
        let by_risk = risk_amount / distance;

        let leverage = leverage.clamp(1.0, self.max_leverage.max(1.0));
        let by_leverage = equity * leverage / entry;

        let size = by_risk.min(by_leverage);
        if size < by_risk {
            debug!(by_risk, by_leverage, leverage, "Position size clipped by leverage");
        }
        if size.is_finite() {
            size
        } else {
            0.0
        }
    }
}

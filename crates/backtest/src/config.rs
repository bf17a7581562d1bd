use serde::{Deserialize, Serialize};

use common::{Error, Result};
use risk::{RiskConfig, ScaleLevel};

/// Simulation settings. All fields have defaults so a partial JSON/TOML
/// section is enough.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub initial_equity: f64,
    #[serde(flatten)]
    pub risk: RiskConfig,
    /// Holding limit for signals that carry no `max_hold_bars` hint.
    pub default_max_hold_bars: usize,
    /// Applied against the trader on entry and exit.
    pub slippage_bps: f64,
    /// Trail the stop this many ATRs behind the close. Off when unset.
    pub trailing_stop_atr: Option<f64>,
    pub atr_period: usize,
    /// Partial exits by R multiple, ascending. Each closes a fraction of
    /// what is left.
    pub profit_scaling: Vec<ScaleLevel>,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            initial_equity: 10_000.0,
            risk: RiskConfig::default(),
            default_max_hold_bars: 48,
            slippage_bps: 0.0,
            trailing_stop_atr: None,
            atr_period: 14,
            profit_scaling: Vec::new(),
        }
    }
}

impl BacktestConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.initial_equity > 0.0) || !self.initial_equity.is_finite() {
            return Err(Error::config(format!(
                "initial_equity must be > 0, got {}",
                self.initial_equity
            )));
        }
        if self.default_max_hold_bars == 0 {
            return Err(Error::config("default_max_hold_bars must be > 0"));
        }
        if !(0.0..1_000.0).contains(&self.slippage_bps) {
            return Err(Error::config(format!(
                "slippage_bps must be in [0, 1000), got {}",
                self.slippage_bps
            )));
        }
        if let Some(multiple) = self.trailing_stop_atr {
            if !(multiple > 0.0) || !multiple.is_finite() {
                return Err(Error::config(format!("trailing_stop_atr must be > 0, got {multiple}")));
            }
        }
        if self.atr_period == 0 {
            return Err(Error::config("atr_period must be > 0"));
        }
        let mut prev = 0.0;
        for level in &self.profit_scaling {
            if !(level.r_multiple > prev) {
                return Err(Error::config("profit_scaling r_multiple values must be positive and ascending"));
            }
            if !(level.close_fraction > 0.0 && level.close_fraction <= 1.0) {
                return Err(Error::config(format!(
                    "profit_scaling close_fraction must be in (0, 1], got {}",
                    level.close_fraction
                )));
            }
            prev = level.r_multiple;
        }
        self.risk.validate()
    }

    /// Fill price after slippage: entries pay up, exits give up.
    pub fn fill_price(&self, price: f64, direction: common::Direction, entry: bool) -> f64 {
        let against = if entry { direction.sign() } else { -direction.sign() };
        price * (1.0 + against * self.slippage_bps / 10_000.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Direction;

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: BacktestConfig =
            serde_json::from_str(r#"{"initial_equity": 5000, "risk_per_trade": 0.01}"#).unwrap();
        assert_eq!(cfg.initial_equity, 5_000.0);
        assert_eq!(cfg.risk.risk_per_trade, 0.01);
        assert_eq!(cfg.risk.max_leverage, 5.0);
        assert_eq!(cfg.slippage_bps, 0.0);
        assert_eq!(cfg.trailing_stop_atr, None);
        assert!(cfg.profit_scaling.is_empty());
        cfg.validate().unwrap();
    }

    #[test]
    fn exit_management_from_toml() {
        let cfg: BacktestConfig = toml::from_str(
            r#"
            trailing_stop_atr = 2.5
            profit_scaling = [
                { r_multiple = 1.5, close_fraction = 0.3 },
                { r_multiple = 3.0, close_fraction = 0.5 },
            ]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.trailing_stop_atr, Some(2.5));
        assert_eq!(cfg.atr_period, 14);
        assert_eq!(cfg.profit_scaling[1], ScaleLevel { r_multiple: 3.0, close_fraction: 0.5 });
        cfg.validate().unwrap();
    }

    #[test]
    fn rejects_bad_exit_management() {
        let level = |r_multiple, close_fraction| ScaleLevel { r_multiple, close_fraction };
        let bad = [
            BacktestConfig { trailing_stop_atr: Some(0.0), ..Default::default() },
            BacktestConfig { atr_period: 0, ..Default::default() },
            BacktestConfig { profit_scaling: vec![level(2.0, 0.5), level(1.0, 0.5)], ..Default::default() },
            BacktestConfig { profit_scaling: vec![level(1.0, 0.0)], ..Default::default() },
            BacktestConfig { profit_scaling: vec![level(1.0, 1.5)], ..Default::default() },
            BacktestConfig { profit_scaling: vec![level(-1.0, 0.5)], ..Default::default() },
        ];
        for cfg in bad {
            assert!(cfg.validate().is_err(), "{cfg:?}");
        }
    }

    #[test]
    fn slippage_always_costs_the_trader() {
        let cfg = BacktestConfig { slippage_bps: 10.0, ..Default::default() };
        assert!((cfg.fill_price(1000.0, Direction::Long, true) - 1001.0).abs() < 1e-9);
        assert!((cfg.fill_price(1000.0, Direction::Long, false) - 999.0).abs() < 1e-9);
        assert!((cfg.fill_price(1000.0, Direction::Short, true) - 999.0).abs() < 1e-9);
        assert!((cfg.fill_price(1000.0, Direction::Short, false) - 1001.0).abs() < 1e-9);
    }

    #[test]
    fn rejects_bad_settings() {
        assert!(BacktestConfig { initial_equity: 0.0, ..Default::default() }.validate().is_err());
        assert!(BacktestConfig { default_max_hold_bars: 0, ..Default::default() }.validate().is_err());
        let mut cfg = BacktestConfig::default();
        cfg.risk.risk_per_trade = 2.0;
        assert!(matches!(cfg.validate(), Err(Error::InvalidConfiguration(_))));
    }
}

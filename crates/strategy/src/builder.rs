use common::{Error, Result, RiskProfile, Timeframe};
use tracing::info;

use crate::aggressive::{AggressiveParams, AggressiveStrategy};
use crate::config::StrategyConfig;
use crate::conservative::{ConservativeParams, ConservativeStrategy};
use crate::moderate::{ModerateParams, ModerateStrategy};
use crate::Strategy;

/// Build a strategy instance from its config section.
///
/// Fails with `InvalidConfiguration` on out-of-range or mistyped parameters.
pub fn build_strategy(cfg: &StrategyConfig) -> Result<Box<dyn Strategy>> {
    cfg.validate()?;
    let settings = cfg.settings();

    let strategy: Box<dyn Strategy> = match cfg.strategy_type {
        RiskProfile::Aggressive => {
            if cfg.trend_timeframe.is_some() {
                return Err(Error::config(format!("{}: aggressive takes no trend_timeframe", cfg.id)));
            }
            let params = AggressiveParams::from_table(&settings)?;
            Box::new(AggressiveStrategy::new(&cfg.id, cfg.timeframe, params))
        }
        RiskProfile::Moderate => {
            let params = ModerateParams::from_table(&settings)?;
            let trend = cfg.trend_timeframe.unwrap_or(Timeframe::H4);
            if trend.minutes() <= cfg.timeframe.minutes() {
                return Err(Error::config(format!(
                    "{}: trend timeframe {trend} must be longer than {}",
                    cfg.id, cfg.timeframe
                )));
            }
            Box::new(ModerateStrategy::new(&cfg.id, cfg.timeframe, trend, params))
        }
        RiskProfile::Conservative => {
            if cfg.trend_timeframe.is_some() {
                return Err(Error::config(format!("{}: conservative takes no trend_timeframe", cfg.id)));
            }
            let params = ConservativeParams::from_table(&settings)?;
            Box::new(ConservativeStrategy::new(&cfg.id, cfg.timeframe, params))
        }
    };

    info!(
        id = %strategy.id(),
        profile = %strategy.profile(),
        timeframe = %strategy.timeframe(),
        "Built strategy"
    );
    Ok(strategy)
}

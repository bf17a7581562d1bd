pub mod aggressive;
pub mod builder;
pub mod config;
pub mod conservative;
pub mod indicators;
pub mod moderate;
pub mod params;
pub mod series;
pub mod state;

pub use aggressive::AggressiveStrategy;
pub use builder::build_strategy;
pub use config::{StrategyConfig, StrategyFileConfig};
pub use conservative::ConservativeStrategy;
pub use moderate::ModerateStrategy;
pub use series::{CandleSeries, MarketView, TrendView};
pub use state::Phase;

use std::collections::BTreeMap;

use common::{Result, RiskProfile, Signal, StrategyStats, Timeframe};

/// Minimum primary window handed to every strategy, live and in backtest.
pub const DEFAULT_LOOKBACK: usize = 200;

/// One risk profile's state machine.
///
/// An instance owns the per-symbol state of every symbol it evaluates.
/// Callers serialise access (`&mut self`), so evaluation, parameter reload
/// and reset never interleave for the same instance.
pub trait Strategy: Send + Sync {
    fn id(&self) -> &str;

    fn profile(&self) -> RiskProfile;

    /// Primary timeframe decisions are made on.
    fn timeframe(&self) -> Timeframe;

    /// Higher timeframe used as a filter, if any.
    fn trend_timeframe(&self) -> Option<Timeframe> {
        None
    }

    /// Closed primary candles wanted per evaluation.
    fn lookback(&self) -> usize;

    /// Closed trend candles wanted per evaluation.
    fn trend_lookback(&self) -> usize {
        0
    }

    /// Evaluate the latest closed candle in `view` for `symbol`.
    ///
    /// Returns at most one signal. A bar already processed for this symbol
    /// is a no-op. On error the symbol's state is left untouched.
    fn evaluate(&mut self, symbol: &str, view: &MarketView<'_>) -> Result<Option<Signal>>;

    /// Validate `changes` on top of the current parameters and swap the
    /// complete new set in; on error the current set stays active.
    fn update_parameters(&mut self, changes: &toml::Table) -> Result<()>;

    /// Current parameter and filter values.
    fn parameters(&self) -> toml::Table;

    /// Forget `symbol`'s state; it restarts Idle.
    fn reset(&mut self, symbol: &str);

    fn reset_all(&mut self);

    fn phase(&self, symbol: &str) -> Phase;

    fn phases(&self) -> BTreeMap<String, Phase>;

    fn statistics(&self) -> StrategyStats;
}

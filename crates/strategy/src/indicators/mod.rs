//! Stateless indicator functions over ordered (oldest first) sequences.
//!
//! Every function returns a series aligned index-for-index with its input.
//! Warm-up positions that cannot be computed yet are `None` and must not be
//! used for decisions.

pub mod adx;
pub mod atr;
pub mod crossover;
pub mod divergence;
pub mod ema;
pub mod filters;
pub mod rsi;
pub mod sma;
pub mod stoch_rsi;

pub use adx::{adx, Adx};
pub use atr::{atr, atr_pct, true_range};
pub use crossover::{cross, crossover, crossover_at, crossovers, Crossover};
pub use divergence::rsi_divergence;
pub use ema::ema;
pub use filters::{average_volume, candle_body_ratio, volume_confirmed, wick_confirms, TimeWindow};
pub use rsi::rsi;
pub use sma::sma;
pub use stoch_rsi::{stoch_rsi, StochRsi};

/// Indicator output aligned with its input; `None` during warm-up.
pub type Series = Vec<Option<f64>>;

/// Latest defined value of a series.
pub fn last_value(series: &[Option<f64>]) -> Option<f64> {
    series.last().copied().flatten()
}

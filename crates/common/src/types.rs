use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::Error;

/// One closed (or in-progress) OHLCV bucket.
///
/// Immutable once produced. The close time is derived from the series'
/// timeframe, see [`Candle::close_time`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn close_time(&self, timeframe: Timeframe) -> DateTime<Utc> {
        self.open_time + timeframe.duration()
    }

    /// True once the bucket has fully elapsed at `now`.
    pub fn is_closed_at(&self, timeframe: Timeframe, now: DateTime<Utc>) -> bool {
        self.close_time(timeframe) <= now
    }

    pub fn is_finite(&self) -> bool {
        [self.open, self.high, self.low, self.close, self.volume]
            .iter()
            .all(|v| v.is_finite())
    }
}

/// Bucket duration of a candle series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1m")]
    M1,
    #[serde(rename = "5m")]
    M5,
    #[serde(rename = "15m")]
    M15,
    #[serde(rename = "30m")]
    M30,
    #[serde(rename = "1h")]
    H1,
    #[serde(rename = "4h")]
    H4,
    #[serde(rename = "1d")]
    D1,
}

impl Timeframe {
    pub fn minutes(self) -> i64 {
        match self {
            Timeframe::M1 => 1,
            Timeframe::M5 => 5,
            Timeframe::M15 => 15,
            Timeframe::M30 => 30,
            Timeframe::H1 => 60,
            Timeframe::H4 => 240,
            Timeframe::D1 => 1440,
        }
    }

    pub fn duration(self) -> Duration {
        Duration::minutes(self.minutes())
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Timeframe::M1 => "1m",
            Timeframe::M5 => "5m",
            Timeframe::M15 => "15m",
            Timeframe::M30 => "30m",
            Timeframe::H1 => "1h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
        }
    }
}

impl std::fmt::Display for Timeframe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Timeframe {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1m" => Ok(Timeframe::M1),
            "5m" => Ok(Timeframe::M5),
            "15m" => Ok(Timeframe::M15),
            "30m" => Ok(Timeframe::M30),
            "1h" => Ok(Timeframe::H1),
            "4h" => Ok(Timeframe::H4),
            "1d" => Ok(Timeframe::D1),
            other => Err(Error::config(format!("unknown timeframe '{other}'"))),
        }
    }
}

/// Direction of a signal or simulated position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    pub fn opposite(self) -> Self {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
        }
    }

    /// +1 for long, -1 for short. Multiplies a price move into PnL.
    pub fn sign(self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Long => write!(f, "LONG"),
            Direction::Short => write!(f, "SHORT"),
        }
    }
}

/// Risk profile a strategy implements. One concrete state machine per profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskProfile {
    Aggressive,
    Moderate,
    Conservative,
}

impl RiskProfile {
    pub fn display_name(self) -> &'static str {
        match self {
            RiskProfile::Aggressive => "Aggressive Momentum Ignition",
            RiskProfile::Moderate => "Moderate EMA Crossover",
            RiskProfile::Conservative => "Conservative Trend Rider",
        }
    }

    pub fn risk_label(self) -> &'static str {
        match self {
            RiskProfile::Aggressive => "HIGH RISK",
            RiskProfile::Moderate => "MEDIUM RISK",
            RiskProfile::Conservative => "LOW RISK",
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            RiskProfile::Aggressive => "🚨",
            RiskProfile::Moderate => "⚖️",
            RiskProfile::Conservative => "🛡️",
        }
    }
}

impl std::fmt::Display for RiskProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskProfile::Aggressive => write!(f, "aggressive"),
            RiskProfile::Moderate => write!(f, "moderate"),
            RiskProfile::Conservative => write!(f, "conservative"),
        }
    }
}

impl FromStr for RiskProfile {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "aggressive" => Ok(RiskProfile::Aggressive),
            "moderate" => Ok(RiskProfile::Moderate),
            "conservative" => Ok(RiskProfile::Conservative),
            other => Err(Error::config(format!("unknown strategy type '{other}'"))),
        }
    }
}

/// Emitted by a strategy at most once per state transition into "signaled".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub strategy_id: String,
    pub symbol: String,
    pub direction: Direction,
    pub timeframe: Timeframe,
    /// Close of the decision candle.
    pub price: f64,
    /// Close time of the decision candle (never wall-clock).
    pub timestamp: DateTime<Utc>,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub leverage: f64,
    /// Holding limit hint in bars of `timeframe`, used by the simulator.
    pub max_hold_bars: Option<usize>,
    /// Indicator values observed at the decision candle.
    #[serde(default)]
    pub metadata: BTreeMap<String, f64>,
}

/// Formatted projection of a signal handed to the delivery collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertPayload {
    pub id: String,
    pub profile: RiskProfile,
    pub signal: Signal,
    pub message: String,
}

impl AlertPayload {
    pub fn new(profile: RiskProfile, signal: Signal, message: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            profile,
            signal,
            message,
        }
    }
}

/// Read-only counters a strategy exposes to the orchestrator.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StrategyStats {
    pub signals_generated: u64,
    pub last_signal_time: Option<DateTime<Utc>>,
    pub errors_count: u64,
    pub last_error: Option<String>,
}

impl StrategyStats {
    pub fn record_signal(&mut self, signal: &Signal) {
        self.signals_generated += 1;
        self.last_signal_time = Some(signal.timestamp);
    }

    pub fn record_error(&mut self, error: &Error) {
        self.errors_count += 1;
        self.last_error = Some(error.to_string());
    }
}

/// Current state of the scheduling engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    #[default]
    Stopped,
    Running,
    Paused,
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineState::Stopped => write!(f, "stopped"),
            EngineState::Running => write!(f, "running"),
            EngineState::Paused => write!(f, "paused"),
        }
    }
}

/// Commands sent to the engine via the command channel.
#[derive(Debug, Clone)]
pub enum EngineCommand {
    Start,
    Stop,
    Pause,
    Resume,
    /// Start the schedule loop of a strategy registered after `Start`.
    Register(String),
    /// Stop the schedule loop of a strategy that was removed.
    Remove(String),
}

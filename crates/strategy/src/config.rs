use std::collections::HashSet;

use common::{Error, Result, RiskProfile, Timeframe};
use serde::{Deserialize, Serialize};

/// Top-level strategy config file (TOML).
///
/// Example `config/strategies.toml`:
/// ```toml
/// symbols = ["BTCUSDT", "ETHUSDT"]
///
/// [[strategy]]
/// id = "aggressive-5m"
/// type = "aggressive"
/// timeframe = "5m"
/// interval_seconds = 300
///
/// [strategy.parameters]
/// oversold = 10.0
/// overbought = 90.0
///
/// [strategy.filters]
/// volume_filter = true
/// ```
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StrategyFileConfig {
    /// Symbols used by every strategy that does not list its own.
    #[serde(default)]
    pub symbols: Vec<String>,
    #[serde(rename = "strategy", default)]
    pub strategies: Vec<StrategyConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StrategyConfig {
    /// Unique id used in logs, alerts and operator commands.
    pub id: String,
    #[serde(rename = "type")]
    pub strategy_type: RiskProfile,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    pub timeframe: Timeframe,
    pub interval_seconds: u64,
    /// Higher timeframe for trend filtering (moderate profile).
    #[serde(default)]
    pub trend_timeframe: Option<Timeframe>,
    #[serde(default)]
    pub symbols: Vec<String>,
    #[serde(default)]
    pub parameters: toml::Table,
    #[serde(default)]
    pub filters: toml::Table,
}

fn enabled_by_default() -> bool {
    true
}

impl StrategyFileConfig {
    /// Read, parse and validate a strategy file.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::config(format!("failed to read strategy config at '{path}': {e}"))
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut cfg: Self = toml::from_str(content)
            .map_err(|e| Error::config(format!("failed to parse strategy config: {e}")))?;
        for strategy in &mut cfg.strategies {
            if strategy.symbols.is_empty() {
                strategy.symbols = cfg.symbols.clone();
            }
        }
        cfg.validate()?;
        Ok(cfg)
    }

    fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for s in &self.strategies {
            if !seen.insert(s.id.as_str()) {
                return Err(Error::DuplicateStrategyId(s.id.clone()));
            }
            s.validate()?;
        }
        Ok(())
    }
}

impl StrategyConfig {
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(Error::config("strategy id must not be empty"));
        }
        if self.interval_seconds == 0 {
            return Err(Error::config(format!("{}: interval_seconds must be > 0", self.id)));
        }
        if self.symbols.is_empty() {
            return Err(Error::config(format!("{}: no symbols configured", self.id)));
        }
        if let Some(trend) = self.trend_timeframe {
            if trend.minutes() <= self.timeframe.minutes() {
                return Err(Error::config(format!(
                    "{}: trend_timeframe {trend} must be longer than timeframe {}",
                    self.id, self.timeframe
                )));
            }
        }
        Ok(())
    }

    /// Parameters and filters as one flat table; filters win on clashes.
    pub fn settings(&self) -> toml::Table {
        let mut t = self.parameters.clone();
        for (k, v) in &self.filters {
            t.insert(k.clone(), v.clone());
        }
        t
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        symbols = ["BTCUSDT", "ETHUSDT"]

        [[strategy]]
        id = "aggr"
        type = "aggressive"
        timeframe = "5m"
        interval_seconds = 300
        comment = "unknown keys are ignored"

        [strategy.parameters]
        oversold = 12.0

        [strategy.filters]
        volume_filter = false

        [[strategy]]
        id = "mod"
        type = "moderate"
        enabled = false
        timeframe = "15m"
        trend_timeframe = "4h"
        interval_seconds = 900
        symbols = ["SOLUSDT"]
    "#;

    #[test]
    fn parses_and_inherits_default_symbols() {
        let cfg = StrategyFileConfig::parse(SAMPLE).unwrap();
        assert_eq!(cfg.strategies.len(), 2);
        let aggr = &cfg.strategies[0];
        assert_eq!(aggr.strategy_type, RiskProfile::Aggressive);
        assert!(aggr.enabled);
        assert_eq!(aggr.symbols, vec!["BTCUSDT", "ETHUSDT"]);
        let settings = aggr.settings();
        assert_eq!(settings["oversold"].as_float(), Some(12.0));
        assert_eq!(settings["volume_filter"].as_bool(), Some(false));

        let moderate = &cfg.strategies[1];
        assert!(!moderate.enabled);
        assert_eq!(moderate.trend_timeframe, Some(Timeframe::H4));
        assert_eq!(moderate.symbols, vec!["SOLUSDT"]);
    }

    #[test]
    fn missing_required_key_is_invalid_configuration() {
        let src = r#"
            [[strategy]]
            id = "x"
            type = "conservative"
            timeframe = "4h"
        "#;
        assert!(matches!(StrategyFileConfig::parse(src), Err(Error::InvalidConfiguration(_))));
    }

    #[test]
    fn unknown_type_and_bad_timeframe_are_rejected() {
        let bad_type = SAMPLE.replace("\"aggressive\"", "\"yolo\"");
        assert!(StrategyFileConfig::parse(&bad_type).is_err());
        let bad_tf = SAMPLE.replace("\"5m\"", "\"7m\"");
        assert!(StrategyFileConfig::parse(&bad_tf).is_err());
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let dup = SAMPLE.replace("id = \"mod\"", "id = \"aggr\"");
        assert!(matches!(StrategyFileConfig::parse(&dup), Err(Error::DuplicateStrategyId(_))));
    }
}

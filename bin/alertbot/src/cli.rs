use chrono::{DateTime, NaiveDate, Utc};
use clap::{Args, Parser, Subcommand};

/// Strategy alert engine: runs live against the exchange or replays history.
#[derive(Debug, Parser)]
#[command(name = "alertbot", version, about, propagate_version = true)]
pub struct Cli {
    /// Omit to run the live engine.
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Replay the enabled strategies over historical candles.
    Backtest(BacktestArgs),
}

#[derive(Debug, Clone, PartialEq, Args)]
pub struct BacktestArgs {
    /// Start of the window, YYYY-MM-DD (UTC midnight) or RFC 3339.
    #[arg(long, value_parser = parse_time)]
    pub from: DateTime<Utc>,

    /// End of the window (exclusive).
    #[arg(long, value_parser = parse_time)]
    pub to: DateTime<Utc>,

    /// Comma-separated symbols. Empty means every symbol in the strategy file.
    #[arg(long, value_delimiter = ',', value_parser = parse_symbol)]
    pub symbols: Vec<String>,

    /// Write the JSON report here instead of stdout.
    #[arg(long)]
    pub out: Option<String>,

    /// Starting equity in quote currency.
    #[arg(long = "equity")]
    pub initial_equity: Option<f64>,

    /// Fill slippage in basis points, charged on entry and exit.
    #[arg(long)]
    pub slippage_bps: Option<f64>,
}

impl BacktestArgs {
    pub fn validate(&self) -> Result<(), String> {
        if self.from >= self.to {
            return Err("--from must be before --to".into());
        }
        Ok(())
    }
}

fn parse_time(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Ok(t.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|t| t.and_utc())
        .ok_or_else(|| format!("invalid date '{raw}'"))
}

fn parse_symbol(raw: &str) -> Result<String, String> {
    let symbol = raw.trim().to_uppercase();
    if symbol.is_empty() {
        return Err("empty symbol".into());
    }
    Ok(symbol)
}

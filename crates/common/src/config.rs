use std::time::Duration;

use tracing::warn;

/// Process configuration loaded from environment variables at startup.
/// Strategy definitions live in the TOML file at `strategy_config_path`.
#[derive(Debug, Clone)]
pub struct Config {
    // Telegram delivery; absent token means console delivery only
    pub telegram_token: Option<String>,
    pub telegram_allowed_user_ids: Vec<i64>,

    // Market data
    pub market_data_url: String,
    pub fetch_timeout: Duration,
    pub fetch_max_attempts: u32,
    pub fetch_retry_delay: Duration,

    // Reporting
    pub status_interval: Duration,

    // Strategy config file path
    pub strategy_config_path: String,
}

impl Config {
    pub const DEFAULT_MARKET_DATA_URL: &'static str = "https://api.binance.com";

    /// Load all configuration from environment variables.
    /// Loads `.env` if present. Panics on malformed required values.
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // ignore error if .env not present

        let telegram_token = optional_env("TELEGRAM_TOKEN").filter(|t| !t.trim().is_empty());

        let telegram_allowed_user_ids: Vec<i64> = optional_env("TELEGRAM_ALLOWED_USER_IDS")
            .map(|raw| {
                raw.split(',')
                    .filter(|s| !s.trim().is_empty())
                    .map(|s| {
                        s.trim().parse::<i64>().unwrap_or_else(|_| {
                            panic!(
                                "TELEGRAM_ALLOWED_USER_IDS contains non-numeric ID: '{}'",
                                s.trim()
                            )
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        if telegram_token.is_some() && telegram_allowed_user_ids.is_empty() {
            panic!("TELEGRAM_TOKEN is set but TELEGRAM_ALLOWED_USER_IDS is empty");
        }

        Config {
            telegram_token,
            telegram_allowed_user_ids,
            market_data_url: optional_env("MARKET_DATA_URL")
                .unwrap_or_else(|| Self::DEFAULT_MARKET_DATA_URL.to_string()),
            fetch_timeout: Duration::from_secs(parsed_env("FETCH_TIMEOUT_SECS", 30)),
            fetch_max_attempts: parsed_env("FETCH_MAX_ATTEMPTS", 3),
            fetch_retry_delay: Duration::from_millis(parsed_env("FETCH_RETRY_DELAY_MS", 5_000)),
            status_interval: Duration::from_secs(parsed_env("STATUS_INTERVAL_SECS", 6 * 3600)),
            strategy_config_path: optional_env("STRATEGY_CONFIG_PATH")
                .unwrap_or_else(|| "config/strategies.toml".to_string()),
        }
    }

    pub fn telegram_enabled(&self) -> bool {
        self.telegram_token.is_some()
    }
}

fn optional_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

fn parsed_env<T: std::str::FromStr + Copy + std::fmt::Display>(key: &str, default: T) -> T {
    match optional_env(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, default = %default, "Unparseable env value, using default");
            default
        }),
        None => default,
    }
}

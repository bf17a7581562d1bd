use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Market data could not be fetched (network or exchange failure).
    #[error("Market data unavailable: {0}")]
    DataUnavailable(String),

    /// Not enough closed candles to compute an indicator.
    #[error("Insufficient data: need {needed} values, have {available}")]
    InsufficientData { needed: usize, available: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Strategy id '{0}' is already registered")]
    DuplicateStrategyId(String),

    #[error("Unknown strategy id '{0}'")]
    UnknownStrategy(String),

    #[error("Alert delivery failed: {0}")]
    DeliveryFailure(String),

    /// A candle row was rejected by the series adapter.
    #[error("Invalid candle: {0}")]
    InvalidCandle(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand used by indicator code.
    pub fn insufficient(needed: usize, available: usize) -> Self {
        Error::InsufficientData { needed, available }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Error::InvalidConfiguration(msg.into())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

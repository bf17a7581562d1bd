pub mod alert;
pub mod binance;
pub mod fetch;
pub mod lifecycle;
pub mod manager;
pub mod scheduler;
pub mod sink;

pub use alert::{build_alert, format_alert, format_status};
pub use binance::BinanceMarketData;
pub use fetch::{fetch_with_retry, RetryPolicy};
pub use lifecycle::{Engine, EngineHandle};
pub use manager::{CycleReport, ManagerStatus, Schedule, StrategyManager, StrategyStatus};
pub use sink::LogSink;

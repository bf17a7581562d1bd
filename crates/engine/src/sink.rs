use async_trait::async_trait;
use tracing::info;

use common::{AlertPayload, AlertSink, Result};

/// Console delivery used when no Telegram token is configured.
pub struct LogSink;

#[async_trait]
impl AlertSink for LogSink {
    async fn deliver(&self, alert: &AlertPayload) -> Result<()> {
        info!(
            id = %alert.id,
            strategy = %alert.signal.strategy_id,
            symbol = %alert.signal.symbol,
            direction = %alert.signal.direction,
            "ALERT\n{}",
            alert.message
        );
        Ok(())
    }

    async fn notify(&self, text: &str) -> Result<()> {
        info!("{text}");
        Ok(())
    }
}

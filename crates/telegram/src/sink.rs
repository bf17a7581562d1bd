use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use teloxide::utils::html;
use tracing::{debug, warn};

use common::{AlertPayload, AlertSink, Error, Result};

/// Delivers alerts to every allowed operator's private chat.
pub struct TelegramSink {
    bot: Bot,
    chat_ids: Vec<ChatId>,
}

impl TelegramSink {
    pub fn new(bot: Bot, user_ids: &[i64]) -> Self {
        Self {
            bot,
            chat_ids: user_ids.iter().map(|&id| ChatId(id)).collect(),
        }
    }

    /// Send to all chats; fails if any chat could not be reached.
    async fn broadcast(&self, text: &str, parse_mode: Option<ParseMode>) -> Result<()> {
        let mut failed = Vec::new();
        for &chat_id in &self.chat_ids {
            let mut req = self.bot.send_message(chat_id, text);
            if let Some(mode) = parse_mode {
                req = req.parse_mode(mode);
            }
            if let Err(e) = req.await {
                warn!(chat_id = ?chat_id, error = %e, "Failed to send Telegram message");
                failed.push(format!("{}: {e}", chat_id.0));
            }
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(Error::DeliveryFailure(failed.join("; ")))
        }
    }
}

#[async_trait]
impl AlertSink for TelegramSink {
    async fn deliver(&self, alert: &AlertPayload) -> Result<()> {
        debug!(id = %alert.id, chats = self.chat_ids.len(), "Sending alert to Telegram");
        self.broadcast(&render_html(&alert.message), Some(ParseMode::Html))
            .await
    }

    async fn notify(&self, text: &str) -> Result<()> {
        self.broadcast(text, None).await
    }
}

/// Escape the alert text for Telegram HTML and bold its headline.
pub fn render_html(message: &str) -> String {
    let (head, body) = message.split_once('\n').unwrap_or((message, ""));
    if body.is_empty() {
        format!("<b>{}</b>", html::escape(head))
    } else {
        format!("<b>{}</b>\n{}", html::escape(head), html::escape(body))
    }
}

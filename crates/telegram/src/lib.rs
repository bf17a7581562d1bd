//! Telegram side of the alert engine: alert delivery to the operator chats
//! and the operator command bot.

pub mod commands;
pub mod sink;

pub use commands::{start_bot, BotDeps, Command};
pub use sink::TelegramSink;

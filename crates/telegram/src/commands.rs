use std::sync::Arc;

use teloxide::{dispatching::UpdateHandler, prelude::*, utils::command::BotCommands};
use tracing::{info, warn};

use common::{EngineCommand, EngineState};
use engine::{format_status, EngineHandle};

type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Dependencies injected into every handler via `dptree`.
#[derive(Clone)]
pub struct BotDeps {
    pub engine: EngineHandle,
    pub allowed_user_ids: Arc<Vec<i64>>,
}

/// Operator commands.
#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "lowercase", description = "Alert bot commands:")]
pub enum Command {
    #[command(description = "Show this help")]
    Help,
    #[command(description = "Signals, errors and state per strategy")]
    Status,
    #[command(description = "Enable a strategy: /enable <id>")]
    Enable(String),
    #[command(description = "Disable a strategy and clear its state: /disable <id>")]
    Disable(String),
    #[command(
        description = "Change one parameter: /set <id> <key> <value>",
        parse_with = "split"
    )]
    Set { id: String, key: String, value: String },
    #[command(description = "Skip evaluation cycles until /resume")]
    Pause,
    #[command(description = "Resume evaluation cycles")]
    Resume,
}

/// Start the Telegram bot in long-polling mode.
pub async fn start_bot(bot: Bot, deps: BotDeps) {
    let deps = Arc::new(deps);

    info!("Telegram bot starting (long-polling)");

    Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![deps])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

fn schema() -> UpdateHandler<Box<dyn std::error::Error + Send + Sync>> {
    use dptree::case;

    let command_handler = teloxide::filter_command::<Command, _>()
        .branch(case![Command::Help].endpoint(handle_help))
        .branch(case![Command::Status].endpoint(handle_status))
        .branch(case![Command::Enable(id)].endpoint(handle_enable))
        .branch(case![Command::Disable(id)].endpoint(handle_disable))
        .branch(case![Command::Set { id, key, value }].endpoint(handle_set))
        .branch(case![Command::Pause].endpoint(handle_pause))
        .branch(case![Command::Resume].endpoint(handle_resume));

    Update::filter_message()
        .filter_map(|msg: Message| msg.from().map(|u| u.id))
        .filter_async(auth_filter)
        .branch(command_handler)
}

/// Silently drop messages from users not in the allowed list.
async fn auth_filter(user_id: UserId, deps: Arc<BotDeps>) -> bool {
    let uid = user_id.0 as i64;
    let allowed = deps.allowed_user_ids.contains(&uid);
    if !allowed {
        warn!(user_id = uid, "Unauthorized Telegram access attempt");
    }
    allowed
}

async fn handle_help(bot: Bot, msg: Message) -> HandlerResult {
    bot.send_message(msg.chat.id, Command::descriptions().to_string()).await?;
    Ok(())
}

async fn handle_status(bot: Bot, msg: Message, deps: Arc<BotDeps>) -> HandlerResult {
    let status = deps.engine.manager().status().await;
    bot.send_message(msg.chat.id, format_status(&status)).await?;
    Ok(())
}

async fn handle_enable(bot: Bot, msg: Message, deps: Arc<BotDeps>, id: String) -> HandlerResult {
    let reply = match deps.engine.manager().enable(id.trim()).await {
        Ok(()) => format!("Strategy {} enabled.", id.trim()),
        Err(e) => e.to_string(),
    };
    bot.send_message(msg.chat.id, reply).await?;
    Ok(())
}

async fn handle_disable(bot: Bot, msg: Message, deps: Arc<BotDeps>, id: String) -> HandlerResult {
    let reply = match deps.engine.manager().disable(id.trim()).await {
        Ok(()) => format!("Strategy {} disabled, state cleared.", id.trim()),
        Err(e) => e.to_string(),
    };
    bot.send_message(msg.chat.id, reply).await?;
    Ok(())
}

async fn handle_set(
    bot: Bot,
    msg: Message,
    deps: Arc<BotDeps>,
    (id, key, value): (String, String, String),
) -> HandlerResult {
    let mut changes = toml::Table::new();
    changes.insert(key.clone(), parse_value(&value));
    let reply = match deps.engine.manager().update_parameters(&id, &changes).await {
        Ok(()) => format!("{id}: {key} = {value}"),
        Err(e) => format!("Rejected, previous parameters kept. {e}"),
    };
    bot.send_message(msg.chat.id, reply).await?;
    Ok(())
}

async fn handle_pause(bot: Bot, msg: Message, deps: Arc<BotDeps>) -> HandlerResult {
    let reply = match deps.engine.state().await {
        EngineState::Running => {
            deps.engine.send(EngineCommand::Pause).await;
            "Engine paused."
        }
        EngineState::Paused => "Engine is already paused.",
        EngineState::Stopped => "Engine is stopped.",
    };
    bot.send_message(msg.chat.id, reply).await?;
    Ok(())
}

async fn handle_resume(bot: Bot, msg: Message, deps: Arc<BotDeps>) -> HandlerResult {
    let reply = match deps.engine.state().await {
        EngineState::Paused => {
            deps.engine.send(EngineCommand::Resume).await;
            "Engine resumed."
        }
        EngineState::Running => "Engine is already running.",
        EngineState::Stopped => "Engine is stopped.",
    };
    bot.send_message(msg.chat.id, reply).await?;
    Ok(())
}

/// Read a command argument as a TOML value: numbers and booleans keep their
/// type, anything else is a string.
pub fn parse_value(raw: &str) -> toml::Value {
    let raw = raw.trim();
    match format!("v = {raw}").parse::<toml::Table>() {
        Ok(mut t) => t.remove("v").unwrap_or_else(|| toml::Value::String(raw.to_string())),
        Err(_) => toml::Value::String(raw.to_string()),
    }
}

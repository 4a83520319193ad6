use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::{BotCommand, InlineKeyboardButton, InlineKeyboardMarkup};

use crate::adapters::render;
use crate::app::handlers::{Button, Reply, RequestHandler};
use crate::domain::command::{Command, CommandParseError, parse_callback, parse_command};
use crate::domain::models::UserId as TrackerUserId;

// Telegram rejects longer callback payloads.
const MAX_CALLBACK_DATA_BYTES: usize = 64;

type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

pub struct TelegramBot {
    bot: Bot,
}

impl TelegramBot {
    pub fn new(token: &str) -> Self {
        Self {
            bot: Bot::new(token),
        }
    }

    pub async fn run(&self, handler: Arc<dyn RequestHandler>) {
        if let Err(error) = self.bot.set_my_commands(bot_commands()).await {
            tracing::warn!(error = %error, "failed to register bot commands");
        }

        let tree = dptree::entry()
            .branch(Update::filter_message().endpoint(on_message))
            .branch(Update::filter_callback_query().endpoint(on_callback));

        tracing::info!("telegram dispatcher starting");

        Dispatcher::builder(self.bot.clone(), tree)
            .dependencies(dptree::deps![handler])
            .enable_ctrlc_handler()
            .build()
            .dispatch()
            .await;

        tracing::info!("telegram dispatcher stopped");
    }
}

pub fn bot_commands() -> Vec<BotCommand> {
    [
        ("start", "Welcome and quick start"),
        ("help", "All commands and the cost formula"),
        ("add", "Add appliance: /add name low high"),
        ("list", "Show your appliances"),
        ("delete", "Remove an appliance"),
        ("use", "Start tracking an appliance"),
        ("stop", "End the session and show the cost"),
        ("cancel", "Discard the active session"),
        ("status", "Running time and cost so far"),
        ("mnd", "Billing period summary"),
        ("history", "Recent sessions"),
        ("budget", "Show or set the monthly budget"),
        ("set_fastkost", "Fixed cost per kWh"),
        ("set_region", "Price region NO1-NO5"),
        ("set_periode", "Billing period start day"),
        ("config", "Show all settings"),
        ("clear", "Delete session history"),
    ]
    .into_iter()
    .map(|(command, description)| BotCommand::new(command, description))
    .collect()
}

async fn on_message(bot: Bot, msg: Message, handler: Arc<dyn RequestHandler>) -> HandlerResult {
    let (Some(text), Some(user)) = (msg.text(), msg.from.as_ref()) else {
        return Ok(());
    };
    let user_id = tracker_user_id(user.id)?;

    let replies = match parse_command(text) {
        Ok(command) => handle(handler.as_ref(), user_id, command).await,
        Err(CommandParseError::NotACommand) => return Ok(()),
        Err(error) => {
            tracing::debug!(user_id = %user_id, error = %error, "rejected command");
            vec![Reply::text(render::parse_error(&error))]
        }
    };

    send_replies(&bot, msg.chat.id, replies).await
}

async fn on_callback(
    bot: Bot,
    query: CallbackQuery,
    handler: Arc<dyn RequestHandler>,
) -> HandlerResult {
    bot.answer_callback_query(query.id.clone()).await?;

    let Some(data) = query.data.as_deref() else {
        return Ok(());
    };
    let user_id = tracker_user_id(query.from.id)?;
    let chat_id = query
        .message
        .as_ref()
        .map(|message| message.chat().id)
        .unwrap_or_else(|| ChatId::from(query.from.id));

    let command = match parse_callback(data) {
        Ok(command) => command,
        Err(error) => {
            tracing::warn!(user_id = %user_id, error = %error, "ignoring button payload");
            return Ok(());
        }
    };

    let replies = handle(handler.as_ref(), user_id, command).await;
    send_replies(&bot, chat_id, replies).await
}

async fn handle(handler: &dyn RequestHandler, user_id: TrackerUserId, command: Command) -> Vec<Reply> {
    match handler.handle(user_id, command).await {
        Ok(replies) => replies,
        Err(error) => {
            tracing::error!(user_id = %user_id, error = %error, "request failed");
            vec![Reply::text(render::generic_failure())]
        }
    }
}

async fn send_replies(bot: &Bot, chat_id: ChatId, replies: Vec<Reply>) -> HandlerResult {
    for reply in replies {
        let keyboard = keyboard(&reply.buttons);
        let request = bot.send_message(chat_id, reply.text);
        match keyboard {
            Some(keyboard) => request.reply_markup(keyboard).await?,
            None => request.await?,
        };
    }
    Ok(())
}

fn tracker_user_id(user_id: teloxide::types::UserId) -> Result<TrackerUserId, std::num::TryFromIntError> {
    i64::try_from(user_id.0).map(TrackerUserId)
}

pub fn keyboard(rows: &[Vec<Button>]) -> Option<InlineKeyboardMarkup> {
    let rows: Vec<Vec<InlineKeyboardButton>> = rows
        .iter()
        .map(|row| row.iter().filter_map(inline_button).collect::<Vec<_>>())
        .filter(|row| !row.is_empty())
        .collect();

    (!rows.is_empty()).then(|| InlineKeyboardMarkup::new(rows))
}

fn inline_button(button: &Button) -> Option<InlineKeyboardButton> {
    let data = button.command.to_callback_data()?;
    if data.len() > MAX_CALLBACK_DATA_BYTES {
        tracing::warn!(label = %button.label, bytes = data.len(), "button payload too long");
        return None;
    }
    Some(InlineKeyboardButton::callback(button.label.clone(), data))
}

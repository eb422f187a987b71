//! Command handler helper functions
//!
//! Reusable patterns for command handlers: replies, error reporting and
//! the user-id argument commands.

use crate::constants::emoji;
use crate::error::{BotError, UserMessage};
use crate::types::HandlerResult;
use crate::utils;
use teloxide::prelude::*;

/// Send a formatted message with emoji prefix
pub async fn send_response(bot: &Bot, chat_id: ChatId, emoji: &str, message: &str) -> HandlerResult {
    bot.send_message(chat_id, format!("{} {}", emoji, message))
        .await?;
    Ok(())
}

/// Report a user-facing failure in the chat
///
/// Telegram transport errors are returned to the dispatcher instead.
pub async fn reply_error(bot: &Bot, chat_id: ChatId, err: BotError) -> HandlerResult {
    match err {
        BotError::Telegram(e) => Err(e.into()),
        other => {
            tracing::debug!("Replying with error: {}", other);
            bot.send_message(chat_id, other.user_message()).await?;
            Ok(())
        }
    }
}

/// Id of the user who sent a message
pub fn sender_id(msg: &Message) -> Option<u64> {
    msg.from().map(|user| user.id.0)
}

/// Parse a `<user_id>` argument and run an operation with it
///
/// This helper handles:
/// - Argument parsing and validation
/// - Operation execution
/// - Success/error response formatting
pub async fn execute_user_command<F, Fut>(
    bot: Bot,
    msg: Message,
    usage_msg: &str,
    operation: F,
) -> HandlerResult
where
    F: FnOnce(u64) -> Fut,
    Fut: std::future::Future<Output = Result<String, BotError>>,
{
    let args = utils::parse_args(msg.text().unwrap_or(""));

    let user_id = match utils::extract_user_id_arg(&args) {
        Ok(id) => id,
        Err(e) => {
            bot.send_message(msg.chat.id, format!("{} {}\n{}", emoji::ERROR, e, usage_msg))
                .await?;
            return Ok(());
        }
    };

    match operation(user_id).await {
        Ok(done) => send_response(&bot, msg.chat.id, emoji::SUCCESS, &done).await,
        Err(err) => {
            tracing::error!("Command for user {} failed: {}", user_id, err);
            reply_error(&bot, msg.chat.id, err).await
        }
    }
}

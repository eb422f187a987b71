//! Callback query handlers for inline keyboard interactions

use crate::commands::{cancel_scope, cancel_task, status_text};
use crate::constants::{emoji, MAX_CALLBACK_DATA_LEN};
use crate::context::BotContext;
use crate::error::UserMessage;
use crate::keyboards;
use crate::rate_limit;
use crate::types::HandlerResult;
use teloxide::prelude::*;
use teloxide::types::ParseMode;
use teloxide::{ApiError, RequestError};

/// Action encoded in a button's callback data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackAction {
    Cancel(String),
    CancelAll,
    RefreshStatus,
}

impl CallbackAction {
    pub fn parse(data: &str) -> Option<Self> {
        if data.len() > MAX_CALLBACK_DATA_LEN {
            return None;
        }
        let parts: Vec<&str> = data.split(':').collect();
        match parts.as_slice() {
            ["cancel", gid] if !gid.is_empty() => Some(CallbackAction::Cancel(gid.to_string())),
            ["cancelall"] => Some(CallbackAction::CancelAll),
            ["status", "refresh"] => Some(CallbackAction::RefreshStatus),
            _ => None,
        }
    }
}

/// Handle all callback queries from inline keyboards
pub async fn handle_callback(bot: Bot, q: CallbackQuery, ctx: BotContext) -> HandlerResult {
    let Some(action) = q.data.as_deref().and_then(CallbackAction::parse) else {
        tracing::warn!("Ignoring callback data {:?}", q.data);
        bot.answer_callback_query(&q.id).await?;
        return Ok(());
    };

    let user_id = q.from.id.0;
    if !rate_limit::check_rate_limit(user_id) {
        tracing::debug!("Rate limited user: {}", user_id);
        bot.answer_callback_query(&q.id)
            .text("Slow down a little")
            .await?;
        return Ok(());
    }

    let chat_id = q.message.as_ref().map(|m| m.chat.id.0).unwrap_or(user_id as i64);
    if !ctx.is_authorized(user_id, chat_id).await {
        bot.answer_callback_query(&q.id)
            .text(format!("{} You are not authorized", emoji::DENIED))
            .show_alert(true)
            .await?;
        return Ok(());
    }

    let notice = match action {
        CallbackAction::Cancel(gid) => match cancel_task(&ctx, &gid, user_id) {
            Ok(done) => format!("{} {}", emoji::CANCELLED, done),
            Err(e) => e.user_message(),
        },
        CallbackAction::CancelAll => {
            let count = ctx.tasks.cancel_all(cancel_scope(&ctx, user_id));
            format!("{} Cancelling {} task(s)", emoji::CANCELLED, count)
        }
        CallbackAction::RefreshStatus => {
            if let Some(message) = &q.message {
                let result = bot
                    .edit_message_text(message.chat.id, message.id, status_text(&ctx))
                    .parse_mode(ParseMode::Html)
                    .reply_markup(keyboards::status_keyboard())
                    .await;
                match result {
                    Ok(_) | Err(RequestError::Api(ApiError::MessageNotModified)) => {}
                    Err(e) => return Err(e.into()),
                }
            }
            "Refreshed".to_string()
        }
    };

    bot.answer_callback_query(&q.id).text(notice).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_actions() {
        assert_eq!(
            CallbackAction::parse("cancel:0123456789abcdef"),
            Some(CallbackAction::Cancel("0123456789abcdef".to_string()))
        );
        assert_eq!(CallbackAction::parse("cancelall"), Some(CallbackAction::CancelAll));
        assert_eq!(CallbackAction::parse("status:refresh"), Some(CallbackAction::RefreshStatus));
    }

    #[test]
    fn test_rejects_unknown_and_oversized() {
        assert_eq!(CallbackAction::parse("cancel:"), None);
        assert_eq!(CallbackAction::parse("page:2"), None);
        assert_eq!(CallbackAction::parse(""), None);
        let long = format!("cancel:{}", "a".repeat(MAX_CALLBACK_DATA_LEN));
        assert_eq!(CallbackAction::parse(&long), None);
    }
}

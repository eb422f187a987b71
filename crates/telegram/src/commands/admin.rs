//! Owner and sudo commands (auth, unauth, users, log, restart)

use std::path::Path;
use std::time::Duration;

use teloxide::prelude::*;
use teloxide::types::{InputFile, ParseMode};

use crate::constants::{emoji, usage, RESTART_NOTICE_FILE};
use crate::context::BotContext;
use crate::error::{BotError, BotResult};
use crate::handlers::{execute_user_command, reply_error, sender_id};
use crate::restart::{self, RestartNotice};
use crate::types::HandlerResult;

fn require_owner(ctx: &BotContext, msg: &Message) -> BotResult<u64> {
    match sender_id(msg) {
        Some(id) if ctx.is_owner(id) => Ok(id),
        _ => Err(BotError::Unauthorized("Only the owner can use this command".to_string())),
    }
}

fn require_sudo(ctx: &BotContext, msg: &Message) -> BotResult<u64> {
    match sender_id(msg) {
        Some(id) if ctx.is_sudo(id) => Ok(id),
        _ => Err(BotError::Unauthorized("Only sudo users can use this command".to_string())),
    }
}

/// Authorize a user
pub async fn auth(bot: Bot, msg: Message, ctx: BotContext) -> HandlerResult {
    let owner = match require_owner(&ctx, &msg) {
        Ok(id) => id,
        Err(e) => return reply_error(&bot, msg.chat.id, e).await,
    };
    execute_user_command(bot, msg, usage::AUTH, |user_id| async move {
        ctx.authorize(user_id, owner).await?;
        tracing::info!("User {} authorized by {}", user_id, owner);
        Ok::<_, BotError>(format!("User {} authorized", user_id))
    })
    .await
}

/// Revoke a user
pub async fn unauth(bot: Bot, msg: Message, ctx: BotContext) -> HandlerResult {
    if let Err(e) = require_owner(&ctx, &msg) {
        return reply_error(&bot, msg.chat.id, e).await;
    }
    execute_user_command(bot, msg, usage::UNAUTH, |user_id| async move {
        if ctx.is_owner(user_id) {
            return Err(BotError::InvalidArguments("The owner cannot be unauthorized".to_string()));
        }
        if !ctx.unauthorize(user_id).await? {
            return Err(BotError::Message(format!("User {} was not authorized", user_id)));
        }
        tracing::info!("User {} unauthorized", user_id);
        Ok::<_, BotError>(format!("User {} unauthorized", user_id))
    })
    .await
}

fn format_ids<T: std::fmt::Display>(ids: &[T]) -> String {
    if ids.is_empty() {
        return "none".to_string();
    }
    ids.iter()
        .map(|id| format!("<code>{}</code>", id))
        .collect::<Vec<_>>()
        .join(", ")
}

async fn users_text(ctx: &BotContext) -> BotResult<String> {
    let config = &ctx.config;
    let mut text = format!(
        "{} <b>Authorized users</b>\n\n👑 Owner: <code>{}</code>\n🛡 Sudo: {}\n💬 Chats: {}\n",
        emoji::USERS,
        config.owner_id,
        format_ids(&config.sudo_users),
        format_ids(&config.authorized_chats),
    );

    let users: Vec<i64> = match &ctx.db {
        Some(db) => db
            .authorized_users()
            .await?
            .into_iter()
            .map(|record| record.user_id)
            .collect(),
        None => ctx.runtime_users().into_iter().map(|id| id as i64).collect(),
    };
    text.push_str(&format!("👤 Users: {}", format_ids(&users)));

    if crate::auth::is_open_mode(config) {
        text.push_str("\n\n🔓 Open mode: everyone may use the bot.");
    }
    Ok(text)
}

/// List who may use the bot
pub async fn users(bot: Bot, msg: Message, ctx: BotContext) -> HandlerResult {
    if let Err(e) = require_sudo(&ctx, &msg) {
        return reply_error(&bot, msg.chat.id, e).await;
    }
    match users_text(&ctx).await {
        Ok(text) => {
            bot.send_message(msg.chat.id, text)
                .parse_mode(ParseMode::Html)
                .await?;
            Ok(())
        }
        Err(e) => reply_error(&bot, msg.chat.id, e).await,
    }
}

/// Send the log file
pub async fn log(bot: Bot, msg: Message, ctx: BotContext) -> HandlerResult {
    if let Err(e) = require_sudo(&ctx, &msg) {
        return reply_error(&bot, msg.chat.id, e).await;
    }
    let path = ctx.config.log_file();
    if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
        let err = BotError::Message(format!("No log file at {}", path.display()));
        return reply_error(&bot, msg.chat.id, err).await;
    }
    bot.send_document(msg.chat.id, InputFile::file(path))
        .caption(format!("{} Bot log", emoji::FILES))
        .await?;
    Ok(())
}

/// Cancel every task and re-execute the process
pub async fn restart(bot: Bot, msg: Message, ctx: BotContext) -> HandlerResult {
    if let Err(e) = require_owner(&ctx, &msg) {
        return reply_error(&bot, msg.chat.id, e).await;
    }

    let cancelled = ctx.tasks.cancel_all(None);
    let notice = bot
        .send_message(
            msg.chat.id,
            format!("{} Restarting... ({} task(s) cancelled)", emoji::RESTART, cancelled),
        )
        .await?;
    let saved = restart::save_notice(
        Path::new(RESTART_NOTICE_FILE),
        RestartNotice {
            chat_id: msg.chat.id,
            message_id: notice.id,
        },
    )
    .await;
    if let Err(e) = saved {
        tracing::warn!("Could not save restart notice: {}", e);
    }

    // Let cancelled runners clean up their directories
    if cancelled > 0 {
        tokio::time::sleep(Duration::from_secs(2)).await;
    }
    tracing::info!("Restarting on request of the owner");
    let err = restart::reexec();
    tracing::error!("Restart failed: {}", err);
    reply_error(&bot, msg.chat.id, BotError::Message(format!("Restart failed: {}", err))).await
}

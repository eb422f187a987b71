//! Task control commands (status, cancel, cancelall)

use teloxide::prelude::*;
use teloxide::types::ParseMode;

use crate::auth::can_manage_task;
use crate::constants::{emoji, usage};
use crate::context::BotContext;
use crate::error::{BotError, BotResult};
use crate::handlers::{reply_error, send_response, sender_id};
use crate::keyboards;
use crate::status;
use crate::types::{HandlerResult, MyDialogue, State};
use crate::utils::{escape_html, parse_args};

/// Current `/status` text
pub fn status_text(ctx: &BotContext) -> String {
    status::format_status(
        &ctx.tasks.list(),
        ctx.config.status_limit,
        ctx.uptime_seconds(),
        &ctx.tasks.count_by_state(),
    )
}

/// List active tasks with progress
pub async fn status(bot: Bot, msg: Message, ctx: BotContext) -> HandlerResult {
    bot.send_message(msg.chat.id, status_text(&ctx))
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboards::status_keyboard())
        .await?;
    Ok(())
}

/// Cancel one task on behalf of a user
///
/// # Returns
/// * A confirmation naming the task
pub fn cancel_task(ctx: &BotContext, gid: &str, user_id: u64) -> BotResult<String> {
    let info = ctx
        .tasks
        .get(gid)
        .ok_or_else(|| BotError::InvalidArguments(format!("No active task with gid {}", gid)))?;
    if !can_manage_task(&ctx.config, info.user_id, user_id) {
        return Err(BotError::Unauthorized("You can only cancel your own tasks".to_string()));
    }
    ctx.tasks.cancel(gid);
    Ok(format!("Cancelling {}", info.name))
}

/// Whose tasks a user may cancel in bulk; `None` means everyone's
pub fn cancel_scope(ctx: &BotContext, user_id: u64) -> Option<u64> {
    if ctx.is_sudo(user_id) {
        None
    } else {
        Some(user_id)
    }
}

/// Cancel by gid, stop waiting for a link, or offer a keyboard
pub async fn cancel(bot: Bot, dialogue: MyDialogue, msg: Message, ctx: BotContext) -> HandlerResult {
    let Some(user_id) = sender_id(&msg) else {
        return Ok(());
    };
    let args = parse_args(msg.text().unwrap_or(""));

    if let Some(gid) = args.get(1) {
        return match cancel_task(&ctx, gid, user_id) {
            Ok(done) => send_response(&bot, msg.chat.id, emoji::CANCELLED, &done).await,
            Err(e) => reply_error(&bot, msg.chat.id, e).await,
        };
    }

    if matches!(dialogue.get().await?, Some(State::AwaitingLink { .. })) {
        dialogue.exit().await?;
        return send_response(&bot, msg.chat.id, emoji::SUCCESS, "Operation cancelled.").await;
    }

    let tasks = match cancel_scope(&ctx, user_id) {
        None => ctx.tasks.list(),
        Some(uid) => ctx.tasks.list_for_user(uid),
    };
    if tasks.is_empty() {
        return send_response(&bot, msg.chat.id, emoji::INFO, "No active tasks to cancel.").await;
    }

    bot.send_message(msg.chat.id, escape_html(usage::CANCEL))
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboards::cancel_keyboard(&tasks))
        .await?;
    Ok(())
}

/// Sudo users cancel everything, others only their own tasks
pub async fn cancel_all(bot: Bot, msg: Message, ctx: BotContext) -> HandlerResult {
    let Some(user_id) = sender_id(&msg) else {
        return Ok(());
    };
    let count = ctx.tasks.cancel_all(cancel_scope(&ctx, user_id));
    send_response(
        &bot,
        msg.chat.id,
        emoji::CANCELLED,
        &format!("Cancelling {} task(s).", count),
    )
    .await
}

//! Commands that start tasks (mirror, leech, ytdl) and link intake

use engine::{EngineResult, UploadTarget};
use teloxide::prelude::*;

use crate::constants::{emoji, usage};
use crate::context::BotContext;
use crate::handlers::{reply_error, sender_id};
use crate::pipeline::{self, Source, Submission};
use crate::types::{HandlerResult, MyDialogue, State};
use crate::utils::parse_args;

/// Mirror a link or replied file to Google Drive
pub async fn mirror(bot: Bot, dialogue: MyDialogue, msg: Message, ctx: BotContext) -> HandlerResult {
    start_task(bot, dialogue, msg, ctx, UploadTarget::Drive, false).await
}

/// Leech a link or replied file to Telegram
pub async fn leech(bot: Bot, dialogue: MyDialogue, msg: Message, ctx: BotContext) -> HandlerResult {
    start_task(bot, dialogue, msg, ctx, UploadTarget::Telegram, false).await
}

/// Force yt-dlp and upload to `DEFAULT_UPLOAD`
pub async fn ytdl(bot: Bot, dialogue: MyDialogue, msg: Message, ctx: BotContext) -> HandlerResult {
    let target = ctx.config.default_upload;
    start_task(bot, dialogue, msg, ctx, target, true).await
}

fn prompt_for(target: UploadTarget, ytdl: bool) -> &'static str {
    match (target, ytdl) {
        (_, true) => usage::YTDL,
        (UploadTarget::Drive, false) => usage::MIRROR,
        (UploadTarget::Telegram, false) => usage::LEECH,
    }
}

async fn start_task(
    bot: Bot,
    dialogue: MyDialogue,
    msg: Message,
    ctx: BotContext,
    target: UploadTarget,
    ytdl: bool,
) -> HandlerResult {
    let Some(user_id) = sender_id(&msg) else {
        return Ok(());
    };
    if let Err(e) = pipeline::check_target(&ctx, target) {
        return reply_error(&bot, msg.chat.id, e).await;
    }

    match command_source(&msg, ytdl) {
        Some(Ok(source)) => submit_source(&bot, &ctx, &msg, user_id, source, target).await,
        Some(Err(e)) => reply_error(&bot, msg.chat.id, e.into()).await,
        None => {
            dialogue.update(State::AwaitingLink { target, ytdl }).await?;
            bot.send_message(msg.chat.id, format!("{} {}", emoji::LINK, prompt_for(target, ytdl)))
                .reply_to_message_id(msg.id)
                .await?;
            Ok(())
        }
    }
}

/// Link after the command, else the file or link of the replied message
fn command_source(msg: &Message, ytdl: bool) -> Option<EngineResult<Source>> {
    let args = parse_args(msg.text().unwrap_or(""));
    if args.len() > 1 {
        return Some(Source::from_text(&args[1..].join(" "), ytdl));
    }
    msg.reply_to_message()
        .and_then(|reply| Source::from_message(reply, ytdl))
}

async fn submit_source(
    bot: &Bot,
    ctx: &BotContext,
    msg: &Message,
    user_id: u64,
    source: Source,
    target: UploadTarget,
) -> HandlerResult {
    let submission = Submission {
        source,
        target,
        user_id,
        chat_id: msg.chat.id,
        reply_to: msg.id,
    };
    match pipeline::submit(bot.clone(), ctx.clone(), submission).await {
        Ok(_) => Ok(()),
        Err(e) => reply_error(bot, msg.chat.id, e).await,
    }
}

/// The message that follows a command sent without a link
pub async fn receive_link(
    bot: Bot,
    dialogue: MyDialogue,
    msg: Message,
    (target, ytdl): (UploadTarget, bool),
    ctx: BotContext,
) -> HandlerResult {
    let Some(user_id) = sender_id(&msg) else {
        return Ok(());
    };
    if !ctx.is_authorized(user_id, msg.chat.id.0).await {
        return Ok(());
    }

    match Source::from_message(&msg, ytdl) {
        Some(Ok(source)) => {
            dialogue.exit().await?;
            submit_source(&bot, &ctx, &msg, user_id, source, target).await
        }
        Some(Err(e)) => reply_error(&bot, msg.chat.id, e.into()).await,
        None => {
            bot.send_message(
                msg.chat.id,
                format!("{} Send a link or a file, or /cancel to stop waiting.", emoji::ERROR),
            )
            .await?;
            Ok(())
        }
    }
}

/// A link or file sent in a private chat without any command
pub async fn bare_link(bot: Bot, msg: Message, ctx: BotContext) -> HandlerResult {
    let Some(user_id) = sender_id(&msg) else {
        return Ok(());
    };
    let target = ctx.config.default_upload;
    match Source::from_message(&msg, false) {
        Some(Ok(source)) => submit_source(&bot, &ctx, &msg, user_id, source, target).await,
        Some(Err(e)) => reply_error(&bot, msg.chat.id, e.into()).await,
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_support::{message, text_message};
    use crate::pipeline::TelegramFile;
    use engine::LinkKind;
    use serde_json::json;

    #[test]
    fn test_source_from_command_args() {
        let msg = text_message(100, "/leech https://example.com/a.zip");
        match command_source(&msg, false) {
            Some(Ok(Source::Link(link))) => assert_eq!(link.kind, LinkKind::Direct),
            other => panic!("unexpected source {:?}", other),
        }

        let msg = text_message(100, "/ytdl https://example.com/watch?v=1");
        assert!(matches!(
            command_source(&msg, true),
            Some(Ok(Source::Link(engine::Link { kind: LinkKind::YtDlp, .. })))
        ));

        let msg = text_message(100, "/leech not-a-link");
        assert!(matches!(command_source(&msg, false), Some(Err(_))));
    }

    #[test]
    fn test_source_from_replied_file() {
        let msg = message(json!({
            "message_id": 2,
            "date": 1_700_000_000,
            "chat": { "id": 100, "type": "private", "first_name": "Test" },
            "from": { "id": 100, "is_bot": false, "first_name": "Test" },
            "text": "/mirror",
            "reply_to_message": {
                "message_id": 1,
                "date": 1_700_000_000,
                "chat": { "id": 100, "type": "private", "first_name": "Test" },
                "from": { "id": 100, "is_bot": false, "first_name": "Test" },
                "document": {
                    "file_id": "AgAD",
                    "file_unique_id": "AQAD",
                    "file_size": 2048,
                    "file_name": "report.pdf"
                }
            }
        }));

        let expected = TelegramFile {
            file_id: "AgAD".to_string(),
            name: "report.pdf".to_string(),
            size: 2048,
        };
        assert!(matches!(
            command_source(&msg, false),
            Some(Ok(Source::TelegramFile(file))) if file == expected
        ));
    }

    #[test]
    fn test_bare_command_waits_for_link() {
        let msg = text_message(100, "/leech");
        assert!(command_source(&msg, false).is_none());
    }

    #[test]
    fn test_prompts() {
        assert_eq!(prompt_for(UploadTarget::Drive, false), usage::MIRROR);
        assert_eq!(prompt_for(UploadTarget::Telegram, false), usage::LEECH);
        assert_eq!(prompt_for(UploadTarget::Drive, true), usage::YTDL);
    }
}

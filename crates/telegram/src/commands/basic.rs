//! Basic bot commands (start, help, ping)

use std::time::Instant;

use crate::constants::emoji;
use crate::context::BotContext;
use crate::types::HandlerResult;
use teloxide::prelude::*;

fn start_text(suffix: &str) -> String {
    format!(
        "{robot} Welcome to Mirror Leech Bot!\n\n\
        Send me a link or a file and I will fetch it for you.\n\n\
        🎯 Quick Actions:\n\
        • /mirror{s} <link> - Upload to Google Drive\n\
        • /leech{s} <link> - Upload to Telegram\n\
        • /ytdl{s} <link> - Download with yt-dlp\n\
        • /status{s} - Show active tasks\n\
        • /help{s} - See all commands",
        robot = emoji::ROBOT,
        s = suffix,
    )
}

fn help_text(suffix: &str) -> String {
    format!(
        "📖 <b>Commands</b>\n\n\
        /mirror{s} [link] - Download, then upload to Google Drive\n\
        /leech{s} [link] - Download, then upload to Telegram\n\
        /ytdl{s} [link] - Download with yt-dlp\n\
        /status{s} - Active tasks with progress\n\
        /cancel{s} [gid] - Cancel a task\n\
        /cancelall{s} - Cancel your tasks (sudo: all tasks)\n\
        /ping{s} - Check latency\n\n\
        👑 <b>Admin</b>\n\
        /auth{s} &lt;user_id&gt;, /unauth{s} &lt;user_id&gt; - Manage access (owner)\n\
        /users{s} - Authorized users (sudo)\n\
        /log{s} - Log file (sudo)\n\
        /restart{s} - Restart the bot (owner)\n\n\
        🔗 <b>Supported links</b>\n\
        Direct HTTP, Terabox, Google Drive, MediaFire, YouTube and other yt-dlp sites, \
        magnets and .torrent files (when qBittorrent is configured).\n\n\
        💡 <b>Examples</b>\n\
        <code>/leech{s} https://example.com/file.zip</code>\n\
        Reply to a file with /leech{s} or /mirror{s}.\n\
        Send a command without a link and I will ask for one.",
        s = suffix,
    )
}

/// Welcome message when user starts the bot
pub async fn start(bot: Bot, msg: Message, ctx: BotContext) -> HandlerResult {
    bot.send_message(msg.chat.id, start_text(&ctx.config.cmd_suffix))
        .await?;
    Ok(())
}

/// Display help message with available commands
pub async fn help(bot: Bot, msg: Message, ctx: BotContext) -> HandlerResult {
    bot.send_message(msg.chat.id, help_text(&ctx.config.cmd_suffix))
        .parse_mode(teloxide::types::ParseMode::Html)
        .await?;
    Ok(())
}

/// Reply, then edit in the round trip time
pub async fn ping(bot: Bot, msg: Message) -> HandlerResult {
    let started = Instant::now();
    let reply = bot
        .send_message(msg.chat.id, format!("{} Pong!", emoji::PING))
        .await?;
    let elapsed = started.elapsed().as_millis();
    bot.edit_message_text(
        msg.chat.id,
        reply.id,
        format!("{} Pong!\n{} {} ms", emoji::PING, emoji::TIME, elapsed),
    )
    .await?;
    Ok(())
}

/// Commands from users who are not authorized
pub async fn unauthorized(bot: Bot, msg: Message) -> HandlerResult {
    if let Some(user) = msg.from() {
        tracing::info!("Rejected command from unauthorized user {}", user.id.0);
    }
    bot.send_message(
        msg.chat.id,
        format!("{} You are not authorized to use this bot.", emoji::DENIED),
    )
    .await?;
    Ok(())
}

/// Handle invalid state
pub async fn invalid_state(bot: Bot, msg: Message) -> HandlerResult {
    bot.send_message(
        msg.chat.id,
        "Unable to handle the message. Type /help to see the usage.",
    )
    .await?;
    Ok(())
}

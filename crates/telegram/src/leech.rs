//! Uploading finished downloads to Telegram

use std::path::{Path, PathBuf};

use engine::{split::split_file, Config, EngineError, Progress};
use teloxide::prelude::*;
use teloxide::types::{InputFile, ParseMode};
use tokio_util::sync::CancellationToken;

use crate::constants::CLOUD_UPLOAD_LIMIT;
use crate::error::BotResult;
use crate::utils::escape_html;

/// Largest file sent in one message
///
/// Without a local Bot API server Telegram refuses anything above 50 MB.
pub fn part_size(config: &Config) -> u64 {
    let size = config.leech_part_size();
    if config.bot_api_url.is_some() {
        size
    } else {
        size.min(CLOUD_UPLOAD_LIMIT)
    }
}

/// Dump chat when configured, else the chat the task came from
pub fn destination(config: &Config, origin: ChatId) -> ChatId {
    config.leech_dump_chat.map(ChatId).unwrap_or(origin)
}

/// Whole video files go out as streamable videos unless `AS_DOCUMENT`
pub fn send_as_video(path: &Path, as_document: bool, is_part: bool) -> bool {
    if as_document || is_part {
        return false;
    }
    mime_guess::from_path(path)
        .first()
        .map(|mime| mime.type_() == mime_guess::mime::VIDEO)
        .unwrap_or(false)
}

fn caption_for(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("<code>{}</code>", escape_html(&name))
}

async fn send_file(bot: &Bot, chat: ChatId, path: &Path, video: bool) -> Result<(), teloxide::RequestError> {
    let file = InputFile::file(path.to_path_buf());
    let caption = caption_for(path);
    if video {
        bot.send_video(chat, file)
            .caption(caption)
            .parse_mode(ParseMode::Html)
            .supports_streaming(true)
            .await?;
    } else {
        bot.send_document(chat, file)
            .caption(caption)
            .parse_mode(ParseMode::Html)
            .await?;
    }
    Ok(())
}

/// Send every file, splitting the large ones into `work_dir`
///
/// # Returns
/// * Number of messages sent
pub async fn upload(
    bot: &Bot,
    config: &Config,
    files: &[PathBuf],
    chat: ChatId,
    work_dir: &Path,
    progress: &Progress,
    cancel: &CancellationToken,
) -> BotResult<usize> {
    let limit = part_size(config);
    let mut sent = 0;

    for file in files {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled.into());
        }
        let parts = split_file(file, limit, work_dir).await?;
        let is_part = parts.len() > 1;

        for part in &parts {
            let size = tokio::fs::metadata(part).await?.len();
            let video = send_as_video(part, config.as_document, is_part);
            tracing::info!("Uploading {} ({} bytes) to chat {}", part.display(), size, chat.0);

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(EngineError::Cancelled.into()),
                result = send_file(bot, chat, part, video) => result?,
            }
            progress.advance(size);
            sent += 1;

            if is_part {
                if let Err(e) = tokio::fs::remove_file(part).await {
                    tracing::warn!("Failed to remove part {}: {}", part.display(), e);
                }
            }
        }
    }

    Ok(sent)
}

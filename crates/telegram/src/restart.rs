//! `/restart` bookkeeping
//!
//! Before re-executing, the bot stores which message announced the restart
//! so the new process can edit it once it is up.

use std::path::Path;

use teloxide::prelude::*;
use teloxide::types::MessageId;

use crate::constants::emoji;

/// Chat and message to edit after a restart
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RestartNotice {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

impl RestartNotice {
    fn encode(&self) -> String {
        format!("{} {}", self.chat_id.0, self.message_id.0)
    }

    fn decode(raw: &str) -> Option<Self> {
        let mut parts = raw.split_whitespace();
        let chat_id = parts.next()?.parse::<i64>().ok()?;
        let message_id = parts.next()?.parse::<i32>().ok()?;
        Some(Self {
            chat_id: ChatId(chat_id),
            message_id: MessageId(message_id),
        })
    }
}

pub async fn save_notice(path: &Path, notice: RestartNotice) -> std::io::Result<()> {
    tokio::fs::write(path, notice.encode()).await
}

/// Read and delete a pending notice
pub async fn take_notice(path: &Path) -> Option<RestartNotice> {
    let raw = tokio::fs::read_to_string(path).await.ok()?;
    if let Err(e) = tokio::fs::remove_file(path).await {
        tracing::warn!("Failed to remove {}: {}", path.display(), e);
    }
    RestartNotice::decode(&raw)
}

/// Edit the message that announced a restart, if there was one
pub async fn finish_restart(bot: &Bot, path: &Path) {
    let Some(notice) = take_notice(path).await else {
        return;
    };
    let text = format!("{} Restarted successfully!", emoji::SUCCESS);
    if let Err(e) = bot.edit_message_text(notice.chat_id, notice.message_id, text).await {
        tracing::warn!("Failed to edit restart notice: {}", e);
    }
}

/// Replace the running process with a fresh copy of itself
///
/// Only returns on failure.
#[cfg(unix)]
pub fn reexec() -> std::io::Error {
    use std::os::unix::process::CommandExt;

    match std::env::current_exe() {
        Ok(exe) => std::process::Command::new(exe)
            .args(std::env::args_os().skip(1))
            .exec(),
        Err(e) => e,
    }
}

#[cfg(not(unix))]
pub fn reexec() -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Unsupported, "restart needs a unix host")
}

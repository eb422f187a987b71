use engine::UploadTarget;
use teloxide::{
    dispatching::dialogue::{Dialogue, InMemStorage},
    macros::BotCommands,
};

/// Type alias for dialogue management with State and InMemStorage
pub type MyDialogue = Dialogue<State, InMemStorage<State>>;

/// Type alias for handler result types
pub type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Per-chat dialogue state
#[derive(Clone, Default, Debug, PartialEq)]
pub enum State {
    #[default]
    Start,
    /// A command arrived without a link; the next message supplies it
    AwaitingLink { target: UploadTarget, ytdl: bool },
}

/// Available bot commands
///
/// Only the command token is parsed; handlers read arguments from the
/// message text.
#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(
    rename_rule = "lowercase",
    description = "These commands are supported:"
)]
pub enum Command {
    #[command(description = "Start the bot")]
    Start,
    #[command(description = "Display help information")]
    Help,
    #[command(description = "Mirror a link or file to Google Drive")]
    Mirror,
    #[command(description = "Leech a link or file to Telegram")]
    Leech,
    #[command(description = "Download with yt-dlp")]
    Ytdl,
    #[command(description = "Show active tasks")]
    Status,
    #[command(description = "Cancel a task by gid")]
    Cancel,
    #[command(description = "Cancel all your tasks")]
    CancelAll,
    #[command(description = "Check bot latency")]
    Ping,
    #[command(description = "Authorize a user (owner)")]
    Auth,
    #[command(description = "Revoke a user (owner)")]
    Unauth,
    #[command(description = "List authorized users (sudo)")]
    Users,
    #[command(description = "Send the log file (sudo)")]
    Log,
    #[command(description = "Restart the bot (owner)")]
    Restart,
}

#[cfg(test)]
mod tests {
    use super::*;
    use teloxide::utils::command::BotCommands;

    #[test]
    fn test_parses_lowercase_commands() {
        assert_eq!(Command::parse("/leech", "bot").unwrap(), Command::Leech);
        assert_eq!(Command::parse("/cancelall", "bot").unwrap(), Command::CancelAll);
        assert_eq!(Command::parse("/status@bot", "bot").unwrap(), Command::Status);
        assert!(Command::parse("/unknown", "bot").is_err());
    }

    #[test]
    fn test_menu_lists_every_command() {
        let names: Vec<String> = Command::bot_commands().into_iter().map(|c| c.command).collect();
        assert_eq!(names.len(), 14);
        assert!(names.iter().any(|n| n.ends_with("mirror")));
        assert!(names.iter().any(|n| n.ends_with("restart")));
    }
}

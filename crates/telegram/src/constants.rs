//! Constants used throughout the telegram bot

/// Minimum interval between callback presses per user
pub const RATE_LIMIT_SECONDS: u64 = 1;

/// Telegram caps callback data at 64 bytes
pub const MAX_CALLBACK_DATA_LEN: usize = 64;

/// Cells in the status progress bar
pub const PROGRESS_BAR_CELLS: usize = 12;

/// Longest task name shown on a status line
pub const MAX_NAME_DISPLAY: usize = 60;

/// Tasks offered by the `/cancel` keyboard
pub const MAX_CANCEL_BUTTONS: usize = 10;

/// Bot API `getFile` limit without a local Bot API server
pub const CLOUD_DOWNLOAD_LIMIT: u64 = 20 * 1024 * 1024;

/// Bot API upload limit without a local Bot API server
pub const CLOUD_UPLOAD_LIMIT: u64 = 50 * 1024 * 1024;

/// Written before `/restart` re-executes the process
pub const RESTART_NOTICE_FILE: &str = ".restartmsg";

/// Emoji constants for consistent UI
pub mod emoji {
    pub const SUCCESS: &str = "✅";
    pub const ERROR: &str = "❌";
    pub const INFO: &str = "📊";
    pub const FOLDER: &str = "📁";
    pub const DOWNLOAD: &str = "📥";
    pub const UPLOAD: &str = "📤";
    pub const SPEED: &str = "⚡";
    pub const TIME: &str = "⏱";
    pub const SIZE: &str = "💾";
    pub const FILES: &str = "📄";
    pub const LINK: &str = "🔗";
    pub const QUEUED: &str = "🕒";
    pub const CANCELLED: &str = "🚫";
    pub const DENIED: &str = "⛔";
    pub const USERS: &str = "👥";
    pub const RESTART: &str = "♻️";
    pub const PING: &str = "🏓";
    pub const ROBOT: &str = "🤖";
}

/// Usage messages for commands
pub mod usage {
    pub const MIRROR: &str = "Send me the link to mirror to Google Drive.\n\nTip: /mirror <link> or reply to a file with /mirror.";
    pub const LEECH: &str = "Send me the link to leech to Telegram.\n\nTip: /leech <link> or reply to a file with /leech.";
    pub const YTDL: &str = "Send me the video link for yt-dlp.\n\nTip: /ytdl <link>.";
    pub const AUTH: &str = "Usage: /auth <user_id>";
    pub const UNAUTH: &str = "Usage: /unauth <user_id>";
    pub const CANCEL: &str = "Usage: /cancel <gid>\n\nTip: Tap a button below or copy the gid from /status.";
}

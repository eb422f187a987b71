use std::fmt;

use engine::EngineError;

/// Error type for bot handlers and the task pipeline
#[derive(Debug)]
pub enum BotError {
    /// Telegram API error
    Telegram(teloxide::RequestError),
    /// Download, upload or persistence error
    Engine(EngineError),
    /// Invalid command arguments
    InvalidArguments(String),
    /// User lacks the rights for an action
    Unauthorized(String),
    /// Generic error with message
    Message(String),
}

impl BotError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, BotError::Engine(e) if e.is_cancelled())
    }
}

impl fmt::Display for BotError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BotError::Telegram(e) => write!(f, "Telegram error: {}", e),
            BotError::Engine(e) => write!(f, "{}", e),
            BotError::InvalidArguments(msg) => write!(f, "Invalid arguments: {}", msg),
            BotError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            BotError::Message(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for BotError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BotError::Telegram(e) => Some(e),
            BotError::Engine(e) => Some(e),
            _ => None,
        }
    }
}

impl From<teloxide::RequestError> for BotError {
    fn from(err: teloxide::RequestError) -> Self {
        BotError::Telegram(err)
    }
}

impl From<EngineError> for BotError {
    fn from(err: EngineError) -> Self {
        BotError::Engine(err)
    }
}

impl From<std::io::Error> for BotError {
    fn from(err: std::io::Error) -> Self {
        BotError::Engine(EngineError::Io(err))
    }
}

impl From<teloxide::DownloadError> for BotError {
    fn from(err: teloxide::DownloadError) -> Self {
        BotError::Message(format!("Telegram download failed: {}", err))
    }
}

/// Result type alias for bot operations
pub type BotResult<T> = Result<T, BotError>;

/// Helper trait to convert results into user-friendly messages
pub trait UserMessage {
    fn user_message(&self) -> String;
}

impl UserMessage for BotError {
    fn user_message(&self) -> String {
        match self {
            BotError::Telegram(e) => format!("❌ Communication error: {}", e),
            BotError::Engine(EngineError::Cancelled) => "🚫 Task cancelled".to_string(),
            BotError::Engine(e) => format!("❌ {}", e),
            BotError::InvalidArguments(msg) => format!("❌ {}", msg),
            BotError::Unauthorized(msg) => format!("⛔ {}", msg),
            BotError::Message(msg) => format!("❌ {}", msg),
        }
    }
}

use std::fmt;

/// Error type for download, upload and persistence operations
#[derive(Debug)]
pub enum EngineError {
    /// HTTP transport or status error
    Http(reqwest::Error),
    /// Local file system error
    Io(std::io::Error),
    /// Malformed JSON from a remote API
    Json(serde_json::Error),
    /// qBittorrent API error
    Torrent(qbit_rs::Error),
    /// MongoDB error
    Database(mongodb::error::Error),
    /// Google Drive API error
    Drive(String),
    /// External process (yt-dlp) failed
    Process(String),
    /// Link type recognised but not supported by this deployment
    Unsupported(String),
    /// Remote resolver returned nothing usable
    Resolve(String),
    /// Download exceeds the configured size limit
    TooLarge { size: u64, limit: u64 },
    /// Task was cancelled by the user
    Cancelled,
    /// Text is not a usable link
    InvalidLink(String),
    /// Configuration problem detected at runtime
    Config(String),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::Http(e) => write!(f, "HTTP error: {}", e),
            EngineError::Io(e) => write!(f, "I/O error: {}", e),
            EngineError::Json(e) => write!(f, "Invalid JSON: {}", e),
            EngineError::Torrent(e) => write!(f, "qBittorrent error: {}", e),
            EngineError::Database(e) => write!(f, "Database error: {}", e),
            EngineError::Drive(msg) => write!(f, "Google Drive error: {}", msg),
            EngineError::Process(msg) => write!(f, "Process error: {}", msg),
            EngineError::Unsupported(msg) => write!(f, "Unsupported: {}", msg),
            EngineError::Resolve(msg) => write!(f, "Could not resolve link: {}", msg),
            EngineError::TooLarge { size, limit } => write!(
                f,
                "File too large: {} bytes exceeds the limit of {} bytes",
                size, limit
            ),
            EngineError::Cancelled => write!(f, "Task cancelled"),
            EngineError::InvalidLink(msg) => write!(f, "Invalid link: {}", msg),
            EngineError::Config(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Http(e) => Some(e),
            EngineError::Io(e) => Some(e),
            EngineError::Json(e) => Some(e),
            EngineError::Database(e) => Some(e),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for EngineError {
    fn from(err: reqwest::Error) -> Self {
        EngineError::Http(err)
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Io(err)
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Json(err)
    }
}

impl From<qbit_rs::Error> for EngineError {
    fn from(err: qbit_rs::Error) -> Self {
        EngineError::Torrent(err)
    }
}

impl From<mongodb::error::Error> for EngineError {
    fn from(err: mongodb::error::Error) -> Self {
        EngineError::Database(err)
    }
}

impl EngineError {
    /// Whether this error represents a user cancellation rather than a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, EngineError::Cancelled)
    }
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

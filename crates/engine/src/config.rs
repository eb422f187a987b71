//! Environment-driven configuration
//!
//! Every setting comes from an environment variable. Required variables are
//! collected together so a single error names all of the missing ones.

use std::fmt;
use std::path::PathBuf;

use crate::task::UploadTarget;

/// Log file name inside `log_dir`
pub const LOG_FILE_NAME: &str = "bot.log";

/// Variables the bot refuses to start without
pub const REQUIRED_VARS: [&str; 4] = ["BOT_TOKEN", "OWNER_ID", "TELEGRAM_API", "TELEGRAM_HASH"];

const GIB: u64 = 1024 * 1024 * 1024;
const DEFAULT_TERABOX_API: &str = "https://wdzone-terabox-api.vercel.app/api";

/// Errors produced while reading configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// One or more required variables are unset or empty
    Missing(Vec<String>),
    /// A variable is set but cannot be parsed
    Invalid { var: String, value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(vars) => {
                write!(f, "Missing required environment variables: {}", vars.join(", "))
            }
            ConfigError::Invalid { var, value } => {
                write!(f, "Invalid value for {}: '{}'", var, value)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// qBittorrent Web API credentials
#[derive(Debug, Clone)]
pub struct QbitConfig {
    pub host: String,
    pub username: String,
    pub password: String,
}

/// Complete runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub bot_token: String,
    pub owner_id: u64,
    pub telegram_api: i32,
    pub telegram_hash: String,
    pub bot_api_url: Option<String>,

    pub database_url: Option<String>,
    pub database_name: String,
    pub port: u16,

    pub authorized_chats: Vec<i64>,
    /// Configured sudo users, always including the owner
    pub sudo_users: Vec<u64>,
    /// Whether `SUDO_USERS` itself listed anyone
    pub sudo_configured: bool,

    pub default_upload: UploadTarget,
    pub gdrive_id: Option<String>,
    pub is_team_drive: bool,
    pub use_service_accounts: bool,

    pub leech_split_size: u64,
    pub as_document: bool,
    pub leech_dump_chat: Option<i64>,
    pub max_file_size: u64,

    pub queue_all: usize,
    pub queue_download: usize,
    pub queue_upload: usize,

    pub cmd_suffix: String,
    pub excluded_extensions: Vec<String>,
    pub status_update_interval: u64,
    pub status_limit: usize,

    pub qbit: Option<QbitConfig>,
    pub terabox_api: String,
    pub ytdlp_path: PathBuf,

    pub download_dir: PathBuf,
    pub upload_dir: PathBuf,
    pub log_dir: PathBuf,
    pub gdrive_token_path: PathBuf,
    pub accounts_dir: PathBuf,
}

impl Config {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary lookup function
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| -> Option<String> {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let missing: Vec<String> = REQUIRED_VARS
            .iter()
            .filter(|var| get(var).is_none())
            .map(|var| var.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        let bot_token = get("BOT_TOKEN").unwrap_or_default();
        let telegram_hash = get("TELEGRAM_HASH").unwrap_or_default();
        let owner_id: u64 = parse_var("OWNER_ID", get("OWNER_ID"), 0)?;
        let telegram_api: i32 = parse_var("TELEGRAM_API", get("TELEGRAM_API"), 0)?;

        let sudo_raw = parse_ids::<u64>(get("SUDO_USERS").as_deref().unwrap_or(""));
        let sudo_configured = !sudo_raw.is_empty();
        let mut sudo_users = sudo_raw;
        if !sudo_users.contains(&owner_id) {
            sudo_users.push(owner_id);
        }

        let default_upload = match get("DEFAULT_UPLOAD") {
            Some(value) => UploadTarget::parse(&value).ok_or(ConfigError::Invalid {
                var: "DEFAULT_UPLOAD".to_string(),
                value,
            })?,
            None => UploadTarget::Telegram,
        };

        let leech_dump_chat = match get("LEECH_DUMP_CHAT") {
            Some(value) => Some(parse_var("LEECH_DUMP_CHAT", Some(value), 0i64)?),
            None => None,
        };

        let qbit = get("QBIT_HOST").map(|host| QbitConfig {
            host,
            username: get("QBIT_USERNAME").unwrap_or_default(),
            password: get("QBIT_PASSWORD").unwrap_or_default(),
        });

        let status_update_interval: u64 =
            parse_var("STATUS_UPDATE_INTERVAL", get("STATUS_UPDATE_INTERVAL"), 10)?;

        Ok(Config {
            bot_token,
            owner_id,
            telegram_api,
            telegram_hash,
            bot_api_url: get("BOT_API_URL"),

            database_url: get("DATABASE_URL"),
            database_name: get("DATABASE_NAME").unwrap_or_else(|| "mirror_leech_bot".to_string()),
            port: parse_var("PORT", get("PORT"), 8000)?,

            authorized_chats: parse_ids(get("AUTHORIZED_CHATS").as_deref().unwrap_or("")),
            sudo_users,
            sudo_configured,

            default_upload,
            gdrive_id: get("GDRIVE_ID"),
            is_team_drive: parse_bool(get("IS_TEAM_DRIVE")),
            use_service_accounts: parse_bool(get("USE_SERVICE_ACCOUNTS")),

            leech_split_size: parse_var("LEECH_SPLIT_SIZE", get("LEECH_SPLIT_SIZE"), 2 * GIB)?,
            as_document: parse_bool(get("AS_DOCUMENT")),
            leech_dump_chat,
            max_file_size: parse_var("MAX_FILE_SIZE", get("MAX_FILE_SIZE"), 2 * GIB)?,

            queue_all: parse_var("QUEUE_ALL", get("QUEUE_ALL"), 8)?,
            queue_download: parse_var("QUEUE_DOWNLOAD", get("QUEUE_DOWNLOAD"), 4)?,
            queue_upload: parse_var("QUEUE_UPLOAD", get("QUEUE_UPLOAD"), 4)?,

            cmd_suffix: get("CMD_SUFFIX").unwrap_or_default(),
            excluded_extensions: parse_extensions(get("EXCLUDED_EXTENSIONS").as_deref().unwrap_or("")),
            status_update_interval: status_update_interval.max(1),
            status_limit: parse_var("STATUS_LIMIT", get("STATUS_LIMIT"), 4)?,

            qbit,
            terabox_api: get("TERABOX_API").unwrap_or_else(|| DEFAULT_TERABOX_API.to_string()),
            ytdlp_path: PathBuf::from(get("YTDLP_PATH").unwrap_or_else(|| "yt-dlp".to_string())),

            download_dir: PathBuf::from("downloads"),
            upload_dir: PathBuf::from("uploads"),
            log_dir: PathBuf::from("logs"),
            gdrive_token_path: PathBuf::from("token.json"),
            accounts_dir: PathBuf::from("accounts"),
        })
    }

    /// Whether mirroring to Google Drive is possible
    pub fn drive_enabled(&self) -> bool {
        self.gdrive_id.is_some()
    }

    /// Largest single file sent to Telegram before splitting
    pub fn leech_part_size(&self) -> u64 {
        self.leech_split_size.min(self.max_file_size).max(1)
    }

    pub fn is_sudo(&self, user_id: u64) -> bool {
        self.sudo_users.contains(&user_id)
    }

    pub fn is_owner(&self, user_id: u64) -> bool {
        self.owner_id == user_id
    }

    pub fn log_file(&self) -> PathBuf {
        self.log_dir.join(LOG_FILE_NAME)
    }
}

fn parse_var<T: std::str::FromStr>(var: &str, value: Option<String>, default: T) -> Result<T, ConfigError> {
    match value {
        Some(raw) => raw.parse::<T>().map_err(|_| ConfigError::Invalid {
            var: var.to_string(),
            value: raw,
        }),
        None => Ok(default),
    }
}

/// `true` (any case) is true; anything else, malformed included, is false
fn parse_bool(value: Option<String>) -> bool {
    value.map(|v| v.eq_ignore_ascii_case("true")).unwrap_or(false)
}

/// Parse comma and/or whitespace separated ids, skipping anything non-numeric
pub fn parse_ids<T: std::str::FromStr>(raw: &str) -> Vec<T> {
    raw.replace(',', " ")
        .split_whitespace()
        .filter_map(|id| id.parse::<T>().ok())
        .collect()
}

/// Normalise an extension list: lowercase, no leading dot
pub fn parse_extensions(raw: &str) -> Vec<String> {
    raw.split_whitespace()
        .map(|ext| ext.trim_start_matches('.').to_lowercase())
        .filter(|ext| !ext.is_empty())
        .collect()
}

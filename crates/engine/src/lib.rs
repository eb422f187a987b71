//! Mirror/leech engine
//!
//! Everything that does not talk to Telegram: configuration, link
//! classification, the task registry and its queues, download adapters,
//! the Google Drive uploader, file splitting and MongoDB persistence.

pub mod config;
pub mod db;
pub mod download;
pub mod drive;
pub mod error;
pub mod fs;
pub mod links;
pub mod registry;
pub mod split;
pub mod task;

pub use config::{Config, ConfigError, QbitConfig};
pub use db::Database;
pub use download::{DownloadContext, Downloader, TorrentApi};
pub use drive::{DriveLink, DriveUploader};
pub use error::{EngineError, EngineResult};
pub use links::{Link, LinkKind};
pub use registry::{NewTask, Phase, QueueLimits, TaskHandle, TaskRegistry};
pub use task::{Progress, ProgressSnapshot, TaskInfo, TaskState, UploadTarget};

mod logging;

use std::path::Path;
use std::sync::Arc;

use engine::{Config, Database, Downloader, DriveUploader, QueueLimits, TaskRegistry};
use healthcheck::{HealthServer, HealthState};
use telegram::constants::RESTART_NOTICE_FILE;
use telegram::restart;
use telegram::telegram::{schema, set_bot_commands};
use telegram::{BotContext, State};
use teloxide::dispatching::dialogue::InMemStorage;
use teloxide::prelude::*;
use tokio_util::sync::CancellationToken;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    let _ = dotenv::dotenv();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("❌ Error: {}", e);
            std::process::exit(1);
        }
    };

    let dirs = [&config.download_dir, &config.upload_dir, &config.log_dir];
    if let Err(e) = engine::fs::ensure_dirs(&dirs).await {
        eprintln!("❌ Error: cannot create working directories: {}", e);
        std::process::exit(1);
    }

    let _log_guard = match logging::init(&config.log_dir) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("❌ Error: cannot open log file: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = run(config).await {
        tracing::error!("Fatal: {}", e);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<(), BoxError> {
    let config = Arc::new(config);
    tracing::info!("Starting mirror leech bot v{}", env!("CARGO_PKG_VERSION"));
    check_tools(&config);

    let db = match &config.database_url {
        Some(url) => {
            let db = Database::connect(url, &config.database_name).await?;
            db.interrupt_stale_tasks().await?;
            Some(db)
        }
        None => {
            tracing::warn!("DATABASE_URL is not set; users and tasks will not be persisted");
            None
        }
    };

    let downloader = Downloader::connect(&config).await?;
    let drive = DriveUploader::from_config(&config, downloader.http().clone()).await?;
    if drive.is_none() {
        tracing::info!("Google Drive mirroring disabled");
    }

    let tasks = TaskRegistry::new(QueueLimits {
        all: config.queue_all,
        download: config.queue_download,
        upload: config.queue_upload,
    });

    let shutdown = CancellationToken::new();
    let health = HealthServer::new(HealthState::new(tasks.clone()));
    let health_task = tokio::spawn({
        let shutdown = shutdown.clone();
        let port = config.port;
        async move {
            if let Err(e) = health.serve("0.0.0.0", port, shutdown).await {
                tracing::error!("Health server failed: {}", e);
            }
        }
    });

    let bot = build_bot(&config)?;
    if let Err(e) = set_bot_commands(&bot, &config.cmd_suffix).await {
        tracing::warn!("Failed to register bot commands: {}", e);
    }
    restart::finish_restart(&bot, Path::new(RESTART_NOTICE_FILE)).await;
    notify_owner(&bot, &config).await;

    let ctx = BotContext::new(config.clone(), tasks.clone(), db, drive, downloader);
    tracing::info!("Bot started successfully!");

    Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![InMemStorage::<State>::new(), ctx])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    tracing::info!("Shutting down");
    tasks.cancel_all(None);
    shutdown.cancel();
    if let Err(e) = health_task.await {
        tracing::warn!("Health server task ended abnormally: {}", e);
    }
    Ok(())
}

fn build_bot(config: &Config) -> Result<Bot, BoxError> {
    let bot = Bot::new(&config.bot_token);
    match &config.bot_api_url {
        Some(url) => {
            let url = reqwest::Url::parse(url)?;
            tracing::info!("Using Bot API server at {}", url);
            Ok(bot.set_api_url(url))
        }
        None => Ok(bot),
    }
}

async fn notify_owner(bot: &Bot, config: &Config) {
    let text = format!("🤖 Mirror Leech Bot v{} started", env!("CARGO_PKG_VERSION"));
    if let Err(e) = bot.send_message(ChatId(config.owner_id as i64), text).await {
        tracing::warn!("Could not notify the owner: {}", e);
    }
}

/// Warn about missing external tools without refusing to start
fn check_tools(config: &Config) {
    if !tool_available(&config.ytdlp_path) {
        tracing::warn!(
            "yt-dlp not found at {}; /ytdl and media links will fail",
            config.ytdlp_path.display()
        );
    }
    if !tool_available(Path::new("ffmpeg")) {
        tracing::warn!("ffmpeg not found; yt-dlp cannot merge formats");
    }
}

fn tool_available(tool: &Path) -> bool {
    if tool.components().count() > 1 {
        return tool.is_file();
    }
    std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|dir| dir.join(tool).is_file()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_tool_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("fake-tool");
        std::fs::write(&tool, "#!/bin/sh\n").unwrap();
        assert!(tool_available(&tool));
        assert!(!tool_available(&dir.path().join("missing-tool")));
        assert!(!tool_available(&PathBuf::from("surely-not-a-real-tool-name")));
    }
}

//! Task lifecycle
//!
//! [`submit`] registers a task and replies with its status message, then a
//! spawned runner queues it, downloads, uploads and reports the outcome by
//! editing that message.

use std::path::{Component, Path, PathBuf};
use std::time::{Duration, Instant};

use engine::fs::{ensure_dirs, is_excluded, remove_dir, sanitize_filename, total_size};
use engine::links::find_url;
use engine::{
    DownloadContext, EngineError, EngineResult, Link, NewTask, Phase, TaskHandle, TaskRegistry,
    TaskState, UploadTarget,
};
use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::{MessageId, ParseMode};
use teloxide::{ApiError, RequestError};
use tokio_util::sync::CancellationToken;

use crate::constants::CLOUD_DOWNLOAD_LIMIT;
use crate::context::BotContext;
use crate::error::{BotError, BotResult};
use crate::keyboards::task_keyboard;
use crate::leech;
use crate::status::{self, Summary};

/// A file already stored on Telegram's servers
#[derive(Debug, Clone, PartialEq)]
pub struct TelegramFile {
    pub file_id: String,
    pub name: String,
    pub size: u64,
}

/// What a task downloads
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    Link(Link),
    TelegramFile(TelegramFile),
}

impl Source {
    /// First link found in free text
    pub fn from_text(text: &str, ytdl: bool) -> EngineResult<Self> {
        let url = find_url(text)
            .ok_or_else(|| EngineError::InvalidLink("no link found in the message".to_string()))?;
        let link = if ytdl {
            Link::parse_ytdl(&url)?
        } else {
            Link::parse(&url)?
        };
        Ok(Source::Link(link))
    }

    /// A document, video or audio attached to a message, else a link in it
    pub fn from_message(msg: &Message, ytdl: bool) -> Option<EngineResult<Self>> {
        if !ytdl {
            if let Some(file) = attached_file(msg) {
                return Some(Ok(Source::TelegramFile(file)));
            }
        }
        let text = msg.text().or_else(|| msg.caption())?;
        find_url(text)?;
        Some(Self::from_text(text, ytdl))
    }

    pub fn display_name(&self) -> String {
        match self {
            Source::Link(link) => link.display_name(),
            Source::TelegramFile(file) => file.name.clone(),
        }
    }

    /// Stored with the task record
    pub fn description(&self) -> String {
        match self {
            Source::Link(link) => link.url.clone(),
            Source::TelegramFile(file) => format!("telegram:{}", file.file_id),
        }
    }

    fn needs_torrent(&self) -> bool {
        match self {
            Source::Link(link) => link.kind.is_torrent(),
            Source::TelegramFile(file) => is_torrent_file(&file.name),
        }
    }
}

fn attached_file(msg: &Message) -> Option<TelegramFile> {
    let unix = chrono::Utc::now().timestamp();
    if let Some(doc) = msg.document() {
        return Some(TelegramFile {
            file_id: doc.file.id.clone(),
            name: doc.file_name.clone().unwrap_or_else(|| format!("document_{}", unix)),
            size: u64::from(doc.file.size),
        });
    }
    if let Some(video) = msg.video() {
        return Some(TelegramFile {
            file_id: video.file.id.clone(),
            name: video.file_name.clone().unwrap_or_else(|| format!("video_{}.mp4", unix)),
            size: u64::from(video.file.size),
        });
    }
    if let Some(audio) = msg.audio() {
        return Some(TelegramFile {
            file_id: audio.file.id.clone(),
            name: audio.file_name.clone().unwrap_or_else(|| format!("audio_{}.mp3", unix)),
            size: u64::from(audio.file.size),
        });
    }
    None
}

fn is_torrent_file(name: &str) -> bool {
    name.to_lowercase().ends_with(".torrent")
}

/// A request to start a task
#[derive(Debug, Clone)]
pub struct Submission {
    pub source: Source,
    pub target: UploadTarget,
    pub user_id: u64,
    pub chat_id: ChatId,
    pub reply_to: MessageId,
}

/// Whether uploads to `target` are possible at all
pub fn check_target(ctx: &BotContext, target: UploadTarget) -> BotResult<()> {
    if target == UploadTarget::Drive && ctx.drive.is_none() {
        let reason = if ctx.config.drive_enabled() {
            "Google Drive credentials are missing (token.json or accounts/)"
        } else {
            "Mirror is unavailable: GDRIVE_ID is not set"
        };
        return Err(BotError::Message(reason.to_string()));
    }
    Ok(())
}

/// Reject submissions this deployment cannot run
pub fn check_submission(ctx: &BotContext, source: &Source, target: UploadTarget) -> BotResult<()> {
    check_target(ctx, target)?;
    if source.needs_torrent() && !ctx.downloader.torrent_enabled() {
        return Err(EngineError::Unsupported("torrents need QBIT_HOST to be configured".to_string()).into());
    }
    if let Source::TelegramFile(file) = source {
        let max_size = ctx.downloader.max_file_size();
        if file.size > max_size {
            return Err(EngineError::TooLarge {
                size: file.size,
                limit: max_size,
            }
            .into());
        }
        if ctx.config.bot_api_url.is_none() && file.size > CLOUD_DOWNLOAD_LIMIT {
            return Err(EngineError::TooLarge {
                size: file.size,
                limit: CLOUD_DOWNLOAD_LIMIT,
            }
            .into());
        }
    }
    Ok(())
}

/// Register a task, announce it and start it in the background
///
/// # Returns
/// * The task's gid
pub async fn submit(bot: Bot, ctx: BotContext, submission: Submission) -> BotResult<String> {
    check_submission(&ctx, &submission.source, submission.target)?;

    let handle = ctx.tasks.register(NewTask {
        name: submission.source.display_name(),
        source: submission.source.description(),
        target: submission.target,
        user_id: submission.user_id,
        chat_id: submission.chat_id.0,
    });
    let gid = handle.gid.clone();
    let info = ctx
        .tasks
        .get(&gid)
        .ok_or_else(|| BotError::Message("task vanished right after registration".to_string()))?;

    let status_message = match bot
        .send_message(submission.chat_id, status::format_task(&info))
        .parse_mode(ParseMode::Html)
        .reply_to_message_id(submission.reply_to)
        .reply_markup(task_keyboard(&gid))
        .await
    {
        Ok(message) => message,
        Err(e) => {
            ctx.tasks.remove(&gid);
            return Err(e.into());
        }
    };

    if let Some(db) = &ctx.db {
        if let Err(e) = db.record_task(&info).await {
            tracing::warn!("Failed to persist task {}: {}", gid, e);
        }
    }

    tracing::info!(
        "Task {} submitted by {}: {} -> {}",
        gid,
        submission.user_id,
        info.source,
        submission.target.as_str()
    );
    tokio::spawn(run(
        bot,
        ctx,
        handle,
        submission.source,
        submission.target,
        submission.chat_id,
        status_message.id,
    ));
    Ok(gid)
}

async fn run(
    bot: Bot,
    ctx: BotContext,
    handle: TaskHandle,
    source: Source,
    target: UploadTarget,
    chat: ChatId,
    status_id: MessageId,
) {
    let gid = handle.gid.clone();
    let started = Instant::now();

    let reporter_done = CancellationToken::new();
    let reporter = tokio::spawn(report_status(
        bot.clone(),
        ctx.tasks.clone(),
        gid.clone(),
        chat,
        status_id,
        Duration::from_secs(ctx.config.status_update_interval),
        reporter_done.clone(),
    ));

    let result = execute(&bot, &ctx, &handle, &source, target, chat).await;
    reporter_done.cancel();
    if let Err(e) = reporter.await {
        tracing::warn!("Status reporter for {} panicked: {}", gid, e);
    }

    let name = ctx
        .tasks
        .get(&gid)
        .map(|info| info.name)
        .unwrap_or_else(|| source.display_name());
    let verb = target.verb();
    let (state, text, error) = match result {
        Ok(mut summary) => {
            summary.elapsed_seconds = started.elapsed().as_secs();
            tracing::info!("Task {} completed in {}s", gid, summary.elapsed_seconds);
            (TaskState::Completed, status::format_summary(verb, &summary), None)
        }
        Err(e) if e.is_cancelled() => {
            tracing::info!("Task {} cancelled", gid);
            (TaskState::Cancelled, status::format_cancelled(verb, &name), None)
        }
        Err(e) => {
            tracing::error!("Task {} failed: {}", gid, e);
            let reason = e.to_string();
            (TaskState::Failed, status::format_failure(verb, &name, &reason), Some(reason))
        }
    };

    ctx.tasks.set_state(&gid, state);
    if let Err(e) = bot
        .edit_message_text(chat, status_id, text)
        .parse_mode(ParseMode::Html)
        .await
    {
        tracing::warn!("Failed to post final status for {}: {}", gid, e);
    }
    if let Some(db) = &ctx.db {
        if let Err(e) = db.update_task(&gid, state, &name, error.as_deref()).await {
            tracing::warn!("Failed to persist task {}: {}", gid, e);
        }
    }

    ctx.tasks.remove(&gid);
    remove_dir(&ctx.config.download_dir.join(&gid)).await;
    remove_dir(&ctx.config.upload_dir.join(&gid)).await;
}

async fn execute(
    bot: &Bot,
    ctx: &BotContext,
    handle: &TaskHandle,
    source: &Source,
    target: UploadTarget,
    chat: ChatId,
) -> BotResult<Summary> {
    let config = &ctx.config;
    let gid = handle.gid.as_str();
    let cancel = &handle.cancel;
    let progress = handle.progress.as_ref();

    let _task_slot = ctx.tasks.acquire(Phase::All, cancel).await?;
    let download_slot = ctx.tasks.acquire(Phase::Download, cancel).await?;
    advance(ctx, gid, TaskState::Downloading).await;

    let download_dir = config.download_dir.join(gid);
    ensure_dirs(&[&download_dir]).await?;
    progress.start_phase(0);
    let download = DownloadContext::new(&download_dir, progress, cancel);
    let files = match source {
        Source::Link(link) => ctx.downloader.fetch(link, &download).await?,
        Source::TelegramFile(file) => fetch_telegram_file(bot, ctx, file, &download).await?,
    };
    drop(download_slot);

    let (files, skipped): (Vec<PathBuf>, Vec<PathBuf>) = files
        .into_iter()
        .partition(|file| !is_excluded(file, &config.excluded_extensions));
    if !skipped.is_empty() {
        tracing::info!("Task {}: skipped {} excluded file(s)", gid, skipped.len());
    }
    if files.is_empty() {
        return Err(BotError::Message(
            "Nothing to upload: every file has an excluded extension".to_string(),
        ));
    }

    let name = task_name(&download_dir, &files).unwrap_or_else(|| source.display_name());
    ctx.tasks.set_name(gid, &name);
    let size = total_size(&files).await?;

    let _upload_slot = ctx.tasks.acquire(Phase::Upload, cancel).await?;
    advance(ctx, gid, TaskState::Uploading).await;
    progress.start_phase(size);

    let mut summary = Summary {
        name,
        size,
        files: files.len(),
        elapsed_seconds: 0,
        link: None,
        dump_chat: None,
    };
    match target {
        UploadTarget::Telegram => {
            let destination = leech::destination(config, chat);
            let upload_dir = config.upload_dir.join(gid);
            leech::upload(bot, config, &files, destination, &upload_dir, progress, cancel).await?;
            if destination != chat {
                summary.dump_chat = Some(destination.0);
            }
        }
        UploadTarget::Drive => {
            let drive = ctx
                .drive
                .as_ref()
                .ok_or_else(|| BotError::Message("Google Drive is not configured".to_string()))?;
            let link = drive.upload(&files, &summary.name, progress, cancel).await?;
            summary.link = Some(link.url());
        }
    }
    Ok(summary)
}

/// Move a task to a new state and persist it
async fn advance(ctx: &BotContext, gid: &str, state: TaskState) {
    ctx.tasks.set_state(gid, state);
    let Some(db) = &ctx.db else {
        return;
    };
    let Some(info) = ctx.tasks.get(gid) else {
        return;
    };
    if let Err(e) = db.update_task(gid, state, &info.name, None).await {
        tracing::warn!("Failed to persist task {}: {}", gid, e);
    }
}

async fn fetch_telegram_file(
    bot: &Bot,
    ctx: &BotContext,
    file: &TelegramFile,
    download: &DownloadContext<'_>,
) -> BotResult<Vec<PathBuf>> {
    let remote = bot.get_file(file.file_id.clone()).await?;
    let name = sanitize_filename(&file.name);
    let path = download.dir.join(&name);
    download.progress.set_total(file.size);

    // A local Bot API server in --local mode hands out absolute paths
    let local = Path::new(&remote.path);
    if ctx.config.bot_api_url.is_some() && local.is_absolute() && tokio::fs::try_exists(local).await? {
        tokio::fs::copy(local, &path).await?;
    } else {
        let mut destination = tokio::fs::File::create(&path).await?;
        tokio::select! {
            biased;
            _ = download.cancel.cancelled() => return Err(EngineError::Cancelled.into()),
            result = bot.download_file(&remote.path, &mut destination) => result?,
        }
    }
    download.progress.set_done(file.size);

    if is_torrent_file(&name) {
        let data = tokio::fs::read(&path).await?;
        tokio::fs::remove_file(&path).await?;
        return Ok(ctx.downloader.fetch_torrent_file(&name, data, download).await?);
    }
    Ok(vec![path])
}

/// Name shown for the finished task
///
/// A single file gives its own name; files sharing one top-level folder
/// (a torrent or a Terabox folder) give the folder's name.
pub fn task_name(root: &Path, files: &[PathBuf]) -> Option<String> {
    if let [file] = files {
        return file.file_name().map(|n| n.to_string_lossy().into_owned());
    }

    let mut top = None;
    for file in files {
        let relative = file.strip_prefix(root).ok()?;
        let mut components = relative.components();
        let first = match components.next() {
            Some(Component::Normal(name)) => name,
            _ => return None,
        };
        components.next()?;
        match top {
            None => top = Some(first),
            Some(existing) if existing == first => {}
            Some(_) => return None,
        }
    }
    top.map(|name| name.to_string_lossy().into_owned())
}

async fn report_status(
    bot: Bot,
    tasks: TaskRegistry,
    gid: String,
    chat: ChatId,
    message_id: MessageId,
    interval: Duration,
    done: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = done.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
        let Some(info) = tasks.get(&gid) else {
            break;
        };
        let result = bot
            .edit_message_text(chat, message_id, status::format_task(&info))
            .parse_mode(ParseMode::Html)
            .reply_markup(task_keyboard(&gid))
            .await;
        match result {
            Ok(_) | Err(RequestError::Api(ApiError::MessageNotModified)) => {}
            Err(e) => tracing::debug!("Status update for {} failed: {}", gid, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::test_support::{context_in, context_with};
    use engine::LinkKind;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_source_from_text() {
        let source = Source::from_text("please grab https://example.com/a.zip thanks", false).unwrap();
        match source {
            Source::Link(link) => {
                assert_eq!(link.url, "https://example.com/a.zip");
                assert_eq!(link.kind, LinkKind::Direct);
            }
            other => panic!("unexpected source {:?}", other),
        }

        let forced = Source::from_text("https://example.com/a.zip", true).unwrap();
        assert!(matches!(forced, Source::Link(Link { kind: LinkKind::YtDlp, .. })));

        assert!(Source::from_text("no links here", false).is_err());
    }

    #[test]
    fn test_source_description() {
        let file = Source::TelegramFile(TelegramFile {
            file_id: "AgAD".to_string(),
            name: "video.mp4".to_string(),
            size: 10,
        });
        assert_eq!(file.description(), "telegram:AgAD");
        assert_eq!(file.display_name(), "video.mp4");
        assert!(!file.needs_torrent());

        let torrent = Source::TelegramFile(TelegramFile {
            file_id: "x".to_string(),
            name: "Ubuntu.TORRENT".to_string(),
            size: 10,
        });
        assert!(torrent.needs_torrent());
    }

    #[test]
    fn test_check_submission_rules() {
        let ctx = context_with(&[]);
        let direct = Source::from_text("https://example.com/a.zip", false).unwrap();
        assert!(check_submission(&ctx, &direct, UploadTarget::Telegram).is_ok());

        let err = check_submission(&ctx, &direct, UploadTarget::Drive).unwrap_err();
        assert!(err.to_string().contains("GDRIVE_ID"));

        let magnet = Source::from_text("magnet:?xt=urn:btih:abc&dn=x", false).unwrap();
        let err = check_submission(&ctx, &magnet, UploadTarget::Telegram).unwrap_err();
        assert!(err.to_string().contains("QBIT_HOST"));

        let big = Source::TelegramFile(TelegramFile {
            file_id: "x".to_string(),
            name: "big.mkv".to_string(),
            size: CLOUD_DOWNLOAD_LIMIT + 1,
        });
        assert!(check_submission(&ctx, &big, UploadTarget::Telegram).is_err());

        let local = context_with(&[("BOT_API_URL", "http://localhost:8081")]);
        assert!(check_submission(&local, &big, UploadTarget::Telegram).is_ok());
    }

    #[test]
    fn test_max_file_size_applies_to_telegram_files() {
        let ctx = context_with(&[("BOT_API_URL", "http://localhost:8081"), ("MAX_FILE_SIZE", "10")]);
        let file = |size| {
            Source::TelegramFile(TelegramFile {
                file_id: "x".to_string(),
                name: "clip.mp4".to_string(),
                size,
            })
        };

        let err = check_submission(&ctx, &file(100), UploadTarget::Telegram).unwrap_err();
        assert!(matches!(err, BotError::Engine(EngineError::TooLarge { size: 100, limit: 10 })));
        assert!(check_submission(&ctx, &file(10), UploadTarget::Telegram).is_ok());
    }

    async fn serve_file(name: &str) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(format!("/{}", name)))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 64]))
            .mount(&server)
            .await;
        server
    }

    fn register(ctx: &BotContext, source: &Source) -> TaskHandle {
        ctx.tasks.register(NewTask {
            name: source.display_name(),
            source: source.description(),
            target: UploadTarget::Telegram,
            user_id: 100,
            chat_id: 100,
        })
    }

    #[tokio::test]
    async fn test_execute_fails_when_every_file_is_excluded() {
        let server = serve_file("setup.exe").await;
        let dir = tempfile::tempdir().unwrap();
        let ctx = context_in(dir.path(), &[("EXCLUDED_EXTENSIONS", "exe .msi")]);
        let source = Source::from_text(&format!("{}/setup.exe", server.uri()), false).unwrap();
        let handle = register(&ctx, &source);
        assert_eq!(ctx.tasks.get(&handle.gid).unwrap().state, TaskState::Queued);

        let bot = Bot::new("1:test");
        let err = execute(&bot, &ctx, &handle, &source, UploadTarget::Telegram, ChatId(100))
            .await
            .unwrap_err();

        assert!(!err.is_cancelled());
        assert!(err.to_string().contains("excluded"));
        assert_eq!(ctx.tasks.get(&handle.gid).unwrap().state, TaskState::Downloading);
        assert!(dir.path().join("downloads").join(&handle.gid).join("setup.exe").is_file());
    }

    #[tokio::test]
    async fn test_execute_reports_cancellation() {
        let server = serve_file("movie.mkv").await;
        let dir = tempfile::tempdir().unwrap();
        let ctx = context_in(dir.path(), &[]);
        let source = Source::from_text(&format!("{}/movie.mkv", server.uri()), false).unwrap();
        let handle = register(&ctx, &source);
        handle.cancel.cancel();

        let bot = Bot::new("1:test");
        let err = execute(&bot, &ctx, &handle, &source, UploadTarget::Telegram, ChatId(100))
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_task_name_single_file() {
        let root = Path::new("/d/gid");
        let files = vec![root.join("movie.mkv")];
        assert_eq!(task_name(root, &files).as_deref(), Some("movie.mkv"));
    }

    #[test]
    fn test_task_name_shared_folder() {
        let root = Path::new("/d/gid");
        let files = vec![root.join("Album/01.flac"), root.join("Album/cd2/02.flac")];
        assert_eq!(task_name(root, &files).as_deref(), Some("Album"));
    }

    #[test]
    fn test_task_name_mixed() {
        let root = Path::new("/d/gid");
        let files = vec![root.join("a.mp4"), root.join("b.mp4")];
        assert_eq!(task_name(root, &files), None);

        let files = vec![root.join("A/1.mp4"), root.join("B/2.mp4")];
        assert_eq!(task_name(root, &files), None);
    }
}

//! Download adapters
//!
//! [`Downloader`] dispatches a classified [`Link`] to the adapter for its
//! source and returns the files it wrote into the task directory.

pub mod direct;
pub mod mediafire;
pub mod terabox;
pub mod torrent;
pub mod ytdlp;

use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{EngineError, EngineResult};
use crate::links::{Link, LinkKind};
use crate::task::Progress;
use direct::DirectOptions;
pub use torrent::TorrentApi;

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:122.0) Gecko/20100101 Firefox/122.0";

/// Where and how a single task downloads
#[derive(Debug, Clone, Copy)]
pub struct DownloadContext<'a> {
    /// Task directory, created by the caller
    pub dir: &'a Path,
    pub progress: &'a Progress,
    pub cancel: &'a CancellationToken,
}

impl<'a> DownloadContext<'a> {
    pub fn new(dir: &'a Path, progress: &'a Progress, cancel: &'a CancellationToken) -> Self {
        Self {
            dir,
            progress,
            cancel,
        }
    }
}

/// Entry point for all link downloads
#[derive(Clone, Debug)]
pub struct Downloader {
    http: reqwest::Client,
    terabox_api: String,
    ytdlp: PathBuf,
    torrent: Option<TorrentApi>,
    max_file_size: u64,
}

impl Downloader {
    pub fn new(config: &Config, torrent: Option<TorrentApi>) -> EngineResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .cookie_store(true)
            .connect_timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            terabox_api: config.terabox_api.clone(),
            ytdlp: config.ytdlp_path.clone(),
            torrent,
            max_file_size: config.max_file_size,
        })
    }

    /// Build from configuration, logging into qBittorrent when configured
    ///
    /// A failed qBittorrent login disables torrent support instead of
    /// failing startup.
    pub async fn connect(config: &Config) -> EngineResult<Self> {
        let torrent = match &config.qbit {
            Some(qbit) => {
                let api = TorrentApi::new(qbit);
                match api.login().await {
                    Ok(()) => {
                        tracing::info!("Connected to qBittorrent at {}", qbit.host);
                        Some(api)
                    }
                    Err(e) => {
                        tracing::warn!("Torrent support disabled: {}", e);
                        None
                    }
                }
            }
            None => None,
        };
        Self::new(config, torrent)
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    pub fn torrent_enabled(&self) -> bool {
        self.torrent.is_some()
    }

    pub fn max_file_size(&self) -> u64 {
        self.max_file_size
    }

    /// Download a link into `ctx.dir`
    ///
    /// # Returns
    /// * Paths of all downloaded files
    pub async fn fetch(&self, link: &Link, ctx: &DownloadContext<'_>) -> EngineResult<Vec<PathBuf>> {
        tracing::info!("Fetching {} link: {}", link.kind.label(), link.url);
        match &link.kind {
            LinkKind::Direct => Ok(vec![self.direct(&link.url, ctx, DirectOptions::default()).await?]),
            LinkKind::Terabox => {
                let entries = tokio::select! {
                    biased;
                    _ = ctx.cancel.cancelled() => return Err(EngineError::Cancelled),
                    entries = terabox::resolve(&self.http, &self.terabox_api, &link.url) => entries?,
                };
                let mut files = Vec::with_capacity(entries.len());
                for entry in entries {
                    let options = DirectOptions {
                        file_name: entry.title,
                        reject_html: false,
                    };
                    files.push(self.direct(&entry.url, ctx, options).await?);
                }
                Ok(files)
            }
            LinkKind::GoogleDrive { id } => {
                let url = format!(
                    "https://drive.usercontent.google.com/download?id={}&export=download&confirm=t",
                    urlencoding::encode(id)
                );
                let options = DirectOptions {
                    file_name: None,
                    reject_html: true,
                };
                Ok(vec![self.direct(&url, ctx, options).await?])
            }
            LinkKind::MediaFire => {
                let url = tokio::select! {
                    biased;
                    _ = ctx.cancel.cancelled() => return Err(EngineError::Cancelled),
                    url = mediafire::resolve(&self.http, &link.url) => url?,
                };
                Ok(vec![self.direct(&url, ctx, DirectOptions::default()).await?])
            }
            LinkKind::YtDlp => ytdlp::download(&self.ytdlp, &link.url, ctx, self.max_file_size).await,
            LinkKind::Magnet | LinkKind::TorrentUrl => {
                let api = self.torrent_api()?;
                let tag = task_tag(ctx.dir);
                api.add_urls(std::slice::from_ref(&link.url), ctx.dir, &tag).await?;
                api.wait(&tag, ctx, self.max_file_size).await
            }
            LinkKind::Mega => Err(EngineError::Unsupported(
                "Mega links are not supported".to_string(),
            )),
        }
    }

    /// Hand a `.torrent` file to qBittorrent and wait for its data
    pub async fn fetch_torrent_file(
        &self,
        name: &str,
        data: Vec<u8>,
        ctx: &DownloadContext<'_>,
    ) -> EngineResult<Vec<PathBuf>> {
        let api = self.torrent_api()?;
        let tag = task_tag(ctx.dir);
        api.add_file(name, data, ctx.dir, &tag).await?;
        api.wait(&tag, ctx, self.max_file_size).await
    }

    async fn direct(&self, url: &str, ctx: &DownloadContext<'_>, options: DirectOptions) -> EngineResult<PathBuf> {
        direct::download(&self.http, url, ctx, self.max_file_size, options).await
    }

    fn torrent_api(&self) -> EngineResult<&TorrentApi> {
        self.torrent
            .as_ref()
            .ok_or_else(|| EngineError::Unsupported("torrents need QBIT_HOST to be configured".to_string()))
    }
}

/// Task directories are named after the gid, which doubles as the torrent tag
fn task_tag(dir: &Path) -> String {
    dir.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| dir.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config() -> Config {
        let vars: HashMap<&str, &str> = [
            ("BOT_TOKEN", "1:x"),
            ("OWNER_ID", "1"),
            ("TELEGRAM_API", "1"),
            ("TELEGRAM_HASH", "h"),
            ("MAX_FILE_SIZE", "1024"),
        ]
        .into_iter()
        .collect();
        Config::from_lookup(|key| vars.get(key).map(|v| v.to_string())).unwrap()
    }

    #[tokio::test]
    async fn test_mega_unsupported() {
        let downloader = Downloader::new(&test_config(), None).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let progress = Progress::new();
        let cancel = CancellationToken::new();
        let ctx = DownloadContext::new(dir.path(), &progress, &cancel);

        let link = Link::parse("https://mega.nz/file/abc#key").unwrap();
        let err = downloader.fetch(&link, &ctx).await.unwrap_err();
        assert!(matches!(err, EngineError::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_torrent_without_qbittorrent() {
        let downloader = Downloader::new(&test_config(), None).unwrap();
        assert!(!downloader.torrent_enabled());
        let dir = tempfile::tempdir().unwrap();
        let progress = Progress::new();
        let cancel = CancellationToken::new();
        let ctx = DownloadContext::new(dir.path(), &progress, &cancel);

        let link = Link::parse("magnet:?xt=urn:btih:abc").unwrap();
        let err = downloader.fetch(&link, &ctx).await.unwrap_err();
        assert!(matches!(err, EngineError::Unsupported(_)));

        let err = downloader
            .fetch_torrent_file("a.torrent", vec![1, 2, 3], &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Unsupported(_)));
    }

    #[tokio::test]
    async fn test_fetch_direct() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/archive.zip"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8; 32]))
            .mount(&server)
            .await;

        let downloader = Downloader::new(&test_config(), None).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let progress = Progress::new();
        let cancel = CancellationToken::new();
        let ctx = DownloadContext::new(dir.path(), &progress, &cancel);

        let link = Link::parse(&format!("{}/archive.zip", server.uri())).unwrap();
        let files = downloader.fetch(&link, &ctx).await.unwrap();
        assert_eq!(files, vec![dir.path().join("archive.zip")]);
    }

    #[tokio::test]
    async fn test_terabox_resolve_stops_on_cancel() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(30)))
            .mount(&server)
            .await;

        let mut config = test_config();
        config.terabox_api = format!("{}/api", server.uri());
        let downloader = Downloader::new(&config, None).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let progress = Progress::new();
        let cancel = CancellationToken::new();
        let ctx = DownloadContext::new(dir.path(), &progress, &cancel);

        let link = Link::parse("https://terabox.com/s/1xyz").unwrap();
        let fetch = downloader.fetch(&link, &ctx);
        cancel.cancel();
        let err = tokio::time::timeout(Duration::from_secs(5), fetch)
            .await
            .unwrap()
            .unwrap_err();
        assert!(matches!(err, EngineError::Cancelled));
    }

    #[test]
    fn test_task_tag() {
        assert_eq!(task_tag(Path::new("downloads/0123456789abcdef")), "0123456789abcdef");
    }
}

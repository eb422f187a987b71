use qbit_rs::{
    model::{AddTorrentArg, Credential, GetTorrentListArg, Sep, State, Torrent, TorrentFile, TorrentSource},
    Qbit,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use super::DownloadContext;
use crate::config::QbitConfig;
use crate::error::{EngineError, EngineResult};
use crate::fs::collect_files;

const POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Wrapper around qBittorrent API client
#[derive(Clone)]
pub struct TorrentApi {
    pub client: Arc<Qbit>,
}

impl std::fmt::Debug for TorrentApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TorrentApi").finish_non_exhaustive()
    }
}

impl TorrentApi {
    pub fn new(config: &QbitConfig) -> Self {
        let credential = Credential::new(config.username.clone(), config.password.clone());
        let client = Arc::new(Qbit::new(config.host.as_str(), credential));
        TorrentApi { client }
    }

    /// Authenticate with the qBittorrent server
    pub async fn login(&self) -> EngineResult<()> {
        self.client.login(false).await.map_err(|e| {
            tracing::error!("Failed to login to qBittorrent: {}", e);
            EngineError::from(e)
        })
    }

    /// Add magnet or torrent URLs, tagged with the task gid
    pub async fn add_urls(&self, urls: &[String], save_path: &Path, tag: &str) -> EngineResult<()> {
        tracing::info!("Adding torrent for task {}: {:?}", tag, urls);
        let urls = urls
            .iter()
            .map(|url| {
                url.parse::<reqwest::Url>()
                    .map_err(|_| EngineError::InvalidLink(url.clone()))
            })
            .collect::<EngineResult<Vec<_>>>()?;
        let source = TorrentSource::Urls { urls: Sep::from(urls) };
        self.add(source, save_path, tag).await
    }

    /// Add a `.torrent` file's contents, tagged with the task gid
    pub async fn add_file(&self, name: &str, data: Vec<u8>, save_path: &Path, tag: &str) -> EngineResult<()> {
        tracing::info!("Adding torrent file {} for task {}", name, tag);
        let source = TorrentSource::TorrentFiles {
            torrents: vec![TorrentFile {
                filename: name.to_string(),
                data,
            }],
        };
        self.add(source, save_path, tag).await
    }

    async fn add(&self, source: TorrentSource, save_path: &Path, tag: &str) -> EngineResult<()> {
        let save_path = std::path::absolute(save_path).unwrap_or_else(|_| save_path.to_path_buf());
        let arg = AddTorrentArg {
            source,
            savepath: Some(save_path.display().to_string()),
            tags: Some(tag.to_string()),
            ..Default::default()
        };
        self.client.add_torrent(arg).await.map_err(|err| {
            tracing::error!("Error adding torrent: {}", err);
            EngineError::from(err)
        })
    }

    /// The torrent carrying a task's tag, if qBittorrent knows it yet
    pub async fn find_by_tag(&self, tag: &str) -> EngineResult<Option<Torrent>> {
        let arg = GetTorrentListArg {
            filter: None,
            category: None,
            tag: Some(tag.to_string()),
            sort: None,
            reverse: None,
            limit: None,
            offset: None,
            hashes: None,
        };
        let torrents = self.client.get_torrent_list(arg).await?;
        Ok(torrents.into_iter().next())
    }

    pub async fn delete(&self, hash: &str, delete_files: bool) -> EngineResult<()> {
        self.client
            .delete_torrents(vec![hash.to_string()], delete_files)
            .await
            .map_err(|err| {
                tracing::error!("Error deleting torrent {}: {}", hash, err);
                EngineError::from(err)
            })
    }

    /// Poll until the tagged torrent completes, fails or the task is cancelled
    ///
    /// Torrents larger than `max_size` are removed along with their data.
    ///
    /// # Returns
    /// * Every file under the task directory once the torrent finished
    pub async fn wait(&self, tag: &str, ctx: &DownloadContext<'_>, max_size: u64) -> EngineResult<Vec<PathBuf>> {
        wait_for(self, tag, ctx, max_size, POLL_INTERVAL).await
    }
}

/// Torrent fields the poll loop looks at
#[derive(Debug, Default)]
pub(crate) struct TorrentStatus {
    hash: Option<String>,
    state: Option<State>,
    progress: f64,
    size: i64,
    name: String,
}

impl From<Torrent> for TorrentStatus {
    fn from(torrent: Torrent) -> Self {
        Self {
            hash: torrent.hash,
            state: torrent.state,
            progress: torrent.progress.unwrap_or_default(),
            size: torrent.size.unwrap_or_default(),
            name: torrent.name.unwrap_or_default(),
        }
    }
}

/// qBittorrent operations needed while waiting on a task's torrent
pub(crate) trait TorrentControl {
    async fn lookup(&self, tag: &str) -> EngineResult<Option<TorrentStatus>>;
    async fn remove(&self, hash: &str, delete_files: bool) -> EngineResult<()>;
}

impl TorrentControl for TorrentApi {
    async fn lookup(&self, tag: &str) -> EngineResult<Option<TorrentStatus>> {
        Ok(self.find_by_tag(tag).await?.map(TorrentStatus::from))
    }

    async fn remove(&self, hash: &str, delete_files: bool) -> EngineResult<()> {
        self.delete(hash, delete_files).await
    }
}

async fn wait_for<C: TorrentControl>(
    control: &C,
    tag: &str,
    ctx: &DownloadContext<'_>,
    max_size: u64,
    interval: Duration,
) -> EngineResult<Vec<PathBuf>> {
    let mut hash: Option<String> = None;
    loop {
        tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => {
                discard(control, tag, hash.as_deref()).await;
                return Err(EngineError::Cancelled);
            }
            _ = tokio::time::sleep(interval) => {}
        }

        let status = match control.lookup(tag).await {
            Ok(Some(status)) => status,
            Ok(None) => {
                tracing::debug!("Torrent for task {} not listed yet", tag);
                continue;
            }
            Err(e) => {
                discard(control, tag, hash.as_deref()).await;
                return Err(e);
            }
        };
        if hash.is_none() {
            hash = status.hash.clone();
        }

        match poll_outcome(&status, max_size) {
            PollOutcome::Running { done, total } => {
                ctx.progress.set_total(total);
                ctx.progress.set_done(done);
            }
            PollOutcome::TooLarge { total } => {
                discard(control, tag, hash.as_deref()).await;
                return Err(EngineError::TooLarge {
                    size: total,
                    limit: max_size,
                });
            }
            PollOutcome::Failed(reason) => {
                discard(control, tag, hash.as_deref()).await;
                return Err(EngineError::Resolve(reason));
            }
            PollOutcome::Finished { total } => {
                ctx.progress.set_total(total);
                ctx.progress.set_done(total);
                if let Some(hash) = &hash {
                    if let Err(e) = control.remove(hash, false).await {
                        tracing::warn!("Could not remove finished torrent {}: {}", hash, e);
                    }
                }
                return collect_files(ctx.dir).await;
            }
        }
    }
}

/// Remove a task's torrent and its data, looking it up by tag when the hash is unknown
async fn discard<C: TorrentControl>(control: &C, tag: &str, known: Option<&str>) {
    let hash = match known {
        Some(hash) => Some(hash.to_string()),
        None => match control.lookup(tag).await {
            Ok(status) => status.and_then(|status| status.hash),
            Err(e) => {
                tracing::warn!("Could not look up torrent for task {}: {}", tag, e);
                None
            }
        },
    };
    let Some(hash) = hash else {
        return;
    };
    if let Err(e) = control.remove(&hash, true).await {
        tracing::warn!("Could not remove torrent {}: {}", hash, e);
    }
}

#[derive(Debug, PartialEq)]
enum PollOutcome {
    Running { done: u64, total: u64 },
    Finished { total: u64 },
    TooLarge { total: u64 },
    Failed(String),
}

fn poll_outcome(status: &TorrentStatus, max_size: u64) -> PollOutcome {
    if matches!(status.state, Some(State::Error) | Some(State::MissingFiles)) {
        return PollOutcome::Failed(format!("torrent {} errored in qBittorrent", status.name));
    }
    let total = status.size.max(0) as u64;
    if total > max_size {
        return PollOutcome::TooLarge { total };
    }
    if status.progress >= 1.0 {
        PollOutcome::Finished { total }
    } else {
        PollOutcome::Running {
            done: (total as f64 * status.progress) as u64,
            total,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Progress;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio_util::sync::CancellationToken;

    const LIMIT: u64 = 1000;

    fn status(hash: &str, state: State, progress: f64, size: i64) -> TorrentStatus {
        TorrentStatus {
            hash: Some(hash.to_string()),
            state: Some(state),
            progress,
            size,
            name: "ubuntu.iso".to_string(),
        }
    }

    /// Replays queued lookups and records removals
    #[derive(Default)]
    struct ScriptedQbit {
        lookups: Mutex<VecDeque<EngineResult<Option<TorrentStatus>>>>,
        removed: Mutex<Vec<(String, bool)>>,
    }

    impl ScriptedQbit {
        fn with(lookups: Vec<EngineResult<Option<TorrentStatus>>>) -> Self {
            Self {
                lookups: Mutex::new(lookups.into()),
                removed: Mutex::default(),
            }
        }

        fn removed(&self) -> Vec<(String, bool)> {
            self.removed.lock().unwrap().clone()
        }
    }

    impl TorrentControl for ScriptedQbit {
        async fn lookup(&self, _tag: &str) -> EngineResult<Option<TorrentStatus>> {
            self.lookups.lock().unwrap().pop_front().unwrap_or(Ok(None))
        }

        async fn remove(&self, hash: &str, delete_files: bool) -> EngineResult<()> {
            self.removed.lock().unwrap().push((hash.to_string(), delete_files));
            Ok(())
        }
    }

    async fn run_wait(qbit: &ScriptedQbit, dir: &std::path::Path, cancel: &CancellationToken) -> EngineResult<Vec<PathBuf>> {
        let progress = Progress::new();
        let ctx = DownloadContext::new(dir, &progress, cancel);
        wait_for(qbit, "0123456789abcdef", &ctx, LIMIT, Duration::from_millis(1)).await
    }

    #[test]
    fn test_poll_running() {
        assert_eq!(
            poll_outcome(&status("h", State::Downloading, 0.25, 1000), LIMIT),
            PollOutcome::Running { done: 250, total: 1000 }
        );
    }

    #[test]
    fn test_poll_finished() {
        assert_eq!(
            poll_outcome(&status("h", State::StalledUP, 1.0, 1000), LIMIT),
            PollOutcome::Finished { total: 1000 }
        );
    }

    #[test]
    fn test_poll_unknown_size() {
        assert_eq!(
            poll_outcome(&TorrentStatus { size: -1, ..Default::default() }, LIMIT),
            PollOutcome::Running { done: 0, total: 0 }
        );
    }

    #[test]
    fn test_poll_failed() {
        assert!(matches!(
            poll_outcome(&status("h", State::Error, 0.5, 1000), LIMIT),
            PollOutcome::Failed(_)
        ));
        assert!(matches!(
            poll_outcome(&status("h", State::MissingFiles, 0.5, 1000), LIMIT),
            PollOutcome::Failed(_)
        ));
    }

    #[test]
    fn test_poll_over_size_limit() {
        assert_eq!(
            poll_outcome(&status("h", State::Downloading, 0.0, 1001), LIMIT),
            PollOutcome::TooLarge { total: 1001 }
        );
    }

    #[tokio::test]
    async fn test_cancel_before_first_poll_removes_torrent() {
        let dir = tempfile::tempdir().unwrap();
        let qbit = ScriptedQbit::with(vec![Ok(Some(status("abc", State::Downloading, 0.1, 10)))]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = run_wait(&qbit, dir.path(), &cancel).await.unwrap_err();
        assert!(matches!(err, EngineError::Cancelled));
        assert_eq!(qbit.removed(), vec![("abc".to_string(), true)]);
    }

    #[tokio::test]
    async fn test_oversized_torrent_is_removed_with_data() {
        let dir = tempfile::tempdir().unwrap();
        let qbit = ScriptedQbit::with(vec![Ok(Some(status("abc", State::Downloading, 0.1, 5000)))]);
        let cancel = CancellationToken::new();

        let err = run_wait(&qbit, dir.path(), &cancel).await.unwrap_err();
        assert!(matches!(err, EngineError::TooLarge { size: 5000, limit: LIMIT }));
        assert_eq!(qbit.removed(), vec![("abc".to_string(), true)]);
    }

    #[tokio::test]
    async fn test_lookup_error_removes_torrent() {
        let dir = tempfile::tempdir().unwrap();
        let qbit = ScriptedQbit::with(vec![
            Err(EngineError::Resolve("connection reset".to_string())),
            Ok(Some(status("abc", State::Downloading, 0.1, 10))),
        ]);
        let cancel = CancellationToken::new();

        let err = run_wait(&qbit, dir.path(), &cancel).await.unwrap_err();
        assert!(matches!(err, EngineError::Resolve(_)));
        assert_eq!(qbit.removed(), vec![("abc".to_string(), true)]);
    }

    #[tokio::test]
    async fn test_finished_torrent_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("ubuntu.iso"), b"data").unwrap();
        let qbit = ScriptedQbit::with(vec![
            Ok(None),
            Ok(Some(status("abc", State::Downloading, 0.5, 4))),
            Ok(Some(status("abc", State::StalledUP, 1.0, 4))),
        ]);
        let cancel = CancellationToken::new();

        let files = run_wait(&qbit, dir.path(), &cancel).await.unwrap();
        assert_eq!(files, vec![dir.path().join("ubuntu.iso")]);
        assert_eq!(qbit.removed(), vec![("abc".to_string(), false)]);
    }
}

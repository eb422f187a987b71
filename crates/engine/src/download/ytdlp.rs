//! yt-dlp subprocess driver

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use super::DownloadContext;
use crate::error::{EngineError, EngineResult};
use crate::fs::collect_files;

const FORMAT: &str = "best[height<=720][ext=mp4]/best[ext=mp4]/best";
const PROGRESS_TEMPLATE: &str = "download:[progress] %(progress.downloaded_bytes)s %(progress.total_bytes)s %(progress.total_bytes_estimate)s";
const FILE_TEMPLATE: &str = "after_move:[file] %(filepath)s";
const STDERR_TAIL: usize = 8;

/// A line of interest from yt-dlp's stdout
#[derive(Debug, Clone, PartialEq)]
pub enum YtdlpEvent {
    Progress { downloaded: u64, total: Option<u64> },
    File(PathBuf),
}

/// Build the argument list for one download
pub fn build_args(url: &str, dir: &Path, max_file_size: u64) -> Vec<String> {
    vec![
        "-f".to_string(),
        FORMAT.to_string(),
        "--no-playlist".to_string(),
        "--max-filesize".to_string(),
        max_file_size.to_string(),
        "--newline".to_string(),
        "--progress".to_string(),
        "--progress-template".to_string(),
        PROGRESS_TEMPLATE.to_string(),
        "--print".to_string(),
        FILE_TEMPLATE.to_string(),
        "--no-simulate".to_string(),
        "-P".to_string(),
        dir.display().to_string(),
        "-o".to_string(),
        "%(title).180B.%(ext)s".to_string(),
        url.to_string(),
    ]
}

fn parse_number(value: &str) -> Option<u64> {
    if value == "NA" {
        return None;
    }
    value.parse::<f64>().ok().filter(|n| *n >= 0.0).map(|n| n as u64)
}

/// Parse one stdout line
pub fn parse_ytdlp_line(line: &str) -> Option<YtdlpEvent> {
    let line = line.trim();
    if let Some(rest) = line.strip_prefix("[progress] ") {
        let mut fields = rest.split_whitespace();
        let downloaded = parse_number(fields.next()?)?;
        let total = fields.next().and_then(parse_number);
        let estimate = fields.next().and_then(parse_number);
        return Some(YtdlpEvent::Progress {
            downloaded,
            total: total.or(estimate),
        });
    }
    line.strip_prefix("[file] ")
        .map(str::trim)
        .filter(|path| !path.is_empty())
        .map(|path| YtdlpEvent::File(PathBuf::from(path)))
}

/// Run yt-dlp for `url` and return the files it produced
pub async fn download(
    ytdlp: &Path,
    url: &str,
    ctx: &DownloadContext<'_>,
    max_file_size: u64,
) -> EngineResult<Vec<PathBuf>> {
    tracing::info!("yt-dlp download: {}", url);
    let mut child = Command::new(ytdlp)
        .args(build_args(url, ctx.dir, max_file_size))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                EngineError::Process(format!("{} not found", ytdlp.display()))
            }
            _ => EngineError::Io(e),
        })?;

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| EngineError::Process("yt-dlp stdout unavailable".to_string()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| EngineError::Process("yt-dlp stderr unavailable".to_string()))?;

    let stderr_task = tokio::spawn(async move {
        let mut tail = VecDeque::with_capacity(STDERR_TAIL);
        let mut lines = BufReader::new(stderr).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tail.len() == STDERR_TAIL {
                tail.pop_front();
            }
            tail.push_back(line);
        }
        tail.into_iter().collect::<Vec<_>>().join("\n")
    });

    let mut files = Vec::new();
    let mut lines = BufReader::new(stdout).lines();
    loop {
        let line = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => {
                if let Err(e) = child.kill().await {
                    tracing::warn!("Failed to kill yt-dlp: {}", e);
                }
                return Err(EngineError::Cancelled);
            }
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            break;
        };
        match parse_ytdlp_line(&line) {
            Some(YtdlpEvent::Progress { downloaded, total }) => {
                if let Some(total) = total {
                    ctx.progress.set_total(total);
                }
                ctx.progress.set_done(downloaded);
            }
            Some(YtdlpEvent::File(path)) => files.push(path),
            None => tracing::trace!("yt-dlp: {}", line),
        }
    }

    let status = tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => {
            if let Err(e) = child.kill().await {
                tracing::warn!("Failed to kill yt-dlp: {}", e);
            }
            return Err(EngineError::Cancelled);
        }
        status = child.wait() => status?,
    };
    let stderr_tail = stderr_task.await.unwrap_or_default();

    if !status.success() {
        let detail = if stderr_tail.is_empty() {
            format!("yt-dlp exited with {}", status)
        } else {
            stderr_tail
        };
        return Err(EngineError::Process(detail));
    }

    files.retain(|path| path.exists());
    if files.is_empty() {
        files = collect_files(ctx.dir).await?;
    }
    if files.is_empty() {
        return Err(EngineError::Process("yt-dlp produced no files".to_string()));
    }
    Ok(files)
}

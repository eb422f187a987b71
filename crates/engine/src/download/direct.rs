//! Streamed HTTP downloads

use futures::StreamExt;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;

use super::DownloadContext;
use crate::error::{EngineError, EngineResult};
use crate::fs::{filename_from_content_disposition, sanitize_filename};

/// Per-request tweaks for [`download`]
#[derive(Debug, Default, Clone)]
pub struct DirectOptions {
    /// Use this name instead of deriving one from the response
    pub file_name: Option<String>,
    /// Treat an HTML response as a failure (private or quota-limited files)
    pub reject_html: bool,
}

/// Stream `url` into `ctx.dir`
///
/// # Returns
/// * Path of the written file
pub async fn download(
    http: &reqwest::Client,
    url: &str,
    ctx: &DownloadContext<'_>,
    max_file_size: u64,
    options: DirectOptions,
) -> EngineResult<PathBuf> {
    tracing::info!("Direct download: {}", url);
    let response = tokio::select! {
        biased;
        _ = ctx.cancel.cancelled() => return Err(EngineError::Cancelled),
        response = http.get(url).send() => response?,
    };
    let response = response.error_for_status()?;

    if options.reject_html && is_html(&response) {
        return Err(EngineError::Resolve(
            "the file is private or its download quota was exceeded".to_string(),
        ));
    }

    if let Some(length) = response.content_length() {
        if length > max_file_size {
            return Err(EngineError::TooLarge {
                size: length,
                limit: max_file_size,
            });
        }
        ctx.progress.add_total(length);
    }

    let name = options
        .file_name
        .or_else(|| response_filename(&response))
        .map(|name| sanitize_filename(&name))
        .unwrap_or_else(|| format!("file_{}", chrono::Utc::now().timestamp()));
    let path = unique_path(ctx.dir, &name);

    let mut file = tokio::fs::File::create(&path).await?;
    let mut stream = response.bytes_stream();
    let mut written: u64 = 0;
    loop {
        let next = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => return Err(EngineError::Cancelled),
            next = stream.next() => next,
        };
        let Some(chunk) = next else {
            break;
        };
        let chunk = chunk?;
        written += chunk.len() as u64;
        if written > max_file_size {
            return Err(EngineError::TooLarge {
                size: written,
                limit: max_file_size,
            });
        }
        file.write_all(&chunk).await?;
        ctx.progress.advance(chunk.len() as u64);
    }
    file.flush().await?;

    tracing::info!("Downloaded {} ({} bytes)", path.display(), written);
    Ok(path)
}

fn is_html(response: &reqwest::Response) -> bool {
    response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_lowercase().starts_with("text/html"))
        .unwrap_or(false)
}

fn response_filename(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(reqwest::header::CONTENT_DISPOSITION)
        .and_then(|value| value.to_str().ok())
        .and_then(filename_from_content_disposition)
        .or_else(|| {
            response
                .url()
                .path_segments()
                .and_then(|mut segments| segments.next_back())
                .filter(|segment| !segment.is_empty())
                .map(|segment| {
                    urlencoding::decode(segment)
                        .map(|decoded| decoded.into_owned())
                        .unwrap_or_else(|_| segment.to_string())
                })
        })
}

/// `dir/name`, or `dir/name (n)` style if that already exists
fn unique_path(dir: &Path, name: &str) -> PathBuf {
    let candidate = dir.join(name);
    if !candidate.exists() {
        return candidate;
    }
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, format!(".{}", ext)),
        _ => (name, String::new()),
    };
    (1..)
        .map(|n| dir.join(format!("{} ({}){}", stem, n, ext)))
        .find(|path| !path.exists())
        .unwrap_or(candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::Progress;
    use tokio_util::sync::CancellationToken;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_download_uses_content_disposition() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/dl"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-disposition", "attachment; filename=\"report.pdf\"")
                    .set_body_bytes(vec![7u8; 64]),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let progress = Progress::new();
        let cancel = CancellationToken::new();
        let ctx = DownloadContext::new(dir.path(), &progress, &cancel);

        let http = reqwest::Client::new();
        let file = download(&http, &format!("{}/dl", server.uri()), &ctx, 1024, DirectOptions::default())
            .await
            .unwrap();

        assert_eq!(file.file_name().unwrap(), "report.pdf");
        assert_eq!(tokio::fs::read(&file).await.unwrap().len(), 64);
        assert_eq!(progress.snapshot().done, 64);
    }

    #[tokio::test]
    async fn test_download_name_from_path() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/files/my%20video.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"abc".to_vec()))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let progress = Progress::new();
        let cancel = CancellationToken::new();
        let ctx = DownloadContext::new(dir.path(), &progress, &cancel);

        let http = reqwest::Client::new();
        let url = format!("{}/files/my%20video.mp4", server.uri());
        let file = download(&http, &url, &ctx, 1024, DirectOptions::default()).await.unwrap();
        assert_eq!(file.file_name().unwrap(), "my video.mp4");
    }

    #[tokio::test]
    async fn test_download_too_large() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 100]))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let progress = Progress::new();
        let cancel = CancellationToken::new();
        let ctx = DownloadContext::new(dir.path(), &progress, &cancel);

        let http = reqwest::Client::new();
        let err = download(&http, &server.uri(), &ctx, 10, DirectOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::TooLarge { limit: 10, .. }));
    }

    #[tokio::test]
    async fn test_download_rejects_html() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw("<html>quota exceeded</html>", "text/html"),
            )
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let progress = Progress::new();
        let cancel = CancellationToken::new();
        let ctx = DownloadContext::new(dir.path(), &progress, &cancel);

        let options = DirectOptions {
            file_name: None,
            reject_html: true,
        };
        let http = reqwest::Client::new();
        let err = download(&http, &server.uri(), &ctx, 1024, options).await.unwrap_err();
        assert!(matches!(err, EngineError::Resolve(_)));
    }

    #[tokio::test]
    async fn test_download_http_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let progress = Progress::new();
        let cancel = CancellationToken::new();
        let ctx = DownloadContext::new(dir.path(), &progress, &cancel);

        let http = reqwest::Client::new();
        let err = download(&http, &server.uri(), &ctx, 1024, DirectOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Http(_)));
    }

    #[tokio::test]
    async fn test_download_cancelled() {
        let dir = tempfile::tempdir().unwrap();
        let progress = Progress::new();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let ctx = DownloadContext::new(dir.path(), &progress, &cancel);

        let http = reqwest::Client::new();
        let err = download(&http, "http://127.0.0.1:9/never", &ctx, 1024, DirectOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_unique_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"x").unwrap();
        assert_eq!(unique_path(dir.path(), "a.txt"), dir.path().join("a (1).txt"));
        assert_eq!(unique_path(dir.path(), "b.txt"), dir.path().join("b.txt"));
    }
}

//! File system helpers for task working directories

use std::path::{Path, PathBuf};

use crate::error::EngineResult;

/// Create each directory (and parents) if missing
pub async fn ensure_dirs<P: AsRef<Path>>(dirs: &[P]) -> EngineResult<()> {
    for dir in dirs {
        tokio::fs::create_dir_all(dir.as_ref()).await?;
    }
    Ok(())
}

/// Replace characters that are unsafe in file names
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| match c {
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    let trimmed = cleaned.trim().trim_matches('.');
    if trimmed.is_empty() {
        "file".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Parse a file name out of a `Content-Disposition` header
///
/// `filename*=UTF-8''...` wins over a plain `filename=`.
pub fn filename_from_content_disposition(header: &str) -> Option<String> {
    let mut plain = None;
    for part in header.split(';').map(str::trim) {
        let Some((key, value)) = part.split_once('=') else {
            continue;
        };
        let key = key.trim().to_lowercase();
        let value = value.trim();
        if key == "filename*" {
            let encoded = value
                .split_once("''")
                .map(|(_, rest)| rest)
                .unwrap_or(value)
                .trim_matches('"');
            if let Ok(decoded) = urlencoding::decode(encoded) {
                if !decoded.is_empty() {
                    return Some(decoded.into_owned());
                }
            }
        } else if key == "filename" {
            let value = value.trim_matches('"');
            if !value.is_empty() {
                plain = Some(value.to_string());
            }
        }
    }
    plain
}

/// Lowercase extension without the dot
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_lowercase())
}

/// Whether a file's extension is in the exclusion list
pub fn is_excluded(path: &Path, excluded: &[String]) -> bool {
    match extension_of(path) {
        Some(ext) => excluded.iter().any(|e| *e == ext),
        None => false,
    }
}

/// All regular files below `root`, sorted by path
pub async fn collect_files(root: &Path) -> EngineResult<Vec<PathBuf>> {
    let metadata = tokio::fs::metadata(root).await?;
    if metadata.is_file() {
        return Ok(vec![root.to_path_buf()]);
    }

    let mut files = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                pending.push(entry.path());
            } else if file_type.is_file() {
                files.push(entry.path());
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Sum of file sizes
pub async fn total_size(files: &[PathBuf]) -> EngineResult<u64> {
    let mut total = 0;
    for file in files {
        total += tokio::fs::metadata(file).await?.len();
    }
    Ok(total)
}

/// Remove a directory tree, ignoring a missing one
pub async fn remove_dir(path: &Path) {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => tracing::debug!("Removed {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!("Failed to remove {}: {}", path.display(), e),
    }
}

//! Splitting large files into numbered parts for Telegram

use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;

use crate::error::EngineResult;

/// Split `path` into parts of at most `part_size` bytes
///
/// Parts are written to `out_dir` as `name.001`, `name.002`, ...
///
/// # Returns
/// * The original path alone when the file already fits
pub async fn split_file(path: &Path, part_size: u64, out_dir: &Path) -> EngineResult<Vec<PathBuf>> {
    let size = tokio::fs::metadata(path).await?.len();
    if size <= part_size {
        return Ok(vec![path.to_path_buf()]);
    }

    tokio::fs::create_dir_all(out_dir).await?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string());

    let mut source = tokio::fs::File::open(path).await?;
    let mut parts = Vec::new();
    let mut remaining = size;
    let mut index = 1;
    while remaining > 0 {
        let part_path = out_dir.join(format!("{}.{:03}", name, index));
        let mut part = tokio::fs::File::create(&part_path).await?;
        let mut chunk = (&mut source).take(part_size);
        let written = tokio::io::copy(&mut chunk, &mut part).await?;
        if written == 0 {
            break;
        }
        remaining = remaining.saturating_sub(written);
        parts.push(part_path);
        index += 1;
    }

    tracing::info!("Split {} into {} parts", name, parts.len());
    Ok(parts)
}

/// Whether a path looks like a part produced by [`split_file`]
pub fn is_split_part(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.len() == 3 && ext.chars().all(|c| c.is_ascii_digit()))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_small_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("small.bin");
        tokio::fs::write(&file, vec![1u8; 10]).await.unwrap();

        let parts = split_file(&file, 10, &dir.path().join("out")).await.unwrap();
        assert_eq!(parts, vec![file]);
        assert!(!dir.path().join("out").exists());
    }

    #[tokio::test]
    async fn test_parts_concatenate_to_original() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("big.bin");
        let data: Vec<u8> = (0..2500u32).map(|i| (i % 251) as u8).collect();
        tokio::fs::write(&file, &data).await.unwrap();

        let out = dir.path().join("parts");
        let parts = split_file(&file, 1000, &out).await.unwrap();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0].file_name().unwrap(), "big.bin.001");
        assert_eq!(parts[2].file_name().unwrap(), "big.bin.003");

        let mut joined = Vec::new();
        for part in &parts {
            let bytes = tokio::fs::read(part).await.unwrap();
            assert!(bytes.len() <= 1000);
            assert!(is_split_part(part));
            joined.extend(bytes);
        }
        assert_eq!(joined, data);
    }

    #[test]
    fn test_is_split_part() {
        assert!(is_split_part(Path::new("movie.mkv.002")));
        assert!(!is_split_part(Path::new("movie.mkv")));
        assert!(!is_split_part(Path::new("archive.7z")));
    }
}

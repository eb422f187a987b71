//! Terabox share links, resolved through an external API

use serde_json::Value;

use crate::error::{EngineError, EngineResult};

const STATUS_KEY: &str = "✅ Status";
const INFO_KEY: &str = "📜 Extracted Info";
const TITLE_KEY: &str = "📂 Title";
const LINK_KEY: &str = "🔽 Direct Download Link";

/// One downloadable file behind a share link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeraboxEntry {
    pub title: Option<String>,
    pub url: String,
}

/// Turn a share link into direct download links
pub async fn resolve(http: &reqwest::Client, api: &str, url: &str) -> EngineResult<Vec<TeraboxEntry>> {
    if url.contains("/file/") {
        return Ok(vec![TeraboxEntry {
            title: None,
            url: url.to_string(),
        }]);
    }

    let request = format!("{}?url={}", api, urlencoding::encode(url));
    tracing::info!("Resolving Terabox link through {}", api);
    let response = http.get(&request).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(EngineError::Resolve(format!("Terabox API returned {}", status)));
    }
    let body: Value = response.json().await?;
    parse_terabox_response(&body)
}

/// Extract entries from the resolver's JSON
pub fn parse_terabox_response(body: &Value) -> EngineResult<Vec<TeraboxEntry>> {
    if body.get(STATUS_KEY).is_none() {
        return Err(EngineError::Resolve("file not found".to_string()));
    }
    let info = body
        .get(INFO_KEY)
        .and_then(Value::as_array)
        .ok_or_else(|| EngineError::Resolve("no file information in response".to_string()))?;

    let entries: Vec<TeraboxEntry> = info
        .iter()
        .enumerate()
        .filter_map(|(index, item)| {
            let url = item.get(LINK_KEY)?.as_str()?.to_string();
            if url.is_empty() {
                return None;
            }
            let title = item
                .get(TITLE_KEY)
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| format!("terabox_file_{}", index));
            Some(TeraboxEntry {
                title: Some(with_extension(&title)),
                url,
            })
        })
        .collect();

    if entries.is_empty() {
        return Err(EngineError::Resolve("no downloadable files".to_string()));
    }
    Ok(entries)
}

fn with_extension(title: &str) -> String {
    match title.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() && !ext.contains(' ') => {
            title.to_string()
        }
        _ => format!("{}.mp4", title),
    }
}

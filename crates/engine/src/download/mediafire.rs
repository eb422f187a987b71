//! MediaFire pages: scrape the real download link

use regex::Regex;
use std::sync::OnceLock;

use crate::error::{EngineError, EngineResult};

fn link_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"https?://download[0-9a-z-]*\.mediafire\.com/[^"'\s<>]+"#)
            .unwrap_or_else(|e| panic!("invalid MediaFire pattern: {}", e))
    })
}

/// First download-server link in a MediaFire page
pub fn extract_mediafire_link(html: &str) -> Option<String> {
    link_pattern().find(html).map(|m| m.as_str().to_string())
}

pub async fn resolve(http: &reqwest::Client, url: &str) -> EngineResult<String> {
    let page = http.get(url).send().await?.error_for_status()?.text().await?;
    extract_mediafire_link(&page)
        .ok_or_else(|| EngineError::Resolve("no MediaFire download link on the page".to_string()))
}

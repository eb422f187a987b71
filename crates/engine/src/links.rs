//! Link classification
//!
//! Decides which download adapter handles a piece of user-supplied text.

use reqwest::Url;

use crate::error::{EngineError, EngineResult};

/// Hosts served by the Terabox resolver
pub const TERABOX_DOMAINS: &[&str] = &[
    "terabox.com",
    "nephobox.com",
    "4funbox.com",
    "mirrobox.com",
    "momerybox.com",
    "teraboxapp.com",
    "1024tera.com",
    "gibibox.com",
    "goaibox.com",
    "terasharelink.com",
    "teraboxlink.com",
    "freeterabox.com",
    "1024terabox.com",
    "teraboxshare.com",
    "terafileshare.com",
];

/// Media sites handed to yt-dlp without `/ytdl`
const YTDLP_DOMAINS: &[&str] = &[
    "youtube.com",
    "youtu.be",
    "instagram.com",
    "twitter.com",
    "x.com",
    "tiktok.com",
    "facebook.com",
    "fb.watch",
    "vimeo.com",
    "dailymotion.com",
    "twitch.tv",
    "soundcloud.com",
    "reddit.com",
    "bilibili.com",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkKind {
    Direct,
    Terabox,
    YtDlp,
    GoogleDrive { id: String },
    MediaFire,
    Mega,
    Magnet,
    /// HTTP link to a `.torrent` file
    TorrentUrl,
}

impl LinkKind {
    pub fn label(&self) -> &'static str {
        match self {
            LinkKind::Direct => "Direct",
            LinkKind::Terabox => "Terabox",
            LinkKind::YtDlp => "yt-dlp",
            LinkKind::GoogleDrive { .. } => "Google Drive",
            LinkKind::MediaFire => "MediaFire",
            LinkKind::Mega => "Mega",
            LinkKind::Magnet => "Magnet",
            LinkKind::TorrentUrl => "Torrent",
        }
    }

    /// Whether the link is fetched through qBittorrent
    pub fn is_torrent(&self) -> bool {
        matches!(self, LinkKind::Magnet | LinkKind::TorrentUrl)
    }
}

/// A classified link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Link {
    pub url: String,
    pub kind: LinkKind,
}

impl Link {
    /// Classify text as a link
    ///
    /// # Errors
    /// Returns `InvalidLink` for anything that is not a magnet or http(s) URL
    pub fn parse(text: &str) -> EngineResult<Self> {
        let text = text.trim();
        if text.starts_with("magnet:?") {
            return Ok(Link {
                url: text.to_string(),
                kind: LinkKind::Magnet,
            });
        }

        let url = parse_http(text)?;
        let host = host_of(&url);
        let kind = if matches_domain(&host, TERABOX_DOMAINS) {
            LinkKind::Terabox
        } else if host == "drive.google.com" || host == "docs.google.com" {
            match extract_gdrive_id(text) {
                Some(id) => LinkKind::GoogleDrive { id },
                None => LinkKind::Direct,
            }
        } else if matches_domain(&host, &["mega.nz", "mega.co.nz"]) {
            LinkKind::Mega
        } else if matches_domain(&host, &["mediafire.com"]) {
            LinkKind::MediaFire
        } else if matches_domain(&host, YTDLP_DOMAINS) {
            LinkKind::YtDlp
        } else if url.path().to_lowercase().ends_with(".torrent") {
            LinkKind::TorrentUrl
        } else {
            LinkKind::Direct
        };

        Ok(Link {
            url: text.to_string(),
            kind,
        })
    }

    /// Classify text as a yt-dlp link regardless of host
    pub fn parse_ytdl(text: &str) -> EngineResult<Self> {
        let text = text.trim();
        parse_http(text)?;
        Ok(Link {
            url: text.to_string(),
            kind: LinkKind::YtDlp,
        })
    }

    /// Best-effort display name before the download starts
    pub fn display_name(&self) -> String {
        if self.kind == LinkKind::Magnet {
            return magnet_display_name(&self.url).unwrap_or_else(|| "Magnet".to_string());
        }
        Url::parse(&self.url)
            .ok()
            .and_then(|url| {
                url.path_segments()
                    .and_then(|mut segments| segments.next_back().map(str::to_string))
            })
            .filter(|segment| !segment.is_empty())
            .map(|segment| {
                urlencoding::decode(&segment)
                    .map(|decoded| decoded.into_owned())
                    .unwrap_or(segment)
            })
            .unwrap_or_else(|| self.url.clone())
    }
}

fn parse_http(text: &str) -> EngineResult<Url> {
    let url = Url::parse(text).map_err(|_| EngineError::InvalidLink(text.to_string()))?;
    match url.scheme() {
        "http" | "https" if url.host_str().is_some() => Ok(url),
        _ => Err(EngineError::InvalidLink(text.to_string())),
    }
}

fn host_of(url: &Url) -> String {
    url.host_str()
        .unwrap_or_default()
        .trim_start_matches("www.")
        .to_lowercase()
}

fn matches_domain(host: &str, domains: &[&str]) -> bool {
    domains
        .iter()
        .any(|domain| host == *domain || host.ends_with(&format!(".{}", domain)))
}

/// Find the first http(s) URL in free text
pub fn find_url(text: &str) -> Option<String> {
    text.split_whitespace()
        .find(|word| word.starts_with("http://") || word.starts_with("https://") || word.starts_with("magnet:?"))
        .map(str::to_string)
}

/// Extract the info hash from a magnet link
///
/// Magnet links have the format: magnet:?xt=urn:btih:HASH&...
pub fn extract_info_hash(magnet_url: &str) -> Option<String> {
    magnet_param(magnet_url, "xt")
        .and_then(|xt| xt.strip_prefix("urn:btih:").map(str::to_string))
        .filter(|hash| !hash.is_empty())
        .map(|hash| hash.to_lowercase())
}

/// The `dn` (display name) parameter of a magnet link
pub fn magnet_display_name(magnet_url: &str) -> Option<String> {
    magnet_param(magnet_url, "dn").map(|name| name.replace('+', " "))
}

fn magnet_param(magnet_url: &str, key: &str) -> Option<String> {
    let query = magnet_url.strip_prefix("magnet:?")?;
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == key)
        .map(|(_, v)| {
            urlencoding::decode(v)
                .map(|decoded| decoded.into_owned())
                .unwrap_or_else(|_| v.to_string())
        })
        .filter(|v| !v.is_empty())
}

/// Extract a file id from the usual Google Drive link shapes
pub fn extract_gdrive_id(link: &str) -> Option<String> {
    let url = Url::parse(link).ok()?;
    if let Some((_, id)) = url.query_pairs().find(|(k, _)| k == "id") {
        return Some(id.into_owned()).filter(|id| !id.is_empty());
    }
    let segments: Vec<&str> = url.path_segments()?.collect();
    segments
        .windows(2)
        .find(|pair| pair[0] == "d" || pair[0] == "folders")
        .map(|pair| pair[1].to_string())
        .filter(|id| !id.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify() {
        let cases = [
            ("https://www.terabox.com/s/1abc", LinkKind::Terabox),
            ("https://1024terabox.com/s/1abc", LinkKind::Terabox),
            ("https://mega.nz/file/abc#key", LinkKind::Mega),
            ("https://www.mediafire.com/file/abc/f.zip/file", LinkKind::MediaFire),
            ("https://youtu.be/dQw4w9WgXcQ", LinkKind::YtDlp),
            ("https://m.youtube.com/watch?v=x", LinkKind::YtDlp),
            ("https://example.com/ubuntu.torrent", LinkKind::TorrentUrl),
            ("https://example.com/file.zip", LinkKind::Direct),
            ("magnet:?xt=urn:btih:abc", LinkKind::Magnet),
        ];
        for (text, kind) in cases {
            assert_eq!(Link::parse(text).unwrap().kind, kind, "{}", text);
        }
    }

    #[test]
    fn test_lookalike_host_is_direct() {
        let link = Link::parse("https://notyoutube.com/video").unwrap();
        assert_eq!(link.kind, LinkKind::Direct);
    }

    #[test]
    fn test_google_drive() {
        let link = Link::parse("https://drive.google.com/file/d/1AbC_x/view?usp=sharing").unwrap();
        assert_eq!(link.kind, LinkKind::GoogleDrive { id: "1AbC_x".to_string() });

        let link = Link::parse("https://drive.google.com/uc?id=XYZ&export=download").unwrap();
        assert_eq!(link.kind, LinkKind::GoogleDrive { id: "XYZ".to_string() });
    }

    #[test]
    fn test_rejects_non_links() {
        assert!(Link::parse("hello world").is_err());
        assert!(Link::parse("ftp://example.com/file").is_err());
        assert!(Link::parse("").is_err());
        assert!(Link::parse_ytdl("not a url").is_err());
    }

    #[test]
    fn test_ytdl_forces_kind() {
        let link = Link::parse_ytdl("https://example.com/page").unwrap();
        assert_eq!(link.kind, LinkKind::YtDlp);
    }

    #[test]
    fn test_extract_info_hash() {
        let magnet = "magnet:?xt=urn:btih:abc123def456&dn=Test";
        assert_eq!(extract_info_hash(magnet), Some("abc123def456".to_string()));

        let magnet = "magnet:?dn=Test&xt=urn:btih:ABC123DEF456&tr=http://tracker.example.com";
        assert_eq!(extract_info_hash(magnet), Some("abc123def456".to_string()));

        assert_eq!(extract_info_hash("http://example.com/file.torrent"), None);
        assert_eq!(extract_info_hash("magnet:?dn=Only+Name"), None);
    }

    #[test]
    fn test_display_name() {
        let link = Link::parse("magnet:?xt=urn:btih:abc&dn=Big%20Buck+Bunny").unwrap();
        assert_eq!(link.display_name(), "Big Buck Bunny");

        let link = Link::parse("https://example.com/dir/my%20file.zip").unwrap();
        assert_eq!(link.display_name(), "my file.zip");
    }

    #[test]
    fn test_find_url() {
        assert_eq!(
            find_url("check this https://example.com/a out"),
            Some("https://example.com/a".to_string())
        );
        assert_eq!(find_url("no links here"), None);
    }
}

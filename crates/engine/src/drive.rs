//! Google Drive uploader
//!
//! Talks to the Drive v3 REST API directly: OAuth tokens come from either a
//! `token.json` refresh token or a directory of service-account keys, and
//! files go up through resumable upload sessions in 8 MiB chunks.

use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use std::io::SeekFrom;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::error::{EngineError, EngineResult};
use crate::task::Progress;

pub const CHUNK_SIZE: u64 = 8 * 1024 * 1024;
const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const API_BASE: &str = "https://www.googleapis.com/drive/v3";
const UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";
const FOLDER_MIME: &str = "application/vnd.google-apps.folder";
const TOKEN_MARGIN: Duration = Duration::from_secs(60);
/// 308 replies in a row that commit nothing before the upload is abandoned
const MAX_STALLED_CHUNKS: u32 = 3;

/// `token.json` in authorized-user format
#[derive(Debug, Clone, Deserialize)]
pub struct UserCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

/// The fields of a service-account key we need
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceAccount {
    pub client_email: String,
    pub private_key: String,
    #[serde(default)]
    pub token_uri: Option<String>,
}

#[derive(Debug, Clone)]
pub enum Credentials {
    User(UserCredentials),
    ServiceAccounts(Vec<ServiceAccount>),
}

#[derive(Debug, Serialize)]
struct JwtClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expiry")]
    expires_in: u64,
}

fn default_expiry() -> u64 {
    3600
}

#[derive(Debug, Deserialize)]
struct DriveFile {
    id: String,
}

#[derive(Debug, Default)]
struct TokenState {
    token: Option<(String, Instant)>,
    account: usize,
}

/// Result of an upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriveLink {
    pub id: String,
    pub name: String,
    pub is_folder: bool,
}

impl DriveLink {
    pub fn url(&self) -> String {
        if self.is_folder {
            folder_link(&self.id)
        } else {
            file_link(&self.id)
        }
    }
}

pub fn file_link(id: &str) -> String {
    format!("https://drive.google.com/file/d/{}/view", id)
}

pub fn folder_link(id: &str) -> String {
    format!("https://drive.google.com/drive/folders/{}", id)
}

/// Read credentials from `token.json` or every `*.json` in the accounts directory
pub async fn load_credentials(
    token_path: &Path,
    accounts_dir: &Path,
    use_service_accounts: bool,
) -> EngineResult<Credentials> {
    if use_service_accounts {
        let mut paths = Vec::new();
        let mut entries = tokio::fs::read_dir(accounts_dir).await.map_err(|e| {
            EngineError::Config(format!("cannot read {}: {}", accounts_dir.display(), e))
        })?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut accounts = Vec::with_capacity(paths.len());
        for path in paths {
            let raw = tokio::fs::read(&path).await?;
            match serde_json::from_slice::<ServiceAccount>(&raw) {
                Ok(account) => accounts.push(account),
                Err(e) => tracing::warn!("Skipping service account {}: {}", path.display(), e),
            }
        }
        if accounts.is_empty() {
            return Err(EngineError::Config(format!(
                "no service accounts found in {}",
                accounts_dir.display()
            )));
        }
        tracing::info!("Loaded {} service account(s)", accounts.len());
        Ok(Credentials::ServiceAccounts(accounts))
    } else {
        let raw = tokio::fs::read(token_path).await.map_err(|e| {
            EngineError::Config(format!("cannot read {}: {}", token_path.display(), e))
        })?;
        Ok(Credentials::User(serde_json::from_slice(&raw)?))
    }
}

/// Drive API endpoints, overridable for tests
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub token_url: String,
    pub api_base: String,
    pub upload_base: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            token_url: TOKEN_URL.to_string(),
            api_base: API_BASE.to_string(),
            upload_base: UPLOAD_BASE.to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct DriveUploader {
    http: reqwest::Client,
    parent_id: String,
    team_drive: bool,
    credentials: Arc<Credentials>,
    state: Arc<Mutex<TokenState>>,
    endpoints: Endpoints,
    chunk_size: u64,
}

impl DriveUploader {
    pub fn new(
        http: reqwest::Client,
        parent_id: String,
        team_drive: bool,
        credentials: Credentials,
        endpoints: Endpoints,
    ) -> Self {
        Self {
            http,
            parent_id,
            team_drive,
            credentials: Arc::new(credentials),
            state: Arc::new(Mutex::new(TokenState::default())),
            endpoints,
            chunk_size: CHUNK_SIZE,
        }
    }

    /// Bytes sent per PUT of a resumable session
    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    /// Build an uploader when `GDRIVE_ID` is configured
    pub async fn from_config(config: &Config, http: reqwest::Client) -> EngineResult<Option<Self>> {
        let Some(parent_id) = config.gdrive_id.clone() else {
            return Ok(None);
        };
        let credentials = load_credentials(
            &config.gdrive_token_path,
            &config.accounts_dir,
            config.use_service_accounts,
        )
        .await?;
        Ok(Some(Self::new(
            http,
            parent_id,
            config.is_team_drive,
            credentials,
            Endpoints::default(),
        )))
    }

    fn account_count(&self) -> usize {
        match self.credentials.as_ref() {
            Credentials::User(_) => 1,
            Credentials::ServiceAccounts(accounts) => accounts.len(),
        }
    }

    /// A valid access token, refreshed when close to expiry
    async fn access_token(&self) -> EngineResult<String> {
        let mut state = self.state.lock().await;
        if let Some((token, expires)) = &state.token {
            if Instant::now() + TOKEN_MARGIN < *expires {
                return Ok(token.clone());
            }
        }

        let form: Vec<(&str, String)> = match self.credentials.as_ref() {
            Credentials::User(user) => vec![
                ("grant_type", "refresh_token".to_string()),
                ("client_id", user.client_id.clone()),
                ("client_secret", user.client_secret.clone()),
                ("refresh_token", user.refresh_token.clone()),
            ],
            Credentials::ServiceAccounts(accounts) => {
                let account = &accounts[state.account % accounts.len()];
                vec![
                    ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer".to_string()),
                    ("assertion", self.sign_assertion(account)?),
                ]
            }
        };

        let response = self.http.post(&self.endpoints.token_url).form(&form).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EngineError::Drive(format!("token exchange failed ({}): {}", status, body)));
        }
        let token: TokenResponse = response.json().await?;
        let expires = Instant::now() + Duration::from_secs(token.expires_in);
        state.token = Some((token.access_token.clone(), expires));
        Ok(token.access_token)
    }

    fn sign_assertion(&self, account: &ServiceAccount) -> EngineResult<String> {
        let now = chrono::Utc::now().timestamp();
        let aud = account.token_uri.as_deref().unwrap_or(&self.endpoints.token_url);
        let claims = JwtClaims {
            iss: &account.client_email,
            scope: DRIVE_SCOPE,
            aud,
            iat: now,
            exp: now + 3600,
        };
        let key = EncodingKey::from_rsa_pem(account.private_key.as_bytes())
            .map_err(|e| EngineError::Drive(format!("invalid service account key: {}", e)))?;
        jsonwebtoken::encode(&Header::new(Algorithm::RS256), &claims, &key)
            .map_err(|e| EngineError::Drive(format!("failed to sign service account token: {}", e)))
    }

    /// Switch to the next service account
    async fn rotate(&self) {
        let mut state = self.state.lock().await;
        state.account = (state.account + 1) % self.account_count().max(1);
        state.token = None;
        tracing::info!("Switched to service account #{}", state.account);
    }

    fn all_drives(&self) -> &'static str {
        if self.team_drive {
            "true"
        } else {
            "false"
        }
    }

    /// Upload one or many files
    ///
    /// A single file lands directly in the configured folder; several files
    /// get a new folder named `name`.
    pub async fn upload(
        &self,
        files: &[PathBuf],
        name: &str,
        progress: &Progress,
        cancel: &CancellationToken,
    ) -> EngineResult<DriveLink> {
        let link = match files {
            [] => return Err(EngineError::Drive("nothing to upload".to_string())),
            [file] => {
                let file_name = display_name(file);
                let id = self.upload_file(file, &self.parent_id, progress, cancel).await?;
                DriveLink {
                    id,
                    name: file_name,
                    is_folder: false,
                }
            }
            files => {
                let folder = self.create_folder(name, &self.parent_id).await?;
                for file in files {
                    self.upload_file(file, &folder, progress, cancel).await?;
                }
                DriveLink {
                    id: folder,
                    name: name.to_string(),
                    is_folder: true,
                }
            }
        };

        if let Err(e) = self.make_public(&link.id).await {
            tracing::warn!("Could not share {}: {}", link.id, e);
        }
        Ok(link)
    }

    pub async fn create_folder(&self, name: &str, parent: &str) -> EngineResult<String> {
        let token = self.access_token().await?;
        let url = format!("{}/files?supportsAllDrives={}", self.endpoints.api_base, self.all_drives());
        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&json!({ "name": name, "mimeType": FOLDER_MIME, "parents": [parent] }))
            .send()
            .await?;
        let file: DriveFile = drive_json(response).await?;
        tracing::info!("Created Drive folder {} ({})", name, file.id);
        Ok(file.id)
    }

    /// Give anyone with the link read access
    pub async fn make_public(&self, id: &str) -> EngineResult<()> {
        let token = self.access_token().await?;
        let url = format!(
            "{}/files/{}/permissions?supportsAllDrives={}",
            self.endpoints.api_base,
            id,
            self.all_drives()
        );
        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(&json!({ "role": "reader", "type": "anyone" }))
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(EngineError::Drive(format!("permission update returned {}", response.status())));
        }
        Ok(())
    }

    /// Open a resumable session, rotating service accounts on 403
    async fn start_session(&self, name: &str, parent: &str, size: u64) -> EngineResult<String> {
        let url = format!(
            "{}/files?uploadType=resumable&supportsAllDrives={}",
            self.endpoints.upload_base,
            self.all_drives()
        );
        let attempts = self.account_count();
        for attempt in 1..=attempts {
            let token = self.access_token().await?;
            let response = self
                .http
                .post(&url)
                .bearer_auth(token)
                .header("X-Upload-Content-Length", size)
                .json(&json!({ "name": name, "parents": [parent] }))
                .send()
                .await?;

            if response.status() == StatusCode::FORBIDDEN
                && matches!(self.credentials.as_ref(), Credentials::ServiceAccounts(_))
                && attempt < attempts
            {
                tracing::warn!("Upload session refused, rotating service account");
                self.rotate().await;
                continue;
            }
            if !response.status().is_success() {
                let status = response.status();
                let body = response.text().await.unwrap_or_default();
                return Err(EngineError::Drive(format!("upload session failed ({}): {}", status, body)));
            }
            return response
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|value| value.to_str().ok())
                .map(str::to_string)
                .ok_or_else(|| EngineError::Drive("upload session without location".to_string()));
        }
        Err(EngineError::Drive("all service accounts refused the upload".to_string()))
    }

    /// Upload a single file into `parent`
    ///
    /// # Returns
    /// * Drive file id
    pub async fn upload_file(
        &self,
        path: &Path,
        parent: &str,
        progress: &Progress,
        cancel: &CancellationToken,
    ) -> EngineResult<String> {
        let name = display_name(path);
        let size = tokio::fs::metadata(path).await?.len();
        let session = self.start_session(&name, parent, size).await?;
        tracing::info!("Uploading {} ({} bytes) to Drive", name, size);

        let mut file = tokio::fs::File::open(path).await?;
        let mut offset: u64 = 0;
        let mut stalled = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            let len = self.chunk_size.min(size - offset);
            let mut chunk = vec![0u8; len as usize];
            file.seek(SeekFrom::Start(offset)).await?;
            file.read_exact(&mut chunk).await?;
            let range = if len == 0 {
                format!("bytes */{}", size)
            } else {
                format!("bytes {}-{}/{}", offset, offset + len - 1, size)
            };

            let response = self
                .http
                .put(&session)
                .header(reqwest::header::CONTENT_RANGE, range)
                .body(chunk)
                .send()
                .await?;

            match response.status().as_u16() {
                308 => {
                    // Drive may keep only part of a chunk; resume after what it stored
                    let committed = committed_bytes(response.headers()).min(size);
                    if committed > offset {
                        progress.advance(committed - offset);
                        offset = committed;
                        stalled = 0;
                    } else {
                        stalled += 1;
                        if stalled >= MAX_STALLED_CHUNKS {
                            return Err(EngineError::Drive(format!(
                                "upload of {} stalled at byte {}",
                                name, offset
                            )));
                        }
                    }
                }
                200 | 201 => {
                    progress.advance(size - offset);
                    let file: DriveFile = response.json().await?;
                    return Ok(file.id);
                }
                status => {
                    let body = response.text().await.unwrap_or_default();
                    return Err(EngineError::Drive(format!("chunk upload failed ({}): {}", status, body)));
                }
            }
        }
    }
}

/// Bytes stored so far, from a 308 reply's `Range: bytes=0-N`
fn committed_bytes(headers: &reqwest::header::HeaderMap) -> u64 {
    range_end(headers).map(|end| end + 1).unwrap_or(0)
}

fn range_end(headers: &reqwest::header::HeaderMap) -> Option<u64> {
    let range = headers.get(reqwest::header::RANGE)?.to_str().ok()?;
    let end = range.trim().strip_prefix("bytes=")?.split('-').nth(1)?;
    end.trim().parse().ok()
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "file".to_string())
}

async fn drive_json<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> EngineResult<T> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(EngineError::Drive(format!("{}: {}", status, body)));
    }
    Ok(response.json().await?)
}

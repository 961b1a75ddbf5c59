//! External file-storage client (Google Drive).
//!
//! Handles the OAuth2 token lifecycle (authorization-code exchange and
//! transparent refresh), folder search-or-create, and multipart file
//! upload. The refreshed token is persisted to disk before any upload so
//! a crash never loses it.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tokio::sync::Mutex;
use tracing::{debug, info};

const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const FILES_URL: &str = "https://www.googleapis.com/drive/v3/files";
const UPLOAD_URL: &str = "https://www.googleapis.com/upload/drive/v3/files?uploadType=multipart";
const FOLDER_MIME: &str = "application/vnd.google-apps.folder";
const SCOPE: &str = "https://www.googleapis.com/auth/drive.file";

/// Errors from the file-storage provider
#[derive(Debug, Error)]
pub enum DriveError {
    #[error("drive auth failed: {0}")]
    Auth(String),

    #[error("drive request failed: {0}")]
    Network(String),

    #[error("drive API error {status}: {message}")]
    Api { status: u16, message: String },
}

impl From<reqwest::Error> for DriveError {
    fn from(e: reqwest::Error) -> Self {
        DriveError::Network(e.to_string())
    }
}

/// Trait seam for the external file-storage account
#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Resolve or create a folder with this name under the backup root;
    /// returns the provider's folder id.
    async fn ensure_folder(&self, name: &str) -> Result<String, DriveError>;

    /// Upload one file into a folder; returns the provider's file id
    async fn upload(
        &self,
        folder_id: &str,
        file_name: &str,
        mime_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String, DriveError>;

    /// Best-effort artifact removal
    async fn delete_file(&self, file_id: &str) -> Result<(), DriveError>;
}

/// OAuth2 token persisted between sessions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl StoredToken {
    /// Expired (with a safety margin) and due for refresh
    pub fn is_expired(&self) -> bool {
        self.expires_at <= Utc::now() + Duration::seconds(60)
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    expires_in: i64,
}

#[derive(Deserialize)]
struct FileListResponse {
    #[serde(default)]
    files: Vec<FileEntry>,
}

#[derive(Deserialize)]
struct FileEntry {
    id: String,
}

/// Google Drive client with transparent token refresh
pub struct DriveClient {
    client: reqwest::Client,
    client_id: String,
    client_secret: String,
    token_path: PathBuf,
    root_folder: String,
    token: Mutex<Option<StoredToken>>,
}

impl DriveClient {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        token_path: impl Into<PathBuf>,
        root_folder: impl Into<String>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            token_path: token_path.into(),
            root_folder: root_folder.into(),
            token: Mutex::new(None),
        }
    }

    /// URL the user visits once to grant access (authorization-code flow)
    pub fn authorize_url(&self, redirect_uri: &str) -> String {
        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&access_type=offline&prompt=consent",
            AUTH_URL, self.client_id, redirect_uri, SCOPE
        )
    }

    /// Exchange the one-time authorization code and persist the token
    pub async fn exchange_code(&self, code: &str, redirect_uri: &str) -> Result<(), DriveError> {
        let response = self
            .client
            .post(TOKEN_URL)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
                ("redirect_uri", redirect_uri),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await?;

        let parsed = Self::parse_token_response(response).await?;
        let refresh_token = parsed
            .refresh_token
            .ok_or_else(|| DriveError::Auth("token exchange returned no refresh token".into()))?;

        let token = StoredToken {
            access_token: parsed.access_token,
            refresh_token,
            expires_at: Utc::now() + Duration::seconds(parsed.expires_in),
        };

        self.persist_token(&token).await?;
        *self.token.lock().await = Some(token);
        info!("drive authorization complete");
        Ok(())
    }

    async fn parse_token_response(response: reqwest::Response) -> Result<TokenResponse, DriveError> {
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(DriveError::Auth(format!("{}: {}", status, message)));
        }
        response
            .json()
            .await
            .map_err(|e| DriveError::Auth(format!("token parse: {}", e)))
    }

    /// Return a non-expired access token, exchanging the stored refresh
    /// token (and persisting the result) first when needed.
    async fn fresh_access_token(&self) -> Result<String, DriveError> {
        let mut guard = self.token.lock().await;

        if guard.is_none() {
            *guard = Some(self.load_token().await?);
        }

        let Some(current) = guard.clone() else {
            return Err(DriveError::Auth("no stored drive token".into()));
        };

        if !current.is_expired() {
            return Ok(current.access_token);
        }

        debug!("drive access token expired, refreshing");
        let response = self
            .client
            .post(TOKEN_URL)
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", current.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await?;

        let parsed = Self::parse_token_response(response).await?;
        let refreshed = StoredToken {
            access_token: parsed.access_token.clone(),
            // Google only returns a refresh token on the first exchange
            refresh_token: parsed.refresh_token.unwrap_or(current.refresh_token),
            expires_at: Utc::now() + Duration::seconds(parsed.expires_in),
        };

        // Persisted before any upload uses it
        self.persist_token(&refreshed).await?;
        *guard = Some(refreshed);
        Ok(parsed.access_token)
    }

    async fn load_token(&self) -> Result<StoredToken, DriveError> {
        let content = fs::read_to_string(&self.token_path).await.map_err(|e| {
            DriveError::Auth(format!(
                "no stored drive token at {}: {}",
                self.token_path.display(),
                e
            ))
        })?;

        serde_json::from_str(&content)
            .map_err(|e| DriveError::Auth(format!("corrupt drive token file: {}", e)))
    }

    async fn persist_token(&self, token: &StoredToken) -> Result<(), DriveError> {
        if let Some(parent) = self.token_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| DriveError::Auth(format!("token dir: {}", e)))?;
        }

        let json = serde_json::to_string_pretty(token)
            .map_err(|e| DriveError::Auth(format!("token serialize: {}", e)))?;

        fs::write(&self.token_path, json)
            .await
            .map_err(|e| DriveError::Auth(format!("token write: {}", e)))
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, DriveError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response.text().await.unwrap_or_default();
        Err(DriveError::Api { status, message })
    }

    /// Find a folder by name (optionally under a parent), or create it
    async fn find_or_create_folder(
        &self,
        access_token: &str,
        name: &str,
        parent_id: Option<&str>,
    ) -> Result<String, DriveError> {
        let mut query = format!(
            "name = '{}' and mimeType = '{}' and trashed = false",
            name.replace('\'', "\\'"),
            FOLDER_MIME
        );
        if let Some(parent) = parent_id {
            query.push_str(&format!(" and '{}' in parents", parent));
        }

        let response = self
            .client
            .get(FILES_URL)
            .bearer_auth(access_token)
            .query(&[("q", query.as_str()), ("fields", "files(id)")])
            .send()
            .await?;

        let list: FileListResponse = Self::check(response).await?.json().await?;
        if let Some(existing) = list.files.first() {
            return Ok(existing.id.clone());
        }

        debug!(folder = name, "creating drive folder");
        let mut metadata = serde_json::json!({
            "name": name,
            "mimeType": FOLDER_MIME,
        });
        if let Some(parent) = parent_id {
            metadata["parents"] = serde_json::json!([parent]);
        }

        let response = self
            .client
            .post(FILES_URL)
            .bearer_auth(access_token)
            .json(&metadata)
            .send()
            .await?;

        let created: FileEntry = Self::check(response).await?.json().await?;
        Ok(created.id)
    }
}

#[async_trait]
impl FileStorage for DriveClient {
    async fn ensure_folder(&self, name: &str) -> Result<String, DriveError> {
        let access_token = self.fresh_access_token().await?;

        let root_id = self
            .find_or_create_folder(&access_token, &self.root_folder, None)
            .await?;
        self.find_or_create_folder(&access_token, name, Some(&root_id))
            .await
    }

    async fn upload(
        &self,
        folder_id: &str,
        file_name: &str,
        mime_type: &str,
        bytes: Vec<u8>,
    ) -> Result<String, DriveError> {
        let access_token = self.fresh_access_token().await?;

        let metadata = serde_json::json!({
            "name": file_name,
            "parents": [folder_id],
        });

        // Drive's multipart upload is multipart/related: a JSON metadata
        // part followed by the media part, so the body is assembled by hand.
        let boundary = format!("voxsync-{}", uuid::Uuid::new_v4());
        let mut body = Vec::with_capacity(bytes.len() + 512);
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\r\n--{boundary}\r\nContent-Type: {mime_type}\r\n\r\n",
            )
            .as_bytes(),
        );
        body.extend_from_slice(&bytes);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        let response = self
            .client
            .post(UPLOAD_URL)
            .bearer_auth(access_token)
            .header(
                "Content-Type",
                format!("multipart/related; boundary={}", boundary),
            )
            .body(body)
            .send()
            .await?;

        let created: FileEntry = Self::check(response).await?.json().await?;
        debug!(file = file_name, id = %created.id, "uploaded to drive");
        Ok(created.id)
    }

    async fn delete_file(&self, file_id: &str) -> Result<(), DriveError> {
        let access_token = self.fresh_access_token().await?;

        let response = self
            .client
            .delete(format!("{}/{}", FILES_URL, file_id))
            .bearer_auth(access_token)
            .send()
            .await?;

        Self::check(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_expiry_margin() {
        let live = StoredToken {
            access_token: "a".into(),
            refresh_token: "r".into(),
            expires_at: Utc::now() + Duration::hours(1),
        };
        assert!(!live.is_expired());

        // Within the 60s margin counts as expired
        let closing = StoredToken {
            expires_at: Utc::now() + Duration::seconds(30),
            ..live.clone()
        };
        assert!(closing.is_expired());

        let gone = StoredToken {
            expires_at: Utc::now() - Duration::hours(1),
            ..live
        };
        assert!(gone.is_expired());
    }

    #[test]
    fn test_authorize_url_contains_flow_params() {
        let client = DriveClient::new("cid", "secret", "/tmp/token.json", "Voice Notes");
        let url = client.authorize_url("http://localhost:8085/callback");

        assert!(url.contains("client_id=cid"));
        assert!(url.contains("response_type=code"));
        assert!(url.contains("access_type=offline"));
    }

    #[tokio::test]
    async fn test_token_round_trips_through_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("token.json");
        let client = DriveClient::new("cid", "secret", &path, "Voice Notes");

        let token = StoredToken {
            access_token: "at".into(),
            refresh_token: "rt".into(),
            expires_at: Utc::now() + Duration::hours(1),
        };
        client.persist_token(&token).await.unwrap();

        let loaded = client.load_token().await.unwrap();
        assert_eq!(loaded.access_token, "at");
        assert_eq!(loaded.refresh_token, "rt");
    }
}

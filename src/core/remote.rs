//! Remote file store access: the Drive v3 REST surface we depend on.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::format::{FileFormat, FOLDER_MIME};
use super::retry::{is_transient_status, is_transient_transport};
use crate::config::Config;
use crate::error::{AppError, Result};

const LIST_FIELDS: &str = "nextPageToken,files(id,name,mimeType,modifiedTime,parents,size)";
const PAGE_SIZE: &str = "1000";

/// Snapshot of one remote file as seen by a listing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RemoteFile {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    pub format: FileFormat,
    pub modified_at: DateTime<Utc>,
    pub parent_id: String,
    pub size_bytes: Option<u64>,
}

/// Child entry of a folder: either a sub-folder or a file
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteEntry {
    Folder { id: String, name: String },
    File(RemoteFile),
}

/// One page of a folder listing
#[derive(Debug, Clone, Default)]
pub struct FolderPage {
    pub entries: Vec<RemoteEntry>,
    pub next_page_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RemoteError {
    #[error("transient: {0}")]
    Transient(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    Fatal(String),
}

impl RemoteError {
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<RemoteError> for AppError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::NotFound(what) => Self::NotFound(what),
            other => Self::Remote(other.to_string()),
        }
    }
}

#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// List one page of a folder's non-trashed children
    async fn list_children(
        &self,
        folder_id: &str,
        page_token: Option<&str>,
    ) -> std::result::Result<FolderPage, RemoteError>;

    /// Fetch a file's bytes; native documents are exported as text
    async fn download(&self, file: &RemoteFile) -> std::result::Result<Vec<u8>, RemoteError>;

    /// Fetch metadata for a single file id
    async fn file_metadata(&self, file_id: &str) -> std::result::Result<RemoteFile, RemoteError>;
}

// =========================================================================
// Drive v3 client
// =========================================================================

pub struct DriveClient {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFileList {
    next_page_token: Option<String>,
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    name: String,
    mime_type: String,
    modified_time: Option<DateTime<Utc>>,
    #[serde(default)]
    parents: Vec<String>,
    /// Drive reports sizes as decimal strings
    size: Option<String>,
}

impl DriveFile {
    fn into_entry(self, parent_hint: &str) -> RemoteEntry {
        if self.mime_type == FOLDER_MIME {
            return RemoteEntry::Folder {
                id: self.id,
                name: self.name,
            };
        }
        RemoteEntry::File(self.into_remote_file(parent_hint))
    }

    fn into_remote_file(self, parent_hint: &str) -> RemoteFile {
        let parent_id = self
            .parents
            .into_iter()
            .next()
            .unwrap_or_else(|| parent_hint.to_string());
        let modified_at = self.modified_time.unwrap_or_else(|| {
            debug!("{} ({}) has no modifiedTime; using the epoch", self.name, self.id);
            DateTime::<Utc>::default()
        });
        RemoteFile {
            format: FileFormat::from_mime(&self.mime_type),
            size_bytes: self.size.and_then(|s| s.parse().ok()),
            modified_at,
            id: self.id,
            name: self.name,
            mime_type: self.mime_type,
            parent_id,
        }
    }
}

impl DriveClient {
    pub fn new(client: reqwest::Client, base_url: &str, token: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    /// Build a client from config; the bearer token comes from the environment
    pub fn from_config(config: &Config) -> Result<Self> {
        let token = std::env::var(&config.drive_token_env).map_err(|_| {
            AppError::Config(format!(
                "{} must hold a Drive access token",
                config.drive_token_env
            ))
        })?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self::new(client, &config.drive_api_url, &token))
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        what: &str,
    ) -> std::result::Result<reqwest::Response, RemoteError> {
        let response = request.bearer_auth(&self.token).send().await.map_err(|e| {
            if is_transient_transport(&e) {
                RemoteError::Transient(e.to_string())
            } else {
                RemoteError::Fatal(e.to_string())
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(RemoteError::NotFound(what.to_string()));
        }
        let body = response.text().await.unwrap_or_default();
        let message = format!("{what}: store returned {status}: {body}");
        if is_transient_status(status) {
            Err(RemoteError::Transient(message))
        } else {
            Err(RemoteError::Fatal(message))
        }
    }
}

#[async_trait]
impl RemoteStore for DriveClient {
    async fn list_children(
        &self,
        folder_id: &str,
        page_token: Option<&str>,
    ) -> std::result::Result<FolderPage, RemoteError> {
        let query = format!("'{}' in parents and trashed=false", folder_id.replace('\'', "\\'"));
        let mut params = vec![
            ("q", query.as_str()),
            ("fields", LIST_FIELDS),
            ("pageSize", PAGE_SIZE),
        ];
        if let Some(token) = page_token {
            params.push(("pageToken", token));
        }

        let request = self
            .client
            .get(format!("{}/files", self.base_url))
            .query(&params);
        let response = self.send(request, &format!("folder {folder_id}")).await?;
        let list: DriveFileList = response
            .json()
            .await
            .map_err(|e| RemoteError::Fatal(format!("unexpected listing body: {e}")))?;

        debug!("Folder {folder_id}: {} entries on page", list.files.len());
        Ok(FolderPage {
            entries: list
                .files
                .into_iter()
                .map(|f| f.into_entry(folder_id))
                .collect(),
            next_page_token: list.next_page_token,
        })
    }

    async fn download(&self, file: &RemoteFile) -> std::result::Result<Vec<u8>, RemoteError> {
        let request = if file.format == FileFormat::NativeExport {
            self.client
                .get(format!("{}/files/{}/export", self.base_url, file.id))
                .query(&[("mimeType", FileFormat::export_mime(&file.mime_type))])
        } else {
            self.client
                .get(format!("{}/files/{}", self.base_url, file.id))
                .query(&[("alt", "media")])
        };

        let response = self.send(request, &format!("file {}", file.id)).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| RemoteError::Transient(format!("download interrupted: {e}")))?;
        Ok(bytes.to_vec())
    }

    async fn file_metadata(&self, file_id: &str) -> std::result::Result<RemoteFile, RemoteError> {
        let request = self
            .client
            .get(format!("{}/files/{file_id}", self.base_url))
            .query(&[("fields", "id,name,mimeType,modifiedTime,parents,size")]);
        let response = self.send(request, &format!("file {file_id}")).await?;
        let file: DriveFile = response
            .json()
            .await
            .map_err(|e| RemoteError::Fatal(format!("unexpected metadata body: {e}")))?;
        Ok(file.into_remote_file(""))
    }
}

//! HTTP bindings for the backend API.
//!
//! Implements the three service traits against the document backend's REST
//! surface. Wire DTOs live here; the rest of the crate only sees the
//! `doc_core` types.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use futures_util::StreamExt;
use log::debug;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response};
use serde::Deserialize;
use serde_json::json;

use doc_core::{
    DirectoryListing, Document, DocumentId, DocumentStatus, RemoteFile, RemoteFolder, SyncSource,
    SyncSourceId, SyncStatus,
};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::services::{
    AnswerService, AnswerStream, AuthorizedAccount, IngestionService, NewSyncSource, SessionId,
    SyncProvider, UploadReceipt,
};

const SESSION_ID_HEADER: &str = "X-Session-Id";

/// Backend client shared by all three service implementations.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Pass 2xx responses through; map everything else to an API error
    /// carrying the backend's `detail` field.
    async fn check(response: Response) -> Result<Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let detail = match response.json::<ErrorBody>().await {
            Ok(body) => body.detail,
            Err(_) => format!("HTTP {status}"),
        };
        Err(ClientError::Api { status, detail })
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: String,
}

// --- Documents ---

#[derive(Debug, Deserialize)]
struct DocumentDto {
    id: DocumentId,
    original_filename: String,
    status: DocumentStatus,
    #[serde(default)]
    processing_stage: Option<String>,
    #[serde(default)]
    processing_progress: Option<u8>,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    page_count: Option<u32>,
    #[serde(default)]
    chunk_count: Option<u32>,
    #[serde(default)]
    created_at: Option<NaiveDateTime>,
}

impl From<DocumentDto> for Document {
    fn from(dto: DocumentDto) -> Self {
        Document {
            id: dto.id,
            original_filename: dto.original_filename,
            status: dto.status,
            processing_stage: dto.processing_stage,
            progress: dto.processing_progress,
            error_message: dto.error_message,
            page_count: dto.page_count,
            chunk_count: dto.chunk_count,
            created_at: to_utc(dto.created_at),
        }
    }
}

#[derive(Debug, Deserialize)]
struct UploadReceiptDto {
    document_id: DocumentId,
    filename: String,
    status: DocumentStatus,
}

impl From<UploadReceiptDto> for UploadReceipt {
    fn from(dto: UploadReceiptDto) -> Self {
        UploadReceipt {
            document_id: dto.document_id,
            filename: dto.filename,
            status: dto.status,
        }
    }
}

// Backend timestamps are naive UTC.
fn to_utc(value: Option<NaiveDateTime>) -> DateTime<Utc> {
    value.map(|n| n.and_utc()).unwrap_or_else(Utc::now)
}

#[async_trait]
impl IngestionService for HttpBackend {
    async fn upload_document(&self, file_name: &str, bytes: Vec<u8>) -> Result<UploadReceipt> {
        let part = Part::bytes(bytes).file_name(file_name.to_string());
        let form = Form::new().part("file", part);
        let response = self
            .client
            .post(self.url("/api/upload"))
            .multipart(form)
            .send()
            .await?;
        let dto = Self::check(response).await?.json::<UploadReceiptDto>().await?;
        Ok(dto.into())
    }

    async fn document_status(&self, id: DocumentId) -> Result<Document> {
        let response = self
            .client
            .get(self.url(&format!("/api/documents/{id}")))
            .send()
            .await?;
        let dto = Self::check(response).await?.json::<DocumentDto>().await?;
        Ok(dto.into())
    }

    async fn list_documents(&self) -> Result<Vec<Document>> {
        let response = self.client.get(self.url("/api/documents")).send().await?;
        let dtos = Self::check(response).await?.json::<Vec<DocumentDto>>().await?;
        Ok(dtos.into_iter().map(Document::from).collect())
    }

    async fn delete_document(&self, id: DocumentId) -> Result<()> {
        let response = self
            .client
            .delete(self.url(&format!("/api/documents/{id}")))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

#[async_trait]
impl AnswerService for HttpBackend {
    async fn ask(
        &self,
        question: &str,
        session_id: Option<SessionId>,
        document_id: Option<DocumentId>,
    ) -> Result<AnswerStream> {
        let mut body = json!({ "message": question });
        if let Some(session_id) = session_id {
            body["session_id"] = json!(session_id);
        }
        if let Some(document_id) = document_id {
            body["document_id"] = json!(document_id);
        }

        let response = self
            .client
            .post(self.url("/api/chat"))
            .json(&body)
            .send()
            .await?;
        let response = Self::check(response).await?;

        let session_id = response
            .headers()
            .get(SESSION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<SessionId>().ok());
        debug!("answer stream opened, session_id={session_id:?}");

        let chunks = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| ClientError::Stream(e.to_string())));
        Ok(AnswerStream {
            session_id,
            chunks: Box::pin(chunks),
        })
    }

    async fn persist_answer(&self, session_id: SessionId, content: &str) -> Result<()> {
        let response = self
            .client
            .post(self.url("/api/chat/save-response"))
            .json(&json!({ "session_id": session_id, "content": content }))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

// --- Sync provider ---

#[derive(Debug, Deserialize)]
struct AuthUrlDto {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ExchangeCodeDto {
    token: String,
    #[serde(default)]
    user: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SyncSourceDto {
    id: SyncSourceId,
    name: String,
    folder_path: String,
    sync_interval: u32,
    #[serde(default)]
    last_synced_at: Option<NaiveDateTime>,
    status: SyncStatus,
    #[serde(default)]
    error_message: Option<String>,
    #[serde(default)]
    yandex_user: Option<String>,
    #[serde(default)]
    is_connected: bool,
    #[serde(default)]
    oauth_token: Option<String>,
    #[serde(default)]
    created_at: Option<NaiveDateTime>,
}

impl From<SyncSourceDto> for SyncSource {
    fn from(dto: SyncSourceDto) -> Self {
        SyncSource {
            id: dto.id,
            name: dto.name,
            folder_path: dto.folder_path,
            sync_interval: dto.sync_interval,
            last_synced_at: dto.last_synced_at.map(|n| n.and_utc()),
            status: dto.status,
            error_message: dto.error_message,
            account_label: dto.yandex_user,
            is_connected: dto.is_connected,
            oauth_token: dto.oauth_token,
            created_at: dto.created_at.map(|n| n.and_utc()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct BrowseDto {
    #[serde(default)]
    folders: Vec<RemoteFolder>,
    #[serde(default)]
    files: Vec<RemoteFile>,
}

/// Folder paths for new sources get a leading `/` unless they already use the
/// provider's `disk:/` scheme.
fn normalize_folder_path(path: &str) -> String {
    if path.starts_with('/') || path.starts_with("disk:/") {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

#[async_trait]
impl SyncProvider for HttpBackend {
    async fn authorization_url(&self) -> Result<String> {
        let response = self.client.get(self.url("/api/yandex/auth-url")).send().await?;
        let dto = Self::check(response).await?.json::<AuthUrlDto>().await?;
        Ok(dto.url)
    }

    async fn exchange_code(
        &self,
        code: &str,
        source_id: Option<SyncSourceId>,
    ) -> Result<AuthorizedAccount> {
        let mut body = json!({ "code": code });
        if let Some(source_id) = source_id {
            body["source_id"] = json!(source_id);
        }
        let response = self
            .client
            .post(self.url("/api/yandex/exchange-code"))
            .json(&body)
            .send()
            .await?;
        let dto = Self::check(response).await?.json::<ExchangeCodeDto>().await?;
        Ok(AuthorizedAccount {
            token: dto.token,
            account_label: dto.user.unwrap_or_default(),
        })
    }

    async fn list_directory(&self, token: &str, path: &str) -> Result<DirectoryListing> {
        let response = self
            .client
            .post(self.url("/api/yandex/browse"))
            .json(&json!({ "token": token, "path": path }))
            .send()
            .await?;
        let dto = Self::check(response).await?.json::<BrowseDto>().await?;
        let mut listing = DirectoryListing {
            folders: dto.folders,
            files: dto.files,
        };
        listing.sort();
        Ok(listing)
    }

    async fn import_file(&self, token: &str, path: &str, name: &str) -> Result<UploadReceipt> {
        let response = self
            .client
            .post(self.url("/api/yandex/import-file"))
            .json(&json!({ "token": token, "file_path": path, "file_name": name }))
            .send()
            .await?;
        let dto = Self::check(response).await?.json::<UploadReceiptDto>().await?;
        Ok(dto.into())
    }

    async fn list_sources(&self) -> Result<Vec<SyncSource>> {
        let response = self.client.get(self.url("/api/sync-sources")).send().await?;
        let dtos = Self::check(response).await?.json::<Vec<SyncSourceDto>>().await?;
        Ok(dtos.into_iter().map(SyncSource::from).collect())
    }

    async fn create_source(&self, source: NewSyncSource) -> Result<SyncSource> {
        let body = json!({
            "name": source.name,
            "folder_path": normalize_folder_path(&source.folder_path),
            "sync_interval": source.sync_interval,
            "oauth_token": source.oauth_token,
            "yandex_user": source.account_label,
        });
        let response = self
            .client
            .post(self.url("/api/sync-sources"))
            .json(&body)
            .send()
            .await?;
        let dto = Self::check(response).await?.json::<SyncSourceDto>().await?;
        Ok(dto.into())
    }

    async fn trigger_sync(&self, id: SyncSourceId) -> Result<()> {
        let response = self
            .client
            .post(self.url(&format!("/api/sync-sources/{id}/sync")))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn disconnect(&self, id: SyncSourceId) -> Result<()> {
        let response = self
            .client
            .post(self.url(&format!("/api/sync-sources/{id}/disconnect")))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    async fn delete_source(&self, id: SyncSourceId) -> Result<()> {
        let response = self
            .client
            .delete(self.url(&format!("/api/sync-sources/{id}")))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

//! Abstract contracts for the external services the client consumes.
//!
//! The orchestration components only ever see these traits; the HTTP
//! bindings in [`http`] implement them against the real backend, and tests
//! substitute scripted in-memory mocks.

pub mod http;

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;

use doc_core::{
    DirectoryListing, Document, DocumentId, DocumentStatus, SyncSource, SyncSourceId,
};

use crate::error::Result;

pub type SessionId = i64;

/// Raw transport chunks of a streamed answer, before frame decoding.
pub type RawChunkStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Acknowledgement of an accepted upload or import.
#[derive(Debug, Clone)]
pub struct UploadReceipt {
    pub document_id: DocumentId,
    pub filename: String,
    pub status: DocumentStatus,
}

/// An open answer stream plus the session identity the server attached to it.
pub struct AnswerStream {
    /// Server-issued session id, present on every exchange; adopted by the
    /// conversation on its first successful exchange.
    pub session_id: Option<SessionId>,
    pub chunks: RawChunkStream,
}

/// Result of exchanging an authorization code.
#[derive(Debug, Clone)]
pub struct AuthorizedAccount {
    pub token: String,
    pub account_label: String,
}

/// Parameters for persisting a new sync source.
#[derive(Debug, Clone)]
pub struct NewSyncSource {
    pub name: String,
    pub folder_path: String,
    pub sync_interval: u32,
    pub oauth_token: Option<String>,
    pub account_label: Option<String>,
}

/// Document ingestion backend: upload, status, deletion.
#[async_trait]
pub trait IngestionService: Send + Sync {
    async fn upload_document(&self, file_name: &str, bytes: Vec<u8>) -> Result<UploadReceipt>;

    async fn document_status(&self, id: DocumentId) -> Result<Document>;

    async fn list_documents(&self) -> Result<Vec<Document>>;

    async fn delete_document(&self, id: DocumentId) -> Result<()>;
}

/// Question answering backend with streamed replies.
#[async_trait]
pub trait AnswerService: Send + Sync {
    async fn ask(
        &self,
        question: &str,
        session_id: Option<SessionId>,
        document_id: Option<DocumentId>,
    ) -> Result<AnswerStream>;

    /// Persist the final assistant message for a session. Best-effort: the
    /// caller logs failures and never retries.
    async fn persist_answer(&self, session_id: SessionId, content: &str) -> Result<()>;
}

/// Cloud-storage provider: authorization, browsing, import, source CRUD.
#[async_trait]
pub trait SyncProvider: Send + Sync {
    async fn authorization_url(&self) -> Result<String>;

    /// Exchange an authorization code for a credential. With `source_id` the
    /// credential is attached to that existing source (reconnect); without,
    /// it is returned for a source yet to be created.
    async fn exchange_code(
        &self,
        code: &str,
        source_id: Option<SyncSourceId>,
    ) -> Result<AuthorizedAccount>;

    async fn list_directory(&self, token: &str, path: &str) -> Result<DirectoryListing>;

    async fn import_file(&self, token: &str, path: &str, name: &str) -> Result<UploadReceipt>;

    async fn list_sources(&self) -> Result<Vec<SyncSource>>;

    async fn create_source(&self, source: NewSyncSource) -> Result<SyncSource>;

    async fn trigger_sync(&self, id: SyncSourceId) -> Result<()>;

    async fn disconnect(&self, id: SyncSourceId) -> Result<()>;

    async fn delete_source(&self, id: SyncSourceId) -> Result<()>;
}

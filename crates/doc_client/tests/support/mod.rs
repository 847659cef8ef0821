//! Scripted service mocks shared by the integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;

use doc_client::error::{ClientError, Result};
use doc_client::services::{
    AnswerService, AnswerStream, AuthorizedAccount, IngestionService, NewSyncSource,
    RawChunkStream, SessionId, SyncProvider, UploadReceipt,
};
use doc_core::{
    DirectoryListing, Document, DocumentId, DocumentStatus, RemoteFile, SyncSource, SyncSourceId,
    SyncStatus,
};

pub fn transport_err(msg: &str) -> ClientError {
    ClientError::Transport(msg.to_string())
}

/// Poll `check` until it returns true or the deadline passes.
pub async fn wait_until<F, Fut>(what: &str, mut check: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        if check().await {
            return;
        }
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

pub fn status_snapshot(id: DocumentId, status: DocumentStatus) -> Document {
    Document {
        id,
        original_filename: String::new(),
        status,
        processing_stage: None,
        progress: None,
        error_message: None,
        page_count: None,
        chunk_count: None,
        created_at: Utc::now(),
    }
}

// --- Ingestion ---

#[derive(Default)]
pub struct MockIngestion {
    /// Scripted replies per document id, consumed front to back.
    pub statuses: Mutex<HashMap<DocumentId, VecDeque<Result<Document>>>>,
    pub polls: Mutex<Vec<DocumentId>>,
    pub deleted: Mutex<Vec<DocumentId>>,
    pub listed: Mutex<Vec<Document>>,
    next_id: AtomicI64,
}

impl MockIngestion {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(1),
            ..Self::default()
        }
    }

    pub fn script_status(&self, id: DocumentId, reply: Result<Document>) {
        self.statuses
            .lock()
            .unwrap()
            .entry(id)
            .or_default()
            .push_back(reply);
    }

    pub fn poll_count(&self, id: DocumentId) -> usize {
        self.polls.lock().unwrap().iter().filter(|p| **p == id).count()
    }
}

#[async_trait]
impl IngestionService for MockIngestion {
    async fn upload_document(&self, file_name: &str, _bytes: Vec<u8>) -> Result<UploadReceipt> {
        Ok(UploadReceipt {
            document_id: self.next_id.fetch_add(1, Ordering::SeqCst),
            filename: file_name.to_string(),
            status: DocumentStatus::Processing,
        })
    }

    async fn document_status(&self, id: DocumentId) -> Result<Document> {
        self.polls.lock().unwrap().push(id);
        self.statuses
            .lock()
            .unwrap()
            .get_mut(&id)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Err(transport_err("no scripted status")))
    }

    async fn list_documents(&self) -> Result<Vec<Document>> {
        Ok(self.listed.lock().unwrap().clone())
    }

    async fn delete_document(&self, id: DocumentId) -> Result<()> {
        self.deleted.lock().unwrap().push(id);
        Ok(())
    }
}

// --- Answers ---

pub struct ScriptedAnswer {
    pub session_id: Option<SessionId>,
    pub chunks: RawChunkStream,
}

impl ScriptedAnswer {
    /// A stream that yields the given transport chunks and closes.
    pub fn body(session_id: Option<SessionId>, chunks: &[&str]) -> Self {
        let items: Vec<Result<Bytes>> = chunks
            .iter()
            .map(|c| Ok(Bytes::from(c.to_string())))
            .collect();
        Self {
            session_id,
            chunks: Box::pin(futures::stream::iter(items)),
        }
    }

    /// A stream fed by hand, for tests that need an exchange held open.
    pub fn channel(session_id: Option<SessionId>) -> (Self, tokio::sync::mpsc::Sender<Result<Bytes>>) {
        let (tx, rx) = tokio::sync::mpsc::channel(8);
        let stream = tokio_stream::wrappers::ReceiverStream::new(rx);
        (
            Self {
                session_id,
                chunks: Box::pin(stream),
            },
            tx,
        )
    }
}

#[derive(Default)]
pub struct MockAnswers {
    replies: Mutex<VecDeque<ScriptedAnswer>>,
    pub asks: Mutex<Vec<(String, Option<SessionId>, Option<DocumentId>)>>,
    pub persisted: Mutex<Vec<(SessionId, String)>>,
}

impl MockAnswers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self, answer: ScriptedAnswer) {
        self.replies.lock().unwrap().push_back(answer);
    }
}

#[async_trait]
impl AnswerService for MockAnswers {
    async fn ask(
        &self,
        question: &str,
        session_id: Option<SessionId>,
        document_id: Option<DocumentId>,
    ) -> Result<AnswerStream> {
        self.asks
            .lock()
            .unwrap()
            .push((question.to_string(), session_id, document_id));
        let scripted = self
            .replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| transport_err("no scripted answer"))?;
        Ok(AnswerStream {
            session_id: scripted.session_id,
            chunks: scripted.chunks,
        })
    }

    async fn persist_answer(&self, session_id: SessionId, content: &str) -> Result<()> {
        self.persisted
            .lock()
            .unwrap()
            .push((session_id, content.to_string()));
        Ok(())
    }
}

// --- Sync provider ---

pub fn remote_file(name: &str, path: &str) -> RemoteFile {
    RemoteFile {
        name: name.to_string(),
        path: path.to_string(),
        size: 1024,
        modified: "2024-05-01T10:00:00+00:00".to_string(),
        extension: ".pdf".to_string(),
    }
}

pub fn connected_source(id: SyncSourceId, name: &str) -> SyncSource {
    SyncSource {
        id,
        name: name.to_string(),
        folder_path: "/docs".to_string(),
        sync_interval: 3600,
        last_synced_at: None,
        status: SyncStatus::Idle,
        error_message: None,
        account_label: Some("tester".to_string()),
        is_connected: true,
        oauth_token: Some("token-1".to_string()),
        created_at: None,
    }
}

#[derive(Default)]
pub struct MockSyncProvider {
    pub auth_url_calls: AtomicUsize,
    pub exchange_results: Mutex<VecDeque<Result<AuthorizedAccount>>>,
    /// Listings by path.
    pub listings: Mutex<HashMap<String, Result<DirectoryListing>>>,
    pub imports: Mutex<Vec<String>>,
    import_active: AtomicUsize,
    pub import_max_active: AtomicUsize,
    pub sources: Mutex<Vec<SyncSource>>,
    pub synced: Mutex<Vec<SyncSourceId>>,
    pub disconnected: Mutex<Vec<SyncSourceId>>,
    pub deleted: Mutex<Vec<SyncSourceId>>,
    next_doc_id: AtomicI64,
    next_source_id: AtomicI64,
}

impl MockSyncProvider {
    pub fn new() -> Self {
        Self {
            next_doc_id: AtomicI64::new(100),
            next_source_id: AtomicI64::new(1),
            ..Self::default()
        }
    }

    pub fn script_exchange(&self, reply: Result<AuthorizedAccount>) {
        self.exchange_results.lock().unwrap().push_back(reply);
    }

    pub fn script_listing(&self, path: &str, listing: Result<DirectoryListing>) {
        self.listings.lock().unwrap().insert(path.to_string(), listing);
    }
}

fn clone_listing(listing: &Result<DirectoryListing>) -> Result<DirectoryListing> {
    match listing {
        Ok(l) => Ok(l.clone()),
        Err(ClientError::Api { status, detail }) => Err(ClientError::Api {
            status: *status,
            detail: detail.clone(),
        }),
        Err(other) => Err(transport_err(&other.to_string())),
    }
}

#[async_trait]
impl SyncProvider for MockSyncProvider {
    async fn authorization_url(&self) -> Result<String> {
        self.auth_url_calls.fetch_add(1, Ordering::SeqCst);
        Ok("https://provider.example/authorize".to_string())
    }

    async fn exchange_code(
        &self,
        _code: &str,
        _source_id: Option<SyncSourceId>,
    ) -> Result<AuthorizedAccount> {
        self.exchange_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(transport_err("no scripted exchange")))
    }

    async fn list_directory(&self, _token: &str, path: &str) -> Result<DirectoryListing> {
        let listings = self.listings.lock().unwrap();
        match listings.get(path) {
            Some(listing) => clone_listing(listing),
            None => Err(ClientError::Api {
                status: 404,
                detail: format!("Path not found: {path}"),
            }),
        }
    }

    async fn import_file(&self, _token: &str, path: &str, name: &str) -> Result<UploadReceipt> {
        let active = self.import_active.fetch_add(1, Ordering::SeqCst) + 1;
        self.import_max_active.fetch_max(active, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(5)).await;
        self.imports.lock().unwrap().push(path.to_string());
        self.import_active.fetch_sub(1, Ordering::SeqCst);
        Ok(UploadReceipt {
            document_id: self.next_doc_id.fetch_add(1, Ordering::SeqCst),
            filename: name.to_string(),
            status: DocumentStatus::Processing,
        })
    }

    async fn list_sources(&self) -> Result<Vec<SyncSource>> {
        Ok(self.sources.lock().unwrap().clone())
    }

    async fn create_source(&self, source: NewSyncSource) -> Result<SyncSource> {
        let created = SyncSource {
            id: self.next_source_id.fetch_add(1, Ordering::SeqCst),
            name: source.name,
            folder_path: source.folder_path,
            sync_interval: source.sync_interval,
            last_synced_at: None,
            status: SyncStatus::Idle,
            error_message: None,
            account_label: source.account_label,
            is_connected: source.oauth_token.is_some(),
            oauth_token: source.oauth_token,
            created_at: None,
        };
        self.sources.lock().unwrap().push(created.clone());
        Ok(created)
    }

    async fn trigger_sync(&self, id: SyncSourceId) -> Result<()> {
        self.synced.lock().unwrap().push(id);
        Ok(())
    }

    async fn disconnect(&self, id: SyncSourceId) -> Result<()> {
        self.disconnected.lock().unwrap().push(id);
        Ok(())
    }

    async fn delete_source(&self, id: SyncSourceId) -> Result<()> {
        self.deleted.lock().unwrap().push(id);
        self.sources.lock().unwrap().retain(|s| s.id != id);
        Ok(())
    }
}

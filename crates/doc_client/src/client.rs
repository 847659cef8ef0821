//! Top-level client facade.
//!
//! Wires the tracker, chat multiplexer, and sync manager over one backend
//! (or injected service implementations) and owns the actions that span
//! components, such as the delete cascade.

use std::sync::Arc;

use tokio::sync::broadcast;

use doc_core::{ContextKey, Document, DocumentId};

use crate::config::ClientConfig;
use crate::error::Result;
use crate::events::{EventBus, StateEvent};
use crate::multiplexer::ChatMultiplexer;
use crate::services::http::HttpBackend;
use crate::services::{AnswerService, IngestionService, SyncProvider};
use crate::sync::SyncManager;
use crate::tracker::DocumentTracker;

pub struct DocChatClient {
    ingestion: Arc<dyn IngestionService>,
    events: EventBus,
    pub tracker: Arc<DocumentTracker>,
    pub chat: Arc<ChatMultiplexer>,
    pub sync: Arc<SyncManager>,
}

impl DocChatClient {
    /// Connect all components to the HTTP backend named by `config`.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let backend = Arc::new(HttpBackend::new(&config)?);
        Ok(Self::with_services(
            &config,
            backend.clone(),
            backend.clone(),
            backend,
        ))
    }

    /// Wire the components over explicit service implementations.
    pub fn with_services(
        config: &ClientConfig,
        ingestion: Arc<dyn IngestionService>,
        answers: Arc<dyn AnswerService>,
        sync_provider: Arc<dyn SyncProvider>,
    ) -> Self {
        let events = EventBus::default();
        let tracker = Arc::new(DocumentTracker::new(
            Arc::clone(&ingestion),
            config.poll_interval,
            events.clone(),
        ));
        let chat = Arc::new(ChatMultiplexer::new(answers, events.clone()));
        let sync = Arc::new(SyncManager::new(
            sync_provider,
            Arc::clone(&tracker),
            events.clone(),
        ));
        Self {
            ingestion,
            events,
            tracker,
            chat,
            sync,
        }
    }

    /// Receive a notification after every state change.
    pub fn subscribe(&self) -> broadcast::Receiver<StateEvent> {
        self.events.subscribe()
    }

    /// Seed documents and sync sources at startup.
    pub async fn load_initial(&self) -> Result<()> {
        self.tracker.load_initial().await?;
        self.sync.refresh_sources().await?;
        Ok(())
    }

    /// Upload a file and start tracking it the moment the backend accepts
    /// it, before processing completes.
    pub async fn upload_document(&self, file_name: &str, bytes: Vec<u8>) -> Result<DocumentId> {
        let receipt = self.ingestion.upload_document(file_name, bytes).await?;
        let doc = Document::new_processing(receipt.document_id, receipt.filename);
        self.tracker.register_uploaded(doc).await;
        Ok(receipt.document_id)
    }

    /// Delete a document and cascade: the backend record, the tracked entry,
    /// and any conversation keyed to it.
    pub async fn delete_document(&self, id: DocumentId) -> Result<()> {
        self.ingestion.delete_document(id).await?;
        self.tracker.remove(id).await;
        self.chat.drop_context(ContextKey::Document(id)).await;
        Ok(())
    }

    /// Tear down background work: the poll scheduler and any in-flight
    /// exchanges.
    pub async fn shutdown(&self) {
        self.tracker.shutdown().await;
        for key in self.chat.context_keys().await {
            self.chat.cancel(key).await;
        }
    }
}

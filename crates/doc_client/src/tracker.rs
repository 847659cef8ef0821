//! Document lifecycle tracker.
//!
//! Owns the shared document set and reconciles every non-terminal document
//! against the ingestion backend until it reaches `ready` or `failed`. The
//! poll scheduler is explicit: it starts when a processing document appears,
//! ticks on a fixed interval, and exits on the first tick that finds nothing
//! left to poll.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use doc_core::{Document, DocumentId, DocumentStatus};

use crate::error::Result;
use crate::events::{EventBus, StateEvent};
use crate::services::IngestionService;

type DocumentMap = Arc<RwLock<HashMap<DocumentId, Document>>>;
type InFlightSet = Arc<Mutex<HashSet<DocumentId>>>;

type SchedulerSlot = Arc<Mutex<Option<JoinHandle<()>>>>;

pub struct DocumentTracker {
    service: Arc<dyn IngestionService>,
    documents: DocumentMap,
    in_flight: InFlightSet,
    poll_task: SchedulerSlot,
    poll_interval: Duration,
    events: EventBus,
}

impl DocumentTracker {
    pub fn new(
        service: Arc<dyn IngestionService>,
        poll_interval: Duration,
        events: EventBus,
    ) -> Self {
        Self {
            service,
            documents: Arc::new(RwLock::new(HashMap::new())),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            poll_task: Arc::new(Mutex::new(None)),
            poll_interval,
            events,
        }
    }

    /// Seed the document set from the backend's current list.
    pub async fn load_initial(&self) -> Result<()> {
        let listed = self.service.list_documents().await?;
        {
            let mut documents = self.documents.write().await;
            for doc in listed {
                documents.insert(doc.id, doc);
            }
        }
        self.events.emit(StateEvent::DocumentsChanged);
        self.ensure_polling().await;
        Ok(())
    }

    /// Insert the local record for a just-accepted upload and make sure the
    /// scheduler is running. Called before any server confirmation of
    /// processing completion.
    pub async fn register_uploaded(&self, doc: Document) {
        info!("tracking uploaded document {} ({})", doc.id, doc.original_filename);
        self.documents.write().await.insert(doc.id, doc);
        self.events.emit(StateEvent::DocumentsChanged);
        self.ensure_polling().await;
    }

    /// Remove a document from the local set. The caller is responsible for
    /// the backend delete and for cascading to conversation state.
    pub async fn remove(&self, id: DocumentId) -> bool {
        let removed = self.documents.write().await.remove(&id).is_some();
        if removed {
            self.events.emit(StateEvent::DocumentsChanged);
        }
        removed
    }

    /// Current documents, newest first.
    pub async fn snapshot(&self) -> Vec<Document> {
        let documents = self.documents.read().await;
        let mut list: Vec<Document> = documents.values().cloned().collect();
        list.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        list
    }

    pub async fn get(&self, id: DocumentId) -> Option<Document> {
        self.documents.read().await.get(&id).cloned()
    }

    /// Dedup check: is there a non-failed document with this original name?
    pub async fn has_active_named(&self, name: &str) -> bool {
        self.documents
            .read()
            .await
            .values()
            .any(|d| d.original_filename == name && d.status != DocumentStatus::Failed)
    }

    pub async fn processing_count(&self) -> usize {
        self.documents
            .read()
            .await
            .values()
            .filter(|d| !d.is_terminal())
            .count()
    }

    /// Run one reconciliation pass right now, outside the scheduler.
    pub async fn reconcile(&self) -> usize {
        reconcile_once(&self.service, &self.documents, &self.in_flight, &self.events).await
    }

    /// Whether the poll scheduler task is currently alive.
    pub async fn is_polling(&self) -> bool {
        self.poll_task
            .lock()
            .await
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Start the poll scheduler if it is not running and there is something
    /// to poll.
    pub async fn ensure_polling(&self) {
        let mut guard = self.poll_task.lock().await;
        if let Some(handle) = guard.as_ref() {
            if !handle.is_finished() {
                return;
            }
        }
        if self.processing_count().await == 0 {
            return;
        }

        let service = Arc::clone(&self.service);
        let documents = Arc::clone(&self.documents);
        let in_flight = Arc::clone(&self.in_flight);
        let events = self.events.clone();
        let interval = self.poll_interval;
        let slot = Arc::clone(&self.poll_task);

        *guard = Some(tokio::spawn(async move {
            info!("document poll scheduler started");
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let remaining = reconcile_once(&service, &documents, &in_flight, &events).await;
                if remaining == 0 {
                    // Exit decision and new registrations serialize through
                    // the scheduler slot: a document registered while this
                    // task is winding down is either seen here, or finds the
                    // slot empty and starts a fresh scheduler.
                    let mut slot = slot.lock().await;
                    let still_processing = documents
                        .read()
                        .await
                        .values()
                        .any(|d| !d.is_terminal());
                    if still_processing {
                        continue;
                    }
                    *slot = None;
                    info!("no documents processing, poll scheduler stopped");
                    break;
                }
            }
        }));
    }

    /// Cancel the scheduler so no tick fires after teardown.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.poll_task.lock().await.take() {
            handle.abort();
        }
    }
}

/// One reconciliation pass: poll every processing document that has no query
/// already in flight, merge authoritative snapshots, and report how many
/// documents are still non-terminal.
async fn reconcile_once(
    service: &Arc<dyn IngestionService>,
    documents: &DocumentMap,
    in_flight: &InFlightSet,
    events: &EventBus,
) -> usize {
    let ids: Vec<DocumentId> = {
        let documents = documents.read().await;
        let in_flight = in_flight.lock().await;
        documents
            .values()
            .filter(|d| !d.is_terminal() && !in_flight.contains(&d.id))
            .map(|d| d.id)
            .collect()
    };

    if !ids.is_empty() {
        in_flight.lock().await.extend(ids.iter().copied());
    }

    let mut changed = false;
    for id in &ids {
        match service.document_status(*id).await {
            Ok(snapshot) => {
                let mut documents = documents.write().await;
                if let Some(doc) = documents.get_mut(id) {
                    if doc.merge_snapshot(&snapshot) {
                        debug!("document {id} now {:?}", doc.status);
                        changed = true;
                    }
                }
            }
            // Transient: the document is left untouched and retried on the
            // next tick. Only the backend's own status may fail a document.
            Err(e) => warn!("status poll for document {id} failed: {e}"),
        }
    }

    {
        let mut in_flight = in_flight.lock().await;
        for id in &ids {
            in_flight.remove(id);
        }
    }

    if changed {
        events.emit(StateEvent::DocumentsChanged);
    }

    documents
        .read()
        .await
        .values()
        .filter(|d| !d.is_terminal())
        .count()
}

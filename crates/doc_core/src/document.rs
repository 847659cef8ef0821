use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type DocumentId = i64;

/// Processing state reported by the ingestion backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Processing,
    Ready,
    Failed,
}

impl DocumentStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DocumentStatus::Ready | DocumentStatus::Failed)
    }
}

/// A document known to the client, from upload acceptance until deletion.
///
/// `processing_stage` and `progress` are only meaningful while the document
/// is still processing; both are cleared on the terminal transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub original_filename: String,
    pub status: DocumentStatus,
    #[serde(default)]
    pub processing_stage: Option<String>,
    #[serde(default)]
    pub progress: Option<u8>,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub page_count: Option<u32>,
    #[serde(default)]
    pub chunk_count: Option<u32>,
    pub created_at: DateTime<Utc>,
}

impl Document {
    /// Create the local record for a just-accepted upload.
    pub fn new_processing(id: DocumentId, original_filename: impl Into<String>) -> Self {
        Self {
            id,
            original_filename: original_filename.into(),
            status: DocumentStatus::Processing,
            processing_stage: None,
            progress: Some(0),
            error_message: None,
            page_count: None,
            chunk_count: None,
            created_at: Utc::now(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Merge a server snapshot into this record, preserving identity.
    ///
    /// A document already in a terminal state is never mutated again.
    /// Returns whether anything changed.
    pub fn merge_snapshot(&mut self, snapshot: &Document) -> bool {
        if self.status.is_terminal() {
            return false;
        }

        let mut changed = false;

        if snapshot.status.is_terminal() {
            self.status = snapshot.status;
            self.processing_stage = None;
            self.progress = None;
            self.error_message = snapshot.error_message.clone();
            self.page_count = snapshot.page_count;
            self.chunk_count = snapshot.chunk_count;
            return true;
        }

        if snapshot.processing_stage != self.processing_stage {
            self.processing_stage = snapshot.processing_stage.clone();
            changed = true;
        }
        if snapshot.progress.is_some() && snapshot.progress != self.progress {
            self.progress = snapshot.progress;
            changed = true;
        }

        changed
    }
}

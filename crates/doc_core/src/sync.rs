use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type SyncSourceId = i64;

/// File extensions the ingestion pipeline accepts for import.
pub const SUPPORTED_EXTENSIONS: [&str; 6] = [".pdf", ".docx", ".doc", ".xlsx", ".xls", ".txt"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Idle,
    Syncing,
    Error,
    NotConnected,
}

/// A configured cloud-storage source.
///
/// A disconnected source keeps its name, folder path and interval but holds
/// no credential; browsing is only valid while connected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSource {
    pub id: SyncSourceId,
    pub name: String,
    pub folder_path: String,
    /// Periodic sync interval, in seconds.
    pub sync_interval: u32,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub status: SyncStatus,
    pub error_message: Option<String>,
    /// Provider-reported account label, e.g. the cloud account's user name.
    pub account_label: Option<String>,
    pub is_connected: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth_token: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteFolder {
    pub name: String,
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteFile {
    pub name: String,
    pub path: String,
    pub size: u64,
    pub modified: String,
    pub extension: String,
}

/// Contents of one remote directory: folders first, both lists sorted
/// case-insensitively by name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DirectoryListing {
    pub folders: Vec<RemoteFolder>,
    pub files: Vec<RemoteFile>,
}

impl DirectoryListing {
    pub fn sort(&mut self) {
        self.folders.sort_by_key(|f| f.name.to_lowercase());
        self.files.sort_by_key(|f| f.name.to_lowercase());
    }
}

/// Whether a remote file name carries a supported extension.
pub fn is_supported_file(name: &str) -> bool {
    let lower = name.to_lowercase();
    SUPPORTED_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

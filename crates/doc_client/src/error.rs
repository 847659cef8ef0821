use doc_core::{ContextKey, SyncSourceId};
use thiserror::Error;

pub type Result<T, E = ClientError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Transient transport failure; retried at the next natural schedule
    /// point, never treated as an authoritative failure of the entity.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The backend rejected the request; `detail` is its reported reason.
    #[error("API error ({status}): {detail}")]
    Api { status: u16, detail: String },

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Context '{0}' already has a request in flight")]
    Busy(ContextKey),

    #[error("Question is empty")]
    EmptyQuestion,

    #[error("Source is not connected")]
    NotConnected,

    #[error("Sync source not found: {0}")]
    SourceNotFound(SyncSourceId),

    #[error("No browser is open")]
    BrowserClosed,
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ClientError::Transport(err.to_string())
    }
}

impl ClientError {
    /// Whether the failure is transient (worth retrying on the next tick)
    /// rather than an authoritative rejection.
    pub fn is_transient(&self) -> bool {
        matches!(self, ClientError::Transport(_))
    }
}

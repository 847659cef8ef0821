//! State-change notifications for the UI layer.
//!
//! Every component emits a [`StateEvent`] after mutating its state so the
//! presentation layer can pull a fresh snapshot. Emission never blocks and
//! never fails: with no subscribers the event is simply dropped.

use doc_core::ContextKey;
use tokio::sync::broadcast;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateEvent {
    /// The document set or a document's processing state changed.
    DocumentsChanged,
    /// One conversation's messages, busy flag, or status label changed.
    ChatChanged(ContextKey),
    /// The sync source list or connection flow changed.
    SyncChanged,
    /// The open directory browser changed (listing, selection, imports).
    BrowserChanged,
}

/// Broadcast bus carrying [`StateEvent`]s to any number of subscribers.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<StateEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StateEvent> {
        self.sender.subscribe()
    }

    pub fn emit(&self, event: StateEvent) {
        // A send error only means nobody is listening right now.
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}

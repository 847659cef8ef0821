//! doc_client - Client-side orchestration core for the docchat application
//!
//! Keeps the UI consistent with three independently-paced backend processes:
//! - `tracker` - document ingestion lifecycle, reconciled by periodic polls
//! - `multiplexer` + `decoder` - per-context conversations with streamed answers
//! - `sync` - cloud-storage authorization, browsing, and import
//!
//! External services are reached through the traits in `services`; the UI
//! layer reads snapshots and listens on the `events` bus.

pub mod client;
pub mod config;
pub mod decoder;
pub mod error;
pub mod events;
pub mod multiplexer;
pub mod services;
pub mod sync;
pub mod tracker;

// Re-export commonly used types
pub use client::DocChatClient;
pub use config::ClientConfig;
pub use decoder::{decode_stream, FrameDecoder, FrameStream};
pub use error::{ClientError, Result};
pub use events::{EventBus, StateEvent};
pub use multiplexer::{ChatMultiplexer, ContextSnapshot};
pub use sync::{BrowseState, ConnectionFlow, SyncManager};
pub use tracker::DocumentTracker;

//! doc_core - Core domain types for the docchat client
//!
//! This crate provides the foundational types used across the client crates:
//! - `document` - Document and its ingestion status
//! - `message` - Chat messages and conversation context keys
//! - `frame` - Decoded records of a streamed answer
//! - `sync` - Cloud sync sources and remote directory listings

pub mod document;
pub mod frame;
pub mod message;
pub mod sync;

// Re-export commonly used types
pub use document::{Document, DocumentId, DocumentStatus};
pub use frame::{RawFrame, StreamFrame};
pub use message::{ChatMessage, ContextKey, Role};
pub use sync::{
    is_supported_file, DirectoryListing, RemoteFile, RemoteFolder, SyncSource, SyncSourceId,
    SyncStatus, SUPPORTED_EXTENSIONS,
};

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::document::DocumentId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// One entry in a conversation's message list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            created_at: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// Identity of one independent conversation: a specific document, or the
/// cross-document conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContextKey {
    Global,
    Document(DocumentId),
}

impl fmt::Display for ContextKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ContextKey::Global => write!(f, "all"),
            ContextKey::Document(id) => write!(f, "{id}"),
        }
    }
}

impl FromStr for ContextKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s == "all" {
            return Ok(ContextKey::Global);
        }
        s.parse::<DocumentId>()
            .map(ContextKey::Document)
            .map_err(|_| format!("invalid context key: {s}"))
    }
}

impl ContextKey {
    /// The document id to attach to an answer request, if any.
    pub fn document_id(&self) -> Option<DocumentId> {
        match self {
            ContextKey::Global => None,
            ContextKey::Document(id) => Some(*id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_key_round_trips_through_string() {
        assert_eq!("all".parse::<ContextKey>().unwrap(), ContextKey::Global);
        assert_eq!("7".parse::<ContextKey>().unwrap(), ContextKey::Document(7));
        assert_eq!(ContextKey::Global.to_string(), "all");
        assert_eq!(ContextKey::Document(7).to_string(), "7");
    }

    #[test]
    fn test_context_key_rejects_garbage() {
        assert!("not-a-key".parse::<ContextKey>().is_err());
    }

    #[test]
    fn test_document_id_only_for_document_contexts() {
        assert_eq!(ContextKey::Global.document_id(), None);
        assert_eq!(ContextKey::Document(3).document_id(), Some(3));
    }
}

use serde::Deserialize;

/// One decoded record of a streamed answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFrame {
    /// A piece of assistant text. When `replace` is set the delta overwrites
    /// the in-progress message instead of appending to it (used to clear an
    /// interim placeholder such as "thinking").
    ContentDelta { text: String, replace: bool },
    /// Transient progress label, e.g. "thinking". Never becomes a message.
    Status(String),
    /// The service reported a failure; no further frames follow.
    Error(String),
    /// Explicit end of the answer; no further frames follow.
    Done,
}

impl StreamFrame {
    pub fn delta(text: impl Into<String>) -> Self {
        StreamFrame::ContentDelta {
            text: text.into(),
            replace: false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StreamFrame::Error(_) | StreamFrame::Done)
    }
}

/// Wire shape of a single `data:` payload from the answer stream.
///
/// The backend emits JSON objects with at most one meaningful field per
/// record; precedence when several are present: error > done > status >
/// content.
#[derive(Debug, Default, Deserialize)]
pub struct RawFrame {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub done: Option<bool>,
}

impl RawFrame {
    pub fn classify(self) -> Option<StreamFrame> {
        if let Some(error) = self.error {
            return Some(StreamFrame::Error(error));
        }
        if self.done.unwrap_or(false) {
            return Some(StreamFrame::Done);
        }
        if let Some(status) = self.status {
            return Some(StreamFrame::Status(status));
        }
        self.content.map(StreamFrame::delta)
    }
}

//! Chat session multiplexer.
//!
//! One independent conversation per [`ContextKey`]. Each context serializes
//! its requests through a busy flag, folds the decoded answer stream into its
//! own message list, and never shares messages or session identity with any
//! other context.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::StreamExt;
use log::{debug, info, warn};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use doc_core::{ChatMessage, ContextKey, Role, StreamFrame};

use crate::decoder::decode_stream;
use crate::error::{ClientError, Result};
use crate::events::{EventBus, StateEvent};
use crate::services::{AnswerService, SessionId};

/// Read-only view of one conversation.
#[derive(Debug, Clone, Default)]
pub struct ContextSnapshot {
    pub messages: Vec<ChatMessage>,
    pub session_id: Option<SessionId>,
    pub busy: bool,
    /// Transient progress label ("thinking"), shown while the answer is
    /// still pending. Never part of the message list.
    pub status_label: Option<String>,
    pub last_error: Option<String>,
}

#[derive(Default)]
struct ContextState {
    messages: Vec<ChatMessage>,
    session_id: Option<SessionId>,
    busy: bool,
    status_label: Option<String>,
    last_error: Option<String>,
    cancel: Option<CancellationToken>,
}

impl ContextState {
    fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot {
            messages: self.messages.clone(),
            session_id: self.session_id,
            busy: self.busy,
            status_label: self.status_label.clone(),
            last_error: self.last_error.clone(),
        }
    }
}

type ContextMap = Arc<RwLock<HashMap<ContextKey, ContextState>>>;

pub struct ChatMultiplexer {
    service: Arc<dyn AnswerService>,
    contexts: ContextMap,
    events: EventBus,
}

impl ChatMultiplexer {
    pub fn new(service: Arc<dyn AnswerService>, events: EventBus) -> Self {
        Self {
            service,
            contexts: Arc::new(RwLock::new(HashMap::new())),
            events,
        }
    }

    pub async fn snapshot(&self, key: ContextKey) -> ContextSnapshot {
        self.contexts
            .read()
            .await
            .get(&key)
            .map(ContextState::snapshot)
            .unwrap_or_default()
    }

    /// Send a question in one context and stream the answer into it.
    ///
    /// Rejected locally, with no state mutated, when the question is empty
    /// or the context already has a request in flight.
    pub async fn send(&self, key: ContextKey, question: &str) -> Result<()> {
        let question = question.trim().to_string();
        if question.is_empty() {
            return Err(ClientError::EmptyQuestion);
        }

        let (session_id, cancel) = {
            let mut contexts = self.contexts.write().await;
            let state = contexts.entry(key).or_default();
            if state.busy {
                return Err(ClientError::Busy(key));
            }
            state.busy = true;
            state.last_error = None;
            state.messages.push(ChatMessage::user(question.clone()));
            // The in-progress assistant message exists from the start so the
            // UI can show a pending reply.
            state.messages.push(ChatMessage::assistant(""));
            let cancel = CancellationToken::new();
            state.cancel = Some(cancel.clone());
            (state.session_id, cancel)
        };
        self.events.emit(StateEvent::ChatChanged(key));

        let service = Arc::clone(&self.service);
        let contexts = Arc::clone(&self.contexts);
        let events = self.events.clone();
        tokio::spawn(async move {
            run_exchange(service, contexts, events, key, question, session_id, cancel).await;
        });
        Ok(())
    }

    /// Stop frame processing for an in-flight exchange without retracting
    /// anything already folded.
    pub async fn cancel(&self, key: ContextKey) {
        if let Some(state) = self.contexts.read().await.get(&key) {
            if let Some(cancel) = &state.cancel {
                cancel.cancel();
            }
        }
    }

    /// Discard messages and session identity for one context only.
    pub async fn reset(&self, key: ContextKey) {
        let mut contexts = self.contexts.write().await;
        if let Some(state) = contexts.get_mut(&key) {
            if let Some(cancel) = state.cancel.take() {
                cancel.cancel();
            }
            *state = ContextState::default();
            self.events.emit(StateEvent::ChatChanged(key));
        }
    }

    /// Drop a context entirely. Used when its owning document is deleted.
    pub async fn drop_context(&self, key: ContextKey) {
        let removed = self.contexts.write().await.remove(&key);
        if let Some(state) = removed {
            if let Some(cancel) = state.cancel {
                cancel.cancel();
            }
            self.events.emit(StateEvent::ChatChanged(key));
        }
    }

    pub async fn context_keys(&self) -> Vec<ContextKey> {
        self.contexts.read().await.keys().copied().collect()
    }
}

async fn run_exchange(
    service: Arc<dyn AnswerService>,
    contexts: ContextMap,
    events: EventBus,
    key: ContextKey,
    question: String,
    session_id: Option<SessionId>,
    cancel: CancellationToken,
) {
    match service.ask(&question, session_id, key.document_id()).await {
        Ok(answer) => {
            if let Some(issued) = answer.session_id {
                let mut contexts = contexts.write().await;
                if let Some(state) = contexts.get_mut(&key) {
                    if state.session_id.is_none() {
                        debug!("context {key} adopted session {issued}");
                        state.session_id = Some(issued);
                    }
                }
            }

            let mut frames = decode_stream(answer.chunks);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("exchange for context {key} cancelled");
                        break;
                    }
                    frame = frames.next() => match frame {
                        Some(frame) => {
                            let terminal = frame.is_terminal();
                            fold_frame(&service, &contexts, &events, key, frame).await;
                            if terminal {
                                break;
                            }
                        }
                        None => break,
                    }
                }
            }
        }
        Err(e) => {
            warn!("answer request for context {key} failed: {e}");
            let mut contexts = contexts.write().await;
            if let Some(state) = contexts.get_mut(&key) {
                state.last_error = Some(e.to_string());
                retract_empty_assistant(state);
            }
        }
    }

    let mut contexts = contexts.write().await;
    if let Some(state) = contexts.get_mut(&key) {
        state.busy = false;
        state.status_label = None;
        state.cancel = None;
    }
    drop(contexts);
    events.emit(StateEvent::ChatChanged(key));
}

async fn fold_frame(
    service: &Arc<dyn AnswerService>,
    contexts: &ContextMap,
    events: &EventBus,
    key: ContextKey,
    frame: StreamFrame,
) {
    let mut guard = contexts.write().await;
    let Some(state) = guard.get_mut(&key) else {
        return;
    };

    match frame {
        StreamFrame::ContentDelta { text, replace } => {
            if let Some(last) = state.messages.last_mut() {
                if last.role == Role::Assistant {
                    if replace {
                        last.content = text;
                    } else {
                        last.content.push_str(&text);
                    }
                }
            }
            state.status_label = None;
        }
        StreamFrame::Status(label) => {
            state.status_label = Some(label);
        }
        StreamFrame::Error(message) => {
            warn!("answer stream for context {key} failed: {message}");
            state.last_error = Some(message);
            retract_empty_assistant(state);
        }
        StreamFrame::Done => {
            let final_content = state
                .messages
                .last()
                .filter(|m| m.role == Role::Assistant)
                .map(|m| m.content.clone())
                .unwrap_or_default();
            if final_content.is_empty() {
                debug!("answer for context {key} ended empty, retracting");
                retract_empty_assistant(state);
            } else if let Some(session_id) = state.session_id {
                // Best-effort persistence: failure is logged, never retried,
                // never surfaced.
                let service = Arc::clone(service);
                tokio::spawn(async move {
                    if let Err(e) = service.persist_answer(session_id, &final_content).await {
                        warn!("failed to persist final answer for session {session_id}: {e}");
                    }
                });
            }
        }
    }

    drop(guard);
    events.emit(StateEvent::ChatChanged(key));
}

fn retract_empty_assistant(state: &mut ContextState) {
    if state
        .messages
        .last()
        .map(|m| m.role == Role::Assistant && m.content.is_empty())
        .unwrap_or(false)
    {
        state.messages.pop();
    }
}

mod support;

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use doc_client::error::ClientError;
use doc_client::events::EventBus;
use doc_client::multiplexer::ChatMultiplexer;
use doc_core::{ContextKey, Role};

use support::{wait_until, MockAnswers, ScriptedAnswer};

fn multiplexer_with(service: Arc<MockAnswers>) -> ChatMultiplexer {
    ChatMultiplexer::new(service, EventBus::default())
}

async fn wait_idle(mux: &ChatMultiplexer, key: ContextKey) {
    wait_until("context to go idle", move || async move {
        !mux.snapshot(key).await.busy
    })
    .await;
}

#[tokio::test]
async fn test_streamed_answer_is_folded_into_one_message() {
    let service = Arc::new(MockAnswers::new());
    service.script(ScriptedAnswer::body(
        Some(12),
        &[
            "data: {\"status\": \"thinking\"}\n\n",
            "data: {\"content\": \"The value\"}\n\n",
            "data: {\"content\": \" is 42.\"}\n\n",
            "data: {\"done\": true}\n\n",
        ],
    ));
    let mux = multiplexer_with(Arc::clone(&service));
    let key = ContextKey::Document(7);

    mux.send(key, "What is X?").await.unwrap();
    wait_idle(&mux, key).await;

    let snapshot = mux.snapshot(key).await;
    assert_eq!(snapshot.messages.len(), 2);
    assert_eq!(snapshot.messages[0].role, Role::User);
    assert_eq!(snapshot.messages[0].content, "What is X?");
    assert_eq!(snapshot.messages[1].role, Role::Assistant);
    assert_eq!(snapshot.messages[1].content, "The value is 42.");
    assert_eq!(snapshot.session_id, Some(12));
    assert_eq!(snapshot.status_label, None);
    assert!(!snapshot.busy);

    // The document id was attached to the request.
    assert_eq!(
        service.asks.lock().unwrap().as_slice(),
        &[("What is X?".to_string(), None, Some(7))]
    );

    // The finished answer is persisted, best-effort.
    let s = &service;
    wait_until("answer persistence", move || async move {
        !s.persisted.lock().unwrap().is_empty()
    })
    .await;
    assert_eq!(
        service.persisted.lock().unwrap().as_slice(),
        &[(12, "The value is 42.".to_string())]
    );
}

#[tokio::test]
async fn test_session_id_is_reused_on_later_sends() {
    let service = Arc::new(MockAnswers::new());
    service.script(ScriptedAnswer::body(
        Some(3),
        &["data: {\"content\": \"one\"}\n\ndata: {\"done\": true}\n\n"],
    ));
    service.script(ScriptedAnswer::body(
        Some(3),
        &["data: {\"content\": \"two\"}\n\ndata: {\"done\": true}\n\n"],
    ));
    let mux = multiplexer_with(Arc::clone(&service));

    mux.send(ContextKey::Global, "first").await.unwrap();
    wait_idle(&mux, ContextKey::Global).await;
    mux.send(ContextKey::Global, "second").await.unwrap();
    wait_idle(&mux, ContextKey::Global).await;

    let asks = service.asks.lock().unwrap();
    assert_eq!(asks[0].1, None);
    assert_eq!(asks[1].1, Some(3));
    // The cross-document context never carries a document id.
    assert_eq!(asks[0].2, None);
    assert_eq!(asks[1].2, None);
}

#[tokio::test]
async fn test_second_send_is_rejected_while_busy() {
    let service = Arc::new(MockAnswers::new());
    let (answer, tx) = ScriptedAnswer::channel(Some(1));
    service.script(answer);
    let mux = multiplexer_with(Arc::clone(&service));
    let key = ContextKey::Document(1);

    mux.send(key, "first").await.unwrap();
    let m = &mux;
    wait_until("exchange to start", move || async move {
        m.snapshot(key).await.busy
    })
    .await;

    let rejected = mux.send(key, "second").await;
    assert!(matches!(rejected, Err(ClientError::Busy(k)) if k == key));
    // The rejected send must not have touched the message list.
    assert_eq!(mux.snapshot(key).await.messages.len(), 2);

    tx.send(Ok(Bytes::from("data: {\"done\": true}\n\n")))
        .await
        .unwrap();
    drop(tx);
    wait_idle(&mux, key).await;
    assert_eq!(service.asks.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn test_empty_question_is_rejected_without_state_change() {
    let service = Arc::new(MockAnswers::new());
    let mux = multiplexer_with(Arc::clone(&service));

    let rejected = mux.send(ContextKey::Global, "   ").await;
    assert!(matches!(rejected, Err(ClientError::EmptyQuestion)));
    assert!(mux.snapshot(ContextKey::Global).await.messages.is_empty());
    assert!(service.asks.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_contexts_are_fully_isolated() {
    let service = Arc::new(MockAnswers::new());
    service.script(ScriptedAnswer::body(
        Some(5),
        &["data: {\"content\": \"about doc five\"}\n\ndata: {\"done\": true}\n\n"],
    ));
    service.script(ScriptedAnswer::body(
        Some(6),
        &["data: {\"content\": \"about doc six\"}\n\ndata: {\"done\": true}\n\n"],
    ));
    let mux = multiplexer_with(Arc::clone(&service));
    let five = ContextKey::Document(5);
    let six = ContextKey::Document(6);

    mux.send(five, "q5").await.unwrap();
    wait_idle(&mux, five).await;
    mux.send(six, "q6").await.unwrap();
    wait_idle(&mux, six).await;

    let snap_five = mux.snapshot(five).await;
    let snap_six = mux.snapshot(six).await;
    assert_eq!(snap_five.session_id, Some(5));
    assert_eq!(snap_six.session_id, Some(6));
    assert_eq!(snap_five.messages[1].content, "about doc five");
    assert_eq!(snap_six.messages[1].content, "about doc six");

    // Resetting one context leaves the other untouched.
    mux.reset(five).await;
    assert!(mux.snapshot(five).await.messages.is_empty());
    assert_eq!(mux.snapshot(five).await.session_id, None);
    assert_eq!(mux.snapshot(six).await.messages.len(), 2);
    assert_eq!(mux.snapshot(six).await.session_id, Some(6));
}

#[tokio::test]
async fn test_error_frame_retracts_empty_assistant_message() {
    let service = Arc::new(MockAnswers::new());
    service.script(ScriptedAnswer::body(
        Some(1),
        &["data: {\"error\": \"model unavailable\"}\n\n"],
    ));
    let mux = multiplexer_with(Arc::clone(&service));
    let key = ContextKey::Global;

    mux.send(key, "hello").await.unwrap();
    wait_idle(&mux, key).await;

    let snapshot = mux.snapshot(key).await;
    // Only the user message remains; the blank reply was removed.
    assert_eq!(snapshot.messages.len(), 1);
    assert_eq!(snapshot.messages[0].role, Role::User);
    assert_eq!(snapshot.last_error.as_deref(), Some("model unavailable"));
}

#[tokio::test]
async fn test_error_frame_keeps_partial_content() {
    let service = Arc::new(MockAnswers::new());
    service.script(ScriptedAnswer::body(
        Some(1),
        &["data: {\"content\": \"partial\"}\n\ndata: {\"error\": \"cut off\"}\n\n"],
    ));
    let mux = multiplexer_with(Arc::clone(&service));
    let key = ContextKey::Global;

    mux.send(key, "hello").await.unwrap();
    wait_idle(&mux, key).await;

    let snapshot = mux.snapshot(key).await;
    assert_eq!(snapshot.messages.len(), 2);
    assert_eq!(snapshot.messages[1].content, "partial");
    assert_eq!(snapshot.last_error.as_deref(), Some("cut off"));
}

#[tokio::test]
async fn test_transport_close_finalizes_last_content() {
    let service = Arc::new(MockAnswers::new());
    // No terminal frame: the body just ends.
    service.script(ScriptedAnswer::body(
        Some(9),
        &["data: {\"content\": \"all we got\"}\n\n"],
    ));
    let mux = multiplexer_with(Arc::clone(&service));
    let key = ContextKey::Global;

    mux.send(key, "hello").await.unwrap();
    wait_idle(&mux, key).await;

    let snapshot = mux.snapshot(key).await;
    assert_eq!(snapshot.messages[1].content, "all we got");
    assert_eq!(snapshot.last_error, None);
}

#[tokio::test]
async fn test_failed_request_clears_busy_and_surfaces_error() {
    let service = Arc::new(MockAnswers::new());
    // Nothing scripted: ask() fails before any stream opens.
    let mux = multiplexer_with(Arc::clone(&service));
    let key = ContextKey::Document(2);

    mux.send(key, "hello").await.unwrap();
    wait_idle(&mux, key).await;

    let snapshot = mux.snapshot(key).await;
    assert_eq!(snapshot.messages.len(), 1);
    assert!(snapshot.last_error.is_some());
    assert!(!snapshot.busy);

    // The context accepts a new send afterwards.
    service.script(ScriptedAnswer::body(
        Some(4),
        &["data: {\"content\": \"ok\"}\n\ndata: {\"done\": true}\n\n"],
    ));
    mux.send(key, "retry").await.unwrap();
    wait_idle(&mux, key).await;
    assert_eq!(mux.snapshot(key).await.messages.len(), 3);
}

#[tokio::test]
async fn test_status_label_is_transient() {
    let service = Arc::new(MockAnswers::new());
    let (answer, tx) = ScriptedAnswer::channel(Some(1));
    service.script(answer);
    let mux = multiplexer_with(Arc::clone(&service));
    let key = ContextKey::Global;

    mux.send(key, "hello").await.unwrap();
    tx.send(Ok(Bytes::from("data: {\"status\": \"thinking\"}\n\n")))
        .await
        .unwrap();
    let m = &mux;
    wait_until("thinking label to show", move || async move {
        m.snapshot(key).await.status_label.as_deref() == Some("thinking")
    })
    .await;
    // The label never became a message.
    assert_eq!(mux.snapshot(key).await.messages.len(), 2);

    tx.send(Ok(Bytes::from("data: {\"content\": \"Hi.\"}\n\n")))
        .await
        .unwrap();
    wait_until("label to clear on first delta", move || async move {
        m.snapshot(key).await.status_label.is_none()
    })
    .await;

    tx.send(Ok(Bytes::from("data: {\"done\": true}\n\n")))
        .await
        .unwrap();
    drop(tx);
    wait_idle(&mux, key).await;
    assert_eq!(mux.snapshot(key).await.messages[1].content, "Hi.");
}

#[tokio::test]
async fn test_cancel_stops_folding_but_keeps_messages() {
    let service = Arc::new(MockAnswers::new());
    let (answer, tx) = ScriptedAnswer::channel(Some(1));
    service.script(answer);
    let mux = multiplexer_with(Arc::clone(&service));
    let key = ContextKey::Global;

    mux.send(key, "hello").await.unwrap();
    tx.send(Ok(Bytes::from("data: {\"content\": \"before cancel\"}\n\n")))
        .await
        .unwrap();
    let m = &mux;
    wait_until("delta to fold", move || async move {
        let snapshot = m.snapshot(key).await;
        snapshot.messages.len() == 2 && snapshot.messages[1].content == "before cancel"
    })
    .await;

    mux.cancel(key).await;
    wait_idle(&mux, key).await;

    // Already-folded content survives cancellation.
    let snapshot = mux.snapshot(key).await;
    assert_eq!(snapshot.messages[1].content, "before cancel");

    // Frames arriving after cancellation are not folded.
    let _ = tx
        .send(Ok(Bytes::from("data: {\"content\": \" too late\"}\n\n")))
        .await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(mux.snapshot(key).await.messages[1].content, "before cancel");
}

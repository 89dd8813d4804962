//! End-to-end tests of the one-shot query orchestrator against an
//! in-process fake of the conversational API.

use std::sync::Mutex;
use std::sync::atomic::AtomicBool;

use async_trait::async_trait;
use futures::stream;
use m365chat::oneshot::run_query;
use m365chat::{
    ChatMessage, Conversation, ConversationApi, EventStream, Result, SseEvent,
};

/// A scripted stand-in for the remote API.
#[derive(Default)]
struct MockApi {
    conversation_id: Option<String>,
    reply: Vec<ChatMessage>,
    events: Vec<SseEvent>,
    calls: Mutex<Vec<&'static str>>,
}

impl MockApi {
    fn with_id(id: &str) -> Self {
        Self {
            conversation_id: Some(id.to_string()),
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConversationApi for MockApi {
    async fn create_conversation(&self) -> Result<Conversation> {
        self.calls.lock().unwrap().push("create");
        Ok(Conversation {
            id: self.conversation_id.clone(),
            messages: Vec::new(),
        })
    }

    async fn send_message(&self, _conversation_id: &str, _text: &str) -> Result<Conversation> {
        self.calls.lock().unwrap().push("chat");
        Ok(Conversation {
            id: self.conversation_id.clone(),
            messages: self.reply.clone(),
        })
    }

    async fn send_message_streaming(
        &self,
        _conversation_id: &str,
        _text: &str,
    ) -> Result<EventStream> {
        self.calls.lock().unwrap().push("stream");
        let events: Vec<Result<SseEvent>> = self.events.iter().cloned().map(Ok).collect();
        Ok(Box::pin(stream::iter(events)))
    }
}

fn snapshot_event(texts: &[&str]) -> SseEvent {
    let messages: Vec<serde_json::Value> = texts
        .iter()
        .map(|t| serde_json::json!({ "author": "assistant", "text": t }))
        .collect();
    SseEvent {
        event: Some("message".to_string()),
        id: None,
        data: serde_json::json!({ "messages": messages }).to_string(),
    }
}

#[tokio::test]
async fn non_streaming_emits_only_the_reply() {
    let mut api = MockApi::with_id("conv-1");
    api.reply = vec![
        ChatMessage::new_with_text("hi"),
        ChatMessage::new_with_text("how can I help?"),
    ];

    let cancel = AtomicBool::new(false);
    let mut emitted = Vec::new();
    run_query(&api, "hi", false, &cancel, &mut |text| {
        emitted.push(text.to_string())
    })
    .await
    .unwrap();

    assert_eq!(emitted, vec!["how can I help?"]);
    assert_eq!(api.calls(), vec!["create", "chat"]);
}

#[tokio::test]
async fn non_streaming_zero_message_reply_emits_nothing() {
    let api = MockApi::with_id("conv-1");

    let cancel = AtomicBool::new(false);
    let mut emitted = Vec::new();
    run_query(&api, "hi", false, &cancel, &mut |text| {
        emitted.push(text.to_string())
    })
    .await
    .unwrap();

    assert!(emitted.is_empty());
}

#[tokio::test]
async fn streaming_emits_each_snapshot_in_order() {
    let mut api = MockApi::with_id("conv-1");
    api.events = vec![
        snapshot_event(&["Let me look"]),
        snapshot_event(&["Let me look", "Here is what I found"]),
    ];

    let cancel = AtomicBool::new(false);
    let mut emitted = Vec::new();
    run_query(&api, "find it", true, &cancel, &mut |text| {
        emitted.push(text.to_string())
    })
    .await
    .unwrap();

    assert_eq!(emitted, vec!["Let me look", "Here is what I found"]);
    assert_eq!(api.calls(), vec!["create", "stream"]);
}

#[tokio::test]
async fn streaming_skips_empty_and_undisplayable_frames() {
    let mut api = MockApi::with_id("conv-1");
    api.events = vec![
        SseEvent {
            event: Some("ping".to_string()),
            id: None,
            data: String::new(),
        },
        SseEvent {
            event: None,
            id: None,
            data: "not json".to_string(),
        },
        snapshot_event(&["the answer"]),
    ];

    let cancel = AtomicBool::new(false);
    let mut emitted = Vec::new();
    run_query(&api, "q", true, &cancel, &mut |text| {
        emitted.push(text.to_string())
    })
    .await
    .unwrap();

    assert_eq!(emitted, vec!["the answer"]);
}

#[tokio::test]
async fn empty_query_is_rejected_before_any_request() {
    let api = MockApi::with_id("conv-1");

    let cancel = AtomicBool::new(false);
    let mut emitted = Vec::new();
    let err = run_query(&api, "   ", false, &cancel, &mut |text| {
        emitted.push(text.to_string())
    })
    .await
    .unwrap_err();

    assert!(err.is_validation());
    assert_eq!(err.exit_code(), 4);
    assert!(emitted.is_empty());
    assert!(api.calls().is_empty());
}

#[tokio::test]
async fn missing_conversation_id_stops_before_sending() {
    let api = MockApi::default();

    let cancel = AtomicBool::new(false);
    let mut emitted = Vec::new();
    let err = run_query(&api, "hi", false, &cancel, &mut |text| {
        emitted.push(text.to_string())
    })
    .await
    .unwrap_err();

    assert!(err.is_conversation());
    assert_eq!(api.calls(), vec!["create"]);
    assert!(emitted.is_empty());
}

#[tokio::test]
async fn cancellation_stops_streaming_output() {
    let mut api = MockApi::with_id("conv-1");
    api.events = vec![snapshot_event(&["never shown"])];

    let cancel = AtomicBool::new(true);
    let mut emitted = Vec::new();
    run_query(&api, "q", true, &cancel, &mut |text| {
        emitted.push(text.to_string())
    })
    .await
    .unwrap();

    assert!(emitted.is_empty());
}

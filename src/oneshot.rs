//! One-shot query orchestration.
//!
//! Drives a single query end to end: validate input, create a conversation,
//! submit the message, and emit the reply either as one unit (non-streaming)
//! or incrementally as SSE frames decode (streaming). No retries: the first
//! failure at any step surfaces one categorized error.

use std::sync::atomic::{AtomicBool, Ordering};

use futures::StreamExt;

use crate::client::ConversationApi;
use crate::error::{Error, Result};
use crate::extract;

/// Run a one-shot query against the conversational API.
///
/// Each unit of reply text is passed to `emit` in server arrival order; in
/// streaming mode text is emitted as soon as its frame decodes, never
/// buffered until stream end. The `cancel` flag is checked between frames
/// so a user interrupt stops decoding promptly.
///
/// # Errors
///
/// - [`Error::Validation`] when the query is empty or whitespace-only
///   (checked before any network traffic);
/// - [`Error::Conversation`] when the server returns a conversation without
///   an identifier;
/// - any error from the underlying API operations, unchanged.
pub async fn run_query<C: ConversationApi + ?Sized>(
    api: &C,
    query: &str,
    streaming: bool,
    cancel: &AtomicBool,
    emit: &mut dyn FnMut(&str),
) -> Result<()> {
    if query.trim().is_empty() {
        return Err(Error::validation("Message cannot be empty"));
    }

    let conversation = api.create_conversation().await?;
    let Some(conversation_id) = conversation.id else {
        return Err(Error::conversation(
            "Server did not return a conversation identifier",
        ));
    };

    if streaming {
        let mut events = api.send_message_streaming(&conversation_id, query).await?;
        loop {
            if cancel.load(Ordering::SeqCst) {
                break;
            }
            let Some(event) = events.next().await else {
                break;
            };
            let event = event?;
            if event.data.is_empty() {
                continue;
            }
            if let Some(text) = extract::latest_message_text(&event.data) {
                emit(&text);
            }
        }
    } else {
        let updated = api.send_message(&conversation_id, query).await?;
        // A conversation with zero messages emits nothing and still counts
        // as success.
        if let Some(text) = updated.last_message_text() {
            emit(text);
        }
    }

    Ok(())
}

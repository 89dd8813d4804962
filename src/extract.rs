//! Extraction of displayable text from conversation snapshots.
//!
//! The streaming endpoint does not send incremental text deltas; each SSE
//! payload carries a full snapshot of the conversation, and this module
//! projects out "what changed" by always taking the last message.

use crate::types::Conversation;

/// Extract the latest message text from a JSON conversation snapshot.
///
/// Returns `None` when the payload does not parse as a conversation, has no
/// messages, or the last message carries no text. Parse failures are
/// deliberately swallowed: a single malformed frame must not abort the
/// stream.
pub fn latest_message_text(payload: &str) -> Option<String> {
    let conversation: Conversation = serde_json::from_str(payload).ok()?;
    let text = conversation.last_message_text()?;
    if text.is_empty() {
        return None;
    }
    Some(text.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_latest_message() {
        let payload = r#"{"id":"c1","messages":[{"text":"hi"},{"text":"on it"}]}"#;
        assert_eq!(latest_message_text(payload), Some("on it".to_string()));
    }

    #[test]
    fn case_insensitive_field_names() {
        let payload = r#"{"Id":"c1","Messages":[{"Text":"hello"}]}"#;
        assert_eq!(latest_message_text(payload), Some("hello".to_string()));
    }

    #[test]
    fn invalid_json_yields_none() {
        assert_eq!(latest_message_text("not json at all"), None);
        assert_eq!(latest_message_text("{\"unterminated"), None);
    }

    #[test]
    fn missing_messages_yields_none() {
        assert_eq!(latest_message_text(r#"{"id":"c1"}"#), None);
        assert_eq!(latest_message_text(r#"{"id":"c1","messages":[]}"#), None);
    }

    #[test]
    fn message_without_text_yields_none() {
        let payload = r#"{"messages":[{"id":"m1","author":"assistant"}]}"#;
        assert_eq!(latest_message_text(payload), None);
    }

    #[test]
    fn empty_text_yields_none() {
        let payload = r#"{"messages":[{"text":""}]}"#;
        assert_eq!(latest_message_text(payload), None);
    }
}

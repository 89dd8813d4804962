use serde::{Deserialize, Serialize};

use crate::types::ChatMessage;

/// A conversation as returned by the Copilot API.
///
/// Conversations are created server-side; the client only reads the
/// identifier and the append-only message list. The latest message is always
/// the last element.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Conversation {
    /// The server-assigned conversation identifier.
    #[serde(default, alias = "Id", alias = "ID", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// The ordered messages of the conversation, oldest first.
    #[serde(default, alias = "Messages")]
    pub messages: Vec<ChatMessage>,
}

impl Conversation {
    /// Returns the most recent message, if any.
    pub fn last_message(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    /// Returns the text of the most recent message, if any.
    pub fn last_message_text(&self) -> Option<&str> {
        self.last_message().and_then(|m| m.text.as_deref())
    }
}

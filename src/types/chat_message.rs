use serde::{Deserialize, Serialize};

/// A single message within a conversation.
///
/// The server serializes fields in camelCase but some endpoints have shipped
/// PascalCase payloads, so deserialization accepts either spelling. Only
/// those two spellings are accepted; fully case-insensitive matching (for
/// example `"TEXT"`) is not attempted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    /// Opaque identifier for the message.
    #[serde(default, alias = "Id", alias = "ID", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// The author of the message (for example "user" or "assistant").
    #[serde(default, alias = "Author", skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,

    /// The text content of the message.
    #[serde(default, alias = "Text", skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl ChatMessage {
    /// Create a new message with the given text.
    pub fn new_with_text(text: impl Into<String>) -> Self {
        Self {
            id: None,
            author: None,
            text: Some(text.into()),
        }
    }
}

use serde::{Deserialize, Serialize};

use crate::types::LocationHint;

/// The message portion of a chat request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageParameter {
    /// The text of the message to send.
    pub text: String,
}

/// Outbound payload for the chat and chatOverStream endpoints.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatRequest {
    /// The message to append to the conversation.
    pub message: MessageParameter,

    /// The caller's locale, expressed as an IANA time zone.
    #[serde(rename = "locationHint")]
    pub location_hint: LocationHint,
}

impl ChatRequest {
    /// Create a new chat request with the given message text and time zone.
    pub fn new(text: impl Into<String>, time_zone: impl Into<String>) -> Self {
        Self {
            message: MessageParameter { text: text.into() },
            location_hint: LocationHint::new(time_zone),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_wire_shape() {
        let req = ChatRequest::new("hello", "America/Chicago");
        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(
            json,
            r#"{"message":{"text":"hello"},"locationHint":{"timeZone":"America/Chicago"}}"#
        );
    }
}

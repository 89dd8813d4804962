// Public modules
pub mod chat_message;
pub mod chat_request;
pub mod conversation;
pub mod location_hint;

// Re-exports
pub use chat_message::ChatMessage;
pub use chat_request::{ChatRequest, MessageParameter};
pub use conversation::Conversation;
pub use location_hint::LocationHint;

// Public modules
pub mod auth;
pub mod client;
pub mod error;
pub mod extract;
pub mod oneshot;
pub mod sse;
pub mod timezone;
pub mod types;

mod observability;

// Re-exports
pub use client::{ConversationApi, Copilot, EventStream};
pub use error::{Error, Result};
pub use observability::register_biometrics;
pub use sse::{SseEvent, process_sse};
pub use types::*;

//! Conversation memory management module
//!
//! Provides session-scoped chat with:
//! - Pluggable history storage (`HistoryStore`), in-memory DashMap by default
//! - Idle expiry for the in-memory store
//! - System prompt templating with user context

mod cache;
mod engine;

pub use cache::{HistoryStore, MemoryHistoryStore};
pub use engine::{ConversationEngine, LlmProvider};

// Re-export common types for convenience
pub use crate::models::chat::{ChatMessage, SessionId};

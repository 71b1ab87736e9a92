use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, info};

use crate::models::chat::{ChatMessage, SessionId};

use super::cache::HistoryStore;

/// Trait for the chat completion service
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String>;
}

/// Session-scoped conversation on top of an LLM provider.
///
/// Every successful call appends the user turn and the assistant reply to the
/// session's history. History is never trimmed here; eviction belongs to the store.
pub struct ConversationEngine {
    llm: Arc<dyn LlmProvider>,
    history: Arc<dyn HistoryStore>,
    system_prompt: String,
}

impl ConversationEngine {
    pub fn new(
        llm: Arc<dyn LlmProvider>,
        history: Arc<dyn HistoryStore>,
        system_prompt: String,
    ) -> Self {
        Self {
            llm,
            history,
            system_prompt,
        }
    }

    /// Fill `{user_name}` / `{age}` in the system prompt template
    pub fn render_system_prompt(&self, user_name: &str, age: Option<i32>) -> String {
        let age = age
            .map(|a| a.to_string())
            .unwrap_or_else(|| "Not provided".to_string());

        self.system_prompt
            .trim()
            .replace("{user_name}", user_name)
            .replace("{age}", &age)
    }

    pub async fn invoke(
        &self,
        input: &str,
        user_name: &str,
        age: Option<i32>,
        session_id: SessionId,
    ) -> Result<String> {
        let history = self.history.load(session_id).await?;
        debug!(
            "Invoking conversation for session {} with {} prior messages",
            session_id,
            history.len()
        );

        let user_turn = ChatMessage::user(input);

        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(self.render_system_prompt(user_name, age)));
        messages.extend(history);
        messages.push(user_turn.clone());

        let reply = self.llm.generate(&messages).await?;

        self.history
            .append(session_id, vec![user_turn, ChatMessage::assistant(reply.clone())])
            .await?;

        info!(
            "Conversation turn completed for session {} ({} chars)",
            session_id,
            reply.len()
        );
        Ok(reply)
    }
}

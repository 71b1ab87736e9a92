use anyhow::Result;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::models::chat::{ChatMessage, SessionId};

/// Keyed conversation history. Implementations own eviction.
#[async_trait::async_trait]
pub trait HistoryStore: Send + Sync {
    /// Full ordered history of a session (empty when unknown or expired)
    async fn load(&self, session_id: SessionId) -> Result<Vec<ChatMessage>>;

    /// Append turns to the end of a session's history
    async fn append(&self, session_id: SessionId, turns: Vec<ChatMessage>) -> Result<()>;
}

#[derive(Debug, Clone)]
struct HistoryEntry {
    messages: Vec<ChatMessage>,
    last_activity: Instant,
}

impl HistoryEntry {
    fn new() -> Self {
        Self {
            messages: Vec::new(),
            last_activity: Instant::now(),
        }
    }

    fn is_expired(&self, ttl: Duration) -> bool {
        self.last_activity.elapsed() > ttl
    }
}

/// Thread-safe in-memory history store
/// Uses DashMap for lock-free concurrent access; sessions idle longer than `ttl` are dropped
#[derive(Clone)]
pub struct MemoryHistoryStore {
    storage: Arc<DashMap<SessionId, HistoryEntry>>,
    ttl: Duration,
}

impl MemoryHistoryStore {
    pub fn new(ttl: Duration) -> Self {
        info!("Initializing conversation history store (ttl: {:?})", ttl);
        Self {
            storage: Arc::new(DashMap::new()),
            ttl,
        }
    }

    /// Remove a session's history
    pub fn remove(&self, session_id: SessionId) -> Option<Vec<ChatMessage>> {
        self.storage
            .remove(&session_id)
            .map(|(_, entry)| entry.messages)
    }

    /// Get number of tracked sessions
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Drop idle sessions, returns number removed
    pub fn cleanup_expired(&self) -> usize {
        let start_len = self.storage.len();
        let ttl = self.ttl;
        self.storage.retain(|_, entry| !entry.is_expired(ttl));

        let count = start_len.saturating_sub(self.storage.len());
        if count > 0 {
            info!("Cleaned up {} expired conversation histories", count);
        }
        count
    }

    /// Periodic cleanup on the current runtime
    pub fn spawn_cleanup(&self, interval: Duration) -> JoinHandle<()> {
        let store = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                store.cleanup_expired();
            }
        })
    }
}

#[async_trait::async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn load(&self, session_id: SessionId) -> Result<Vec<ChatMessage>> {
        let Some(entry) = self.storage.get(&session_id) else {
            return Ok(Vec::new());
        };

        // Lazy expiry
        if entry.is_expired(self.ttl) {
            drop(entry);
            self.storage.remove(&session_id);
            debug!("History of session {} expired, removed", session_id);
            return Ok(Vec::new());
        }

        Ok(entry.messages.clone())
    }

    async fn append(&self, session_id: SessionId, turns: Vec<ChatMessage>) -> Result<()> {
        let mut entry = self
            .storage
            .entry(session_id)
            .or_insert_with(HistoryEntry::new);

        if entry.is_expired(self.ttl) {
            entry.messages.clear();
        }

        entry.messages.extend(turns);
        entry.last_activity = Instant::now();

        debug!(
            "Session {} history now has {} messages",
            session_id,
            entry.messages.len()
        );
        Ok(())
    }
}

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

/// Envelope as it left the emitter: topic plus the serialized outcome record
#[derive(Debug, Clone, Serialize)]
pub struct PublishedEvent {
    pub topic: String,
    pub payload: serde_json::Value,
}

impl PublishedEvent {
    /// Authenticated user the outcome belongs to, if any
    pub fn user_id(&self) -> Option<i64> {
        self.payload["payload"]["user_id"].as_i64()
    }
}

/// In-process fan-out of published events (SSE subscribers, tests)
pub struct EventBus {
    tx: broadcast::Sender<PublishedEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Returns the number of subscribers that received the event
    pub fn publish(&self, event: PublishedEvent) -> usize {
        match self.tx.send(event) {
            Ok(receivers) => receivers,
            Err(_) => {
                debug!("Event published with no subscribers");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent> {
        self.tx.subscribe()
    }
}

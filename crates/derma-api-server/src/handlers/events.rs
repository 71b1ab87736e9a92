use axum::{
    extract::State,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

use crate::auth::AuthUser;
use crate::services::EventBus;

/// Live feed of the caller's own outcome events. Requires a bearer token.
pub async fn events_stream_handler(
    AuthUser(user_id): AuthUser,
    State(event_bus): State<Arc<EventBus>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let mut rx = event_bus.subscribe();
    info!("Event stream subscriber connected: user={}", user_id);

    let stream = async_stream::stream! {
        loop {
            match rx.recv().await {
                Ok(event) if event.user_id() == Some(user_id) => {
                    let kind = event.payload["type"].as_str().unwrap_or("outcome").to_string();
                    yield Ok(create_sse_event(&kind, &event));
                }
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("Event stream subscriber lagged, skipped {} events", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
    };

    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn create_sse_event<T: serde::Serialize>(event_type: &str, data: &T) -> Event {
    Event::default()
        .event(event_type)
        .data(serde_json::to_string(data).unwrap_or_else(|_| "{}".to_string()))
}

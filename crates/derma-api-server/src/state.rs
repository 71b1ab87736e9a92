use axum::extract::FromRef;
use std::sync::Arc;

use crate::auth::JwtKeys;
use crate::database::AssistantRepository;
use crate::services::{AssistantService, EventBus};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub assistant: Arc<AssistantService>,
    pub repository: Arc<dyn AssistantRepository>,
    pub jwt: JwtKeys,
    pub event_bus: Arc<EventBus>,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        state.jwt.clone()
    }
}

impl FromRef<AppState> for Arc<EventBus> {
    fn from_ref(state: &AppState) -> Self {
        state.event_bus.clone()
    }
}

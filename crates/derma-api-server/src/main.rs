use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use derma_api_server::auth::JwtManager;
use derma_api_server::build_router;
use derma_api_server::config::Settings;
use derma_api_server::database::{AssistantRepository, DbPool, Repository};
use derma_api_server::services::conversation::{ConversationEngine, MemoryHistoryStore};
use derma_api_server::services::event_emitter::{build_sink, EmitterConfig};
use derma_api_server::services::{
    AssistantService, AssistantSettings, EventBus, EventEmitter, ImageClassifier,
    KnowledgeService, LlmService, MediaStore, SkinClassifier,
};
use derma_api_server::state::AppState;
use derma_api_server::utils::logger::init_logger;

#[tokio::main]
async fn main() -> Result<()> {
    let _log_guard = init_logger()?;

    info!("🚀 Starting Derma API Server...");

    // Load configuration
    let settings = Settings::load()?;
    info!("✅ Configuration loaded");

    // Initialize database pool
    let db_pool = DbPool::new(&settings.database).await?;
    info!("✅ Database connection established");

    let repository: Arc<dyn AssistantRepository> = Arc::new(Repository::new(db_pool.clone()));

    // The service keeps running without a model; image requests are refused
    let classifier: Option<Arc<dyn ImageClassifier>> =
        match SkinClassifier::load(&settings.classifier).await {
            Ok(classifier) => {
                info!("✅ Classifier '{}' loaded", settings.classifier.model_name);
                Some(Arc::new(classifier))
            }
            Err(e) => {
                error!("Failed to load classifier model: {:#}", e);
                None
            }
        };

    // Conversation history
    let history = MemoryHistoryStore::new(Duration::from_secs(
        settings.conversation.history_ttl_seconds,
    ));
    history.spawn_cleanup(Duration::from_secs(
        settings.conversation.cleanup_interval_seconds.max(1),
    ));

    let llm = Arc::new(LlmService::new(settings.llm.clone()));
    let conversation = Arc::new(ConversationEngine::new(
        llm,
        Arc::new(history),
        settings.conversation.system_prompt.clone(),
    ));

    let knowledge = Arc::new(KnowledgeService::new(settings.search.clone()));

    // Outcome events
    let event_bus = Arc::new(EventBus::new(settings.events.broadcast_capacity));
    let sink = build_sink(&settings.events, event_bus.clone());
    let emitter = EventEmitter::new(sink, EmitterConfig::from(&settings.events));

    let media = MediaStore::new(settings.media_path());
    tokio::fs::create_dir_all(media.root()).await?;

    let assistant = Arc::new(AssistantService::new(
        repository.clone(),
        classifier,
        conversation,
        knowledge,
        media,
        emitter,
        AssistantSettings {
            confidence_threshold: settings.classifier.confidence_threshold,
            search_top_k: settings.search.top_k,
            dermatologist_limit: settings.conversation.dermatologist_limit,
        },
    ));

    let jwt = match JwtManager::new(&settings.auth.jwt_secret) {
        Ok(jwt) => Some(Arc::new(jwt)),
        Err(e) => {
            warn!("{}; every request is anonymous and /api/events is closed", e);
            None
        }
    };

    let state = AppState {
        assistant,
        repository,
        jwt,
        event_bus,
    };

    let app = build_router(
        state,
        settings.media_path(),
        settings.server.body_limit_mb * 1024 * 1024,
    );

    // Server address
    let addr = SocketAddr::from((
        settings.server.host.parse::<std::net::IpAddr>()?,
        settings.server.port,
    ));

    info!("🎯 Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db_pool.close().await;
    info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
}

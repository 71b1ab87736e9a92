pub mod assistant_service;
pub mod classifier_service;
pub mod conversation;
pub mod event_bus;
pub mod event_emitter;
pub mod intent_router;
pub mod knowledge_service;
pub mod llm_service;
pub mod media_store;

pub use assistant_service::{AssistantService, AssistantSettings};
pub use classifier_service::{ImageClassifier, SkinClassifier};
pub use event_bus::EventBus;
pub use event_emitter::EventEmitter;
pub use knowledge_service::KnowledgeService;
pub use llm_service::LlmService;
pub use media_store::MediaStore;

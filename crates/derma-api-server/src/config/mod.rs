pub mod settings;

pub use settings::{
    AuthConfig, ClassifierConfig, ConversationConfig, DatabaseConfig, EventSinkKind,
    EventsConfig, KafkaConfig, LlmConfig, SearchConfig, ServerConfig, Settings, StorageConfig,
};

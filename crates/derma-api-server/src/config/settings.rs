use anyhow::Result;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub classifier: ClassifierConfig,
    pub llm: LlmConfig,
    pub search: SearchConfig,
    pub conversation: ConversationConfig,
    pub events: EventsConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_body_limit_mb")]
    pub body_limit_mb: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_max_size: u32,
    pub pool_timeout_seconds: u64,
    #[serde(default)]
    pub run_migrations: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ClassifierConfig {
    /// Base URL of the model server (TensorFlow Serving REST API)
    pub base_url: String,
    pub model_name: String,
    #[serde(default = "default_image_size")]
    pub image_size: u32,
    /// Percent; predictions below this are reported as low confidence
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    #[serde(default = "default_labels")]
    pub labels: Vec<String>,
    pub timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    /// Deployment / model name sent to the chat completion API
    pub deployment: String,
    /// Set for Azure OpenAI style endpoints; `None` means OpenAI-compatible `/v1/chat/completions`
    #[serde(default)]
    pub api_version: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    pub timeout_seconds: u64,
    pub max_tokens: usize,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SearchConfig {
    pub endpoint: String,
    pub index_name: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_search_api_version")]
    pub api_version: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    pub timeout_seconds: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ConversationConfig {
    /// Template with `{user_name}` and `{age}` placeholders
    pub system_prompt: String,
    pub history_ttl_seconds: u64,
    pub cleanup_interval_seconds: u64,
    #[serde(default = "default_dermatologist_limit")]
    pub dermatologist_limit: i64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventSinkKind {
    Broadcast,
    Kafka,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct EventsConfig {
    pub sink: EventSinkKind,
    pub topic: String,
    pub queue_capacity: usize,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub broadcast_capacity: usize,
    #[serde(default)]
    pub kafka: Option<KafkaConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct KafkaConfig {
    pub bootstrap_servers: String,
    #[serde(default = "default_security_protocol")]
    pub security_protocol: String,
    #[serde(default = "default_sasl_mechanism")]
    pub sasl_mechanism: String,
    #[serde(default)]
    pub sasl_username: Option<String>,
    #[serde(default)]
    pub sasl_password: Option<String>,
    #[serde(default = "default_delivery_timeout_ms")]
    pub delivery_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct StorageConfig {
    pub media_dir: String,
}

fn default_body_limit_mb() -> usize {
    20
}

fn default_image_size() -> u32 {
    180
}

fn default_confidence_threshold() -> f64 {
    65.0
}

fn default_temperature() -> f32 {
    0.7
}

fn default_search_api_version() -> String {
    "2023-11-01".to_string()
}

fn default_top_k() -> usize {
    3
}

fn default_dermatologist_limit() -> i64 {
    5
}

fn default_security_protocol() -> String {
    "SASL_SSL".to_string()
}

fn default_sasl_mechanism() -> String {
    "PLAIN".to_string()
}

fn default_delivery_timeout_ms() -> u64 {
    5_000
}

/// Output classes of the skin disease model, in model output order.
pub fn default_labels() -> Vec<String> {
    [
        "acne",
        "actinickeratosis",
        "alopeciaareata",
        "chickenpox",
        "cold sores",
        "eczema",
        "folliculitis",
        "hives",
        "impetigo",
        "melanoma",
        "psoriasis",
        "ringworm",
        "rosacea",
        "shingles",
        "uticaria",
        "vitiligo",
        "warts",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Settings {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config::builder()
            .add_source(File::with_name("config/settings").required(true))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parse settings from an inline TOML document (no environment overrides)
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from_str(toml, FileFormat::Toml))
            .build()?;

        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the services cannot run with
    pub fn validate(&self) -> Result<()> {
        let classifier = &self.classifier;
        if classifier.image_size == 0 {
            anyhow::bail!("classifier.image_size must be greater than zero");
        }
        if classifier.labels.is_empty() {
            anyhow::bail!("classifier.labels must not be empty");
        }
        if !(0.0..=100.0).contains(&classifier.confidence_threshold) {
            anyhow::bail!(
                "classifier.confidence_threshold must be a percentage, got {}",
                classifier.confidence_threshold
            );
        }
        Ok(())
    }

    pub fn media_path(&self) -> PathBuf {
        PathBuf::from(&self.storage.media_dir)
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::models::assistant::{KnowledgeSnippet, SuggestedAction};

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ConversationSession {
    pub session_id: Uuid,
    pub user_id: Option<i64>,
    pub user_name: String,
    pub age: Option<i32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewSession {
    pub session_id: Uuid,
    pub user_id: Option<i64>,
    pub user_name: String,
    pub age: Option<i32>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DiagnosisRecord {
    pub id: i64,
    pub session_id: Uuid,
    pub user_id: Option<i64>,
    /// Path of the stored image, relative to the media root
    pub image: String,
    pub symptoms: String,
    pub predicted_disease: String,
    pub confidence_score: f64,
    pub chatbot_response: String,
    pub user_name: String,
    pub age: Option<i32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDiagnosis {
    pub session_id: Uuid,
    pub user_id: Option<i64>,
    pub image: String,
    pub symptoms: String,
    pub predicted_disease: String,
    pub confidence_score: f64,
    pub chatbot_response: String,
    pub user_name: String,
    pub age: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatMetadata {
    pub sources: Vec<KnowledgeSnippet>,
    pub suggested_actions: Vec<SuggestedAction>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ChatRecord {
    pub id: i64,
    pub session_id: Uuid,
    pub user_id: Option<i64>,
    pub user_message: String,
    pub chatbot_response: String,
    pub metadata: Json<ChatMetadata>,
    pub user_name: String,
    pub age: Option<i32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewChat {
    pub session_id: Uuid,
    pub user_id: Option<i64>,
    pub user_message: String,
    pub chatbot_response: String,
    pub metadata: ChatMetadata,
    pub user_name: String,
    pub age: Option<i32>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Dermatologist {
    pub id: i64,
    pub name: String,
    pub specialization: String,
}

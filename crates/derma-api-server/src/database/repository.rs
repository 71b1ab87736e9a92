use super::models::{
    ChatRecord, ConversationSession, Dermatologist, DiagnosisRecord, NewChat, NewDiagnosis,
    NewSession,
};
use super::DbPool;
use anyhow::Result;
use sqlx::types::Json;
use tracing::debug;
use uuid::Uuid;

/// Persistence capabilities the assistant needs
#[async_trait::async_trait]
pub trait AssistantRepository: Send + Sync {
    /// Returns the session and `true` when it was created by this call
    async fn get_or_create_session(&self, new: &NewSession) -> Result<(ConversationSession, bool)>;

    async fn update_session_profile(
        &self,
        session_id: Uuid,
        user_name: &str,
        age: Option<i32>,
    ) -> Result<ConversationSession>;

    async fn create_diagnosis(&self, record: NewDiagnosis) -> Result<DiagnosisRecord>;

    async fn create_chat(&self, record: NewChat) -> Result<ChatRecord>;

    /// Case-insensitive substring match on specialization
    async fn find_dermatologists(
        &self,
        specialization: &str,
        limit: i64,
    ) -> Result<Vec<Dermatologist>>;

    async fn ping(&self) -> Result<()>;
}

pub struct Repository {
    pub pool: DbPool,
}

impl Repository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl AssistantRepository for Repository {
    async fn get_or_create_session(&self, new: &NewSession) -> Result<(ConversationSession, bool)> {
        let inserted = sqlx::query_as::<_, ConversationSession>(
            r#"INSERT INTO conversation_sessions (session_id, user_id, user_name, age)
               VALUES ($1, $2, $3, $4)
               ON CONFLICT (session_id) DO NOTHING
               RETURNING session_id, user_id, user_name, age, created_at"#,
        )
        .bind(new.session_id)
        .bind(new.user_id)
        .bind(&new.user_name)
        .bind(new.age)
        .fetch_optional(self.pool.get_pool())
        .await?;

        if let Some(session) = inserted {
            debug!("Created session {}", session.session_id);
            return Ok((session, true));
        }

        let existing = sqlx::query_as::<_, ConversationSession>(
            r#"SELECT session_id, user_id, user_name, age, created_at
               FROM conversation_sessions
               WHERE session_id = $1"#,
        )
        .bind(new.session_id)
        .fetch_one(self.pool.get_pool())
        .await?;

        Ok((existing, false))
    }

    async fn update_session_profile(
        &self,
        session_id: Uuid,
        user_name: &str,
        age: Option<i32>,
    ) -> Result<ConversationSession> {
        let session = sqlx::query_as::<_, ConversationSession>(
            r#"UPDATE conversation_sessions
               SET user_name = $2, age = $3
               WHERE session_id = $1
               RETURNING session_id, user_id, user_name, age, created_at"#,
        )
        .bind(session_id)
        .bind(user_name)
        .bind(age)
        .fetch_one(self.pool.get_pool())
        .await?;

        debug!("Updated profile of session {}", session_id);
        Ok(session)
    }

    async fn create_diagnosis(&self, record: NewDiagnosis) -> Result<DiagnosisRecord> {
        let created = sqlx::query_as::<_, DiagnosisRecord>(
            r#"INSERT INTO skin_disease_predictions
                (session_id, user_id, image, symptoms, predicted_disease,
                 confidence_score, chatbot_response, user_name, age)
               VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
               RETURNING id, session_id, user_id, image, symptoms, predicted_disease,
                         confidence_score, chatbot_response, user_name, age, created_at"#,
        )
        .bind(record.session_id)
        .bind(record.user_id)
        .bind(&record.image)
        .bind(&record.symptoms)
        .bind(&record.predicted_disease)
        .bind(record.confidence_score)
        .bind(&record.chatbot_response)
        .bind(&record.user_name)
        .bind(record.age)
        .fetch_one(self.pool.get_pool())
        .await?;

        Ok(created)
    }

    async fn create_chat(&self, record: NewChat) -> Result<ChatRecord> {
        let created = sqlx::query_as::<_, ChatRecord>(
            r#"INSERT INTO chat_history
                (session_id, user_id, user_message, chatbot_response, metadata, user_name, age)
               VALUES ($1, $2, $3, $4, $5, $6, $7)
               RETURNING id, session_id, user_id, user_message, chatbot_response,
                         metadata, user_name, age, created_at"#,
        )
        .bind(record.session_id)
        .bind(record.user_id)
        .bind(&record.user_message)
        .bind(&record.chatbot_response)
        .bind(Json(&record.metadata))
        .bind(&record.user_name)
        .bind(record.age)
        .fetch_one(self.pool.get_pool())
        .await?;

        Ok(created)
    }

    async fn find_dermatologists(
        &self,
        specialization: &str,
        limit: i64,
    ) -> Result<Vec<Dermatologist>> {
        let doctors = sqlx::query_as::<_, Dermatologist>(
            r#"SELECT id, name, specialization
               FROM dermatologists
               WHERE specialization ILIKE '%' || $1 || '%'
               ORDER BY id
               LIMIT $2"#,
        )
        .bind(specialization)
        .bind(limit)
        .fetch_all(self.pool.get_pool())
        .await?;

        debug!("Found {} dermatologists matching '{}'", doctors.len(), specialization);
        Ok(doctors)
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(self.pool.get_pool()).await?;
        Ok(())
    }
}

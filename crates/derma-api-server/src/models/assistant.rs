use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::database::models::{ChatRecord, DiagnosisRecord};

pub const ANONYMOUS_USER: &str = "Anonymous";

/// Next steps the client may offer the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    UploadNewImage,
    FindSpecialist,
    ExplainDiagnosis,
    TreatmentOptions,
    RetryUpload,
    MoreDetails,
    BookAppointment,
    LearnMore,
    EmergencyContact,
}

/// Ranked hit returned by the knowledge index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeSnippet {
    pub content: String,
    #[serde(default)]
    pub source: Option<String>,
}

// ===== REQUEST MODELS =====

/// Unified request after HTTP decoding (multipart or JSON)
#[derive(Debug, Clone)]
pub struct AssistantRequest {
    pub message: String,
    pub image: Option<Bytes>,
    pub user_name: String,
    pub age: Option<i32>,
    pub session_id: Option<String>,
    /// Authenticated user, if the caller presented a valid token
    pub user_id: Option<i64>,
}

impl Default for AssistantRequest {
    fn default() -> Self {
        Self {
            message: String::new(),
            image: None,
            user_name: ANONYMOUS_USER.to_string(),
            age: None,
            session_id: None,
            user_id: None,
        }
    }
}

impl AssistantRequest {
    pub fn has_image(&self) -> bool {
        self.image.as_ref().is_some_and(|img| !img.is_empty())
    }

    pub fn has_message(&self) -> bool {
        !self.message.trim().is_empty()
    }

    pub fn user_info(&self) -> UserInfo {
        UserInfo {
            user_name: self.user_name.clone(),
            age: self.age,
        }
    }
}

/// JSON body variant; `image` is base64 encoded
#[derive(Debug, Default, Deserialize)]
pub struct AssistantJsonBody {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub user_name: Option<String>,
    #[serde(default)]
    pub age: Option<serde_json::Value>,
    #[serde(default)]
    pub session_id: Option<String>,
}

// ===== RESPONSE MODELS =====

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserInfo {
    pub user_name: String,
    pub age: Option<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AssistantResponse {
    pub session_id: Uuid,
    pub user_info: UserInfo,
    #[serde(flatten)]
    pub outcome: Option<Outcome>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum Outcome {
    Diagnosis(DiagnosisOutcome),
    Chat(ChatOutcome),
    Redirect(RedirectOutcome),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum DiagnosisOutcome {
    LowConfidence {
        diagnosis: TentativeDiagnosis,
        message: String,
        suggested_actions: Vec<SuggestedAction>,
    },
    Success {
        diagnosis: DiagnosisRecord,
        message: String,
        suggested_actions: Vec<SuggestedAction>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TentativeDiagnosis {
    pub condition: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatOutcome {
    pub chat_response: ChatRecord,
    pub suggested_actions: Vec<SuggestedAction>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RedirectOutcome {
    pub text: String,
}

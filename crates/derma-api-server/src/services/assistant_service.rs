use anyhow::Result;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::database::models::{
    ChatMetadata, ConversationSession, Dermatologist, NewChat, NewDiagnosis, NewSession,
};
use crate::database::AssistantRepository;
use crate::models::assistant::{
    AssistantRequest, AssistantResponse, ChatOutcome, DiagnosisOutcome, KnowledgeSnippet, Outcome,
    RedirectOutcome, SuggestedAction, TentativeDiagnosis, ANONYMOUS_USER,
};
use crate::services::classifier_service::{ImageClassifier, Prediction};
use crate::services::conversation::ConversationEngine;
use crate::services::event_emitter::{EventEmitter, OutcomeEvent};
use crate::services::intent_router::{IntentMode, IntentRouter, REDIRECT_MESSAGE};
use crate::services::knowledge_service::KnowledgeRetriever;
use crate::services::media_store::MediaStore;
use crate::utils::error::ApiError;

/// Specializations are matched by substring, so this also finds "Pediatric Dermatology"
const DERMATOLOGY: &str = "dermatology";
const NO_CONTEXT: &str = "No specific database match.";

#[derive(Debug, Clone)]
pub struct AssistantSettings {
    /// Percent; strictly below is low confidence
    pub confidence_threshold: f64,
    pub search_top_k: usize,
    pub dermatologist_limit: i64,
}

impl Default for AssistantSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: 65.0,
            search_top_k: 3,
            dermatologist_limit: 5,
        }
    }
}

/// Entry point of `POST /api/assistant`.
///
/// Resolves the session, then handles exactly one of: image diagnosis, text chat,
/// or nothing (envelope only). At most one record is written and one event emitted.
pub struct AssistantService {
    repository: Arc<dyn AssistantRepository>,
    classifier: Option<Arc<dyn ImageClassifier>>,
    conversation: Arc<ConversationEngine>,
    knowledge: Arc<dyn KnowledgeRetriever>,
    media: MediaStore,
    emitter: EventEmitter,
    settings: AssistantSettings,
}

/// Parse a client supplied session id; anything unusable yields a fresh one
pub fn parse_session_id(raw: Option<&str>) -> Uuid {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        Some(value) => Uuid::parse_str(value).unwrap_or_else(|_| {
            debug!("Replacing malformed session id '{}'", value);
            Uuid::new_v4()
        }),
        None => Uuid::new_v4(),
    }
}

pub fn low_confidence_message(prediction: &Prediction) -> String {
    format!(
        "Possible {} detected ({:.1}%). Please upload a clearer photo or consult a doctor.",
        prediction.label, prediction.confidence
    )
}

pub fn analysis_prompt(prediction: &Prediction, symptoms: &str) -> String {
    format!(
        "The user has been diagnosed with {} ({:.1}% confidence). Symptoms: {}. Provide a professional medical summary, self-care tips, and when to see a doctor.",
        prediction.label, prediction.confidence, symptoms
    )
}

pub fn search_prompt(message: &str, sources: &[KnowledgeSnippet]) -> String {
    let context = if sources.is_empty() {
        NO_CONTEXT.to_string()
    } else {
        sources
            .iter()
            .map(|s| s.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "Question: {}\nMedical Context: {}\nAnswer based on context:",
        message, context
    )
}

pub fn specialists_response(doctors: &[Dermatologist]) -> (String, Vec<SuggestedAction>) {
    if doctors.is_empty() {
        return (
            "I couldn't find any dermatologists matching your criteria.".to_string(),
            Vec::new(),
        );
    }

    let list = doctors
        .iter()
        .map(|d| format!("- {} ({})", d.name, d.specialization))
        .collect::<Vec<_>>()
        .join("\n");

    (
        format!("Here are some specialists:\n{}", list),
        vec![SuggestedAction::BookAppointment],
    )
}

impl AssistantService {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        repository: Arc<dyn AssistantRepository>,
        classifier: Option<Arc<dyn ImageClassifier>>,
        conversation: Arc<ConversationEngine>,
        knowledge: Arc<dyn KnowledgeRetriever>,
        media: MediaStore,
        emitter: EventEmitter,
        settings: AssistantSettings,
    ) -> Self {
        Self {
            repository,
            classifier,
            conversation,
            knowledge,
            media,
            emitter,
            settings,
        }
    }

    pub fn classifier_loaded(&self) -> bool {
        self.classifier.is_some()
    }

    pub async fn handle(&self, request: AssistantRequest) -> Result<AssistantResponse, ApiError> {
        let session = self
            .resolve_session(&request)
            .await
            .map_err(|e| ApiError::InternalError(format!("{:#}", e)))?;

        let mut response = AssistantResponse {
            session_id: session.session_id,
            user_info: request.user_info(),
            outcome: None,
        };

        if request.has_image() {
            let outcome = self.process_image(&request, &session).await?;
            response.outcome = Some(Outcome::Diagnosis(outcome));
        } else if request.has_message() {
            // Text never travels with an image here, so there is no image context
            response.outcome = Some(self.process_text(&request, &session, false).await?);
        }

        Ok(response)
    }

    async fn resolve_session(&self, request: &AssistantRequest) -> Result<ConversationSession> {
        let session_id = parse_session_id(request.session_id.as_deref());

        let (session, created) = self
            .repository
            .get_or_create_session(&NewSession {
                session_id,
                user_id: request.user_id,
                user_name: request.user_name.clone(),
                age: request.age,
            })
            .await?;

        if created {
            info!("Started session {}", session_id);
            return Ok(session);
        }

        if request.user_name != ANONYMOUS_USER || request.age.is_some() {
            debug!("Updating profile of session {}", session_id);
            return self
                .repository
                .update_session_profile(session_id, &request.user_name, request.age)
                .await;
        }

        Ok(session)
    }

    async fn process_image(
        &self,
        request: &AssistantRequest,
        session: &ConversationSession,
    ) -> Result<DiagnosisOutcome, ApiError> {
        let Some(classifier) = &self.classifier else {
            warn!("Image submitted while the classifier is unavailable");
            return Err(ApiError::processing("Model not loaded"));
        };

        let image = request.image.clone().unwrap_or_default();
        let retry = |e: anyhow::Error| {
            error!("Image processing error: {:#}", e);
            ApiError::processing_with(format!("{:#}", e), vec![SuggestedAction::RetryUpload])
        };

        let prediction = classifier.classify(image.clone()).await.map_err(retry)?;

        if prediction.confidence < self.settings.confidence_threshold {
            info!(
                "Low confidence prediction {} ({:.1}%) for session {}",
                prediction.label, prediction.confidence, session.session_id
            );
            let diagnosis = TentativeDiagnosis {
                condition: prediction.label.clone(),
                confidence: prediction.confidence,
            };
            self.emitter.emit(OutcomeEvent::LowConfidence {
                session_id: session.session_id,
                user_id: request.user_id,
                diagnosis: diagnosis.clone(),
            });

            return Ok(DiagnosisOutcome::LowConfidence {
                diagnosis,
                message: low_confidence_message(&prediction),
                suggested_actions: vec![
                    SuggestedAction::UploadNewImage,
                    SuggestedAction::FindSpecialist,
                ],
            });
        }

        let analysis = self
            .conversation
            .invoke(
                &analysis_prompt(&prediction, &request.message),
                &request.user_name,
                request.age,
                session.session_id,
            )
            .await
            .map_err(retry)?;

        let image_path = self.media.save_diagnosis_image(&image).await.map_err(retry)?;

        let record = self
            .repository
            .create_diagnosis(NewDiagnosis {
                session_id: session.session_id,
                user_id: request.user_id,
                image: image_path,
                symptoms: request.message.clone(),
                predicted_disease: prediction.label.clone(),
                confidence_score: prediction.confidence,
                chatbot_response: analysis.clone(),
                user_name: request.user_name.clone(),
                age: request.age,
            })
            .await
            .map_err(retry)?;

        info!(
            "Diagnosis {} recorded for session {}",
            record.id, session.session_id
        );
        self.emitter
            .emit(OutcomeEvent::DiagnosisCreated(record.clone()));

        Ok(DiagnosisOutcome::Success {
            diagnosis: record,
            message: analysis,
            suggested_actions: vec![
                SuggestedAction::ExplainDiagnosis,
                SuggestedAction::TreatmentOptions,
            ],
        })
    }

    async fn process_text(
        &self,
        request: &AssistantRequest,
        session: &ConversationSession,
        has_image_context: bool,
    ) -> Result<Outcome, ApiError> {
        let message = request.message.as_str();

        if !has_image_context && !IntentRouter::is_healthcare_question(message) {
            return Ok(Outcome::Redirect(RedirectOutcome {
                text: REDIRECT_MESSAGE.to_string(),
            }));
        }

        self.answer_text(request, session, has_image_context)
            .await
            .map(Outcome::Chat)
            .map_err(|e| {
                error!("Text processing error: {:#}", e);
                ApiError::processing(format!("Chat processing failed: {:#}", e))
            })
    }

    async fn answer_text(
        &self,
        request: &AssistantRequest,
        session: &ConversationSession,
        has_image_context: bool,
    ) -> Result<ChatOutcome> {
        let message = request.message.as_str();
        let mode = IntentRouter::determine_mode(message, has_image_context);
        info!("Processing text for session {} as {:?}", session.session_id, mode);

        let mut sources = Vec::new();
        let (response_text, suggested_actions) = match mode {
            IntentMode::MedicalSearch => {
                sources = self
                    .knowledge
                    .search(message, self.settings.search_top_k)
                    .await
                    .unwrap_or_else(|e| {
                        warn!("Knowledge retrieval failed, continuing without context: {}", e);
                        Vec::new()
                    });

                let reply = self
                    .conversation
                    .invoke(
                        &search_prompt(message, &sources),
                        &request.user_name,
                        request.age,
                        session.session_id,
                    )
                    .await?;
                (reply, vec![SuggestedAction::MoreDetails])
            }
            IntentMode::DermatologistQuery => {
                let doctors = self
                    .repository
                    .find_dermatologists(DERMATOLOGY, self.settings.dermatologist_limit)
                    .await?;
                specialists_response(&doctors)
            }
            IntentMode::GeneralChat => {
                let reply = self
                    .conversation
                    .invoke(
                        message,
                        &request.user_name,
                        request.age,
                        session.session_id,
                    )
                    .await?;
                (reply, IntentRouter::followup_actions(message))
            }
        };

        let record = self
            .repository
            .create_chat(NewChat {
                session_id: session.session_id,
                user_id: request.user_id,
                user_message: message.to_string(),
                chatbot_response: response_text,
                metadata: ChatMetadata {
                    sources,
                    suggested_actions: suggested_actions.clone(),
                },
                user_name: request.user_name.clone(),
                age: request.age,
            })
            .await?;

        self.emitter.emit(OutcomeEvent::ChatCreated(record.clone()));

        Ok(ChatOutcome {
            chat_response: record,
            suggested_actions,
        })
    }
}

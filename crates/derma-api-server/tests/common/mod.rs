#![allow(dead_code)]

use anyhow::Result;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use chrono::Utc;
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use serde_json::Value;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;
use uuid::Uuid;

use derma_api_server::auth::JwtManager;
use derma_api_server::build_router;
use derma_api_server::database::{
    AssistantRepository, ChatRecord, ConversationSession, Dermatologist, DiagnosisRecord,
    NewChat, NewDiagnosis, NewSession,
};
use derma_api_server::models::assistant::KnowledgeSnippet;
use derma_api_server::models::chat::ChatMessage;
use bytes::Bytes;
use derma_api_server::services::classifier_service::{
    ImageClassifier, ImageTensor, ModelBackend, Prediction,
};
use derma_api_server::services::conversation::{
    ConversationEngine, LlmProvider, MemoryHistoryStore,
};
use derma_api_server::services::event_emitter::{BroadcastSink, EmitterConfig, EventSink};
use derma_api_server::services::knowledge_service::KnowledgeRetriever;
use derma_api_server::services::{
    AssistantService, AssistantSettings, EventBus, EventEmitter, MediaStore, SkinClassifier,
};
use derma_api_server::state::AppState;

pub const JWT_SECRET: &str = "integration-secret";
pub const LABELS: [&str; 3] = ["acne", "eczema", "hives"];

// ===== REPOSITORY =====

#[derive(Default)]
pub struct RepoData {
    pub sessions: Vec<ConversationSession>,
    pub diagnoses: Vec<DiagnosisRecord>,
    pub chats: Vec<ChatRecord>,
    pub dermatologists: Vec<Dermatologist>,
}

/// Postgres stand-in with the same observable semantics
#[derive(Default)]
pub struct InMemoryRepository {
    pub data: Mutex<RepoData>,
    pub unavailable: bool,
}

impl InMemoryRepository {
    pub fn with_dermatologists(doctors: &[(&str, &str)]) -> Self {
        let repo = Self::default();
        repo.data.lock().unwrap().dermatologists = doctors
            .iter()
            .enumerate()
            .map(|(i, (name, specialization))| Dermatologist {
                id: i as i64 + 1,
                name: name.to_string(),
                specialization: specialization.to_string(),
            })
            .collect();
        repo
    }

    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Default::default()
        }
    }

    fn check(&self) -> Result<()> {
        if self.unavailable {
            anyhow::bail!("connection refused");
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl AssistantRepository for InMemoryRepository {
    async fn get_or_create_session(&self, new: &NewSession) -> Result<(ConversationSession, bool)> {
        self.check()?;
        let mut data = self.data.lock().unwrap();
        if let Some(existing) = data
            .sessions
            .iter()
            .find(|s| s.session_id == new.session_id)
        {
            return Ok((existing.clone(), false));
        }

        let session = ConversationSession {
            session_id: new.session_id,
            user_id: new.user_id,
            user_name: new.user_name.clone(),
            age: new.age,
            created_at: Utc::now(),
        };
        data.sessions.push(session.clone());
        Ok((session, true))
    }

    async fn update_session_profile(
        &self,
        session_id: Uuid,
        user_name: &str,
        age: Option<i32>,
    ) -> Result<ConversationSession> {
        self.check()?;
        let mut data = self.data.lock().unwrap();
        let session = data
            .sessions
            .iter_mut()
            .find(|s| s.session_id == session_id)
            .ok_or_else(|| anyhow::anyhow!("session not found"))?;
        session.user_name = user_name.to_string();
        session.age = age;
        Ok(session.clone())
    }

    async fn create_diagnosis(&self, record: NewDiagnosis) -> Result<DiagnosisRecord> {
        self.check()?;
        let mut data = self.data.lock().unwrap();
        let created = DiagnosisRecord {
            id: data.diagnoses.len() as i64 + 1,
            session_id: record.session_id,
            user_id: record.user_id,
            image: record.image,
            symptoms: record.symptoms,
            predicted_disease: record.predicted_disease,
            confidence_score: record.confidence_score,
            chatbot_response: record.chatbot_response,
            user_name: record.user_name,
            age: record.age,
            created_at: Utc::now(),
        };
        data.diagnoses.push(created.clone());
        Ok(created)
    }

    async fn create_chat(&self, record: NewChat) -> Result<ChatRecord> {
        self.check()?;
        let mut data = self.data.lock().unwrap();
        let created = ChatRecord {
            id: data.chats.len() as i64 + 1,
            session_id: record.session_id,
            user_id: record.user_id,
            user_message: record.user_message,
            chatbot_response: record.chatbot_response,
            metadata: sqlx::types::Json(record.metadata),
            user_name: record.user_name,
            age: record.age,
            created_at: Utc::now(),
        };
        data.chats.push(created.clone());
        Ok(created)
    }

    async fn find_dermatologists(
        &self,
        specialization: &str,
        limit: i64,
    ) -> Result<Vec<Dermatologist>> {
        self.check()?;
        let needle = specialization.to_lowercase();
        Ok(self
            .data
            .lock()
            .unwrap()
            .dermatologists
            .iter()
            .filter(|d| d.specialization.to_lowercase().contains(&needle))
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn ping(&self) -> Result<()> {
        self.check()
    }
}

// ===== EXTERNAL SERVICES =====

/// Records every message list and answers "reply N"
#[derive(Default)]
pub struct RecordingLlm {
    pub calls: Mutex<Vec<Vec<ChatMessage>>>,
    pub fail: bool,
}

impl RecordingLlm {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn last_user_input(&self) -> Option<String> {
        self.calls
            .lock()
            .unwrap()
            .last()
            .and_then(|messages| messages.last())
            .map(|m| m.content.clone())
    }
}

#[async_trait::async_trait]
impl LlmProvider for RecordingLlm {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<String> {
        if self.fail {
            anyhow::bail!("upstream timeout");
        }
        let mut calls = self.calls.lock().unwrap();
        calls.push(messages.to_vec());
        Ok(format!("reply {}", calls.len()))
    }
}

#[derive(Default)]
pub struct FakeKnowledge {
    pub hits: Vec<KnowledgeSnippet>,
    pub fail: bool,
}

#[async_trait::async_trait]
impl KnowledgeRetriever for FakeKnowledge {
    async fn search(&self, _query: &str, top: usize) -> Result<Vec<KnowledgeSnippet>> {
        if self.fail {
            anyhow::bail!("search unavailable");
        }
        Ok(self.hits.iter().take(top).cloned().collect())
    }
}

/// Returns the same probabilities for every image, as logits
pub struct FixedBackend(pub Vec<f32>);

impl FixedBackend {
    pub fn probabilities(probs: &[f32]) -> Self {
        Self(probs.iter().map(|p| p.ln()).collect())
    }
}

#[async_trait::async_trait]
impl ModelBackend for FixedBackend {
    async fn predict(&self, _input: &ImageTensor) -> Result<Vec<f32>> {
        Ok(self.0.clone())
    }
}

pub fn classifier(probs: &[f32]) -> Arc<dyn ImageClassifier> {
    Arc::new(SkinClassifier::new(
        Arc::new(FixedBackend::probabilities(probs)),
        LABELS.iter().map(|s| s.to_string()).collect(),
        16,
    ))
}

/// Classifier that skips the model entirely and reports a fixed prediction
pub struct FixedPrediction(pub Prediction);

#[async_trait::async_trait]
impl ImageClassifier for FixedPrediction {
    async fn classify(&self, _image: Bytes) -> Result<Prediction> {
        Ok(self.0.clone())
    }
}

/// Sink whose transport always fails
#[derive(Default)]
pub struct FailingSink {
    pub attempts: AtomicUsize,
}

#[async_trait::async_trait]
impl EventSink for FailingSink {
    async fn publish(&self, _topic: &str, _key: &str, _payload: &Value) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        anyhow::bail!("broker unreachable")
    }
}

// ===== APP =====

pub struct TestApp {
    pub router: Router,
    pub repo: Arc<InMemoryRepository>,
    pub llm: Arc<RecordingLlm>,
    pub history: Arc<MemoryHistoryStore>,
    pub event_bus: Arc<EventBus>,
    pub jwt: Arc<JwtManager>,
    pub media_dir: TempDir,
}

pub struct TestAppBuilder {
    repo: InMemoryRepository,
    llm: RecordingLlm,
    knowledge: FakeKnowledge,
    classifier: Option<Arc<dyn ImageClassifier>>,
    sink: Option<Arc<dyn EventSink>>,
    auth_enabled: bool,
}

impl TestAppBuilder {
    pub fn new() -> Self {
        Self {
            repo: InMemoryRepository::default(),
            llm: RecordingLlm::default(),
            knowledge: FakeKnowledge::default(),
            classifier: None,
            sink: None,
            auth_enabled: true,
        }
    }

    pub fn repo(mut self, repo: InMemoryRepository) -> Self {
        self.repo = repo;
        self
    }

    pub fn llm(mut self, llm: RecordingLlm) -> Self {
        self.llm = llm;
        self
    }

    pub fn knowledge(mut self, knowledge: FakeKnowledge) -> Self {
        self.knowledge = knowledge;
        self
    }

    pub fn classifier(mut self, probs: &[f32]) -> Self {
        self.classifier = Some(classifier(probs));
        self
    }

    pub fn prediction(mut self, label: &str, confidence: f64) -> Self {
        self.classifier = Some(Arc::new(FixedPrediction(Prediction {
            label: label.to_string(),
            confidence,
        })));
        self
    }

    /// As if no JWT secret were configured
    pub fn without_auth(mut self) -> Self {
        self.auth_enabled = false;
        self
    }

    pub fn sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn build(self) -> TestApp {
        let media_dir = tempfile::tempdir().unwrap();
        let repo = Arc::new(self.repo);
        let llm = Arc::new(self.llm);
        let history = Arc::new(MemoryHistoryStore::new(Duration::from_secs(3600)));
        let event_bus = Arc::new(EventBus::new(16));
        let jwt = Arc::new(JwtManager::new(JWT_SECRET).unwrap());

        let sink = self
            .sink
            .unwrap_or_else(|| Arc::new(BroadcastSink::new(event_bus.clone())));
        let emitter = EventEmitter::new(
            sink,
            EmitterConfig {
                topic: "assistant-outcomes".to_string(),
                queue_capacity: 16,
                max_retries: 2,
                retry_backoff: Duration::from_millis(1),
            },
        );

        let conversation = Arc::new(ConversationEngine::new(
            llm.clone(),
            history.clone(),
            "You are DermatologyAI. Name: {user_name}. Age: {age}.".to_string(),
        ));

        let assistant = Arc::new(AssistantService::new(
            repo.clone(),
            self.classifier,
            conversation,
            Arc::new(self.knowledge),
            MediaStore::new(media_dir.path()),
            emitter,
            AssistantSettings::default(),
        ));

        let state = AppState {
            assistant,
            repository: repo.clone(),
            jwt: self.auth_enabled.then(|| jwt.clone()),
            event_bus: event_bus.clone(),
        };

        TestApp {
            router: build_router(state, media_dir.path(), 10 * 1024 * 1024),
            repo,
            llm,
            history,
            event_bus,
            jwt,
            media_dir,
        }
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    pub async fn post_json(&self, body: Value) -> (StatusCode, Value) {
        self.send(json_request(body)).await
    }

    pub async fn post_json_as(&self, user_id: i64, body: Value) -> (StatusCode, Value) {
        let token = self.jwt.generate_token(user_id, "patient", 300).unwrap();
        let mut request = json_request(body);
        request.headers_mut().insert(
            "authorization",
            format!("Bearer {}", token).parse().unwrap(),
        );
        self.send(request).await
    }
}

pub fn json_request(body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/api/assistant")
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub const BOUNDARY: &str = "----derma-test-boundary";

/// Hand-built multipart body: text fields plus an optional `image` file part
pub fn multipart_request(fields: &[(&str, &str)], image: Option<&[u8]>) -> Request<Body> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n",
                BOUNDARY, name, value
            )
            .as_bytes(),
        );
    }
    if let Some(image) = image {
        body.extend_from_slice(
            format!(
                "--{}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"skin.png\"\r\nContent-Type: image/png\r\n\r\n",
                BOUNDARY
            )
            .as_bytes(),
        );
        body.extend_from_slice(image);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    Request::builder()
        .method("POST")
        .uri("/api/assistant")
        .header(
            "content-type",
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap()
}

pub fn png_bytes() -> Vec<u8> {
    let img = ImageBuffer::from_pixel(24, 24, Rgb([180u8, 90, 80]));
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

use axum::{
    extract::{FromRequest, Multipart, Request, State},
    http::header::CONTENT_TYPE,
    Json,
};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use tracing::info;

use crate::auth::OptionalUser;
use crate::models::assistant::{
    AssistantJsonBody, AssistantRequest, AssistantResponse, ANONYMOUS_USER,
};
use crate::state::AppState;
use crate::utils::error::ApiError;

/// `POST /api/assistant` body, from either `multipart/form-data` or JSON
pub struct AssistantPayload(pub AssistantRequest);

impl<S> FromRequest<S> for AssistantPayload
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();

        if content_type.starts_with("multipart/form-data") {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            return read_multipart(multipart).await.map(AssistantPayload);
        }

        if content_type.starts_with("application/json") {
            let Json(body) = Json::<AssistantJsonBody>::from_request(req, state)
                .await
                .map_err(|e| ApiError::BadRequest(e.body_text()))?;
            return from_json(body).map(AssistantPayload);
        }

        if content_type.is_empty() {
            return Ok(AssistantPayload(AssistantRequest::default()));
        }

        Err(ApiError::BadRequest(format!(
            "Unsupported content type: {}",
            content_type
        )))
    }
}

/// Blank means "not provided"; anything else must be an integer
pub fn parse_age(raw: &str) -> Result<Option<i32>, ApiError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse()
        .map(Some)
        .map_err(|_| ApiError::BadRequest("age must be an integer".to_string()))
}

fn user_name_or_default(raw: Option<String>) -> String {
    raw.map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| ANONYMOUS_USER.to_string())
}

async fn read_multipart(mut multipart: Multipart) -> Result<AssistantRequest, ApiError> {
    let mut request = AssistantRequest::default();
    let mut user_name = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Failed to read field: {}", e)))?
    {
        let field_name = field.name().unwrap_or("").to_string();

        match field_name.as_str() {
            "image" => {
                request.image = Some(
                    field
                        .bytes()
                        .await
                        .map_err(|e| ApiError::BadRequest(format!("Failed to read image: {}", e)))?,
                );
            }
            "message" | "user_name" | "age" | "session_id" => {
                let text = field.text().await.map_err(|e| {
                    ApiError::BadRequest(format!("Invalid {}: {}", field_name, e))
                })?;

                match field_name.as_str() {
                    "message" => request.message = text,
                    "user_name" => user_name = Some(text),
                    "age" => request.age = parse_age(&text)?,
                    _ => request.session_id = Some(text),
                }
            }
            _ => {}
        }
    }

    request.user_name = user_name_or_default(user_name);
    Ok(request)
}

fn from_json(body: AssistantJsonBody) -> Result<AssistantRequest, ApiError> {
    let image = match body.image.as_deref().map(str::trim) {
        Some(encoded) if !encoded.is_empty() => {
            // Accept data URLs as produced by browsers
            let encoded = encoded
                .split_once(";base64,")
                .map(|(_, data)| data)
                .unwrap_or(encoded);
            let decoded = STANDARD
                .decode(encoded)
                .map_err(|e| ApiError::BadRequest(format!("Invalid base64 image: {}", e)))?;
            Some(Bytes::from(decoded))
        }
        _ => None,
    };

    let age = match body.age {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::Number(n)) => Some(
            n.as_i64()
                .and_then(|v| i32::try_from(v).ok())
                .ok_or_else(|| ApiError::BadRequest("age must be an integer".to_string()))?,
        ),
        Some(serde_json::Value::String(s)) => parse_age(&s)?,
        Some(_) => return Err(ApiError::BadRequest("age must be an integer".to_string())),
    };

    Ok(AssistantRequest {
        message: body.message.unwrap_or_default(),
        image,
        user_name: user_name_or_default(body.user_name),
        age,
        session_id: body.session_id,
        user_id: None,
    })
}

pub async fn assistant_handler(
    State(state): State<AppState>,
    OptionalUser(user_id): OptionalUser,
    AssistantPayload(mut request): AssistantPayload,
) -> Result<Json<AssistantResponse>, ApiError> {
    request.user_id = user_id;

    info!(
        "Assistant request: session={:?}, user={:?}, has_image={}, message_len={}",
        request.session_id,
        request.user_id,
        request.has_image(),
        request.message.len()
    );

    let response = state.assistant.handle(request).await?;
    Ok(Json(response))
}

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::models::assistant::SuggestedAction;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Handled failure inside image/text processing, reported to the client as-is
    #[error("{message}")]
    Processing {
        message: String,
        suggested_actions: Vec<SuggestedAction>,
    },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Server error: {0}")]
    InternalError(String),
}

impl ApiError {
    pub fn processing(message: impl Into<String>) -> Self {
        ApiError::Processing {
            message: message.into(),
            suggested_actions: Vec::new(),
        }
    }

    pub fn processing_with(message: impl Into<String>, actions: Vec<SuggestedAction>) -> Self {
        ApiError::Processing {
            message: message.into(),
            suggested_actions: actions,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) | ApiError::Processing { .. } => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    kind: &'static str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    suggested_actions: Vec<SuggestedAction>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let error = self.to_string();

        let (kind, suggested_actions) = match self {
            ApiError::BadRequest(_) => {
                tracing::warn!("{}", error);
                ("BadRequest", Vec::new())
            }
            ApiError::Processing {
                suggested_actions, ..
            } => {
                tracing::warn!("Processing error: {}", error);
                ("ProcessingError", suggested_actions)
            }
            ApiError::Unauthorized(_) => {
                tracing::warn!("{}", error);
                ("Unauthorized", Vec::new())
            }
            ApiError::InternalError(_) => {
                tracing::error!("{}", error);
                ("InternalError", Vec::new())
            }
        };

        let body = Json(ErrorResponse {
            error,
            kind,
            suggested_actions,
        });

        (status, body).into_response()
    }
}

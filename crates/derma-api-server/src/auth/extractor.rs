use axum::extract::{FromRef, FromRequestParts};
use axum::http::{header::AUTHORIZATION, request::Parts};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::debug;

use super::jwt::JwtManager;
use crate::utils::error::ApiError;

/// `None` when no JWT secret is configured; every token is then ignored
pub type JwtKeys = Option<Arc<JwtManager>>;

fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
}

/// Caller identity from an optional `Authorization: Bearer` token.
/// Missing or invalid tokens never reject the request; the caller is anonymous.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OptionalUser(pub Option<i64>);

impl<S> FromRequestParts<S> for OptionalUser
where
    JwtKeys: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Some(token) = bearer_token(parts) else {
            return Ok(OptionalUser(None));
        };

        let Some(jwt) = JwtKeys::from_ref(state) else {
            debug!("Ignoring bearer token, authentication is disabled");
            return Ok(OptionalUser(None));
        };

        match jwt.validate_token(token) {
            Ok(claims) => Ok(OptionalUser(Some(claims.user_id))),
            Err(e) => {
                debug!("Ignoring invalid bearer token: {}", e);
                Ok(OptionalUser(None))
            }
        }
    }
}

/// Caller identity that must be present; anything else is a 401
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser(pub i64);

impl<S> FromRequestParts<S> for AuthUser
where
    JwtKeys: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let jwt = JwtKeys::from_ref(state)
            .ok_or_else(|| ApiError::Unauthorized("authentication is disabled".to_string()))?;

        let token = bearer_token(parts)
            .ok_or_else(|| ApiError::Unauthorized("missing bearer token".to_string()))?;

        jwt.validate_token(token)
            .map(|claims| AuthUser(claims.user_id))
            .map_err(|e| ApiError::Unauthorized(format!("invalid token: {}", e)))
    }
}

//! Token validation for WebSocket and REST clients.
//!
//! Tokens are HS256 JWTs issued by the user service. The authenticated user
//! id is the `user_id` claim, or `sub` when `user_id` is absent.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use huddle_shared::constants::{CLOSE_TOKEN_EXPIRED, CLOSE_TOKEN_INVALID};
use huddle_shared::UserId;

use crate::api::AppState;
use crate::error::ServerError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    pub exp: i64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Token expired")]
    Expired,

    #[error("Token invalid")]
    Invalid,

    #[error("Token carries no user id")]
    MissingUser,
}

impl AuthError {
    /// WebSocket close code reported to the client.
    pub fn close_code(&self) -> u16 {
        match self {
            AuthError::Expired => CLOSE_TOKEN_EXPIRED,
            AuthError::Invalid | AuthError::MissingUser => CLOSE_TOKEN_INVALID,
        }
    }
}

/// Resolves a bearer token to a user id.
pub trait TokenValidator: Send + Sync {
    fn validate(&self, token: &str) -> Result<UserId, AuthError>;
}

/// HS256 validator backed by a shared secret.
pub struct JwtValidator {
    key: DecodingKey,
    validation: Validation,
}

impl JwtValidator {
    pub fn new(secret: &[u8]) -> Self {
        Self {
            key: DecodingKey::from_secret(secret),
            validation: Validation::new(Algorithm::HS256),
        }
    }
}

impl TokenValidator for JwtValidator {
    fn validate(&self, token: &str) -> Result<UserId, AuthError> {
        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::Invalid,
            }
        })?;
        data.claims
            .user_id
            .or(data.claims.sub)
            .filter(|id| !id.trim().is_empty())
            .map(UserId)
            .ok_or(AuthError::MissingUser)
    }
}

/// Issue an HS256 token for `user` that expires after `ttl_secs`.
/// Used by tests and local tooling; production tokens come from the user
/// service.
pub fn issue_token(
    secret: &[u8],
    user: &UserId,
    ttl_secs: i64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = Claims {
        user_id: Some(user.to_string()),
        sub: Some(user.to_string()),
        email: None,
        role: None,
        exp: chrono::Utc::now().timestamp() + ttl_secs,
    };
    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret))
}

/// Extractor for the user behind an `Authorization: Bearer <token>` header.
pub struct AuthUser(pub UserId);

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ServerError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ServerError::Unauthorized("missing authorization header".into()))?;
        let token = header
            .strip_prefix("Bearer ")
            .ok_or_else(|| ServerError::Unauthorized("expected a bearer token".into()))?;

        state
            .validator
            .validate(token.trim())
            .map(AuthUser)
            .map_err(|e| ServerError::Unauthorized(e.to_string()))
    }
}

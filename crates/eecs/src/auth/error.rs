//! Authentication errors.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::WWW_AUTHENTICATE},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use super::NotAuthenticatedFault;

/// Authentication errors.
///
/// Every variant is terminal for the request; nothing is retried.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Bad username/password, or any token, claim or user-resolution failure.
    /// The cause is never revealed to the client.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// No token was supplied at all.
    #[error("not authenticated")]
    NotAuthenticated(NotAuthenticatedFault),

    /// The user store could not be queried.
    #[error("user store unavailable: {0}")]
    StoreUnavailable(String),

    /// Internal error.
    #[error("internal auth error: {0}")]
    Internal(String),
}

impl AuthError {
    pub fn is_invalid_credentials(&self) -> bool {
        matches!(self, AuthError::InvalidCredentials)
    }

    pub fn is_not_authenticated(&self) -> bool {
        matches!(self, AuthError::NotAuthenticated(_))
    }
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct AuthErrorResponse {
    pub detail: String,
    pub code: &'static str,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, detail, code, challenge) = match self {
            AuthError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                "Invalid credentials".to_string(),
                "invalid_credentials",
                true,
            ),
            AuthError::NotAuthenticated(NotAuthenticatedFault::Challenge) => (
                StatusCode::UNAUTHORIZED,
                "Not authenticated".to_string(),
                "not_authenticated",
                true,
            ),
            AuthError::NotAuthenticated(NotAuthenticatedFault::Custom { status, detail }) => {
                (status, detail, "not_authenticated", false)
            }
            AuthError::StoreUnavailable(_) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Authentication service unavailable".to_string(),
                "store_unavailable",
                false,
            ),
            AuthError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
                "internal_error",
                false,
            ),
        };

        let mut response = (status, Json(AuthErrorResponse { detail, code })).into_response();
        if challenge {
            response
                .headers_mut()
                .insert(WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
        }
        response
    }
}

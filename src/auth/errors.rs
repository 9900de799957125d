//! Typed authentication errors and their single HTTP mapping.
//!
//! Every failure a client can see carries a machine-readable kind plus a
//! human message, serialized as `{error, message, status, timestamp}`.
//! Nothing here ever exposes internals or stack traces.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::error;

use crate::jwt::JwtError;

/// Domain error taxonomy for the authentication subsystem.
#[derive(Debug)]
pub enum AuthError {
    /// Signup uniqueness conflict (username/email/phone)
    DuplicateResource(String),
    /// Unknown identity, email, or token
    ResourceNotFound(String),
    /// Wrong password at login
    InvalidCredentials,
    /// Account is still pending email verification (or deactivated)
    AccountNotVerified,
    /// Verification requested for an already-active account
    AlreadyVerified,
    /// Token is malformed, of the wrong type, or unknown to the store
    InvalidToken,
    /// Record exists but is not in the state the transition requires
    InvalidTokenState,
    /// JWT `exp` passed, store TTL lapsed, or credential epoch revoked
    TokenExpired,
    /// New password fails the policy
    WeakPassword(String),
    /// A protected endpoint was called without an authenticated context
    NotAuthenticated,
    /// The authenticated context lacks a required role tag
    AccessDenied,
    /// Unexpected internal failure; details are logged, never returned
    Internal,
}

impl AuthError {
    /// Machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::DuplicateResource(_) => "DuplicateResource",
            Self::ResourceNotFound(_) => "ResourceNotFound",
            Self::InvalidCredentials => "InvalidCredentials",
            Self::AccountNotVerified => "AccountNotVerified",
            Self::AlreadyVerified => "AlreadyVerified",
            Self::InvalidToken => "InvalidToken",
            Self::InvalidTokenState => "InvalidTokenState",
            Self::TokenExpired => "TokenExpired",
            Self::WeakPassword(_) => "WeakPassword",
            Self::NotAuthenticated => "NotAuthenticated",
            Self::AccessDenied => "AccessDenied",
            Self::Internal => "AuthProcessingFailed",
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            Self::DuplicateResource(_) | Self::AlreadyVerified => StatusCode::CONFLICT,
            Self::ResourceNotFound(_) => StatusCode::NOT_FOUND,
            Self::InvalidCredentials | Self::AccountNotVerified | Self::NotAuthenticated => {
                StatusCode::UNAUTHORIZED
            }
            Self::AccessDenied => StatusCode::FORBIDDEN,
            Self::InvalidToken
            | Self::InvalidTokenState
            | Self::TokenExpired
            | Self::WeakPassword(_) => StatusCode::BAD_REQUEST,
            Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn message(&self) -> String {
        match self {
            Self::DuplicateResource(what) => format!("{} is already taken", what),
            Self::ResourceNotFound(what) => format!("{} not found", what),
            Self::InvalidCredentials => "Invalid credentials".to_string(),
            Self::AccountNotVerified => "Account is not verified".to_string(),
            Self::AlreadyVerified => "Account is already verified".to_string(),
            Self::InvalidToken => "Invalid token".to_string(),
            Self::InvalidTokenState => "Token is not in a valid state for this step".to_string(),
            Self::TokenExpired => "Token has expired".to_string(),
            Self::WeakPassword(why) => why.clone(),
            Self::NotAuthenticated => "Authentication required".to_string(),
            Self::AccessDenied => "Insufficient permissions".to_string(),
            Self::Internal => "Authentication processing failed".to_string(),
        }
    }

    /// Log the underlying cause and return an opaque internal error.
    pub fn internal(context: &str, e: impl std::fmt::Display) -> Self {
        error!("{}: {}", context, e);
        Self::Internal
    }
}

/// Wire shape of every error response.
#[derive(Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    pub status: u16,
    pub timestamp: u64,
}

/// Build the structured error response used by both the orchestrator
/// endpoints and the request authenticator.
pub fn error_response(status: StatusCode, kind: &'static str, message: String) -> Response {
    (
        status,
        Json(ErrorBody {
            error: kind,
            message,
            status: status.as_u16(),
            timestamp: unix_now(),
        }),
    )
        .into_response()
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        error_response(self.status_code(), self.kind(), self.message())
    }
}

impl std::fmt::Display for AuthError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind(), self.message())
    }
}

impl std::error::Error for AuthError {}

impl From<sqlx::Error> for AuthError {
    fn from(e: sqlx::Error) -> Self {
        AuthError::internal("Database error", e)
    }
}

impl From<JwtError> for AuthError {
    fn from(e: JwtError) -> Self {
        match e {
            JwtError::Malformed | JwtError::WrongTokenType => AuthError::InvalidToken,
            JwtError::Expired => AuthError::TokenExpired,
            JwtError::Encoding(_) | JwtError::TimeError => {
                AuthError::internal("Token codec error", e)
            }
        }
    }
}

/// Extension trait for concise internal-error mapping on Results.
pub trait ResultExt<T> {
    fn internal_err(self, context: &str) -> Result<T, AuthError>;
}

impl<T, E: std::fmt::Display> ResultExt<T> for Result<T, E> {
    fn internal_err(self, context: &str) -> Result<T, AuthError> {
        self.map_err(|e| AuthError::internal(context, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_strings_are_stable() {
        assert_eq!(AuthError::InvalidToken.kind(), "InvalidToken");
        assert_eq!(AuthError::TokenExpired.kind(), "TokenExpired");
        assert_eq!(AuthError::Internal.kind(), "AuthProcessingFailed");
        assert_eq!(
            AuthError::DuplicateResource("username".into()).kind(),
            "DuplicateResource"
        );
    }

    #[test]
    fn test_jwt_error_mapping() {
        assert!(matches!(
            AuthError::from(JwtError::Malformed),
            AuthError::InvalidToken
        ));
        assert!(matches!(
            AuthError::from(JwtError::Expired),
            AuthError::TokenExpired
        ));
        assert!(matches!(
            AuthError::from(JwtError::WrongTokenType),
            AuthError::InvalidToken
        ));
    }
}

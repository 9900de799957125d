//! Per-request authentication.
//!
//! Runs once for every inbound request, before the handler. A request
//! without a bearer token passes through unauthenticated; downstream
//! extractors decide whether that is acceptable. Expired tokens are
//! rejected before any identity lookup, and a failure never leaves a
//! partially populated context behind.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, StatusCode, header, request::Parts},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use super::errors::{AuthError, error_response};
use crate::db::{Database, UserStatus};
use crate::jwt::{JwtConfig, JwtError};

/// Authenticated request context published for downstream handlers.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user_id: i64,
    pub uuid: String,
    pub username: String,
    pub roles: Vec<String>,
}

impl AuthContext {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.iter().any(|r| r == role)
    }
}

/// State required by the request authenticator.
#[derive(Clone)]
pub struct AuthState {
    pub db: Database,
    pub jwt: Arc<JwtConfig>,
}

/// Extract the bearer token from the Authorization header, if any.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    if token.is_empty() { None } else { Some(token) }
}

/// Request authenticator middleware.
///
/// Ordering matters: the expiry probe runs before the full decode and
/// before any identity lookup, so expired tokens are rejected cheaply and
/// `TokenExpired` is distinguishable from `InvalidToken`.
pub async fn authenticate(
    State(state): State<AuthState>,
    mut req: Request,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(req.headers()).map(str::to_string) else {
        // Unauthenticated pass-through; protected handlers reject via the
        // CurrentUser extractor
        return next.run(req).await;
    };

    match state.jwt.is_expired(&token) {
        Ok(false) => {}
        Ok(true) => {
            return error_response(
                StatusCode::UNAUTHORIZED,
                "TokenExpired",
                "Session token has expired".to_string(),
            );
        }
        Err(JwtError::Malformed) => {
            return error_response(
                StatusCode::UNAUTHORIZED,
                "InvalidToken",
                "Invalid session token".to_string(),
            );
        }
        Err(e) => {
            tracing::error!(error = %e, "Token expiry probe failed");
            return auth_processing_failed();
        }
    }

    // Full validation: signature, expiry again (clock may have advanced),
    // and the typ claim so verification tokens never authenticate requests
    let claims = match state.jwt.decode_session(&token) {
        Ok(claims) => claims,
        Err(JwtError::Expired) => {
            return error_response(
                StatusCode::UNAUTHORIZED,
                "TokenExpired",
                "Session token has expired".to_string(),
            );
        }
        Err(JwtError::Malformed) | Err(JwtError::WrongTokenType) => {
            return error_response(
                StatusCode::UNAUTHORIZED,
                "InvalidToken",
                "Invalid session token".to_string(),
            );
        }
        Err(e) => {
            tracing::error!(error = %e, "Token decode failed");
            return auth_processing_failed();
        }
    };

    let user = match state.db.users().get_by_username(&claims.sub).await {
        Ok(Some(user)) => user,
        Ok(None) => {
            return error_response(
                StatusCode::UNAUTHORIZED,
                "InvalidToken",
                "Invalid session token".to_string(),
            );
        }
        Err(e) => {
            tracing::error!(error = %e, "Identity lookup failed");
            return auth_processing_failed();
        }
    };

    if user.status != UserStatus::Active {
        return error_response(
            StatusCode::UNAUTHORIZED,
            "AccountNotVerified",
            "Account is not verified".to_string(),
        );
    }

    // A password reset bumps the epoch; tokens minted before it die here
    if claims.epoch != user.token_epoch {
        return error_response(
            StatusCode::UNAUTHORIZED,
            "TokenExpired",
            "Session token has been revoked".to_string(),
        );
    }

    // Re-entrancy guard: an upstream layer may already have published a
    // context for this request; never overwrite it
    if req.extensions().get::<AuthContext>().is_none() {
        req.extensions_mut().insert(AuthContext {
            user_id: user.id,
            uuid: user.uuid,
            username: user.username,
            roles: user.roles,
        });
    }

    next.run(req).await
}

fn auth_processing_failed() -> Response {
    error_response(
        StatusCode::INTERNAL_SERVER_ERROR,
        "AuthProcessingFailed",
        "Authentication processing failed".to_string(),
    )
}

/// Extractor for handlers that require an authenticated caller.
pub struct CurrentUser(pub AuthContext);

impl<S> FromRequestParts<S> for CurrentUser
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthContext>()
            .cloned()
            .map(CurrentUser)
            .ok_or(AuthError::NotAuthenticated)
    }
}

/// Capability check for protected handlers: the authenticated context must
/// carry every required role tag.
pub fn require_roles(ctx: &AuthContext, required: &[&str]) -> Result<(), AuthError> {
    if required.iter().all(|role| ctx.has_role(role)) {
        Ok(())
    } else {
        Err(AuthError::AccessDenied)
    }
}

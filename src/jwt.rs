//! Signed token generation and validation.
//!
//! One codec covers both token uses:
//! - Session tokens: returned to clients, presented as `Authorization: Bearer`
//! - Verification tokens: never used for API calls, embedded in out-of-band
//!   links (email confirmation, password reset) and keyed into the
//!   verification store
//!
//! The two uses share expiry logic but carry a `typ` claim so the request
//! authenticator can refuse a verification token outright.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

/// Token use, embedded as the `typ` claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    /// Session token (1 hour) presented on API calls
    Session,
    /// Verification token (15 minutes) delivered via email link
    Verification,
}

/// JWT claims shared by session and verification tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (username)
    pub sub: String,
    /// User UUID
    pub uid: String,
    /// Opaque role tags
    pub roles: Vec<String>,
    /// Token use
    #[serde(rename = "typ")]
    pub token_type: TokenType,
    /// Credential epoch at issue time; a password reset bumps the user's
    /// epoch so outstanding session tokens stop matching
    pub epoch: i64,
    /// Issued at (Unix timestamp)
    pub iat: u64,
    /// Expiration time (Unix timestamp)
    pub exp: u64,
}

/// Session token duration: 1 hour
pub const SESSION_TOKEN_DURATION_SECS: u64 = 60 * 60;

/// Verification token/record lifetime in minutes. The verification store
/// writes its row TTL from the same constant so the two expiry sources
/// agree by construction; both are still checked at confirmation time.
pub const VERIFICATION_TOKEN_TTL_MINUTES: u64 = 15;

/// Result of issuing a session token.
#[derive(Debug, Clone)]
pub struct SessionTokenResult {
    /// The JWT token string
    pub token: String,
    /// Token duration in seconds
    pub duration: u64,
}

/// Configuration for JWT operations.
#[derive(Clone)]
pub struct JwtConfig {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
}

impl JwtConfig {
    /// Create a new JWT configuration with the given secret.
    pub fn new(secret: &[u8]) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
        }
    }

    /// Issue a session token for an authenticated user.
    pub fn issue_session_token(
        &self,
        username: &str,
        user_uuid: &str,
        roles: &[String],
        epoch: i64,
    ) -> Result<SessionTokenResult, JwtError> {
        let token = self.issue(
            username,
            user_uuid,
            roles,
            epoch,
            TokenType::Session,
            SESSION_TOKEN_DURATION_SECS,
        )?;
        Ok(SessionTokenResult {
            token,
            duration: SESSION_TOKEN_DURATION_SECS,
        })
    }

    /// Issue a verification token (email confirmation / password reset link).
    pub fn issue_verification_token(
        &self,
        username: &str,
        user_uuid: &str,
    ) -> Result<String, JwtError> {
        self.issue(
            username,
            user_uuid,
            &[],
            0,
            TokenType::Verification,
            VERIFICATION_TOKEN_TTL_MINUTES * 60,
        )
    }

    fn issue(
        &self,
        username: &str,
        user_uuid: &str,
        roles: &[String],
        epoch: i64,
        token_type: TokenType,
        duration_secs: u64,
    ) -> Result<String, JwtError> {
        let now = unix_now()?;
        let claims = Claims {
            sub: username.to_string(),
            uid: user_uuid.to_string(),
            roles: roles.to_vec(),
            token_type,
            epoch,
            iat: now,
            exp: now + duration_secs,
        };

        jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(JwtError::Encoding)
    }

    /// Validate and decode a session token. Fails with [`JwtError::Expired`]
    /// when the signature is good but `exp` has passed, so callers can tell
    /// an expired token from garbage.
    pub fn decode_session(&self, token: &str) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        let token_data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => JwtError::Expired,
                _ => JwtError::Malformed,
            })?;

        if token_data.claims.token_type != TokenType::Session {
            return Err(JwtError::WrongTokenType);
        }

        Ok(token_data.claims)
    }

    /// Decode a token without enforcing expiry. Signature and structure are
    /// still verified; only the clock check is skipped.
    pub fn decode_ignoring_expiry(&self, token: &str) -> Result<Claims, JwtError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.validate_exp = false;

        let token_data = jsonwebtoken::decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|_| JwtError::Malformed)?;

        Ok(token_data.claims)
    }

    /// Whether an otherwise-valid token has passed its embedded expiry.
    /// Fails with [`JwtError::Malformed`] for tokens that do not verify.
    pub fn is_expired(&self, token: &str) -> Result<bool, JwtError> {
        let claims = self.decode_ignoring_expiry(token)?;
        Ok(claims.exp <= unix_now()?)
    }

    /// Extract the subject from a token regardless of expiry. Used by
    /// confirmation flows where the verification store governs liveness and
    /// the JWT `exp` is checked separately by the caller.
    pub fn subject_ignoring_expiry(&self, token: &str) -> Result<String, JwtError> {
        Ok(self.decode_ignoring_expiry(token)?.sub)
    }
}

fn unix_now() -> Result<u64, JwtError> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| JwtError::TimeError)?
        .as_secs())
}

/// Errors that can occur during JWT operations.
#[derive(Debug)]
pub enum JwtError {
    /// Error encoding the token
    Encoding(jsonwebtoken::errors::Error),
    /// Signature or structure is invalid
    Malformed,
    /// Structurally valid but past its `exp` claim
    Expired,
    /// System time error
    TimeError,
    /// Wrong token type (e.g., verification token used as session token)
    WrongTokenType,
}

impl std::fmt::Display for JwtError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JwtError::Encoding(e) => write!(f, "Failed to encode token: {}", e),
            JwtError::Malformed => write!(f, "Malformed token"),
            JwtError::Expired => write!(f, "Token expired"),
            JwtError::TimeError => write!(f, "System time error"),
            JwtError::WrongTokenType => write!(f, "Wrong token type"),
        }
    }
}

impl std::error::Error for JwtError {}

//! Authentication orchestrator: signup, login, verification and
//! password-reset flows, refresh-token rotation.
//!
//! Composes the token codec, the verification store, the refresh store and
//! user persistence. Every operation returns a typed [`AuthError`] result;
//! the HTTP layer maps each failure exactly once.

use std::sync::Arc;

use tracing::warn;
use url::Url;
use uuid::Uuid;

use super::errors::AuthError;
use super::password::{hash_password, validate_password_policy, verify_password};
use crate::db::{
    Database, NewUser, RefreshRecord, User, UserStatus, VerificationKind, VerificationRecord,
    VerificationStatus,
};
use crate::email::Mailer;
use crate::jwt::{JwtConfig, SessionTokenResult, VERIFICATION_TOKEN_TTL_MINUTES};

/// Signup request payload.
#[derive(Debug, Clone)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub phone: Option<String>,
    pub password: String,
    pub full_name: String,
}

/// Session + refresh credentials issued after login or rotation.
#[derive(Debug)]
pub struct IssuedTokens {
    pub session: SessionTokenResult,
    pub refresh: RefreshRecord,
}

#[derive(Clone)]
pub struct AuthService {
    db: Database,
    jwt: Arc<JwtConfig>,
    mailer: Arc<dyn Mailer>,
    public_origin: Url,
}

impl AuthService {
    pub fn new(db: Database, jwt: Arc<JwtConfig>, mailer: Arc<dyn Mailer>, public_origin: Url) -> Self {
        Self {
            db,
            jwt,
            mailer,
            public_origin,
        }
    }

    /// Register a new account. The identity is created `pending`; a
    /// verification email is dispatched out-of-band.
    pub async fn signup(&self, reg: &Registration) -> Result<User, AuthError> {
        validate_password_policy(&reg.password)?;

        if self.db.users().get_by_username(&reg.username).await?.is_some() {
            return Err(AuthError::DuplicateResource("username".to_string()));
        }
        if self.db.users().get_by_email(&reg.email).await?.is_some() {
            return Err(AuthError::DuplicateResource("email".to_string()));
        }
        if let Some(phone) = &reg.phone {
            if self.db.users().get_by_phone(phone).await?.is_some() {
                return Err(AuthError::DuplicateResource("phone".to_string()));
            }
        }

        let password_hash = hash_password(&reg.password)?;
        let new_user = NewUser {
            uuid: Uuid::new_v4().to_string(),
            username: reg.username.clone(),
            email: reg.email.clone(),
            phone: reg.phone.clone(),
            password_hash,
            full_name: reg.full_name.clone(),
            roles: vec!["user".to_string()],
        };

        let id = self.db.users().create(&new_user).await?;
        let user = self
            .db
            .users()
            .get_by_id(id)
            .await?
            .ok_or(AuthError::Internal)?;

        self.start_email_verification(&user, VerificationKind::Register)
            .await?;

        Ok(user)
    }

    /// Check credentials. Returns the identity for token minting; the
    /// caller decides which tokens to issue.
    pub async fn login(&self, username: &str, password: &str) -> Result<User, AuthError> {
        let user = self
            .db
            .users()
            .get_by_username(username)
            .await?
            .ok_or_else(|| AuthError::ResourceNotFound("User".to_string()))?;

        if user.status != UserStatus::Active {
            return Err(AuthError::AccountNotVerified);
        }

        if !verify_password(password, &user.password_hash)? {
            return Err(AuthError::InvalidCredentials);
        }

        Ok(user)
    }

    /// Mint a session token and a fresh refresh record for a user. All
    /// prior refresh records are revoked first, keeping at most one live
    /// record per user.
    pub async fn issue_tokens(&self, user: &User) -> Result<IssuedTokens, AuthError> {
        self.db.refresh_tokens().revoke_all_for_user(user.id).await?;
        let refresh = self.db.refresh_tokens().create(user.id).await?;
        let session =
            self.jwt
                .issue_session_token(&user.username, &user.uuid, &user.roles, user.token_epoch)?;
        Ok(IssuedTokens { session, refresh })
    }

    /// Exchange a refresh token for new credentials. The old record is
    /// consumed; expired records are purged on touch.
    pub async fn refresh_session(&self, refresh_token: &str) -> Result<(User, IssuedTokens), AuthError> {
        let record = self
            .db
            .refresh_tokens()
            .find_by_token(refresh_token)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        if record.is_expired() {
            self.db.refresh_tokens().delete_by_token(&record.token).await?;
            return Err(AuthError::TokenExpired);
        }

        let user = self
            .db
            .users()
            .get_by_id(record.user_id)
            .await?
            .ok_or_else(|| AuthError::ResourceNotFound("User".to_string()))?;

        if user.status != UserStatus::Active {
            return Err(AuthError::AccountNotVerified);
        }

        let tokens = self.issue_tokens(&user).await?;
        Ok((user, tokens))
    }

    /// Send (or resend) the email-verification link. Idempotent while a
    /// live record exists for the address.
    pub async fn send_verification_email(&self, email: &str) -> Result<(), AuthError> {
        let user = self
            .db
            .users()
            .get_by_email(email)
            .await?
            .ok_or_else(|| AuthError::ResourceNotFound("Account".to_string()))?;

        if user.status == UserStatus::Active {
            return Err(AuthError::AlreadyVerified);
        }

        self.start_email_verification(&user, VerificationKind::Email)
            .await
    }

    /// Confirm an email-verification link: flip the identity active, then
    /// destroy the record.
    pub async fn confirm_verification_email(&self, token: &str) -> Result<(), AuthError> {
        let record = self
            .db
            .verifications()
            .get(token)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        match record.kind {
            VerificationKind::Email | VerificationKind::Register => {}
            VerificationKind::ForgotPassword => return Err(AuthError::InvalidToken),
        }
        if record.status != VerificationStatus::Waiting {
            return Err(AuthError::InvalidTokenState);
        }

        // The store said the record is alive; the embedded expiry is a
        // second, stricter check. Either source lapsing rejects the token.
        if self.jwt.is_expired(token)? {
            return Err(AuthError::TokenExpired);
        }

        let subject = self.jwt.subject_ignoring_expiry(token)?;
        let user = self
            .db
            .users()
            .get_by_username(&subject)
            .await?
            .ok_or_else(|| AuthError::ResourceNotFound("User".to_string()))?;

        // Identity mutation first, record deletion second: a crash between
        // the two is recovered by re-confirming (activation is idempotent).
        self.db.users().activate(user.id).await?;
        self.db.verifications().delete(token).await?;

        Ok(())
    }

    /// Begin a password reset. The identifier is an email address or a
    /// phone number, dispatched on shape. Idempotent while a live
    /// forgot-password record exists.
    pub async fn forgot_password(&self, identifier: &str) -> Result<(), AuthError> {
        let user = if looks_like_phone(identifier) {
            self.db.users().get_by_phone(identifier).await?
        } else {
            self.db.users().get_by_email(identifier).await?
        }
        .ok_or_else(|| AuthError::ResourceNotFound("Account".to_string()))?;

        if user.status != UserStatus::Active {
            return Err(AuthError::AccountNotVerified);
        }

        if self
            .db
            .verifications()
            .get_live_by_email(&user.email, VerificationKind::ForgotPassword)
            .await?
            .is_some()
        {
            return Ok(());
        }

        let token = self.jwt.issue_verification_token(&user.username, &user.uuid)?;
        let record = VerificationRecord {
            token: token.clone(),
            email: user.email.clone(),
            phone_number: user.phone.clone(),
            kind: VerificationKind::ForgotPassword,
            status: VerificationStatus::Waiting,
        };
        self.db
            .verifications()
            .save(&record, VERIFICATION_TOKEN_TTL_MINUTES)
            .await?;

        let link = self.build_link("/auth/confirm-forgot-password", &token);
        self.dispatch_reset_email(user.email.clone(), link);

        Ok(())
    }

    /// Acknowledge the reset link. Moves the record `waiting ->
    /// in_progress` so the actual password change cannot be driven straight
    /// from a bare link click.
    pub async fn confirm_forgot_password(&self, token: &str) -> Result<(), AuthError> {
        let record = self.get_forgot_password_record(token).await?;

        if record.status != VerificationStatus::Waiting {
            return Err(AuthError::InvalidTokenState);
        }

        if self.jwt.is_expired(token)? {
            return Err(AuthError::TokenExpired);
        }

        // A false update means the row lapsed between read and write
        if !self
            .db
            .verifications()
            .update_status(token, VerificationStatus::InProgress)
            .await?
        {
            return Err(AuthError::TokenExpired);
        }

        Ok(())
    }

    /// Complete a password reset: policy check, hash swap, epoch bump,
    /// all refresh tokens revoked, record destroyed.
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<(), AuthError> {
        let record = self.get_forgot_password_record(token).await?;

        if record.status != VerificationStatus::InProgress {
            return Err(AuthError::InvalidTokenState);
        }

        if self.jwt.is_expired(token)? {
            return Err(AuthError::TokenExpired);
        }

        validate_password_policy(new_password)?;

        let user = self
            .db
            .users()
            .get_by_email(&record.email)
            .await?
            .ok_or_else(|| AuthError::ResourceNotFound("User".to_string()))?;

        let password_hash = hash_password(new_password)?;
        self.db.users().update_password(user.id, &password_hash).await?;
        self.db.refresh_tokens().revoke_all_for_user(user.id).await?;

        // After the identity mutation, as in the verification flow
        self.db.verifications().delete(token).await?;

        Ok(())
    }

    /// Drop the refresh record matching the token. Idempotent if the
    /// record is already gone.
    pub async fn logout(&self, refresh_token: &str) -> Result<(), AuthError> {
        self.db.refresh_tokens().delete_by_token(refresh_token).await?;
        Ok(())
    }

    async fn get_forgot_password_record(&self, token: &str) -> Result<VerificationRecord, AuthError> {
        let record = self
            .db
            .verifications()
            .get(token)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        if record.kind != VerificationKind::ForgotPassword {
            return Err(AuthError::InvalidToken);
        }

        Ok(record)
    }

    /// Mint and store a verification record for a pending account, then
    /// dispatch the link. No-ops when a live record of the same kind
    /// already exists for the address.
    async fn start_email_verification(
        &self,
        user: &User,
        kind: VerificationKind,
    ) -> Result<(), AuthError> {
        if self
            .db
            .verifications()
            .get_live_by_email(&user.email, kind)
            .await?
            .is_some()
        {
            return Ok(());
        }

        let token = self.jwt.issue_verification_token(&user.username, &user.uuid)?;
        let record = VerificationRecord {
            token: token.clone(),
            email: user.email.clone(),
            phone_number: user.phone.clone(),
            kind,
            status: VerificationStatus::Waiting,
        };
        self.db
            .verifications()
            .save(&record, VERIFICATION_TOKEN_TTL_MINUTES)
            .await?;

        let link = self.build_link("/auth/verify-email/confirm", &token);
        self.dispatch_verification_email(user.email.clone(), link);

        Ok(())
    }

    fn build_link(&self, path: &str, token: &str) -> String {
        let mut url = self.public_origin.clone();
        url.set_path(path);
        url.set_query(Some(&format!("token={}", token)));
        url.to_string()
    }

    /// Fire-and-forget delivery: the record already exists, so a failed
    /// send is logged and the client can resend.
    fn dispatch_verification_email(&self, to: String, link: String) {
        let mailer = self.mailer.clone();
        tokio::spawn(async move {
            if let Err(e) = mailer.send_verification_link(&to, &link).await {
                warn!(to = %to, error = %e, "Failed to send verification email");
            }
        });
    }

    fn dispatch_reset_email(&self, to: String, link: String) {
        let mailer = self.mailer.clone();
        tokio::spawn(async move {
            if let Err(e) = mailer.send_password_reset_link(&to, &link).await {
                warn!(to = %to, error = %e, "Failed to send password reset email");
            }
        });
    }
}

/// Identifier shape dispatch for forgot-password: an optional leading `+`
/// followed by 8 to 15 digits reads as a phone number, anything else as an
/// email address.
fn looks_like_phone(identifier: &str) -> bool {
    let digits = identifier.strip_prefix('+').unwrap_or(identifier);
    (8..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit())
}

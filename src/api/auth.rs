//! Authentication API endpoints.
//!
//! - POST `/signup` - Register a new pending account
//! - POST `/login` - Exchange credentials for session + refresh tokens
//! - POST `/refresh` - Rotate a refresh token into fresh credentials
//! - POST `/forgot-password` - Begin a password reset (email or phone)
//! - POST `/confirm-forgot-password` - Acknowledge the reset link
//! - POST `/reset-password` - Complete the reset with a new password
//! - POST `/verify-email/send` - (Re)send the verification link
//! - POST `/verify-email/confirm` - Confirm the verification link
//! - POST `/logout` - Revoke the presented refresh token (bearer required)
//! - GET `/me` - Inspect the authenticated context

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::auth::{AuthError, AuthService, CurrentUser, Registration};
use crate::db::{User, UserStatus};

#[derive(Clone)]
pub struct AuthApiState {
    pub service: AuthService,
}

pub fn router(state: AuthApiState) -> Router {
    Router::new()
        .route("/signup", post(signup))
        .route("/login", post(login))
        .route("/refresh", post(refresh))
        .route("/forgot-password", post(forgot_password))
        .route("/confirm-forgot-password", post(confirm_forgot_password))
        .route("/reset-password", post(reset_password))
        .route("/verify-email/send", post(send_verification_email))
        .route("/verify-email/confirm", post(confirm_verification_email))
        .route("/logout", post(logout))
        .route("/me", get(me))
        .with_state(state)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignupRequest {
    username: String,
    email: String,
    phone: Option<String>,
    password: String,
    #[serde(default)]
    full_name: String,
}

/// Public identity view. Never carries the password hash.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IdentityResponse {
    uuid: String,
    username: String,
    email: String,
    phone: Option<String>,
    full_name: String,
    status: UserStatus,
    roles: Vec<String>,
}

impl From<User> for IdentityResponse {
    fn from(user: User) -> Self {
        Self {
            uuid: user.uuid,
            username: user.username,
            email: user.email,
            phone: user.phone,
            full_name: user.full_name,
            status: user.status,
            roles: user.roles,
        }
    }
}

async fn signup(
    State(state): State<AuthApiState>,
    Json(req): Json<SignupRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let user = state
        .service
        .signup(&Registration {
            username: req.username,
            email: req.email,
            phone: req.phone,
            password: req.password,
            full_name: req.full_name,
        })
        .await?;

    Ok((StatusCode::OK, Json(IdentityResponse::from(user))))
}

#[derive(Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenResponse {
    token: String,
    expires_in: u64,
    refresh_token: String,
}

async fn login(
    State(state): State<AuthApiState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let user = state.service.login(&req.username, &req.password).await?;
    let tokens = state.service.issue_tokens(&user).await?;

    Ok((
        StatusCode::OK,
        Json(TokenResponse {
            token: tokens.session.token,
            expires_in: tokens.session.duration,
            refresh_token: tokens.refresh.token,
        }),
    ))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest {
    refresh_token: String,
}

async fn refresh(
    State(state): State<AuthApiState>,
    Json(req): Json<RefreshRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let (_, tokens) = state.service.refresh_session(&req.refresh_token).await?;

    Ok((
        StatusCode::OK,
        Json(TokenResponse {
            token: tokens.session.token,
            expires_in: tokens.session.duration,
            refresh_token: tokens.refresh.token,
        }),
    ))
}

#[derive(Deserialize)]
struct EmailQuery {
    email: String,
}

#[derive(Deserialize)]
struct TokenQuery {
    token: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResetPasswordQuery {
    token: String,
    new_password: String,
}

fn accepted() -> impl IntoResponse {
    (StatusCode::ACCEPTED, Json(serde_json::json!({ "success": true })))
}

async fn forgot_password(
    State(state): State<AuthApiState>,
    Query(query): Query<EmailQuery>,
) -> Result<impl IntoResponse, AuthError> {
    state.service.forgot_password(&query.email).await?;
    Ok(accepted())
}

async fn confirm_forgot_password(
    State(state): State<AuthApiState>,
    Query(query): Query<TokenQuery>,
) -> Result<impl IntoResponse, AuthError> {
    state.service.confirm_forgot_password(&query.token).await?;
    Ok(accepted())
}

async fn reset_password(
    State(state): State<AuthApiState>,
    Query(query): Query<ResetPasswordQuery>,
) -> Result<impl IntoResponse, AuthError> {
    state
        .service
        .reset_password(&query.token, &query.new_password)
        .await?;
    Ok(accepted())
}

async fn send_verification_email(
    State(state): State<AuthApiState>,
    Query(query): Query<EmailQuery>,
) -> Result<impl IntoResponse, AuthError> {
    state.service.send_verification_email(&query.email).await?;
    Ok(accepted())
}

async fn confirm_verification_email(
    State(state): State<AuthApiState>,
    Query(query): Query<TokenQuery>,
) -> Result<impl IntoResponse, AuthError> {
    state.service.confirm_verification_email(&query.token).await?;
    Ok(accepted())
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogoutRequest {
    refresh_token: String,
}

async fn logout(
    State(state): State<AuthApiState>,
    CurrentUser(_ctx): CurrentUser,
    Json(req): Json<LogoutRequest>,
) -> Result<impl IntoResponse, AuthError> {
    state.service.logout(&req.refresh_token).await?;
    Ok(accepted())
}

#[derive(Serialize)]
struct MeResponse {
    uuid: String,
    username: String,
    roles: Vec<String>,
}

/// Inspect the authenticated context published by the request
/// authenticator. Doubles as the canonical protected endpoint.
async fn me(CurrentUser(ctx): CurrentUser) -> impl IntoResponse {
    Json(MeResponse {
        uuid: ctx.uuid,
        username: ctx.username,
        roles: ctx.roles,
    })
}

//! End-to-end tests for the authentication HTTP surface.
//!
//! Tests cover:
//! - Signup, email confirmation, and login over HTTP
//! - The request authenticator: pass-through, expired, malformed, revoked
//! - Refresh-token rotation and logout
//! - The structured error body shape

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use std::sync::Arc;
use tower::ServiceExt;
use url::Url;

use authgate::{
    ServerConfig, create_app,
    db::{Database, VerificationKind},
    email::LogMailer,
    jwt::{Claims, JwtConfig, TokenType},
};

const TEST_SECRET: &[u8] = b"test-jwt-secret-for-http-tests!!";

async fn create_test_app() -> (axum::Router, Database) {
    let db = Database::open(":memory:")
        .await
        .expect("Failed to open test database");
    let config = ServerConfig {
        db: db.clone(),
        jwt_secret: TEST_SECRET.to_vec(),
        public_origin: Url::parse("http://localhost:7391").expect("Invalid URL"),
        mailer: Arc::new(LogMailer),
    };
    (create_app(&config), db)
}

fn json_post(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

async fn signup(app: &axum::Router, username: &str, email: &str) {
    let response = app
        .clone()
        .oneshot(json_post(
            "/auth/signup",
            serde_json::json!({
                "username": username,
                "email": email,
                "password": "NewP@ssw0rd1",
                "fullName": "Test User",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

async fn confirm_email(app: &axum::Router, db: &Database, email: &str) {
    let token = db
        .verifications()
        .get_live_by_email(email, VerificationKind::Register)
        .await
        .unwrap()
        .expect("No verification record")
        .token;

    let response = app
        .clone()
        .oneshot(json_post(
            &format!("/auth/verify-email/confirm?token={}", token),
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
}

/// Sign up, confirm, and log in. Returns (session_token, refresh_token).
async fn login_flow(app: &axum::Router, db: &Database, username: &str, email: &str) -> (String, String) {
    signup(app, username, email).await;
    confirm_email(app, db, email).await;

    let response = app
        .clone()
        .oneshot(json_post(
            "/auth/login",
            serde_json::json!({ "username": username, "password": "NewP@ssw0rd1" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    (
        body["token"].as_str().unwrap().to_string(),
        body["refreshToken"].as_str().unwrap().to_string(),
    )
}

fn bearer_get(uri: &str, token: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_signup_confirm_login_walk() {
    let (app, db) = create_test_app().await;

    signup(&app, "alice", "alice@example.com").await;

    // Login before confirmation is refused
    let response = app
        .clone()
        .oneshot(json_post(
            "/auth/login",
            serde_json::json!({ "username": "alice", "password": "NewP@ssw0rd1" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"], "AccountNotVerified");

    confirm_email(&app, &db, "alice@example.com").await;

    let response = app
        .clone()
        .oneshot(json_post(
            "/auth/login",
            serde_json::json!({ "username": "alice", "password": "NewP@ssw0rd1" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert!(body["expiresIn"].as_u64().unwrap() > 0);
    assert!(!body["token"].as_str().unwrap().is_empty());
    assert!(!body["refreshToken"].as_str().unwrap().is_empty());
}

#[tokio::test]
async fn test_signup_duplicate_username_conflicts() {
    let (app, _db) = create_test_app().await;

    signup(&app, "alice", "alice@example.com").await;

    let response = app
        .clone()
        .oneshot(json_post(
            "/auth/signup",
            serde_json::json!({
                "username": "alice",
                "email": "other@example.com",
                "password": "NewP@ssw0rd1",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);

    let body = body_json(response).await;
    assert_eq!(body["error"], "DuplicateResource");
    assert_eq!(body["status"], 409);
    assert!(body["timestamp"].as_u64().unwrap() > 0);
    assert!(body["message"].as_str().unwrap().contains("username"));
}

#[tokio::test]
async fn test_me_requires_authentication() {
    let (app, db) = create_test_app().await;

    // No header: the authenticator passes through, the extractor rejects
    let response = app
        .clone()
        .oneshot(Request::builder().uri("/auth/me").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"], "NotAuthenticated");

    // Garbage bearer is rejected by the authenticator itself
    let response = app
        .clone()
        .oneshot(bearer_get("/auth/me", "not.a.jwt"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"], "InvalidToken");

    let (session, _refresh) = login_flow(&app, &db, "alice", "alice@example.com").await;
    let response = app
        .clone()
        .oneshot(bearer_get("/auth/me", &session))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["username"], "alice");
    assert_eq!(body["roles"][0], "user");
}

#[tokio::test]
async fn test_expired_session_token_rejected_before_lookup() {
    let (app, _db) = create_test_app().await;

    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs();
    let claims = Claims {
        sub: "alice".to_string(),
        uid: "uuid-123".to_string(),
        roles: vec!["user".to_string()],
        token_type: TokenType::Session,
        epoch: 0,
        iat: now - 7200,
        exp: now - 3600,
    };
    let token = jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(TEST_SECRET),
    )
    .unwrap();

    // No matching user exists; the expiry probe still wins
    let response = app.oneshot(bearer_get("/auth/me", &token)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"], "TokenExpired");
}

#[tokio::test]
async fn test_verification_token_never_authenticates_requests() {
    let (app, db) = create_test_app().await;

    login_flow(&app, &db, "alice", "alice@example.com").await;

    // Mint a verification-typed token for the active user
    let jwt = JwtConfig::new(TEST_SECRET);
    let token = jwt.issue_verification_token("alice", "uuid-123").unwrap();

    let response = app.oneshot(bearer_get("/auth/me", &token)).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"], "InvalidToken");
}

#[tokio::test]
async fn test_password_reset_revokes_session_tokens() {
    let (app, db) = create_test_app().await;

    let (session, _refresh) = login_flow(&app, &db, "alice", "alice@example.com").await;

    let response = app
        .clone()
        .oneshot(json_post(
            "/auth/forgot-password?email=alice@example.com",
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let token = db
        .verifications()
        .get_live_by_email("alice@example.com", VerificationKind::ForgotPassword)
        .await
        .unwrap()
        .unwrap()
        .token;

    let response = app
        .clone()
        .oneshot(json_post(
            &format!("/auth/confirm-forgot-password?token={}", token),
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let response = app
        .clone()
        .oneshot(json_post(
            &format!(
                "/auth/reset-password?token={}&newPassword=Fresh0Pass!",
                token
            ),
            serde_json::json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    // The pre-reset session dies on the epoch check
    let response = app
        .clone()
        .oneshot(bearer_get("/auth/me", &session))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"], "TokenExpired");

    // And the new password works
    let response = app
        .oneshot(json_post(
            "/auth/login",
            serde_json::json!({ "username": "alice", "password": "Fresh0Pass!" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_refresh_rotation_over_http() {
    let (app, db) = create_test_app().await;

    let (_session, refresh) = login_flow(&app, &db, "alice", "alice@example.com").await;

    let response = app
        .clone()
        .oneshot(json_post(
            "/auth/refresh",
            serde_json::json!({ "refreshToken": refresh }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let rotated = body["refreshToken"].as_str().unwrap().to_string();
    assert_ne!(rotated, refresh);

    // The consumed token is refused on replay
    let response = app
        .oneshot(json_post(
            "/auth/refresh",
            serde_json::json!({ "refreshToken": refresh }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "InvalidToken");
}

#[tokio::test]
async fn test_logout_requires_bearer_and_is_idempotent() {
    let (app, db) = create_test_app().await;

    let (session, refresh) = login_flow(&app, &db, "alice", "alice@example.com").await;

    // Without a bearer token logout is refused
    let response = app
        .clone()
        .oneshot(json_post(
            "/auth/logout",
            serde_json::json!({ "refreshToken": refresh }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let logout = |refresh: String, session: String| {
        Request::builder()
            .method("POST")
            .uri("/auth/logout")
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, format!("Bearer {}", session))
            .body(Body::from(
                serde_json::json!({ "refreshToken": refresh }).to_string(),
            ))
            .unwrap()
    };

    let response = app
        .clone()
        .oneshot(logout(refresh.clone(), session.clone()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    // Second logout with the same record already gone
    let response = app
        .clone()
        .oneshot(logout(refresh.clone(), session))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    // The revoked refresh token no longer rotates
    let response = app
        .oneshot(json_post(
            "/auth/refresh",
            serde_json::json!({ "refreshToken": refresh }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_weak_password_error_body() {
    let (app, _db) = create_test_app().await;

    let response = app
        .oneshot(json_post(
            "/auth/signup",
            serde_json::json!({
                "username": "alice",
                "email": "alice@example.com",
                "password": "short",
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = body_json(response).await;
    assert_eq!(body["error"], "WeakPassword");
    assert_eq!(body["status"], 400);
    assert!(body["message"].is_string());
    assert!(body["timestamp"].is_number());
}

mod auth;

use axum::Router;

use crate::auth::AuthService;

/// Create the API router.
pub fn create_api_router(service: AuthService) -> Router {
    let auth_state = auth::AuthApiState { service };

    Router::new().nest("/auth", auth::router(auth_state))
}

//! Authentication subsystem: typed errors, password hashing, the
//! orchestrator service, and the per-request authenticator.

pub mod errors;
pub mod middleware;
pub mod password;
pub mod service;

pub use errors::AuthError;
pub use middleware::{AuthContext, AuthState, CurrentUser, authenticate, require_roles};
pub use service::{AuthService, IssuedTokens, Registration};

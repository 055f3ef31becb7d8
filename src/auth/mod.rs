//! Authentication
//!
//! Handles:
//! - Signed session tokens
//! - Login and logout routes
//! - Authentication middleware and extractors

mod login;
mod middleware;
pub mod session;

pub use login::{LoginResponse, auth_router};
pub use middleware::{CurrentUser, MaybeUser, SESSION_COOKIE, require_auth};
pub use session::{Session, create_session_token, verify_session_token};

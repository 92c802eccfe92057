//! Authentication route handlers.
//!
//! Registration and login both end with a fresh session; the response
//! carries the session cookie and the public profile.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tower_sessions::Session;
use tracing::instrument;

use super::ApiJson;
use crate::error::{Result, add_breadcrumb, clear_sentry_user, set_sentry_user};
use crate::middleware::RequireUser;
use crate::models::PublicUser;
use crate::services::{AuthService, Registration, SessionManager};
use crate::state::AppState;

// =============================================================================
// Request Types
// =============================================================================

/// Login form data.
#[derive(Deserialize)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

impl std::fmt::Debug for LoginForm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginForm")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Create an account and sign it in.
#[instrument(skip_all)]
pub async fn register(
    State(state): State<AppState>,
    session: Session,
    ApiJson(form): ApiJson<Registration>,
) -> Result<Response> {
    let user = AuthService::new(state.storage()).register(form).await?;
    SessionManager::new(state.storage(), state.config().session_ttl_secs)
        .create_session(&session, &user)
        .await?;

    set_sentry_user(&user.id, Some(user.email.as_str()));
    add_breadcrumb("auth", "Registered", None);

    Ok((StatusCode::CREATED, ApiJson(PublicUser::from(&user))).into_response())
}

/// Sign in with email and password.
#[instrument(skip_all)]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    ApiJson(form): ApiJson<LoginForm>,
) -> Result<ApiJson<PublicUser>> {
    let user = AuthService::new(state.storage())
        .login(&form.email, &form.password)
        .await?;
    SessionManager::new(state.storage(), state.config().session_ttl_secs)
        .create_session(&session, &user)
        .await?;

    set_sentry_user(&user.id, Some(user.email.as_str()));
    add_breadcrumb("auth", "Logged in", None);
    tracing::info!(user_id = %user.id, "User logged in");

    Ok(ApiJson(PublicUser::from(&user)))
}

/// Destroy the current session. Succeeds for anonymous callers too.
pub async fn logout(State(state): State<AppState>, session: Session) -> Result<StatusCode> {
    SessionManager::new(state.storage(), state.config().session_ttl_secs)
        .destroy_session(&session)
        .await?;
    clear_sentry_user();
    Ok(StatusCode::NO_CONTENT)
}

/// The signed-in user's profile.
pub async fn current_user(RequireUser(user): RequireUser) -> ApiJson<PublicUser> {
    ApiJson(PublicUser::from(&user))
}

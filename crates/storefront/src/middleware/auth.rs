//! Authentication extractors.
//!
//! Both extractors resolve the session against storage on every request,
//! so admin and payment flags are never stale.

use axum::{extract::FromRequestParts, http::request::Parts};
use tower_sessions::Session;

use crate::error::{AppError, set_sentry_user};
use crate::models::User;
use crate::services::SessionManager;
use crate::state::AppState;

/// Extractor that requires a signed-in user.
///
/// Rejects with `401 {"message":"Please log in"}` when the session is
/// anonymous, expired, or points at a user that no longer exists.
///
/// # Example
///
/// ```rust,ignore
/// async fn protected_handler(RequireUser(user): RequireUser) -> impl IntoResponse {
///     format!("Hello, {}!", user.first_name)
/// }
/// ```
pub struct RequireUser(pub User);

/// Extractor that requires a signed-in administrator.
///
/// `401` when anonymous, `403` when signed in without admin rights.
pub struct RequireAdmin(pub User);

async fn current_user(parts: &Parts, state: &AppState) -> Result<Option<User>, AppError> {
    let session = parts
        .extensions
        .get::<Session>()
        .ok_or_else(|| AppError::Internal("session layer not installed".to_owned()))?;

    let user = SessionManager::new(state.storage(), state.config().session_ttl_secs)
        .resolve_session(session)
        .await?;

    if let Some(user) = &user {
        set_sentry_user(&user.id, Some(user.email.as_str()));
    }
    Ok(user)
}

impl FromRequestParts<AppState> for RequireUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        current_user(parts, state)
            .await?
            .map(Self)
            .ok_or(AppError::Unauthorized)
    }
}

impl FromRequestParts<AppState> for RequireAdmin {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = current_user(parts, state)
            .await?
            .ok_or(AppError::Unauthorized)?;
        if !user.is_admin {
            tracing::warn!(user_id = %user.id, path = %parts.uri.path(), "Admin access denied");
            return Err(AppError::Forbidden("Admin access required".to_owned()));
        }
        Ok(Self(user))
    }
}

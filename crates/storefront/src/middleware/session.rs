//! Session middleware configuration.
//!
//! The layer is generic over the store so the same cookie settings apply to
//! `PostgreSQL`-backed sessions in production and in-memory sessions in
//! development and tests.

use tower_sessions::cookie::{SameSite, time::Duration};
use tower_sessions::{Expiry, SessionManagerLayer, SessionStore};

use crate::config::StorefrontConfig;

/// Session cookie name.
pub const SESSION_COOKIE_NAME: &str = "shelf_session";

/// Create the session layer over `store`.
///
/// Sessions expire after `session_ttl_secs` of inactivity. The cookie is
/// `Secure` when the public base URL is https.
#[must_use]
pub fn create_session_layer<S>(store: S, config: &StorefrontConfig) -> SessionManagerLayer<S>
where
    S: SessionStore + Clone,
{
    SessionManagerLayer::new(store)
        .with_name(SESSION_COOKIE_NAME)
        .with_expiry(Expiry::OnInactivity(Duration::seconds(
            config.session_ttl_secs,
        )))
        .with_secure(config.is_secure())
        .with_same_site(SameSite::Lax)
        .with_http_only(true)
        .with_path("/")
}

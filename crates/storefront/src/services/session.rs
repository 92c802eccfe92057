//! Session management.
//!
//! A session holds only the signed-in user's id and email. Everything else
//! about the user is read fresh from storage on each request, so a revoked
//! admin flag or a new purchase takes effect immediately.

use thiserror::Error;
use tower_sessions::{Expiry, Session, cookie::time::Duration, session::Id};
use tracing::instrument;

use crate::db::{RepositoryError, Storage};
use crate::models::{CurrentUser, User, session_keys};

/// Opaque token identifying a stored session.
pub type SessionToken = Id;

/// Errors from session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The session store failed.
    #[error("session store error: {0}")]
    Store(#[from] tower_sessions::session::Error),

    /// Reading the referenced user failed.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    /// The store accepted the session but assigned no id.
    #[error("session saved without an id")]
    MissingId,
}

/// Issues, resolves and destroys login sessions.
pub struct SessionManager<'a> {
    storage: &'a dyn Storage,
    ttl: Duration,
}

impl<'a> SessionManager<'a> {
    /// `ttl_secs` is the inactivity window after which a session expires.
    #[must_use]
    pub const fn new(storage: &'a dyn Storage, ttl_secs: i64) -> Self {
        Self {
            storage,
            ttl: Duration::seconds(ttl_secs),
        }
    }

    fn expiry(&self) -> Expiry {
        Expiry::OnInactivity(self.ttl)
    }

    /// Sign `user` in on this session.
    ///
    /// The session id is cycled first so a token planted before login is
    /// never promoted to an authenticated one.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Store` if the session cannot be persisted.
    #[instrument(skip(self, session, user), fields(user_id = %user.id))]
    pub async fn create_session(
        &self,
        session: &Session,
        user: &User,
    ) -> Result<SessionToken, SessionError> {
        session.cycle_id().await?;
        session.set_expiry(Some(self.expiry()));
        session
            .insert(session_keys::CURRENT_USER, CurrentUser::from(user))
            .await?;
        session.save().await?;

        session.id().ok_or(SessionError::MissingId)
    }

    /// Look up the user this session belongs to.
    ///
    /// Returns `None` for anonymous or expired sessions and for sessions
    /// whose user no longer exists. A hit slides the expiry forward.
    ///
    /// # Errors
    ///
    /// Store and database failures are errors, never "anonymous".
    pub async fn resolve_session(&self, session: &Session) -> Result<Option<User>, SessionError> {
        let Some(current) = session
            .get::<CurrentUser>(session_keys::CURRENT_USER)
            .await?
        else {
            return Ok(None);
        };

        let user = self.storage.find_user_by_id(current.id).await?;
        if user.is_some() {
            session.set_expiry(Some(self.expiry()));
        } else {
            tracing::debug!(user_id = %current.id, "Session refers to a missing user");
        }
        Ok(user)
    }

    /// Delete this session from the store. Other sessions of the same user
    /// are untouched.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Store` if the store cannot delete the record.
    pub async fn destroy_session(&self, session: &Session) -> Result<(), SessionError> {
        session.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use tower_sessions::MemoryStore;

    use shelf_core::Email;

    use super::*;
    use crate::db::MemoryStorage;
    use crate::models::NewUser;

    const TTL: i64 = 3600;

    async fn user(storage: &MemoryStorage, email: &str) -> User {
        storage
            .create_user(NewUser {
                email: Email::parse(email).unwrap(),
                password_hash: None,
                first_name: "Test".to_string(),
                last_name: None,
            })
            .await
            .unwrap()
    }

    fn session(store: &Arc<MemoryStore>, id: Option<Id>) -> Session {
        Session::new(
            id,
            Arc::clone(store),
            Some(Expiry::OnInactivity(Duration::seconds(TTL))),
        )
    }

    #[tokio::test]
    async fn test_create_then_resolve_from_token() {
        let storage = MemoryStorage::new();
        let store = Arc::new(MemoryStore::default());
        let user = user(&storage, "a@x.com").await;
        let manager = SessionManager::new(&storage, TTL);

        let token = manager
            .create_session(&session(&store, None), &user)
            .await
            .unwrap();

        let reopened = session(&store, Some(token));
        let resolved = manager.resolve_session(&reopened).await.unwrap().unwrap();
        assert_eq!(resolved.id, user.id);
    }

    #[tokio::test]
    async fn test_anonymous_session_resolves_to_none() {
        let storage = MemoryStorage::new();
        let store = Arc::new(MemoryStore::default());
        let manager = SessionManager::new(&storage, TTL);

        assert!(
            manager
                .resolve_session(&session(&store, None))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_login_cycles_existing_id() {
        let storage = MemoryStorage::new();
        let store = Arc::new(MemoryStore::default());
        let user = user(&storage, "a@x.com").await;
        let manager = SessionManager::new(&storage, TTL);

        let pre_login = session(&store, None);
        pre_login.insert("visited", true).await.unwrap();
        pre_login.save().await.unwrap();
        let planted = pre_login.id().unwrap();

        let token = manager.create_session(&pre_login, &user).await.unwrap();
        assert_ne!(token, planted);
    }

    #[tokio::test]
    async fn test_destroy_only_affects_one_session() {
        let storage = MemoryStorage::new();
        let store = Arc::new(MemoryStore::default());
        let user = user(&storage, "a@x.com").await;
        let manager = SessionManager::new(&storage, TTL);

        let first = manager
            .create_session(&session(&store, None), &user)
            .await
            .unwrap();
        let second = manager
            .create_session(&session(&store, None), &user)
            .await
            .unwrap();

        manager
            .destroy_session(&session(&store, Some(first)))
            .await
            .unwrap();

        assert!(
            manager
                .resolve_session(&session(&store, Some(first)))
                .await
                .unwrap()
                .is_none()
        );
        assert!(
            manager
                .resolve_session(&session(&store, Some(second)))
                .await
                .unwrap()
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_expired_session_is_anonymous() {
        let storage = MemoryStorage::new();
        let store = Arc::new(MemoryStore::default());
        let user = user(&storage, "a@x.com").await;
        let manager = SessionManager::new(&storage, 1);

        let token = manager
            .create_session(&session(&store, None), &user)
            .await
            .unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(2100)).await;

        assert!(
            manager
                .resolve_session(&session(&store, Some(token)))
                .await
                .unwrap()
                .is_none()
        );
    }
}

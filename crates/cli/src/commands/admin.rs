//! Admin rights management.
//!
//! # Usage
//!
//! ```bash
//! shelf-cli admin promote -e owner@example.com
//! shelf-cli admin demote -e former@example.com
//! ```
//!
//! The account must already exist; register it through the API first.

use thiserror::Error;

use shelf_core::Email;
use shelf_storefront::db::{PgStorage, RepositoryError, Storage};

use super::ConnectError;

/// Errors that can occur during admin operations.
#[derive(Debug, Error)]
pub enum AdminError {
    /// Invalid email.
    #[error("Invalid email: {0}")]
    InvalidEmail(String),

    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// No account with that email.
    #[error("No account found with email: {0}")]
    UserNotFound(String),
}

/// Grant (`true`) or revoke (`false`) admin rights for `email`.
///
/// # Errors
///
/// Returns `AdminError` if the email is malformed, the database is
/// unreachable or no account exists for it.
pub async fn set_admin(email: &str, is_admin: bool) -> Result<(), AdminError> {
    let email = Email::parse(email).map_err(|_| AdminError::InvalidEmail(email.to_owned()))?;

    let storage = PgStorage::new(super::connect().await?);
    let user = storage
        .set_user_admin(&email, is_admin)
        .await?
        .ok_or_else(|| AdminError::UserNotFound(email.to_string()))?;

    if is_admin {
        tracing::info!("Promoted {} (id {}) to admin", user.email, user.id);
    } else {
        tracing::info!("Removed admin rights from {} (id {})", user.email, user.id);
    }
    Ok(())
}

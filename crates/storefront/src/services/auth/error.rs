//! Authentication error types.

use thiserror::Error;

use crate::db::RepositoryError;
use crate::error::ValidationErrors;

/// Errors that can occur during authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Unknown email, no password set, or wrong password. Callers cannot
    /// tell these apart.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Email already registered.
    #[error("email already registered")]
    UserAlreadyExists,

    /// Registration input rejected (email format, password length, names).
    #[error("registration validation failed: {0}")]
    Validation(ValidationErrors),

    /// Repository/database error.
    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    /// Password hashing error.
    #[error("password hashing error")]
    PasswordHash,
}

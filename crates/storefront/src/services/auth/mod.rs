//! Authentication service.
//!
//! Password registration and login. Hashes are Argon2id PHC strings with
//! fixed work parameters: 19 456 KiB memory, 2 passes, 1 lane, 32-byte
//! output, and a random 16-byte salt per hash.

mod error;

use std::sync::LazyLock;

pub use error::AuthError;

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};
use serde::Deserialize;
use tracing::instrument;

use shelf_core::Email;

use crate::db::{RepositoryError, Storage};
use crate::error::ValidationErrors;
use crate::models::{NewUser, User};

/// Minimum password length, in characters.
pub const MIN_PASSWORD_LENGTH: usize = 6;

/// Maximum length of first and last names, in characters.
pub const MAX_NAME_LENGTH: usize = 100;

const ARGON2_MEMORY_KIB: u32 = 19_456;
const ARGON2_ITERATIONS: u32 = 2;
const ARGON2_LANES: u32 = 1;
const ARGON2_OUTPUT_LEN: usize = 32;

/// Verified against when the account has no usable hash, so an unknown email
/// costs the same as a wrong password.
static DUMMY_HASH: LazyLock<Option<String>> =
    LazyLock::new(|| hash_password("shelf-timing-equaliser").ok());

/// Registration form.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: Option<String>,
}

/// Authentication service.
///
/// Handles user registration and password login.
pub struct AuthService<'a> {
    storage: &'a dyn Storage,
}

impl<'a> AuthService<'a> {
    /// Create a new authentication service.
    #[must_use]
    pub const fn new(storage: &'a dyn Storage) -> Self {
        Self { storage }
    }

    /// Register a new user with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::Validation` listing every rejected field.
    /// Returns `AuthError::UserAlreadyExists` if the email is already registered.
    #[instrument(skip(self, registration), fields(email = %registration.email))]
    pub async fn register(&self, registration: Registration) -> Result<User, AuthError> {
        let (email, first_name, last_name) = validate_registration(&registration)?;
        let password_hash = hash_off_runtime(registration.password.clone()).await?;

        let user = self
            .storage
            .create_user(NewUser {
                email,
                password_hash: Some(password_hash),
                first_name,
                last_name,
            })
            .await
            .map_err(|e| match e {
                RepositoryError::Conflict(_) => AuthError::UserAlreadyExists,
                other => AuthError::Repository(other),
            })?;

        tracing::info!(user_id = %user.id, "User registered");
        Ok(user)
    }

    /// Login with email and password.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::InvalidCredentials` if the email is unknown, the
    /// account has no password, or the password is wrong.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<User, AuthError> {
        let user = match Email::parse(email) {
            Ok(email) => self.storage.find_user_by_email(&email).await?,
            Err(_) => None,
        };

        let stored_hash = user.as_ref().and_then(|u| u.password_hash.clone());
        let verified = verify_off_runtime(password.to_owned(), stored_hash).await;

        match user {
            Some(user) if verified => Ok(user),
            _ => Err(AuthError::InvalidCredentials),
        }
    }
}

/// Argon2 hashing on the blocking pool, keeping async workers free.
async fn hash_off_runtime(password: String) -> Result<String, AuthError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|_| AuthError::PasswordHash)?
}

/// Verify on the blocking pool. Without a stored hash the dummy hash is
/// checked instead and the result is always `false`.
async fn verify_off_runtime(password: String, stored_hash: Option<String>) -> bool {
    tokio::task::spawn_blocking(move || match stored_hash {
        Some(hash) => verify_password(&password, &hash),
        None => {
            if let Some(dummy) = DUMMY_HASH.as_deref() {
                let _ = verify_password(&password, dummy);
            }
            false
        }
    })
    .await
    .unwrap_or(false)
}

fn validate_registration(
    registration: &Registration,
) -> Result<(Email, String, Option<String>), AuthError> {
    let mut errors = ValidationErrors::new();

    let email = Email::parse(&registration.email)
        .map_err(|e| errors.add("email", format!("Invalid email address: {e}")))
        .ok();

    if registration.password.chars().count() < MIN_PASSWORD_LENGTH {
        errors.add(
            "password",
            format!("Password must be at least {MIN_PASSWORD_LENGTH} characters"),
        );
    }

    let first_name = registration.first_name.trim().to_owned();
    if first_name.is_empty() {
        errors.add("firstName", "First name is required");
    } else if first_name.chars().count() > MAX_NAME_LENGTH {
        errors.add(
            "firstName",
            format!("First name must be at most {MAX_NAME_LENGTH} characters"),
        );
    }

    let last_name = registration
        .last_name
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned);
    if last_name
        .as_ref()
        .is_some_and(|n| n.chars().count() > MAX_NAME_LENGTH)
    {
        errors.add(
            "lastName",
            format!("Last name must be at most {MAX_NAME_LENGTH} characters"),
        );
    }

    match (email, errors.into_result()) {
        (Some(email), Ok(())) => Ok((email, first_name, last_name)),
        (_, Err(errors)) => Err(AuthError::Validation(errors)),
        (None, Ok(())) => Err(AuthError::Validation(ValidationErrors::single(
            "email",
            "Invalid email address",
        ))),
    }
}

fn argon2() -> Result<Argon2<'static>, AuthError> {
    let params = Params::new(
        ARGON2_MEMORY_KIB,
        ARGON2_ITERATIONS,
        ARGON2_LANES,
        Some(ARGON2_OUTPUT_LEN),
    )
    .map_err(|_| AuthError::PasswordHash)?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Hash a password using Argon2id with a fresh random salt.
///
/// # Errors
///
/// Returns `AuthError::PasswordHash` if hashing fails.
pub fn hash_password(password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);

    argon2()?
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|_| AuthError::PasswordHash)
}

/// Verify a password against a stored PHC string in constant time.
///
/// Unparseable hashes never verify.
#[must_use]
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    let Ok(parsed_hash) = PasswordHash::new(stored_hash) else {
        return false;
    };
    argon2().is_ok_and(|argon2| {
        argon2
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok()
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::db::MemoryStorage;

    fn registration(email: &str, password: &str, first_name: &str) -> Registration {
        Registration {
            email: email.to_string(),
            password: password.to_string(),
            first_name: first_name.to_string(),
            last_name: None,
        }
    }

    #[test]
    fn test_hash_roundtrip() {
        let hash = hash_password("secret1").unwrap();
        assert!(verify_password("secret1", &hash));
        assert!(!verify_password("secret2", &hash));
    }

    #[test]
    fn test_hash_uses_fixed_parameters() {
        let hash = hash_password("secret1").unwrap();
        assert!(hash.starts_with("$argon2id$v=19$m=19456,t=2,p=1$"));
    }

    #[test]
    fn test_salts_differ() {
        let a = hash_password("same").unwrap();
        let b = hash_password("same").unwrap();
        assert_ne!(a, b);
        assert!(verify_password("same", &a));
        assert!(verify_password("same", &b));
    }

    #[test]
    fn test_garbage_hash_never_verifies() {
        assert!(!verify_password("anything", "not-a-phc-string"));
        assert!(!verify_password("", ""));
    }

    #[test]
    fn test_validation_collects_all_fields() {
        let err = validate_registration(&registration("nope", "123", "  ")).unwrap_err();
        let AuthError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert!(errors.field("email").is_some());
        assert!(errors.field("password").is_some());
        assert!(errors.field("firstName").is_some());
    }

    #[test]
    fn test_validation_name_length() {
        let long = "x".repeat(MAX_NAME_LENGTH + 1);
        assert!(validate_registration(&registration("a@x.com", "secret1", &long)).is_err());
        assert!(
            validate_registration(&registration("a@x.com", "secret1", &"x".repeat(MAX_NAME_LENGTH)))
                .is_ok()
        );
    }

    #[tokio::test(flavor = "current_thread")]
    async fn test_hashing_leaves_runtime_responsive() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicUsize, Ordering};

        let ticks = Arc::new(AtomicUsize::new(0));
        let ticker = tokio::spawn({
            let ticks = Arc::clone(&ticks);
            async move {
                loop {
                    ticks.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(std::time::Duration::from_millis(1)).await;
                }
            }
        });

        let storage = MemoryStorage::new();
        let auth = AuthService::new(&storage);
        let before = ticks.load(Ordering::SeqCst);
        auth.register(registration("busy@x.com", "secret1", "Busy"))
            .await
            .unwrap();
        auth.login("busy@x.com", "secret1").await.unwrap();
        let after = ticks.load(Ordering::SeqCst);
        ticker.abort();

        // Both hashes ran while the single runtime thread kept ticking.
        assert!(after > before + 1, "ticks {before} -> {after}");
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let storage = MemoryStorage::new();
        let auth = AuthService::new(&storage);

        let user = auth
            .register(registration("A@X.com", "secret1", "Ada"))
            .await
            .unwrap();
        assert_eq!(user.email.as_str(), "a@x.com");

        let logged_in = auth.login("a@x.com", "secret1").await.unwrap();
        assert_eq!(logged_in.id, user.id);

        assert!(matches!(
            auth.login("a@x.com", "wrong-pass").await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_unknown_email_same_error() {
        let storage = MemoryStorage::new();
        let auth = AuthService::new(&storage);

        assert!(matches!(
            auth.login("ghost@x.com", "secret1").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.login("not-an-email", "secret1").await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_passwordless_account_cannot_login() {
        let storage = MemoryStorage::new();
        storage
            .create_user(NewUser {
                email: Email::parse("oauth@x.com").unwrap(),
                password_hash: None,
                first_name: "O".to_string(),
                last_name: None,
            })
            .await
            .unwrap();

        let auth = AuthService::new(&storage);
        assert!(matches!(
            auth.login("oauth@x.com", "").await,
            Err(AuthError::InvalidCredentials)
        ));
    }

    #[tokio::test]
    async fn test_duplicate_registration() {
        let storage = MemoryStorage::new();
        let auth = AuthService::new(&storage);
        auth.register(registration("a@x.com", "secret1", "Ada"))
            .await
            .unwrap();

        assert!(matches!(
            auth.register(registration("a@x.com", "other12", "Bob")).await,
            Err(AuthError::UserAlreadyExists)
        ));
    }
}

//! User domain types.
//!
//! These types represent validated domain objects separate from database row types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use shelf_core::{Email, UserId};

/// A storefront account.
///
/// `Debug` is implemented by hand so the password hash never reaches logs.
#[derive(Clone)]
pub struct User {
    /// Unique user ID.
    pub id: UserId,
    /// Email address (lowercase).
    pub email: Email,
    /// Argon2 PHC string, absent for accounts created through an external identity.
    pub password_hash: Option<String>,
    pub first_name: String,
    pub last_name: Option<String>,
    pub profile_image_url: Option<String>,
    /// Google account subject, if linked.
    pub google_id: Option<String>,
    /// GitHub account id, if linked.
    pub github_id: Option<String>,
    /// Payment processor customer reference.
    pub payment_customer_id: Option<String>,
    /// Payment processor subscription reference.
    pub payment_subscription_id: Option<String>,
    /// Global unlock: entitled to every active product.
    pub has_paid: bool,
    pub is_admin: bool,
    pub is_verified: bool,
    /// When the user was created.
    pub created_at: DateTime<Utc>,
    /// When the user was last updated.
    pub updated_at: DateTime<Utc>,
}

impl std::fmt::Debug for User {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("User")
            .field("id", &self.id)
            .field("email", &self.email)
            .field(
                "password_hash",
                &self.password_hash.as_ref().map(|_| "[REDACTED]"),
            )
            .field("has_paid", &self.has_paid)
            .field("is_admin", &self.is_admin)
            .finish_non_exhaustive()
    }
}

/// Fields required to create a user.
#[derive(Clone)]
pub struct NewUser {
    pub email: Email,
    pub password_hash: Option<String>,
    pub first_name: String,
    pub last_name: Option<String>,
}

/// External identity providers an account can be linked to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExternalProvider {
    Google,
    GitHub,
}

impl ExternalProvider {
    /// Column holding this provider's id.
    #[must_use]
    pub const fn column(self) -> &'static str {
        match self {
            Self::Google => "google_id",
            Self::GitHub => "github_id",
        }
    }
}

/// Profile fields safe to return to clients.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: UserId,
    pub email: Email,
    pub first_name: String,
    pub last_name: Option<String>,
    pub profile_image_url: Option<String>,
    pub has_paid: bool,
    pub is_admin: bool,
    pub is_verified: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&User> for PublicUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            profile_image_url: user.profile_image_url.clone(),
            has_paid: user.has_paid,
            is_admin: user.is_admin,
            is_verified: user.is_verified,
            created_at: user.created_at,
        }
    }
}

//! What a login session remembers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shelf_core::{Email, UserId};

use super::User;

/// Identity written into the session at login.
///
/// Flags such as `is_admin` and `has_paid` are not stored; they are
/// re-read from storage on every request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrentUser {
    pub id: UserId,
    pub email: Email,
    pub signed_in_at: DateTime<Utc>,
}

impl From<&User> for CurrentUser {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            signed_in_at: Utc::now(),
        }
    }
}

/// Session record keys.
pub mod keys {
    pub const CURRENT_USER: &str = "shelf.user";
}

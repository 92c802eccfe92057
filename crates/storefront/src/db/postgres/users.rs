//! User repository for database operations.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use shelf_core::{Email, UserId};

use crate::db::{RepositoryError, conflict_on_unique};
use crate::models::{ExternalProvider, NewUser, User};

macro_rules! user_columns {
    () => {
        "id, email, password_hash, first_name, last_name, profile_image_url, \
         google_id, github_id, payment_customer_id, payment_subscription_id, \
         has_paid, is_admin, is_verified, created_at, updated_at"
    };
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i32,
    email: String,
    password_hash: Option<String>,
    first_name: String,
    last_name: Option<String>,
    profile_image_url: Option<String>,
    google_id: Option<String>,
    github_id: Option<String>,
    payment_customer_id: Option<String>,
    payment_subscription_id: Option<String>,
    has_paid: bool,
    is_admin: bool,
    is_verified: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = RepositoryError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&row.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;

        Ok(Self {
            id: UserId::new(row.id),
            email,
            password_hash: row.password_hash,
            first_name: row.first_name,
            last_name: row.last_name,
            profile_image_url: row.profile_image_url,
            google_id: row.google_id,
            github_id: row.github_id,
            payment_customer_id: row.payment_customer_id,
            payment_subscription_id: row.payment_subscription_id,
            has_paid: row.has_paid,
            is_admin: row.is_admin,
            is_verified: row.is_verified,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_user(row: Option<UserRow>) -> Result<Option<User>, RepositoryError> {
    row.map(User::try_from).transpose()
}

/// Repository for user database operations.
pub struct UserRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> UserRepository<'a> {
    /// Create a new user repository.
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a user by their ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if the email in the database is invalid.
    pub async fn get_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(concat!(
            "SELECT ",
            user_columns!(),
            r#" FROM shelf."user" WHERE id = $1"#
        ))
        .bind(id.as_i32())
        .fetch_optional(self.pool)
        .await?;

        into_user(row)
    }

    /// Get a user by their email address.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if the email in the database is invalid.
    pub async fn get_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(concat!(
            "SELECT ",
            user_columns!(),
            r#" FROM shelf."user" WHERE email = $1"#
        ))
        .bind(email.as_str())
        .fetch_optional(self.pool)
        .await?;

        into_user(row)
    }

    /// Create a new user.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the email already exists.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn create(&self, new: &NewUser) -> Result<User, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(concat!(
            r#"INSERT INTO shelf."user" (email, password_hash, first_name, last_name)
               VALUES ($1, $2, $3, $4)
               RETURNING "#,
            user_columns!()
        ))
        .bind(new.email.as_str())
        .bind(new.password_hash.as_deref())
        .bind(&new.first_name)
        .bind(new.last_name.as_deref())
        .fetch_one(self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "email"))?;

        User::try_from(row)
    }

    /// Flip the global unlock flag.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn mark_paid(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(concat!(
            r#"UPDATE shelf."user" SET has_paid = TRUE, updated_at = NOW()
               WHERE id = $1
               RETURNING "#,
            user_columns!()
        ))
        .bind(id.as_i32())
        .fetch_optional(self.pool)
        .await?;

        into_user(row)
    }

    /// Grant or revoke admin rights.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn set_admin(
        &self,
        email: &Email,
        is_admin: bool,
    ) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(concat!(
            r#"UPDATE shelf."user" SET is_admin = $2, updated_at = NOW()
               WHERE email = $1
               RETURNING "#,
            user_columns!()
        ))
        .bind(email.as_str())
        .bind(is_admin)
        .fetch_optional(self.pool)
        .await?;

        into_user(row)
    }

    /// Find the user linked to an external identity.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_external_identity(
        &self,
        provider: ExternalProvider,
        external_id: &str,
    ) -> Result<Option<User>, RepositoryError> {
        let sql = match provider {
            ExternalProvider::Google => concat!(
                "SELECT ",
                user_columns!(),
                r#" FROM shelf."user" WHERE google_id = $1"#
            ),
            ExternalProvider::GitHub => concat!(
                "SELECT ",
                user_columns!(),
                r#" FROM shelf."user" WHERE github_id = $1"#
            ),
        };
        let row = sqlx::query_as::<_, UserRow>(sql)
            .bind(external_id)
            .fetch_optional(self.pool)
            .await?;

        into_user(row)
    }

    /// Attach an external identity to a user.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if another user holds that identity.
    pub async fn link_external_identity(
        &self,
        id: UserId,
        provider: ExternalProvider,
        external_id: &str,
    ) -> Result<Option<User>, RepositoryError> {
        let sql = match provider {
            ExternalProvider::Google => concat!(
                r#"UPDATE shelf."user" SET google_id = $2, updated_at = NOW()
                   WHERE id = $1 RETURNING "#,
                user_columns!()
            ),
            ExternalProvider::GitHub => concat!(
                r#"UPDATE shelf."user" SET github_id = $2, updated_at = NOW()
                   WHERE id = $1 RETURNING "#,
                user_columns!()
            ),
        };
        let row = sqlx::query_as::<_, UserRow>(sql)
            .bind(id.as_i32())
            .bind(external_id)
            .fetch_optional(self.pool)
            .await
            .map_err(|e| conflict_on_unique(e, provider.column()))?;

        into_user(row)
    }

    /// Count all accounts.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn count(&self) -> Result<i64, RepositoryError> {
        let count: i64 = sqlx::query_scalar(r#"SELECT COUNT(*) FROM shelf."user""#)
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }
}

//! Lead repository for database operations.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use shelf_core::{Email, LeadId};

use crate::db::{RepositoryError, conflict_on_unique};
use crate::models::{Lead, NewLead};

#[derive(sqlx::FromRow)]
struct LeadRow {
    id: i32,
    first_name: String,
    email: String,
    source: String,
    is_converted: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<LeadRow> for Lead {
    type Error = RepositoryError;

    fn try_from(row: LeadRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&row.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;

        Ok(Self {
            id: LeadId::new(row.id),
            first_name: row.first_name,
            email,
            source: row.source,
            is_converted: row.is_converted,
            created_at: row.created_at,
        })
    }
}

/// Repository for lead database operations.
pub struct LeadRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> LeadRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Insert a lead.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the email was already captured.
    pub async fn create(&self, new: &NewLead) -> Result<Lead, RepositoryError> {
        let row = sqlx::query_as::<_, LeadRow>(
            "INSERT INTO shelf.lead (first_name, email, source)
             VALUES ($1, $2, $3)
             RETURNING id, first_name, email, source, is_converted, created_at",
        )
        .bind(&new.first_name)
        .bind(new.email.as_str())
        .bind(&new.source)
        .fetch_one(self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "lead email"))?;

        Lead::try_from(row)
    }

    /// Get a lead by email.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_email(&self, email: &Email) -> Result<Option<Lead>, RepositoryError> {
        let row = sqlx::query_as::<_, LeadRow>(
            "SELECT id, first_name, email, source, is_converted, created_at
             FROM shelf.lead WHERE email = $1",
        )
        .bind(email.as_str())
        .fetch_optional(self.pool)
        .await?;

        row.map(Lead::try_from).transpose()
    }

    /// Mark the lead with this email as converted.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn mark_converted(&self, email: &Email) -> Result<bool, RepositoryError> {
        let result = sqlx::query("UPDATE shelf.lead SET is_converted = TRUE WHERE email = $1")
            .bind(email.as_str())
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// All leads, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self) -> Result<Vec<Lead>, RepositoryError> {
        let rows = sqlx::query_as::<_, LeadRow>(
            "SELECT id, first_name, email, source, is_converted, created_at
             FROM shelf.lead ORDER BY created_at DESC, id DESC",
        )
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(Lead::try_from).collect()
    }

    /// Count captured leads.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn count(&self) -> Result<i64, RepositoryError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM shelf.lead")
            .fetch_one(self.pool)
            .await?;
        Ok(count)
    }
}

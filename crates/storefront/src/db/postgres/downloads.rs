//! Download audit repository.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use shelf_core::{DownloadId, ProductId, UserId};

use crate::db::RepositoryError;
use crate::models::{Download, NewDownload};

#[derive(sqlx::FromRow)]
struct DownloadRow {
    id: i32,
    user_id: i32,
    product_id: i32,
    download_url: String,
    created_at: DateTime<Utc>,
}

impl From<DownloadRow> for Download {
    fn from(row: DownloadRow) -> Self {
        Self {
            id: DownloadId::new(row.id),
            user_id: UserId::new(row.user_id),
            product_id: ProductId::new(row.product_id),
            download_url: row.download_url,
            created_at: row.created_at,
        }
    }
}

/// Repository for the append-only download audit.
pub struct DownloadRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> DownloadRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Append an audit row.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn record(&self, new: &NewDownload) -> Result<Download, RepositoryError> {
        let row = sqlx::query_as::<_, DownloadRow>(
            "INSERT INTO shelf.download (user_id, product_id, download_url)
             VALUES ($1, $2, $3)
             RETURNING id, user_id, product_id, download_url, created_at",
        )
        .bind(new.user_id.as_i32())
        .bind(new.product_id.as_i32())
        .bind(&new.download_url)
        .fetch_one(self.pool)
        .await?;

        Ok(row.into())
    }

    /// A user's downloads, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn for_user(&self, user_id: UserId) -> Result<Vec<Download>, RepositoryError> {
        let rows = sqlx::query_as::<_, DownloadRow>(
            "SELECT id, user_id, product_id, download_url, created_at
             FROM shelf.download WHERE user_id = $1
             ORDER BY created_at DESC, id DESC",
        )
        .bind(user_id.as_i32())
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Download::from).collect())
    }
}

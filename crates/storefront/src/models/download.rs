//! Download audit records.

use chrono::{DateTime, Utc};
use serde::Serialize;

use shelf_core::{DownloadId, ProductId, UserId};

/// One successful delivery. Append-only.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Download {
    pub id: DownloadId,
    pub user_id: UserId,
    pub product_id: ProductId,
    pub download_url: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDownload {
    pub user_id: UserId,
    pub product_id: ProductId,
    pub download_url: String,
}

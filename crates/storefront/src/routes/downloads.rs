//! Product archive download.

use axum::{
    body::Body,
    extract::State,
    http::{
        HeaderValue,
        header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
};
use tracing::instrument;

use shelf_core::ProductId;

use super::ApiPath;
use crate::error::{Result, add_breadcrumb};
use crate::middleware::RequireUser;
use crate::services::DeliveryService;
use crate::state::AppState;

/// Stream a purchased archive.
///
/// 401 without a session, 403 without a grant, 404 when the archive is
/// missing.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn download(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    ApiPath(product_id): ApiPath<ProductId>,
) -> Result<Response> {
    let delivery = DeliveryService::new(state.shared_storage(), state.files())
        .open_download(user.id, product_id)
        .await?;

    add_breadcrumb(
        "download",
        "Started download",
        Some(&[("product_id", &product_id.to_string())]),
    );

    let disposition = HeaderValue::from_str(&format!(
        "attachment; filename=\"{}\"",
        delivery.filename
    ))
    .unwrap_or_else(|_| HeaderValue::from_static("attachment; filename=\"download.zip\""));

    Ok((
        [
            (CONTENT_TYPE, HeaderValue::from_static("application/zip")),
            (CONTENT_DISPOSITION, disposition),
            (CONTENT_LENGTH, HeaderValue::from(delivery.content_length)),
        ],
        Body::from_stream(delivery.body),
    )
        .into_response())
}

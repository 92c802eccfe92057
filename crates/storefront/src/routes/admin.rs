//! Admin route handlers.
//!
//! Every handler requires [`RequireAdmin`]: anonymous callers get 401,
//! signed-in non-admins 403.

use std::path::Path;

use axum::{
    extract::{
        Multipart, State,
        multipart::{Field, MultipartError},
    },
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::instrument;

use shelf_core::{CategoryId, OrderId, OrderStatus, ProductId, SubcategoryId};

use super::{ApiJson, ApiPath};
use crate::db::StoreStats;
use crate::error::{AppError, Result};
use crate::files::generate_archive_name;
use crate::middleware::RequireAdmin;
use crate::models::{
    Category, CategoryUpdate, Lead, NewCategory, NewProduct, NewSubcategory, Order, Product,
    ProductUpdate, Subcategory, SubcategoryUpdate,
};
use crate::services::{CatalogService, LeadService, OrderRecorder};
use crate::state::AppState;

// =============================================================================
// Reporting
// =============================================================================

/// Headline numbers for the dashboard.
pub async fn stats(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
) -> Result<ApiJson<StoreStats>> {
    Ok(ApiJson(state.storage().stats().await?))
}

pub async fn orders(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
) -> Result<ApiJson<Vec<Order>>> {
    Ok(ApiJson(OrderRecorder::new(state.storage()).all_orders().await?))
}

#[derive(Debug, Deserialize)]
pub struct OrderStatusRequest {
    pub status: OrderStatus,
}

/// Set an order's status, e.g. to record a refund.
#[instrument(skip(state, admin), fields(admin_id = %admin.id))]
pub async fn update_order_status(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    ApiPath(order_id): ApiPath<OrderId>,
    ApiJson(request): ApiJson<OrderStatusRequest>,
) -> Result<ApiJson<Order>> {
    Ok(ApiJson(
        OrderRecorder::new(state.storage())
            .update_order_status(order_id, request.status)
            .await?,
    ))
}

pub async fn leads(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
) -> Result<ApiJson<Vec<Lead>>> {
    Ok(ApiJson(LeadService::new(state.storage()).list_leads().await?))
}

// =============================================================================
// Catalog
// =============================================================================

/// All products, including inactive ones.
pub async fn products(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
) -> Result<ApiJson<Vec<Product>>> {
    Ok(ApiJson(
        CatalogService::new(state.storage()).all_products().await?,
    ))
}

pub async fn create_product(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    ApiJson(new): ApiJson<NewProduct>,
) -> Result<(StatusCode, ApiJson<Product>)> {
    let product = CatalogService::new(state.storage())
        .create_product(new)
        .await?;
    Ok((StatusCode::CREATED, ApiJson(product)))
}

pub async fn update_product(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    ApiPath(id): ApiPath<ProductId>,
    ApiJson(update): ApiJson<ProductUpdate>,
) -> Result<ApiJson<Product>> {
    Ok(ApiJson(
        CatalogService::new(state.storage())
            .update_product(id, update)
            .await?,
    ))
}

/// Soft delete: the product stays in order history but is hidden and
/// no longer downloadable.
pub async fn deactivate_product(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    ApiPath(id): ApiPath<ProductId>,
) -> Result<ApiJson<Product>> {
    Ok(ApiJson(
        CatalogService::new(state.storage())
            .deactivate_product(id)
            .await?,
    ))
}

pub async fn categories(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
) -> Result<ApiJson<Vec<Category>>> {
    Ok(ApiJson(
        CatalogService::new(state.storage()).all_categories().await?,
    ))
}

pub async fn create_category(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    ApiJson(new): ApiJson<NewCategory>,
) -> Result<(StatusCode, ApiJson<Category>)> {
    let category = CatalogService::new(state.storage())
        .create_category(new)
        .await?;
    Ok((StatusCode::CREATED, ApiJson(category)))
}

pub async fn update_category(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    ApiPath(id): ApiPath<CategoryId>,
    ApiJson(update): ApiJson<CategoryUpdate>,
) -> Result<ApiJson<Category>> {
    Ok(ApiJson(
        CatalogService::new(state.storage())
            .update_category(id, update)
            .await?,
    ))
}

pub async fn create_subcategory(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    ApiJson(new): ApiJson<NewSubcategory>,
) -> Result<(StatusCode, ApiJson<Subcategory>)> {
    let subcategory = CatalogService::new(state.storage())
        .create_subcategory(new)
        .await?;
    Ok((StatusCode::CREATED, ApiJson(subcategory)))
}

pub async fn update_subcategory(
    State(state): State<AppState>,
    RequireAdmin(_): RequireAdmin,
    ApiPath(id): ApiPath<SubcategoryId>,
    ApiJson(update): ApiJson<SubcategoryUpdate>,
) -> Result<ApiJson<Subcategory>> {
    Ok(ApiJson(
        CatalogService::new(state.storage())
            .update_subcategory(id, update)
            .await?,
    ))
}

// =============================================================================
// Upload
// =============================================================================

/// Stored archive details, used as `file` when creating or updating a product.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub file_name: String,
    pub original_name: String,
    pub size: u64,
}

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge
    } else {
        AppError::BadRequest(err.body_text())
    }
}

fn is_zip(original_name: &str, content_type: Option<&str>) -> bool {
    Path::new(original_name)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"))
        || content_type == Some("application/zip")
}

/// Copy one field to disk, refusing anything over `max` bytes.
async fn copy_field(field: &mut Field<'_>, file: &mut File, max: usize) -> Result<u64> {
    let mut size: usize = 0;
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        size = size.saturating_add(chunk.len());
        if size > max {
            return Err(AppError::PayloadTooLarge);
        }
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    u64::try_from(size).map_err(|_| AppError::PayloadTooLarge)
}

/// Accept a product archive in the multipart field `file`.
///
/// The archive is streamed to disk under a generated name; a partial file
/// is removed if the upload fails or runs over the size limit.
#[instrument(skip(state, admin, multipart), fields(admin_id = %admin.id))]
pub async fn upload(
    State(state): State<AppState>,
    RequireAdmin(admin): RequireAdmin,
    mut multipart: Multipart,
) -> Result<(StatusCode, ApiJson<UploadedFile>)> {
    let max = state.config().max_upload_bytes;

    while let Some(mut field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }

        let original_name = field.file_name().unwrap_or_default().to_owned();
        if !is_zip(&original_name, field.content_type()) {
            return Err(AppError::BadRequest(
                "Only .zip archives are accepted".to_owned(),
            ));
        }

        state.files().ensure_root().await?;
        let file_name = generate_archive_name();
        let mut file = state.files().create(&file_name).await?;

        let size = match copy_field(&mut field, &mut file, max).await {
            Ok(size) => size,
            Err(e) => {
                drop(file);
                if let Err(cleanup) = state.files().remove(&file_name).await {
                    tracing::error!(error = %cleanup, %file_name, "Failed to remove partial upload");
                }
                return Err(e);
            }
        };

        tracing::info!(%file_name, %original_name, size, "Archive uploaded");
        return Ok((
            StatusCode::CREATED,
            ApiJson(UploadedFile {
                file_name,
                original_name,
                size,
            }),
        ));
    }

    Err(AppError::BadRequest("No file uploaded".to_owned()))
}

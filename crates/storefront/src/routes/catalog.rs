//! Public catalog route handlers.

use axum::extract::State;

use shelf_core::{CategoryId, ProductId};

use super::{ApiJson, ApiPath};
use crate::error::Result;
use crate::models::{Category, Subcategory};
use crate::services::{CatalogProduct, CatalogService};
use crate::state::AppState;

/// Active products with category names.
pub async fn products(State(state): State<AppState>) -> Result<ApiJson<Vec<CatalogProduct>>> {
    Ok(ApiJson(
        CatalogService::new(state.storage()).list_products().await?,
    ))
}

/// One active product.
pub async fn product(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<ProductId>,
) -> Result<ApiJson<CatalogProduct>> {
    Ok(ApiJson(
        CatalogService::new(state.storage()).get_product(id).await?,
    ))
}

pub async fn categories(State(state): State<AppState>) -> Result<ApiJson<Vec<Category>>> {
    Ok(ApiJson(
        CatalogService::new(state.storage()).list_categories().await?,
    ))
}

pub async fn subcategories(State(state): State<AppState>) -> Result<ApiJson<Vec<Subcategory>>> {
    Ok(ApiJson(
        CatalogService::new(state.storage())
            .list_subcategories(None)
            .await?,
    ))
}

pub async fn subcategories_for_category(
    State(state): State<AppState>,
    ApiPath(category_id): ApiPath<CategoryId>,
) -> Result<ApiJson<Vec<Subcategory>>> {
    Ok(ApiJson(
        CatalogService::new(state.storage())
            .list_subcategories(Some(category_id))
            .await?,
    ))
}

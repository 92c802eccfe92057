//! Buyer dashboard route handlers.
//!
//! Everything here is scoped to the signed-in user.

use axum::extract::State;

use super::ApiJson;
use crate::error::Result;
use crate::middleware::RequireUser;
use crate::models::{Download, Order, Product};
use crate::services::{EntitlementResolver, OrderRecorder};
use crate::state::AppState;

/// The caller's orders, newest first.
pub async fn orders(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
) -> Result<ApiJson<Vec<Order>>> {
    Ok(ApiJson(
        OrderRecorder::new(state.storage())
            .orders_for_user(user.id)
            .await?,
    ))
}

/// The caller's download history, newest first.
pub async fn downloads(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
) -> Result<ApiJson<Vec<Download>>> {
    Ok(ApiJson(state.storage().downloads_for_user(user.id).await?))
}

/// Products the caller can download right now.
pub async fn products(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
) -> Result<ApiJson<Vec<Product>>> {
    Ok(ApiJson(
        EntitlementResolver::new(state.storage())
            .entitled_products(&user)
            .await?,
    ))
}

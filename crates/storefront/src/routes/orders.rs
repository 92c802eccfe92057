//! Client-confirmed payment routes.
//!
//! These trust the caller's word that a payment went through. They exist for
//! clients that confirm payments in the browser and can be switched off with
//! `STOREFRONT_TRUST_CLIENT_PAYMENTS=false`, leaving the signed webhook as
//! the only way to record a purchase.

use axum::{extract::State, http::StatusCode};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use shelf_core::ProductId;

use super::ApiJson;
use crate::error::{AppError, Result};
use crate::middleware::RequireUser;
use crate::models::{Order, PublicUser};
use crate::services::OrderRecorder;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub product_id: ProductId,
    pub amount: Decimal,
    #[serde(default)]
    pub external_payment_ref: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MarkPaidResponse {
    pub success: bool,
    pub user: PublicUser,
}

fn ensure_trusted(state: &AppState) -> Result<()> {
    if state.config().trust_client_payments {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "Client-confirmed payments are disabled".to_owned(),
        ))
    }
}

/// Record a completed order for the caller.
#[instrument(skip(state, user, request), fields(user_id = %user.id))]
pub async fn create_order(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
    ApiJson(request): ApiJson<CreateOrderRequest>,
) -> Result<(StatusCode, ApiJson<Order>)> {
    ensure_trusted(&state)?;
    let order = OrderRecorder::new(state.storage())
        .record_completed_order(
            user.id,
            request.product_id,
            request.amount,
            request.external_payment_ref,
        )
        .await?;
    Ok((StatusCode::CREATED, ApiJson(order)))
}

/// Unlock the whole catalog for the caller.
#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn mark_paid(
    State(state): State<AppState>,
    RequireUser(user): RequireUser,
) -> Result<ApiJson<MarkPaidResponse>> {
    ensure_trusted(&state)?;
    let user = OrderRecorder::new(state.storage())
        .mark_user_paid(user.id)
        .await?;
    Ok(ApiJson(MarkPaidResponse {
        success: true,
        user: PublicUser::from(&user),
    }))
}

//! Payment processor webhook endpoint.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
};
use serde_json::{Value, json};

use super::ApiJson;
use crate::error::{AppError, Result};
use crate::services::PaymentWebhooks;
use crate::services::payments::SIGNATURE_HEADER;
use crate::state::AppState;

/// Verify and apply a signed payment event.
///
/// The raw body is read as bytes so the signature covers exactly what was
/// sent.
pub async fn payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<ApiJson<Value>> {
    let secret = state
        .config()
        .payment_webhook_secret
        .as_ref()
        .ok_or_else(|| {
            AppError::ServiceUnavailable("Payment webhooks are not configured".to_owned())
        })?;

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let outcome = PaymentWebhooks::new(state.storage(), secret)
        .handle(signature, &body)
        .await?;

    Ok(ApiJson(json!({ "received": true, "result": outcome })))
}

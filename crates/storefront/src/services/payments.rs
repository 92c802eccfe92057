//! Payment processor webhooks.
//!
//! The processor signs every delivery with HMAC-SHA256 over
//! `"<timestamp>.<raw body>"` and sends `Shelf-Signature: t=<unix>,v1=<hex>`.
//! Deliveries older or newer than five minutes are refused. Several `v1`
//! entries may be present while the secret is being rotated; any match passes.

use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;
use tracing::instrument;

use shelf_core::{OrderId, OrderStatus, ProductId, UserId};

use super::orders::{OrderError, OrderRecorder};
use crate::db::{RepositoryError, Storage};

/// Header carrying the delivery signature.
pub const SIGNATURE_HEADER: &str = "shelf-signature";

/// Maximum clock difference accepted, in seconds.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

type HmacSha256 = Hmac<Sha256>;

/// Errors from webhook handling.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("missing signature header")]
    MissingSignature,

    #[error("malformed signature header: {0}")]
    MalformedSignature(&'static str),

    #[error("signature timestamp outside tolerance")]
    StaleTimestamp,

    #[error("signature mismatch")]
    SignatureMismatch,

    #[error("invalid event payload: {0}")]
    InvalidPayload(String),

    #[error("order error: {0}")]
    Order(#[from] OrderError),
}

impl From<RepositoryError> for WebhookError {
    fn from(err: RepositoryError) -> Self {
        Self::Order(OrderError::Repository(err))
    }
}

/// `payment.succeeded` data.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentSucceeded {
    pub user_id: UserId,
    pub product_id: ProductId,
    /// Amount charged, as a decimal string.
    pub amount: Decimal,
    /// Processor payment id, stored as the order's external reference.
    pub reference: String,
    /// Also grant the whole catalog.
    #[serde(default)]
    pub unlock_all: bool,
}

/// `payment.refunded` data.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentRefunded {
    pub reference: String,
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// What a delivery changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum WebhookOutcome {
    #[serde(rename_all = "camelCase")]
    OrderRecorded { order_id: OrderId, unlocked: bool },
    #[serde(rename_all = "camelCase")]
    OrderRefunded { order_id: OrderId },
    /// Refund for a payment never recorded here.
    UnknownReference,
    /// Event type this storefront does not act on.
    Ignored,
}

/// Compute the `Shelf-Signature` header value for `body` at `timestamp`.
#[must_use]
pub fn sign(secret: &SecretString, timestamp: i64, body: &[u8]) -> String {
    format!(
        "t={timestamp},v1={}",
        hex::encode(mac(secret, timestamp, body).finalize().into_bytes())
    )
}

fn mac(secret: &SecretString, timestamp: i64, body: &[u8]) -> HmacSha256 {
    // HMAC accepts keys of any length.
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.expose_secret().as_bytes())
        .unwrap_or_else(|_| unreachable!());
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body);
    mac
}

/// Check a `Shelf-Signature` header against `body` at time `now`.
///
/// # Errors
///
/// Returns the first problem found with the header, timestamp or digest.
pub fn verify_signature(
    secret: &SecretString,
    header: &str,
    body: &[u8],
    now: i64,
) -> Result<(), WebhookError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp: i64 = timestamp
        .ok_or(WebhookError::MalformedSignature("no timestamp"))?
        .parse()
        .map_err(|_| WebhookError::MalformedSignature("invalid timestamp"))?;
    if signatures.is_empty() {
        return Err(WebhookError::MalformedSignature("no v1 signature"));
    }
    if now.abs_diff(timestamp) > SIGNATURE_TOLERANCE_SECS.unsigned_abs() {
        return Err(WebhookError::StaleTimestamp);
    }

    let expected = mac(secret, timestamp, body);
    let matched = signatures.into_iter().any(|candidate| {
        hex::decode(candidate).is_ok_and(|bytes| expected.clone().verify_slice(&bytes).is_ok())
    });

    if matched {
        Ok(())
    } else {
        Err(WebhookError::SignatureMismatch)
    }
}

/// Verifies and applies processor events.
pub struct PaymentWebhooks<'a> {
    storage: &'a dyn Storage,
    secret: &'a SecretString,
}

impl<'a> PaymentWebhooks<'a> {
    #[must_use]
    pub const fn new(storage: &'a dyn Storage, secret: &'a SecretString) -> Self {
        Self { storage, secret }
    }

    /// Verify a delivery and apply it.
    ///
    /// # Errors
    ///
    /// Signature problems, unparseable payloads and failed order writes.
    pub async fn handle(
        &self,
        signature: Option<&str>,
        body: &[u8],
    ) -> Result<WebhookOutcome, WebhookError> {
        self.handle_at(signature, body, chrono::Utc::now().timestamp()).await
    }

    /// [`Self::handle`] with an explicit clock.
    ///
    /// # Errors
    ///
    /// Same as [`Self::handle`].
    #[instrument(skip(self, signature, body), fields(body_len = body.len()))]
    pub async fn handle_at(
        &self,
        signature: Option<&str>,
        body: &[u8],
        now: i64,
    ) -> Result<WebhookOutcome, WebhookError> {
        let header = signature.ok_or(WebhookError::MissingSignature)?;
        if let Err(e) = verify_signature(self.secret, header, body, now) {
            tracing::warn!(error = %e, "Rejected payment webhook");
            return Err(e);
        }

        let envelope: Envelope = serde_json::from_slice(body)
            .map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;

        match envelope.kind.as_str() {
            "payment.succeeded" => {
                let event: PaymentSucceeded = serde_json::from_value(envelope.data)
                    .map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;
                self.payment_succeeded(event).await
            }
            "payment.refunded" => {
                let event: PaymentRefunded = serde_json::from_value(envelope.data)
                    .map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;
                self.payment_refunded(event).await
            }
            other => {
                tracing::debug!(event_type = other, "Ignoring payment event");
                Ok(WebhookOutcome::Ignored)
            }
        }
    }

    async fn payment_succeeded(
        &self,
        event: PaymentSucceeded,
    ) -> Result<WebhookOutcome, WebhookError> {
        let recorder = OrderRecorder::new(self.storage);
        let order = recorder
            .record_completed_order(
                event.user_id,
                event.product_id,
                event.amount,
                Some(event.reference),
            )
            .await?;
        if event.unlock_all {
            recorder.mark_user_paid(event.user_id).await?;
        }

        Ok(WebhookOutcome::OrderRecorded {
            order_id: order.id,
            unlocked: event.unlock_all,
        })
    }

    async fn payment_refunded(
        &self,
        event: PaymentRefunded,
    ) -> Result<WebhookOutcome, WebhookError> {
        let Some(order) = self
            .storage
            .find_order_by_external_ref(&event.reference)
            .await?
        else {
            tracing::warn!(reference = %event.reference, "Refund for unknown payment");
            return Ok(WebhookOutcome::UnknownReference);
        };

        OrderRecorder::new(self.storage)
            .update_order_status(order.id, OrderStatus::Refunded)
            .await?;

        Ok(WebhookOutcome::OrderRefunded { order_id: order.id })
    }
}

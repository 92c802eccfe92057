//! Order recording.
//!
//! Orders are written once a payment is confirmed. The amount recorded is
//! what the payment event says was charged, never the live product price.

use rust_decimal::Decimal;
use thiserror::Error;
use tracing::instrument;

use shelf_core::{OrderId, OrderStatus, Price, ProductId, UserId};

use super::leads::LeadService;
use crate::db::{RepositoryError, Storage};
use crate::error::ValidationErrors;
use crate::models::{NewOrder, Order, User};

/// Errors from order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    #[error("invalid order: {0}")]
    Validation(ValidationErrors),

    #[error("product {0} not found")]
    ProductNotFound(ProductId),

    #[error("user {0} not found")]
    UserNotFound(UserId),

    #[error("order {0} not found")]
    OrderNotFound(OrderId),

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Answer a repeated payment reference with the order it already produced,
/// provided it names the same user and product.
fn reuse_recorded(
    existing: Order,
    user_id: UserId,
    product_id: ProductId,
) -> Result<Order, OrderError> {
    if existing.user_id == user_id && existing.product_id == product_id {
        tracing::info!(order_id = %existing.id, "Payment already recorded");
        Ok(existing)
    } else {
        Err(OrderError::Validation(ValidationErrors::single(
            "externalPaymentRef",
            "Payment reference already used",
        )))
    }
}

/// Writes orders and payment flags.
pub struct OrderRecorder<'a> {
    storage: &'a dyn Storage,
}

impl<'a> OrderRecorder<'a> {
    #[must_use]
    pub const fn new(storage: &'a dyn Storage) -> Self {
        Self { storage }
    }

    /// Persist a completed order for a confirmed payment.
    ///
    /// A repeated `external_ref` returns the order already recorded for it,
    /// so processor retries do not create duplicates. After a new order is
    /// written the buyer's lead, if any, is marked converted; that step is
    /// best-effort.
    ///
    /// # Errors
    ///
    /// - `OrderError::Validation` for an amount that is negative, finer than
    ///   cents or too large, or a reference reused for a different user or
    ///   product
    /// - `OrderError::UserNotFound` / `OrderError::ProductNotFound`
    #[instrument(skip(self))]
    pub async fn record_completed_order(
        &self,
        user_id: UserId,
        product_id: ProductId,
        amount: Decimal,
        external_ref: Option<String>,
    ) -> Result<Order, OrderError> {
        let amount = Price::new(amount).map_err(|e| {
            OrderError::Validation(ValidationErrors::single("amount", e.to_string()))
        })?;
        let external_ref = external_ref
            .map(|r| r.trim().to_owned())
            .filter(|r| !r.is_empty());

        let user = self
            .storage
            .find_user_by_id(user_id)
            .await?
            .ok_or(OrderError::UserNotFound(user_id))?;
        if self.storage.find_product(product_id).await?.is_none() {
            return Err(OrderError::ProductNotFound(product_id));
        }

        if let Some(reference) = external_ref.as_deref()
            && let Some(existing) = self.storage.find_order_by_external_ref(reference).await?
        {
            return reuse_recorded(existing, user_id, product_id);
        }

        let created = self
            .storage
            .create_order(NewOrder {
                user_id,
                product_id,
                amount,
                status: OrderStatus::Completed,
                external_ref: external_ref.clone(),
            })
            .await;
        let order = match (created, external_ref.as_deref()) {
            (Ok(order), _) => order,
            // A concurrent delivery of the same event inserted first.
            (Err(RepositoryError::Conflict(_)), Some(reference)) => {
                let existing = self
                    .storage
                    .find_order_by_external_ref(reference)
                    .await?
                    .ok_or_else(|| {
                        RepositoryError::DataCorruption(format!(
                            "order reference {reference} conflicted but is not stored"
                        ))
                    })?;
                return reuse_recorded(existing, user_id, product_id);
            }
            (Err(e), _) => return Err(e.into()),
        };
        tracing::info!(order_id = %order.id, %amount, "Order recorded");

        match LeadService::new(self.storage).convert_lead(&user.email).await {
            Ok(true) => tracing::debug!(%user_id, "Lead converted"),
            Ok(false) => {}
            Err(e) => tracing::warn!(error = %e, %user_id, "Failed to convert lead"),
        }

        Ok(order)
    }

    /// Grant the user access to the whole catalog.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::UserNotFound` if no such user exists.
    #[instrument(skip(self))]
    pub async fn mark_user_paid(&self, user_id: UserId) -> Result<User, OrderError> {
        let user = self
            .storage
            .mark_user_paid(user_id)
            .await?
            .ok_or(OrderError::UserNotFound(user_id))?;
        tracing::info!(%user_id, "User marked as paid");
        Ok(user)
    }

    /// Change an order's status, e.g. to `refunded`.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::OrderNotFound` if no such order exists.
    #[instrument(skip(self))]
    pub async fn update_order_status(
        &self,
        order_id: OrderId,
        status: OrderStatus,
    ) -> Result<Order, OrderError> {
        let order = self
            .storage
            .update_order_status(order_id, status)
            .await?
            .ok_or(OrderError::OrderNotFound(order_id))?;
        tracing::info!(%order_id, %status, "Order status updated");
        Ok(order)
    }

    /// A user's orders, newest first.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Repository` if storage fails.
    pub async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>, OrderError> {
        Ok(self.storage.orders_for_user(user_id).await?)
    }

    /// Every order, newest first.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Repository` if storage fails.
    pub async fn all_orders(&self) -> Result<Vec<Order>, OrderError> {
        Ok(self.storage.list_orders().await?)
    }
}

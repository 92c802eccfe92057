//! Order domain types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use shelf_core::{OrderId, OrderStatus, Price, ProductId, UserId};

/// Durable record of a payment for one product by one user.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub product_id: ProductId,
    /// Amount charged, taken from the payment event.
    pub amount: Price,
    pub status: OrderStatus,
    /// Payment processor transaction reference.
    pub external_ref: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: UserId,
    pub product_id: ProductId,
    pub amount: Price,
    pub status: OrderStatus,
    pub external_ref: Option<String>,
}

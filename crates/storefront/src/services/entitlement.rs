//! Download entitlement.
//!
//! Whether a user may download a product is derived from current rows on
//! every call. Checks short-circuit in this order:
//!
//! 1. unknown user or product: no grant
//! 2. inactive product: no grant, whatever else holds
//! 3. admin, then global unlock (`has_paid`)
//! 4. the most recent settled order for the pair grants only if completed
//!
//! Pending and failed orders neither grant nor revoke.

use serde::Serialize;
use tracing::instrument;

use shelf_core::{OrderId, ProductId, UserId};

use crate::db::{RepositoryError, Storage};
use crate::models::{Product, User};

/// Why a download is allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum EntitlementGrant {
    /// Administrators can fetch every active product.
    Admin,
    /// The user bought the whole catalog.
    GlobalUnlock,
    /// A completed order for this product.
    #[serde(rename_all = "camelCase")]
    Purchase { order_id: OrderId },
}

/// Evaluates download rights against storage.
pub struct EntitlementResolver<'a> {
    storage: &'a dyn Storage,
}

impl<'a> EntitlementResolver<'a> {
    #[must_use]
    pub const fn new(storage: &'a dyn Storage) -> Self {
        Self { storage }
    }

    /// Whether `user_id` may download `product_id` right now.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if storage fails. Unknown ids are `Ok(false)`.
    pub async fn can_download(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<bool, RepositoryError> {
        Ok(self.resolve_grant(user_id, product_id).await?.is_some())
    }

    /// The grant that allows the download, if any.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if storage fails.
    #[instrument(skip(self))]
    pub async fn resolve_grant(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<Option<EntitlementGrant>, RepositoryError> {
        let Some(user) = self.storage.find_user_by_id(user_id).await? else {
            return Ok(None);
        };
        let Some(product) = self.storage.find_product(product_id).await? else {
            return Ok(None);
        };
        self.grant_for(&user, &product).await
    }

    /// Active products `user` can download right now, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if storage fails.
    pub async fn entitled_products(&self, user: &User) -> Result<Vec<Product>, RepositoryError> {
        let mut entitled = Vec::new();
        for product in self.storage.list_products(true).await? {
            if self.grant_for(user, &product).await?.is_some() {
                entitled.push(product);
            }
        }
        Ok(entitled)
    }

    /// Same as [`Self::resolve_grant`] for rows the caller already loaded.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` if the order lookup fails.
    pub async fn grant_for(
        &self,
        user: &User,
        product: &Product,
    ) -> Result<Option<EntitlementGrant>, RepositoryError> {
        if !product.is_active {
            return Ok(None);
        }
        if user.is_admin {
            return Ok(Some(EntitlementGrant::Admin));
        }
        if user.has_paid {
            return Ok(Some(EntitlementGrant::GlobalUnlock));
        }

        let latest = self
            .storage
            .latest_settled_order(user.id, product.id)
            .await?;

        Ok(latest
            .filter(|order| order.status.grants_access())
            .map(|order| EntitlementGrant::Purchase { order_id: order.id }))
    }
}

//! Product domain types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shelf_core::{CategoryAssignment, Price, ProductId, StoredFile};

/// A downloadable product.
///
/// Products are never removed; deactivation hides them and blocks delivery.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub description: Option<String>,
    /// List price. Orders record the amount actually charged separately.
    pub price: Price,
    /// External download location, informational only.
    pub download_url: Option<String>,
    /// Archive held by the file store.
    pub file: Option<StoredFile>,
    pub category: CategoryAssignment,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields required to create a product.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProduct {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: Price,
    #[serde(default)]
    pub download_url: Option<String>,
    #[serde(default)]
    pub file: Option<StoredFile>,
    #[serde(default)]
    pub category: CategoryAssignment,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

/// Partial product update. `None` leaves a field unchanged.
///
/// Nullable fields use a nested `Option`: `Some(None)` clears the value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub price: Option<Price>,
    #[serde(default, deserialize_with = "double_option")]
    pub download_url: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub file: Option<Option<StoredFile>>,
    #[serde(default)]
    pub category: Option<CategoryAssignment>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl ProductUpdate {
    /// Apply this update to a product in place.
    pub fn apply_to(self, product: &mut Product) {
        if let Some(name) = self.name {
            product.name = name;
        }
        if let Some(description) = self.description {
            product.description = description;
        }
        if let Some(price) = self.price {
            product.price = price;
        }
        if let Some(download_url) = self.download_url {
            product.download_url = download_url;
        }
        if let Some(file) = self.file {
            product.file = file;
        }
        if let Some(category) = self.category {
            product.category = category;
        }
        if let Some(is_active) = self.is_active {
            product.is_active = is_active;
        }
    }
}

pub(crate) const fn default_true() -> bool {
    true
}

/// Distinguish an absent field from an explicit `null`.
pub(crate) fn double_option<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_update_distinguishes_null_from_absent() {
        let update: ProductUpdate =
            serde_json::from_str(r#"{"description": null, "price": "10.00"}"#).unwrap();
        assert_eq!(update.description, Some(None));
        assert_eq!(update.download_url, None);
        assert_eq!(update.price.unwrap().to_string(), "10.00");
    }

    #[test]
    fn test_new_product_defaults() {
        let new: NewProduct = serde_json::from_str(r#"{"name": "P1", "price": "49.00"}"#).unwrap();
        assert!(new.is_active);
        assert_eq!(new.category, CategoryAssignment::Unassigned);
        assert!(new.file.is_none());
    }
}

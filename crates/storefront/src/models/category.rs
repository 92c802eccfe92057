//! Category taxonomy types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use shelf_core::{CategoryId, SubcategoryId};

use super::product::{default_true, double_option};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
    pub description: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Subcategory {
    pub id: SubcategoryId,
    pub name: String,
    pub description: Option<String>,
    /// Owning category.
    pub category_id: CategoryId,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCategory {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSubcategory {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub category_id: CategoryId,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubcategoryUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl CategoryUpdate {
    pub fn apply_to(self, category: &mut Category) {
        if let Some(name) = self.name {
            category.name = name;
        }
        if let Some(description) = self.description {
            category.description = description;
        }
        if let Some(is_active) = self.is_active {
            category.is_active = is_active;
        }
    }
}

impl SubcategoryUpdate {
    pub fn apply_to(self, subcategory: &mut Subcategory) {
        if let Some(name) = self.name {
            subcategory.name = name;
        }
        if let Some(description) = self.description {
            subcategory.description = description;
        }
        if let Some(category_id) = self.category_id {
            subcategory.category_id = category_id;
        }
        if let Some(is_active) = self.is_active {
            subcategory.is_active = is_active;
        }
    }
}

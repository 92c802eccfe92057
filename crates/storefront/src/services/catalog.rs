//! Catalog browsing and administration.
//!
//! Shoppers only ever see active rows. Admin writes are validated here
//! before they reach storage: names are bounded and a product's category
//! assignment must point at existing rows, with the subcategory belonging
//! to the named category.

use serde::Serialize;
use thiserror::Error;
use tracing::instrument;

use shelf_core::{CategoryAssignment, CategoryId, ProductId, SubcategoryId};

use crate::db::{RepositoryError, Storage};
use crate::error::ValidationErrors;
use crate::models::{
    Category, CategoryUpdate, NewCategory, NewProduct, NewSubcategory, Product, ProductUpdate,
    Subcategory, SubcategoryUpdate,
};

/// Maximum product name length, in characters.
pub const MAX_PRODUCT_NAME_LENGTH: usize = 200;

/// Maximum category and subcategory name length, in characters.
pub const MAX_CATEGORY_NAME_LENGTH: usize = 100;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("invalid catalog input: {0}")]
    Validation(ValidationErrors),

    #[error("{0} not found")]
    NotFound(String),

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),
}

impl From<ValidationErrors> for CatalogError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}

/// A product with its taxonomy names resolved.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogProduct {
    #[serde(flatten)]
    pub product: Product,
    pub category_name: Option<String>,
    pub subcategory_name: Option<String>,
}

pub struct CatalogService<'a> {
    storage: &'a dyn Storage,
}

impl<'a> CatalogService<'a> {
    #[must_use]
    pub const fn new(storage: &'a dyn Storage) -> Self {
        Self { storage }
    }

    // Public reads

    /// Active products, newest first.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Repository` if storage fails.
    pub async fn list_products(&self) -> Result<Vec<CatalogProduct>, CatalogError> {
        let products = self.storage.list_products(true).await?;
        self.resolve_names(products).await
    }

    /// One active product.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::NotFound` for unknown or inactive products.
    pub async fn get_product(&self, id: ProductId) -> Result<CatalogProduct, CatalogError> {
        let product = self
            .storage
            .find_product(id)
            .await?
            .filter(|p| p.is_active)
            .ok_or_else(|| CatalogError::NotFound(format!("Product {id}")))?;
        let mut resolved = self.resolve_names(vec![product]).await?;
        resolved
            .pop()
            .ok_or_else(|| CatalogError::NotFound(format!("Product {id}")))
    }

    /// Active categories by name.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Repository` if storage fails.
    pub async fn list_categories(&self) -> Result<Vec<Category>, CatalogError> {
        Ok(self.storage.list_categories(true).await?)
    }

    /// Active subcategories by name, optionally limited to one category.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Repository` if storage fails.
    pub async fn list_subcategories(
        &self,
        category: Option<CategoryId>,
    ) -> Result<Vec<Subcategory>, CatalogError> {
        Ok(self.storage.list_subcategories(category, true).await?)
    }

    async fn resolve_names(
        &self,
        products: Vec<Product>,
    ) -> Result<Vec<CatalogProduct>, CatalogError> {
        let categories = self.storage.list_categories(false).await?;
        let subcategories = self.storage.list_subcategories(None, false).await?;

        Ok(products
            .into_iter()
            .map(|product| {
                let category_name = product.category.category().and_then(|id| {
                    categories
                        .iter()
                        .find(|c| c.id == id)
                        .map(|c| c.name.clone())
                });
                let subcategory_name = product.category.subcategory().and_then(|id| {
                    subcategories
                        .iter()
                        .find(|s| s.id == id)
                        .map(|s| s.name.clone())
                });
                CatalogProduct {
                    product,
                    category_name,
                    subcategory_name,
                }
            })
            .collect())
    }

    // Admin

    /// Every product, including inactive ones.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Repository` if storage fails.
    pub async fn all_products(&self) -> Result<Vec<Product>, CatalogError> {
        Ok(self.storage.list_products(false).await?)
    }

    /// Every category, including inactive ones.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Repository` if storage fails.
    pub async fn all_categories(&self) -> Result<Vec<Category>, CatalogError> {
        Ok(self.storage.list_categories(false).await?)
    }

    /// # Errors
    ///
    /// `CatalogError::Validation` for a bad name; a duplicate name is a
    /// `RepositoryError::Conflict`.
    #[instrument(skip(self, new), fields(name = %new.name))]
    pub async fn create_category(&self, mut new: NewCategory) -> Result<Category, CatalogError> {
        new.name = checked_name(&new.name, "name", MAX_CATEGORY_NAME_LENGTH)?;
        let category = self.storage.create_category(new).await?;
        tracing::info!(category_id = %category.id, "Category created");
        Ok(category)
    }

    /// # Errors
    ///
    /// `CatalogError::NotFound` for an unknown id.
    #[instrument(skip(self, update))]
    pub async fn update_category(
        &self,
        id: CategoryId,
        mut update: CategoryUpdate,
    ) -> Result<Category, CatalogError> {
        if let Some(name) = update.name.as_deref() {
            update.name = Some(checked_name(name, "name", MAX_CATEGORY_NAME_LENGTH)?);
        }
        self.storage
            .update_category(id, update)
            .await?
            .ok_or_else(|| CatalogError::NotFound(format!("Category {id}")))
    }

    /// # Errors
    ///
    /// `CatalogError::Validation` for a bad name or unknown category.
    #[instrument(skip(self, new), fields(name = %new.name))]
    pub async fn create_subcategory(
        &self,
        mut new: NewSubcategory,
    ) -> Result<Subcategory, CatalogError> {
        let mut errors = ValidationErrors::new();
        match checked_name(&new.name, "name", MAX_CATEGORY_NAME_LENGTH) {
            Ok(name) => new.name = name,
            Err(e) => errors = e,
        }
        if self.storage.find_category(new.category_id).await?.is_none() {
            errors.add("categoryId", "Category does not exist");
        }
        errors.into_result()?;

        let subcategory = self.storage.create_subcategory(new).await?;
        tracing::info!(subcategory_id = %subcategory.id, "Subcategory created");
        Ok(subcategory)
    }

    /// # Errors
    ///
    /// `CatalogError::NotFound` for an unknown id, `CatalogError::Validation`
    /// for a bad name or unknown category.
    #[instrument(skip(self, update))]
    pub async fn update_subcategory(
        &self,
        id: SubcategoryId,
        mut update: SubcategoryUpdate,
    ) -> Result<Subcategory, CatalogError> {
        let mut errors = ValidationErrors::new();
        if let Some(name) = update.name.as_deref() {
            match checked_name(name, "name", MAX_CATEGORY_NAME_LENGTH) {
                Ok(name) => update.name = Some(name),
                Err(e) => errors = e,
            }
        }
        if let Some(category_id) = update.category_id
            && self.storage.find_category(category_id).await?.is_none()
        {
            errors.add("categoryId", "Category does not exist");
        }
        errors.into_result()?;

        self.storage
            .update_subcategory(id, update)
            .await?
            .ok_or_else(|| CatalogError::NotFound(format!("Subcategory {id}")))
    }

    /// # Errors
    ///
    /// `CatalogError::Validation` for a bad name or category assignment.
    #[instrument(skip(self, new), fields(name = %new.name))]
    pub async fn create_product(&self, mut new: NewProduct) -> Result<Product, CatalogError> {
        let mut errors = ValidationErrors::new();
        match checked_name(&new.name, "name", MAX_PRODUCT_NAME_LENGTH) {
            Ok(name) => new.name = name,
            Err(e) => errors = e,
        }
        self.check_assignment(new.category, &mut errors).await?;
        errors.into_result()?;

        let product = self.storage.create_product(new).await?;
        tracing::info!(product_id = %product.id, "Product created");
        Ok(product)
    }

    /// Apply a partial update.
    ///
    /// # Errors
    ///
    /// `CatalogError::NotFound` for an unknown id, `CatalogError::Validation`
    /// for a bad name or category assignment.
    #[instrument(skip(self, update))]
    pub async fn update_product(
        &self,
        id: ProductId,
        mut update: ProductUpdate,
    ) -> Result<Product, CatalogError> {
        let mut errors = ValidationErrors::new();
        if let Some(name) = update.name.as_deref() {
            match checked_name(name, "name", MAX_PRODUCT_NAME_LENGTH) {
                Ok(name) => update.name = Some(name),
                Err(e) => errors = e,
            }
        }
        if let Some(assignment) = update.category {
            self.check_assignment(assignment, &mut errors).await?;
        }
        errors.into_result()?;

        let product = self
            .storage
            .update_product(id, update)
            .await?
            .ok_or_else(|| CatalogError::NotFound(format!("Product {id}")))?;
        tracing::info!(product_id = %id, "Product updated");
        Ok(product)
    }

    /// Hide a product from the catalog and block its delivery.
    ///
    /// # Errors
    ///
    /// `CatalogError::NotFound` for an unknown id.
    pub async fn deactivate_product(&self, id: ProductId) -> Result<Product, CatalogError> {
        self.update_product(
            id,
            ProductUpdate {
                is_active: Some(false),
                ..ProductUpdate::default()
            },
        )
        .await
    }

    async fn check_assignment(
        &self,
        assignment: CategoryAssignment,
        errors: &mut ValidationErrors,
    ) -> Result<(), RepositoryError> {
        match assignment {
            CategoryAssignment::Unassigned => {}
            CategoryAssignment::Category { category } => {
                if self.storage.find_category(category).await?.is_none() {
                    errors.add("category", "Category does not exist");
                }
            }
            CategoryAssignment::Subcategory {
                category,
                subcategory,
            } => {
                if self.storage.find_category(category).await?.is_none() {
                    errors.add("category", "Category does not exist");
                }
                match self.storage.find_subcategory(subcategory).await? {
                    None => errors.add("category", "Subcategory does not exist"),
                    Some(s) if s.category_id != category => errors.add(
                        "category",
                        "Subcategory does not belong to the category",
                    ),
                    Some(_) => {}
                }
            }
        }
        Ok(())
    }
}

/// Trim and bound a display name.
fn checked_name(raw: &str, field: &str, max: usize) -> Result<String, ValidationErrors> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(ValidationErrors::single(field, "Name is required"));
    }
    if name.chars().count() > max {
        return Err(ValidationErrors::single(
            field,
            format!("Name must be at most {max} characters"),
        ));
    }
    Ok(name.to_owned())
}

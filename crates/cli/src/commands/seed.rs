//! Seed the catalog from a YAML file.
//!
//! Entries are matched by name, so re-running a file only adds what is
//! missing. Products are created without an archive; attach one later
//! through the admin upload endpoint.
//!
//! ```yaml
//! categories:
//!   - name: Templates
//!     description: Ready-made project templates
//!     subcategories:
//!       - name: Notion
//! products:
//!   - name: Starter Kit
//!     price: "49.00"
//!     category: Templates
//!     subcategory: Notion
//! ```

use std::path::Path;

use serde::Deserialize;
use tracing::info;

use shelf_core::{CategoryAssignment, CategoryId, Price, SubcategoryId};
use shelf_storefront::db::{PgStorage, RepositoryError, Storage};
use shelf_storefront::models::{NewCategory, NewProduct, NewSubcategory};
use shelf_storefront::services::{CatalogError, CatalogService};

/// Top-level seed file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CatalogSeed {
    #[serde(default)]
    pub categories: Vec<CategorySeed>,
    #[serde(default)]
    pub products: Vec<ProductSeed>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CategorySeed {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub subcategories: Vec<SubcategorySeed>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SubcategorySeed {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ProductSeed {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: Price,
    #[serde(default)]
    pub download_url: Option<String>,
    /// Category name.
    #[serde(default)]
    pub category: Option<String>,
    /// Subcategory name within `category`.
    #[serde(default)]
    pub subcategory: Option<String>,
}

/// What a seeding run changed.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SeedReport {
    pub categories_created: usize,
    pub subcategories_created: usize,
    pub products_created: usize,
    pub skipped: usize,
}

/// Errors while seeding.
#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    #[error("Failed to read {0}: {1}")]
    Read(String, std::io::Error),

    #[error("Invalid seed file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Product '{product}' references unknown {kind} '{name}'")]
    UnknownReference {
        product: String,
        kind: &'static str,
        name: String,
    },

    #[error(transparent)]
    Connect(#[from] super::ConnectError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),
}

/// Seed the catalog from `file_path` into the configured database.
///
/// # Errors
///
/// Returns `SeedError` if the file is unreadable or invalid, a product
/// names an unknown category, or the database fails.
pub async fn catalog(file_path: &str) -> Result<(), SeedError> {
    info!(path = %file_path, "Loading catalog seed");
    let content = tokio::fs::read_to_string(Path::new(file_path))
        .await
        .map_err(|e| SeedError::Read(file_path.to_owned(), e))?;
    let seed: CatalogSeed = serde_yaml::from_str(&content)?;

    let storage = PgStorage::new(super::connect().await?);
    let report = apply(&storage, &seed).await?;

    info!("Seeding complete!");
    info!("  Categories created: {}", report.categories_created);
    info!("  Subcategories created: {}", report.subcategories_created);
    info!("  Products created: {}", report.products_created);
    info!("  Skipped (already exist): {}", report.skipped);
    Ok(())
}

/// Apply `seed` to `storage`, creating only entries whose names are new.
///
/// # Errors
///
/// Same as [`catalog`], minus the file and connection errors.
pub async fn apply(storage: &dyn Storage, seed: &CatalogSeed) -> Result<SeedReport, SeedError> {
    let catalog = CatalogService::new(storage);
    let mut report = SeedReport::default();

    for category_seed in &seed.categories {
        let category_id = match find_category(storage, &category_seed.name).await? {
            Some(id) => {
                report.skipped += 1;
                id
            }
            None => {
                report.categories_created += 1;
                catalog
                    .create_category(NewCategory {
                        name: category_seed.name.clone(),
                        description: category_seed.description.clone(),
                        is_active: true,
                    })
                    .await?
                    .id
            }
        };

        for sub_seed in &category_seed.subcategories {
            if find_subcategory(storage, category_id, &sub_seed.name)
                .await?
                .is_some()
            {
                report.skipped += 1;
                continue;
            }
            catalog
                .create_subcategory(NewSubcategory {
                    name: sub_seed.name.clone(),
                    description: sub_seed.description.clone(),
                    category_id,
                    is_active: true,
                })
                .await?;
            report.subcategories_created += 1;
        }
    }

    let existing: Vec<String> = storage
        .list_products(false)
        .await?
        .into_iter()
        .map(|p| p.name)
        .collect();

    for product_seed in &seed.products {
        if existing.iter().any(|name| name == &product_seed.name) {
            report.skipped += 1;
            continue;
        }
        let category = resolve_assignment(storage, product_seed).await?;
        catalog
            .create_product(NewProduct {
                name: product_seed.name.clone(),
                description: product_seed.description.clone(),
                price: product_seed.price,
                download_url: product_seed.download_url.clone(),
                file: None,
                category,
                is_active: true,
            })
            .await?;
        report.products_created += 1;
    }

    Ok(report)
}

async fn find_category(
    storage: &dyn Storage,
    name: &str,
) -> Result<Option<CategoryId>, RepositoryError> {
    Ok(storage
        .list_categories(false)
        .await?
        .into_iter()
        .find(|c| c.name == name)
        .map(|c| c.id))
}

async fn find_subcategory(
    storage: &dyn Storage,
    category: CategoryId,
    name: &str,
) -> Result<Option<SubcategoryId>, RepositoryError> {
    Ok(storage
        .list_subcategories(Some(category), false)
        .await?
        .into_iter()
        .find(|s| s.name == name)
        .map(|s| s.id))
}

async fn resolve_assignment(
    storage: &dyn Storage,
    product: &ProductSeed,
) -> Result<CategoryAssignment, SeedError> {
    let unknown = |kind, name: &str| SeedError::UnknownReference {
        product: product.name.clone(),
        kind,
        name: name.to_owned(),
    };

    let Some(category_name) = product.category.as_deref() else {
        return match product.subcategory.as_deref() {
            Some(sub) => Err(unknown("category for subcategory", sub)),
            None => Ok(CategoryAssignment::Unassigned),
        };
    };
    let category = find_category(storage, category_name)
        .await?
        .ok_or_else(|| unknown("category", category_name))?;

    match product.subcategory.as_deref() {
        None => Ok(CategoryAssignment::Category { category }),
        Some(sub_name) => {
            let subcategory = find_subcategory(storage, category, sub_name)
                .await?
                .ok_or_else(|| unknown("subcategory", sub_name))?;
            Ok(CategoryAssignment::Subcategory {
                category,
                subcategory,
            })
        }
    }
}

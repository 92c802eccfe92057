//! Category, subcategory and product repositories.
//!
//! Partial updates lock the row, apply the change in Rust and write every
//! column back inside one transaction.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::PgPool;

use shelf_core::{CategoryAssignment, CategoryId, Price, ProductId, StoredFile, SubcategoryId};

use crate::db::{RepositoryError, conflict_on_unique};
use crate::models::{
    Category, CategoryUpdate, NewCategory, NewProduct, NewSubcategory, Product, ProductUpdate,
    Subcategory, SubcategoryUpdate,
};

// =============================================================================
// Row types
// =============================================================================

#[derive(sqlx::FromRow)]
struct CategoryRow {
    id: i32,
    name: String,
    description: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<CategoryRow> for Category {
    fn from(row: CategoryRow) -> Self {
        Self {
            id: CategoryId::new(row.id),
            name: row.name,
            description: row.description,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SubcategoryRow {
    id: i32,
    name: String,
    description: Option<String>,
    category_id: i32,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<SubcategoryRow> for Subcategory {
    fn from(row: SubcategoryRow) -> Self {
        Self {
            id: SubcategoryId::new(row.id),
            name: row.name,
            description: row.description,
            category_id: CategoryId::new(row.category_id),
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: i32,
    name: String,
    description: Option<String>,
    price: Decimal,
    download_url: Option<String>,
    file_name: Option<String>,
    file_size: Option<i64>,
    category_id: Option<i32>,
    subcategory_id: Option<i32>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ProductRow> for Product {
    type Error = RepositoryError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        let price = Price::new(row.price).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid price for product {}: {e}", row.id))
        })?;
        let category = CategoryAssignment::from_columns(
            row.category_id.map(CategoryId::new),
            row.subcategory_id.map(SubcategoryId::new),
        )
        .map_err(|e| {
            RepositoryError::DataCorruption(format!("product {}: {e}", row.id))
        })?;

        Ok(Self {
            id: ProductId::new(row.id),
            name: row.name,
            description: row.description,
            price,
            download_url: row.download_url,
            file: StoredFile::from_columns(row.file_name, row.file_size),
            category,
            is_active: row.is_active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn category_ids(assignment: CategoryAssignment) -> (Option<i32>, Option<i32>) {
    let (category, subcategory) = assignment.to_columns();
    (
        category.map(|c| c.as_i32()),
        subcategory.map(|s| s.as_i32()),
    )
}

macro_rules! product_columns {
    () => {
        "id, name, description, price, download_url, file_name, file_size, \
         category_id, subcategory_id, is_active, created_at, updated_at"
    };
}

// =============================================================================
// Categories
// =============================================================================

/// Repository for categories and subcategories.
pub struct CategoryRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> CategoryRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// List categories ordered by name.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list(&self, active_only: bool) -> Result<Vec<Category>, RepositoryError> {
        let rows = sqlx::query_as::<_, CategoryRow>(
            "SELECT id, name, description, is_active, created_at, updated_at
             FROM shelf.category
             WHERE is_active OR NOT $1
             ORDER BY name",
        )
        .bind(active_only)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Category::from).collect())
    }

    /// Get a category by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get(&self, id: CategoryId) -> Result<Option<Category>, RepositoryError> {
        let row = sqlx::query_as::<_, CategoryRow>(
            "SELECT id, name, description, is_active, created_at, updated_at
             FROM shelf.category WHERE id = $1",
        )
        .bind(id.as_i32())
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Category::from))
    }

    /// Create a category.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the name is taken.
    pub async fn create(&self, new: &NewCategory) -> Result<Category, RepositoryError> {
        let row = sqlx::query_as::<_, CategoryRow>(
            "INSERT INTO shelf.category (name, description, is_active)
             VALUES ($1, $2, $3)
             RETURNING id, name, description, is_active, created_at, updated_at",
        )
        .bind(&new.name)
        .bind(new.description.as_deref())
        .bind(new.is_active)
        .fetch_one(self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "category name"))?;

        Ok(row.into())
    }

    /// Apply a partial update.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the new name is taken.
    pub async fn update(
        &self,
        id: CategoryId,
        update: CategoryUpdate,
    ) -> Result<Option<Category>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let Some(row) = sqlx::query_as::<_, CategoryRow>(
            "SELECT id, name, description, is_active, created_at, updated_at
             FROM shelf.category WHERE id = $1 FOR UPDATE",
        )
        .bind(id.as_i32())
        .fetch_optional(&mut *tx)
        .await?
        else {
            return Ok(None);
        };

        let mut category = Category::from(row);
        update.apply_to(&mut category);

        let row = sqlx::query_as::<_, CategoryRow>(
            "UPDATE shelf.category
             SET name = $2, description = $3, is_active = $4, updated_at = NOW()
             WHERE id = $1
             RETURNING id, name, description, is_active, created_at, updated_at",
        )
        .bind(id.as_i32())
        .bind(&category.name)
        .bind(category.description.as_deref())
        .bind(category.is_active)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| conflict_on_unique(e, "category name"))?;

        tx.commit().await?;
        Ok(Some(row.into()))
    }

    /// List subcategories ordered by name.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_subcategories(
        &self,
        category: Option<CategoryId>,
        active_only: bool,
    ) -> Result<Vec<Subcategory>, RepositoryError> {
        let rows = sqlx::query_as::<_, SubcategoryRow>(
            "SELECT id, name, description, category_id, is_active, created_at, updated_at
             FROM shelf.subcategory
             WHERE (is_active OR NOT $1)
               AND ($2::INTEGER IS NULL OR category_id = $2)
             ORDER BY name",
        )
        .bind(active_only)
        .bind(category.map(|c| c.as_i32()))
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Subcategory::from).collect())
    }

    /// Get a subcategory by ID.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_subcategory(
        &self,
        id: SubcategoryId,
    ) -> Result<Option<Subcategory>, RepositoryError> {
        let row = sqlx::query_as::<_, SubcategoryRow>(
            "SELECT id, name, description, category_id, is_active, created_at, updated_at
             FROM shelf.subcategory WHERE id = $1",
        )
        .bind(id.as_i32())
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Subcategory::from))
    }

    /// Create a subcategory.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn create_subcategory(
        &self,
        new: &NewSubcategory,
    ) -> Result<Subcategory, RepositoryError> {
        let row = sqlx::query_as::<_, SubcategoryRow>(
            "INSERT INTO shelf.subcategory (name, description, category_id, is_active)
             VALUES ($1, $2, $3, $4)
             RETURNING id, name, description, category_id, is_active, created_at, updated_at",
        )
        .bind(&new.name)
        .bind(new.description.as_deref())
        .bind(new.category_id.as_i32())
        .bind(new.is_active)
        .fetch_one(self.pool)
        .await?;

        Ok(row.into())
    }

    /// Apply a partial update.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn update_subcategory(
        &self,
        id: SubcategoryId,
        update: SubcategoryUpdate,
    ) -> Result<Option<Subcategory>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let Some(row) = sqlx::query_as::<_, SubcategoryRow>(
            "SELECT id, name, description, category_id, is_active, created_at, updated_at
             FROM shelf.subcategory WHERE id = $1 FOR UPDATE",
        )
        .bind(id.as_i32())
        .fetch_optional(&mut *tx)
        .await?
        else {
            return Ok(None);
        };

        let mut subcategory = Subcategory::from(row);
        update.apply_to(&mut subcategory);

        let row = sqlx::query_as::<_, SubcategoryRow>(
            "UPDATE shelf.subcategory
             SET name = $2, description = $3, category_id = $4, is_active = $5,
                 updated_at = NOW()
             WHERE id = $1
             RETURNING id, name, description, category_id, is_active, created_at, updated_at",
        )
        .bind(id.as_i32())
        .bind(&subcategory.name)
        .bind(subcategory.description.as_deref())
        .bind(subcategory.category_id.as_i32())
        .bind(subcategory.is_active)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(row.into()))
    }
}

// =============================================================================
// Products
// =============================================================================

/// Repository for products.
pub struct ProductRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> ProductRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// List products, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if a row holds invalid data.
    pub async fn list(&self, active_only: bool) -> Result<Vec<Product>, RepositoryError> {
        let rows = sqlx::query_as::<_, ProductRow>(concat!(
            "SELECT ",
            product_columns!(),
            " FROM shelf.product WHERE is_active OR NOT $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(active_only)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(Product::try_from).collect()
    }

    /// Get a product by ID, active or not.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    /// Returns `RepositoryError::DataCorruption` if the row holds invalid data.
    pub async fn get(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let row = sqlx::query_as::<_, ProductRow>(concat!(
            "SELECT ",
            product_columns!(),
            " FROM shelf.product WHERE id = $1"
        ))
        .bind(id.as_i32())
        .fetch_optional(self.pool)
        .await?;

        row.map(Product::try_from).transpose()
    }

    /// Create a product.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn create(&self, new: &NewProduct) -> Result<Product, RepositoryError> {
        let (category_id, subcategory_id) = category_ids(new.category);
        let row = sqlx::query_as::<_, ProductRow>(concat!(
            "INSERT INTO shelf.product
               (name, description, price, download_url, file_name, file_size,
                category_id, subcategory_id, is_active)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING ",
            product_columns!()
        ))
        .bind(&new.name)
        .bind(new.description.as_deref())
        .bind(new.price.amount())
        .bind(new.download_url.as_deref())
        .bind(new.file.as_ref().map(|f| f.name.as_str()))
        .bind(new.file.as_ref().map(|f| f.size))
        .bind(category_id)
        .bind(subcategory_id)
        .bind(new.is_active)
        .fetch_one(self.pool)
        .await?;

        Product::try_from(row)
    }

    /// Apply a partial update.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn update(
        &self,
        id: ProductId,
        update: ProductUpdate,
    ) -> Result<Option<Product>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let Some(row) = sqlx::query_as::<_, ProductRow>(concat!(
            "SELECT ",
            product_columns!(),
            " FROM shelf.product WHERE id = $1 FOR UPDATE"
        ))
        .bind(id.as_i32())
        .fetch_optional(&mut *tx)
        .await?
        else {
            return Ok(None);
        };

        let mut product = Product::try_from(row)?;
        update.apply_to(&mut product);
        let (category_id, subcategory_id) = category_ids(product.category);

        let row = sqlx::query_as::<_, ProductRow>(concat!(
            "UPDATE shelf.product
             SET name = $2, description = $3, price = $4, download_url = $5,
                 file_name = $6, file_size = $7, category_id = $8, subcategory_id = $9,
                 is_active = $10, updated_at = NOW()
             WHERE id = $1
             RETURNING ",
            product_columns!()
        ))
        .bind(id.as_i32())
        .bind(&product.name)
        .bind(product.description.as_deref())
        .bind(product.price.amount())
        .bind(product.download_url.as_deref())
        .bind(product.file.as_ref().map(|f| f.name.as_str()))
        .bind(product.file.as_ref().map(|f| f.size))
        .bind(category_id)
        .bind(subcategory_id)
        .bind(product.is_active)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Product::try_from(row).map(Some)
    }
}

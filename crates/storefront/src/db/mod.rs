//! Storage for storefront data.
//!
//! All persistence goes through the [`Storage`] trait. Two implementations
//! exist and the configuration picks one at startup:
//!
//! - [`postgres::PgStorage`] - the `shelf` schema in `PostgreSQL`
//! - [`memory::MemoryStorage`] - process-local maps for development and tests
//!
//! # Tables (`shelf` schema)
//!
//! - `user` - accounts, credentials, admin/paid flags
//! - `category`, `subcategory` - product taxonomy
//! - `product` - catalog entries and their stored archive
//! - `order` - payment outcomes, one product each
//! - `lead` - captured prospect emails
//! - `download` - append-only delivery audit
//!
//! Sessions live in `tower_sessions.session`, managed by tower-sessions.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/storefront/migrations/` and run via:
//! ```bash
//! cargo run -p shelf-cli -- migrate
//! ```

pub mod memory;
pub mod postgres;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;
use secrecy::ExposeSecret;
use serde::Serialize;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use shelf_core::{
    CategoryId, Email, OrderId, OrderStatus, ProductId, SubcategoryId, UserId,
};

use crate::models::{
    Category, CategoryUpdate, Download, ExternalProvider, Lead, NewCategory, NewDownload,
    NewLead, NewOrder, NewProduct, NewSubcategory, NewUser, Order, Product, ProductUpdate,
    Subcategory, SubcategoryUpdate, User,
};

pub use memory::MemoryStorage;
pub use postgres::PgStorage;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

/// Headline numbers for the admin dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    /// Sum of completed order amounts.
    pub total_sales: Decimal,
    pub total_customers: i64,
    pub total_leads: i64,
    pub total_orders: i64,
}

/// Shared handle to the configured storage.
pub type SharedStorage = Arc<dyn Storage>;

/// Every persistence operation the storefront performs.
///
/// Lookups return `Ok(None)` for missing rows; `Err` always means the store
/// itself failed. Updates return `Ok(None)` when the target row is absent.
#[async_trait]
pub trait Storage: Send + Sync + 'static {
    /// Check the backing store is reachable.
    async fn ping(&self) -> Result<(), RepositoryError>;

    // Users

    async fn find_user_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError>;
    async fn find_user_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError>;
    /// Fails with `Conflict` when the email is taken.
    async fn create_user(&self, new: NewUser) -> Result<User, RepositoryError>;
    /// Set `has_paid = true` in one statement.
    async fn mark_user_paid(&self, id: UserId) -> Result<Option<User>, RepositoryError>;
    async fn set_user_admin(
        &self,
        email: &Email,
        is_admin: bool,
    ) -> Result<Option<User>, RepositoryError>;
    async fn find_user_by_external_identity(
        &self,
        provider: ExternalProvider,
        external_id: &str,
    ) -> Result<Option<User>, RepositoryError>;
    /// Fails with `Conflict` when the external id belongs to another user.
    async fn link_external_identity(
        &self,
        id: UserId,
        provider: ExternalProvider,
        external_id: &str,
    ) -> Result<Option<User>, RepositoryError>;

    // Catalog

    /// Categories ordered by name.
    async fn list_categories(&self, active_only: bool) -> Result<Vec<Category>, RepositoryError>;
    async fn find_category(&self, id: CategoryId) -> Result<Option<Category>, RepositoryError>;
    async fn create_category(&self, new: NewCategory) -> Result<Category, RepositoryError>;
    async fn update_category(
        &self,
        id: CategoryId,
        update: CategoryUpdate,
    ) -> Result<Option<Category>, RepositoryError>;
    /// Subcategories ordered by name, optionally restricted to one category.
    async fn list_subcategories(
        &self,
        category: Option<CategoryId>,
        active_only: bool,
    ) -> Result<Vec<Subcategory>, RepositoryError>;
    async fn find_subcategory(
        &self,
        id: SubcategoryId,
    ) -> Result<Option<Subcategory>, RepositoryError>;
    async fn create_subcategory(&self, new: NewSubcategory)
    -> Result<Subcategory, RepositoryError>;
    async fn update_subcategory(
        &self,
        id: SubcategoryId,
        update: SubcategoryUpdate,
    ) -> Result<Option<Subcategory>, RepositoryError>;
    /// Products, newest first.
    async fn list_products(&self, active_only: bool) -> Result<Vec<Product>, RepositoryError>;
    async fn find_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError>;
    async fn create_product(&self, new: NewProduct) -> Result<Product, RepositoryError>;
    async fn update_product(
        &self,
        id: ProductId,
        update: ProductUpdate,
    ) -> Result<Option<Product>, RepositoryError>;

    // Orders

    async fn create_order(&self, new: NewOrder) -> Result<Order, RepositoryError>;
    async fn find_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError>;
    async fn find_order_by_external_ref(
        &self,
        external_ref: &str,
    ) -> Result<Option<Order>, RepositoryError>;
    async fn update_order_status(
        &self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<Option<Order>, RepositoryError>;
    /// Most recent `completed` or `refunded` order for the pair, by
    /// `created_at` then id.
    async fn latest_settled_order(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<Option<Order>, RepositoryError>;
    /// A user's orders, newest first.
    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError>;
    /// All orders, newest first.
    async fn list_orders(&self) -> Result<Vec<Order>, RepositoryError>;

    // Leads

    /// Fails with `Conflict` when the email was already captured.
    async fn create_lead(&self, new: NewLead) -> Result<Lead, RepositoryError>;
    async fn find_lead_by_email(&self, email: &Email) -> Result<Option<Lead>, RepositoryError>;
    /// Returns whether a lead was converted.
    async fn mark_lead_converted(&self, email: &Email) -> Result<bool, RepositoryError>;
    /// All leads, newest first.
    async fn list_leads(&self) -> Result<Vec<Lead>, RepositoryError>;

    // Downloads

    async fn record_download(&self, new: NewDownload) -> Result<Download, RepositoryError>;
    /// A user's downloads, newest first.
    async fn downloads_for_user(&self, user_id: UserId) -> Result<Vec<Download>, RepositoryError>;

    // Reporting

    async fn stats(&self) -> Result<StoreStats, RepositoryError>;
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Arguments
///
/// * `database_url` - `PostgreSQL` connection string (wrapped in `SecretString`)
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Map a unique-violation into `Conflict`, anything else into `Database`.
pub(crate) fn conflict_on_unique(err: sqlx::Error, what: &str) -> RepositoryError {
    if let sqlx::Error::Database(ref db_err) = err
        && db_err.is_unique_violation()
    {
        return RepositoryError::Conflict(format!("{what} already exists"));
    }
    RepositoryError::Database(err)
}

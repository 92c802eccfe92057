//! `PostgreSQL` storage.
//!
//! Each table has a repository borrowing the pool; [`PgStorage`] stitches
//! them together behind the [`Storage`] trait. Queries are built at runtime
//! so the crate compiles without a database.

mod catalog;
mod downloads;
mod leads;
mod orders;
mod users;

pub use catalog::{CategoryRepository, ProductRepository};
pub use downloads::DownloadRepository;
pub use leads::LeadRepository;
pub use orders::OrderRepository;
pub use users::UserRepository;

use async_trait::async_trait;
use sqlx::PgPool;

use shelf_core::{CategoryId, Email, OrderId, OrderStatus, ProductId, SubcategoryId, UserId};

use super::{RepositoryError, Storage, StoreStats};
use crate::models::{
    Category, CategoryUpdate, Download, ExternalProvider, Lead, NewCategory, NewDownload,
    NewLead, NewOrder, NewProduct, NewSubcategory, NewUser, Order, Product, ProductUpdate,
    Subcategory, SubcategoryUpdate, User,
};

/// Storage backed by the `shelf` schema.
#[derive(Clone)]
pub struct PgStorage {
    pool: PgPool,
}

impl PgStorage {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the database connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl Storage for PgStorage {
    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn find_user_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        UserRepository::new(&self.pool).get_by_id(id).await
    }

    async fn find_user_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        UserRepository::new(&self.pool).get_by_email(email).await
    }

    async fn create_user(&self, new: NewUser) -> Result<User, RepositoryError> {
        UserRepository::new(&self.pool).create(&new).await
    }

    async fn mark_user_paid(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        UserRepository::new(&self.pool).mark_paid(id).await
    }

    async fn set_user_admin(
        &self,
        email: &Email,
        is_admin: bool,
    ) -> Result<Option<User>, RepositoryError> {
        UserRepository::new(&self.pool)
            .set_admin(email, is_admin)
            .await
    }

    async fn find_user_by_external_identity(
        &self,
        provider: ExternalProvider,
        external_id: &str,
    ) -> Result<Option<User>, RepositoryError> {
        UserRepository::new(&self.pool)
            .get_by_external_identity(provider, external_id)
            .await
    }

    async fn link_external_identity(
        &self,
        id: UserId,
        provider: ExternalProvider,
        external_id: &str,
    ) -> Result<Option<User>, RepositoryError> {
        UserRepository::new(&self.pool)
            .link_external_identity(id, provider, external_id)
            .await
    }

    async fn list_categories(&self, active_only: bool) -> Result<Vec<Category>, RepositoryError> {
        CategoryRepository::new(&self.pool).list(active_only).await
    }

    async fn find_category(&self, id: CategoryId) -> Result<Option<Category>, RepositoryError> {
        CategoryRepository::new(&self.pool).get(id).await
    }

    async fn create_category(&self, new: NewCategory) -> Result<Category, RepositoryError> {
        CategoryRepository::new(&self.pool).create(&new).await
    }

    async fn update_category(
        &self,
        id: CategoryId,
        update: CategoryUpdate,
    ) -> Result<Option<Category>, RepositoryError> {
        CategoryRepository::new(&self.pool).update(id, update).await
    }

    async fn list_subcategories(
        &self,
        category: Option<CategoryId>,
        active_only: bool,
    ) -> Result<Vec<Subcategory>, RepositoryError> {
        CategoryRepository::new(&self.pool)
            .list_subcategories(category, active_only)
            .await
    }

    async fn find_subcategory(
        &self,
        id: SubcategoryId,
    ) -> Result<Option<Subcategory>, RepositoryError> {
        CategoryRepository::new(&self.pool)
            .get_subcategory(id)
            .await
    }

    async fn create_subcategory(
        &self,
        new: NewSubcategory,
    ) -> Result<Subcategory, RepositoryError> {
        CategoryRepository::new(&self.pool)
            .create_subcategory(&new)
            .await
    }

    async fn update_subcategory(
        &self,
        id: SubcategoryId,
        update: SubcategoryUpdate,
    ) -> Result<Option<Subcategory>, RepositoryError> {
        CategoryRepository::new(&self.pool)
            .update_subcategory(id, update)
            .await
    }

    async fn list_products(&self, active_only: bool) -> Result<Vec<Product>, RepositoryError> {
        ProductRepository::new(&self.pool).list(active_only).await
    }

    async fn find_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        ProductRepository::new(&self.pool).get(id).await
    }

    async fn create_product(&self, new: NewProduct) -> Result<Product, RepositoryError> {
        ProductRepository::new(&self.pool).create(&new).await
    }

    async fn update_product(
        &self,
        id: ProductId,
        update: ProductUpdate,
    ) -> Result<Option<Product>, RepositoryError> {
        ProductRepository::new(&self.pool).update(id, update).await
    }

    async fn create_order(&self, new: NewOrder) -> Result<Order, RepositoryError> {
        OrderRepository::new(&self.pool).create(&new).await
    }

    async fn find_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        OrderRepository::new(&self.pool).get(id).await
    }

    async fn find_order_by_external_ref(
        &self,
        external_ref: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        OrderRepository::new(&self.pool)
            .get_by_external_ref(external_ref)
            .await
    }

    async fn update_order_status(
        &self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<Option<Order>, RepositoryError> {
        OrderRepository::new(&self.pool)
            .update_status(id, status)
            .await
    }

    async fn latest_settled_order(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<Option<Order>, RepositoryError> {
        OrderRepository::new(&self.pool)
            .latest_settled(user_id, product_id)
            .await
    }

    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        OrderRepository::new(&self.pool).for_user(user_id).await
    }

    async fn list_orders(&self) -> Result<Vec<Order>, RepositoryError> {
        OrderRepository::new(&self.pool).list().await
    }

    async fn create_lead(&self, new: NewLead) -> Result<Lead, RepositoryError> {
        LeadRepository::new(&self.pool).create(&new).await
    }

    async fn find_lead_by_email(&self, email: &Email) -> Result<Option<Lead>, RepositoryError> {
        LeadRepository::new(&self.pool).get_by_email(email).await
    }

    async fn mark_lead_converted(&self, email: &Email) -> Result<bool, RepositoryError> {
        LeadRepository::new(&self.pool).mark_converted(email).await
    }

    async fn list_leads(&self) -> Result<Vec<Lead>, RepositoryError> {
        LeadRepository::new(&self.pool).list().await
    }

    async fn record_download(&self, new: NewDownload) -> Result<Download, RepositoryError> {
        DownloadRepository::new(&self.pool).record(&new).await
    }

    async fn downloads_for_user(&self, user_id: UserId) -> Result<Vec<Download>, RepositoryError> {
        DownloadRepository::new(&self.pool).for_user(user_id).await
    }

    async fn stats(&self) -> Result<StoreStats, RepositoryError> {
        let (total_sales, total_orders) = OrderRepository::new(&self.pool).totals().await?;
        let total_customers = UserRepository::new(&self.pool).count().await?;
        let total_leads = LeadRepository::new(&self.pool).count().await?;

        Ok(StoreStats {
            total_sales,
            total_customers,
            total_leads,
            total_orders,
        })
    }
}

//! In-process storage backed by maps behind a `tokio::sync::RwLock`.
//!
//! Used for local development and tests. Every mutation takes the write
//! lock, so uniqueness checks and single-row updates are atomic.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use tokio::sync::RwLock;

use shelf_core::{
    CategoryId, DownloadId, Email, LeadId, OrderId, OrderStatus, ProductId, SubcategoryId,
    UserId,
};

use super::{RepositoryError, Storage, StoreStats};
use crate::models::{
    Category, CategoryUpdate, Download, ExternalProvider, Lead, NewCategory, NewDownload,
    NewLead, NewOrder, NewProduct, NewSubcategory, NewUser, Order, Product, ProductUpdate,
    Subcategory, SubcategoryUpdate, User,
};

#[derive(Default)]
struct Tables {
    users: BTreeMap<UserId, User>,
    categories: BTreeMap<CategoryId, Category>,
    subcategories: BTreeMap<SubcategoryId, Subcategory>,
    products: BTreeMap<ProductId, Product>,
    orders: BTreeMap<OrderId, Order>,
    leads: BTreeMap<LeadId, Lead>,
    downloads: BTreeMap<DownloadId, Download>,
    last_id: i32,
}

impl Tables {
    /// One counter for all tables; ids only need to be unique per table.
    fn next_id(&mut self) -> i32 {
        self.last_id += 1;
        self.last_id
    }

    fn external_id_owner(&self, provider: ExternalProvider, external_id: &str) -> Option<&User> {
        self.users.values().find(|u| {
            let linked = match provider {
                ExternalProvider::Google => u.google_id.as_deref(),
                ExternalProvider::GitHub => u.github_id.as_deref(),
            };
            linked == Some(external_id)
        })
    }
}

/// Storage that lives and dies with the process.
#[derive(Default)]
pub struct MemoryStorage {
    tables: RwLock<Tables>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first<T, K: Ord>(mut rows: Vec<T>, key: impl Fn(&T) -> K) -> Vec<T> {
    rows.sort_by_key(|row| std::cmp::Reverse(key(row)));
    rows
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }

    async fn find_user_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.tables.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| &u.email == email).cloned())
    }

    async fn create_user(&self, new: NewUser) -> Result<User, RepositoryError> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.email == new.email) {
            return Err(RepositoryError::Conflict("email already exists".to_owned()));
        }
        let now = Utc::now();
        let user = User {
            id: UserId::new(tables.next_id()),
            email: new.email,
            password_hash: new.password_hash,
            first_name: new.first_name,
            last_name: new.last_name,
            profile_image_url: None,
            google_id: None,
            github_id: None,
            payment_customer_id: None,
            payment_subscription_id: None,
            has_paid: false,
            is_admin: false,
            is_verified: false,
            created_at: now,
            updated_at: now,
        };
        tables.users.insert(user.id, user.clone());
        Ok(user)
    }

    async fn mark_user_paid(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        let mut tables = self.tables.write().await;
        Ok(tables.users.get_mut(&id).map(|user| {
            user.has_paid = true;
            user.updated_at = Utc::now();
            user.clone()
        }))
    }

    async fn set_user_admin(
        &self,
        email: &Email,
        is_admin: bool,
    ) -> Result<Option<User>, RepositoryError> {
        let mut tables = self.tables.write().await;
        Ok(tables
            .users
            .values_mut()
            .find(|u| &u.email == email)
            .map(|user| {
                user.is_admin = is_admin;
                user.updated_at = Utc::now();
                user.clone()
            }))
    }

    async fn find_user_by_external_identity(
        &self,
        provider: ExternalProvider,
        external_id: &str,
    ) -> Result<Option<User>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.external_id_owner(provider, external_id).cloned())
    }

    async fn link_external_identity(
        &self,
        id: UserId,
        provider: ExternalProvider,
        external_id: &str,
    ) -> Result<Option<User>, RepositoryError> {
        let mut tables = self.tables.write().await;
        if tables
            .external_id_owner(provider, external_id)
            .is_some_and(|owner| owner.id != id)
        {
            return Err(RepositoryError::Conflict(format!(
                "{} already linked",
                provider.column()
            )));
        }
        Ok(tables.users.get_mut(&id).map(|user| {
            let slot = match provider {
                ExternalProvider::Google => &mut user.google_id,
                ExternalProvider::GitHub => &mut user.github_id,
            };
            *slot = Some(external_id.to_owned());
            user.updated_at = Utc::now();
            user.clone()
        }))
    }

    async fn list_categories(&self, active_only: bool) -> Result<Vec<Category>, RepositoryError> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Category> = tables
            .categories
            .values()
            .filter(|c| !active_only || c.is_active)
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    async fn find_category(&self, id: CategoryId) -> Result<Option<Category>, RepositoryError> {
        Ok(self.tables.read().await.categories.get(&id).cloned())
    }

    async fn create_category(&self, new: NewCategory) -> Result<Category, RepositoryError> {
        let mut tables = self.tables.write().await;
        if tables.categories.values().any(|c| c.name == new.name) {
            return Err(RepositoryError::Conflict(
                "category name already exists".to_owned(),
            ));
        }
        let now = Utc::now();
        let category = Category {
            id: CategoryId::new(tables.next_id()),
            name: new.name,
            description: new.description,
            is_active: new.is_active,
            created_at: now,
            updated_at: now,
        };
        tables.categories.insert(category.id, category.clone());
        Ok(category)
    }

    async fn update_category(
        &self,
        id: CategoryId,
        update: CategoryUpdate,
    ) -> Result<Option<Category>, RepositoryError> {
        let mut tables = self.tables.write().await;
        if let Some(name) = &update.name
            && tables
                .categories
                .values()
                .any(|c| c.id != id && &c.name == name)
        {
            return Err(RepositoryError::Conflict(
                "category name already exists".to_owned(),
            ));
        }
        Ok(tables.categories.get_mut(&id).map(|category| {
            update.apply_to(category);
            category.updated_at = Utc::now();
            category.clone()
        }))
    }

    async fn list_subcategories(
        &self,
        category: Option<CategoryId>,
        active_only: bool,
    ) -> Result<Vec<Subcategory>, RepositoryError> {
        let tables = self.tables.read().await;
        let mut rows: Vec<Subcategory> = tables
            .subcategories
            .values()
            .filter(|s| !active_only || s.is_active)
            .filter(|s| category.is_none_or(|c| s.category_id == c))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(rows)
    }

    async fn find_subcategory(
        &self,
        id: SubcategoryId,
    ) -> Result<Option<Subcategory>, RepositoryError> {
        Ok(self.tables.read().await.subcategories.get(&id).cloned())
    }

    async fn create_subcategory(
        &self,
        new: NewSubcategory,
    ) -> Result<Subcategory, RepositoryError> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let subcategory = Subcategory {
            id: SubcategoryId::new(tables.next_id()),
            name: new.name,
            description: new.description,
            category_id: new.category_id,
            is_active: new.is_active,
            created_at: now,
            updated_at: now,
        };
        tables
            .subcategories
            .insert(subcategory.id, subcategory.clone());
        Ok(subcategory)
    }

    async fn update_subcategory(
        &self,
        id: SubcategoryId,
        update: SubcategoryUpdate,
    ) -> Result<Option<Subcategory>, RepositoryError> {
        let mut tables = self.tables.write().await;
        Ok(tables.subcategories.get_mut(&id).map(|subcategory| {
            update.apply_to(subcategory);
            subcategory.updated_at = Utc::now();
            subcategory.clone()
        }))
    }

    async fn list_products(&self, active_only: bool) -> Result<Vec<Product>, RepositoryError> {
        let tables = self.tables.read().await;
        let rows = tables
            .products
            .values()
            .filter(|p| !active_only || p.is_active)
            .cloned()
            .collect();
        Ok(newest_first(rows, |p: &Product| (p.created_at, p.id)))
    }

    async fn find_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        Ok(self.tables.read().await.products.get(&id).cloned())
    }

    async fn create_product(&self, new: NewProduct) -> Result<Product, RepositoryError> {
        let mut tables = self.tables.write().await;
        let now = Utc::now();
        let product = Product {
            id: ProductId::new(tables.next_id()),
            name: new.name,
            description: new.description,
            price: new.price,
            download_url: new.download_url,
            file: new.file,
            category: new.category,
            is_active: new.is_active,
            created_at: now,
            updated_at: now,
        };
        tables.products.insert(product.id, product.clone());
        Ok(product)
    }

    async fn update_product(
        &self,
        id: ProductId,
        update: ProductUpdate,
    ) -> Result<Option<Product>, RepositoryError> {
        let mut tables = self.tables.write().await;
        Ok(tables.products.get_mut(&id).map(|product| {
            update.apply_to(product);
            product.updated_at = Utc::now();
            product.clone()
        }))
    }

    async fn create_order(&self, new: NewOrder) -> Result<Order, RepositoryError> {
        let mut tables = self.tables.write().await;
        if let Some(reference) = &new.external_ref
            && tables
                .orders
                .values()
                .any(|o| o.external_ref.as_ref() == Some(reference))
        {
            return Err(RepositoryError::Conflict(
                "order reference already exists".to_owned(),
            ));
        }
        let now = Utc::now();
        let order = Order {
            id: OrderId::new(tables.next_id()),
            user_id: new.user_id,
            product_id: new.product_id,
            amount: new.amount,
            status: new.status,
            external_ref: new.external_ref,
            created_at: now,
            updated_at: now,
        };
        tables.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn find_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        Ok(self.tables.read().await.orders.get(&id).cloned())
    }

    async fn find_order_by_external_ref(
        &self,
        external_ref: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .orders
            .values()
            .find(|o| o.external_ref.as_deref() == Some(external_ref))
            .cloned())
    }

    async fn update_order_status(
        &self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<Option<Order>, RepositoryError> {
        let mut tables = self.tables.write().await;
        Ok(tables.orders.get_mut(&id).map(|order| {
            order.status = status;
            order.updated_at = Utc::now();
            order.clone()
        }))
    }

    async fn latest_settled_order(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<Option<Order>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables
            .orders
            .values()
            .filter(|o| o.user_id == user_id && o.product_id == product_id)
            .filter(|o| o.status.is_settled())
            .max_by_key(|o| (o.created_at, o.id))
            .cloned())
    }

    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        let tables = self.tables.read().await;
        let rows = tables
            .orders
            .values()
            .filter(|o| o.user_id == user_id)
            .cloned()
            .collect();
        Ok(newest_first(rows, |o: &Order| (o.created_at, o.id)))
    }

    async fn list_orders(&self) -> Result<Vec<Order>, RepositoryError> {
        let tables = self.tables.read().await;
        let rows = tables.orders.values().cloned().collect();
        Ok(newest_first(rows, |o: &Order| (o.created_at, o.id)))
    }

    async fn create_lead(&self, new: NewLead) -> Result<Lead, RepositoryError> {
        let mut tables = self.tables.write().await;
        if tables.leads.values().any(|l| l.email == new.email) {
            return Err(RepositoryError::Conflict("lead email already exists".to_owned()));
        }
        let lead = Lead {
            id: LeadId::new(tables.next_id()),
            first_name: new.first_name,
            email: new.email,
            source: new.source,
            is_converted: false,
            created_at: Utc::now(),
        };
        tables.leads.insert(lead.id, lead.clone());
        Ok(lead)
    }

    async fn find_lead_by_email(&self, email: &Email) -> Result<Option<Lead>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.leads.values().find(|l| &l.email == email).cloned())
    }

    async fn mark_lead_converted(&self, email: &Email) -> Result<bool, RepositoryError> {
        let mut tables = self.tables.write().await;
        Ok(tables
            .leads
            .values_mut()
            .find(|l| &l.email == email)
            .map(|lead| lead.is_converted = true)
            .is_some())
    }

    async fn list_leads(&self) -> Result<Vec<Lead>, RepositoryError> {
        let tables = self.tables.read().await;
        let rows = tables.leads.values().cloned().collect();
        Ok(newest_first(rows, |l: &Lead| (l.created_at, l.id)))
    }

    async fn record_download(&self, new: NewDownload) -> Result<Download, RepositoryError> {
        let mut tables = self.tables.write().await;
        let download = Download {
            id: DownloadId::new(tables.next_id()),
            user_id: new.user_id,
            product_id: new.product_id,
            download_url: new.download_url,
            created_at: Utc::now(),
        };
        tables.downloads.insert(download.id, download.clone());
        Ok(download)
    }

    async fn downloads_for_user(&self, user_id: UserId) -> Result<Vec<Download>, RepositoryError> {
        let tables = self.tables.read().await;
        let rows = tables
            .downloads
            .values()
            .filter(|d| d.user_id == user_id)
            .cloned()
            .collect();
        Ok(newest_first(rows, |d: &Download| (d.created_at, d.id)))
    }

    async fn stats(&self) -> Result<StoreStats, RepositoryError> {
        let tables = self.tables.read().await;
        let total_sales = tables
            .orders
            .values()
            .filter(|o| o.status == OrderStatus::Completed)
            .map(|o| o.amount.amount())
            .sum::<Decimal>();
        Ok(StoreStats {
            total_sales,
            total_customers: i64::try_from(tables.users.len()).unwrap_or(i64::MAX),
            total_leads: i64::try_from(tables.leads.len()).unwrap_or(i64::MAX),
            total_orders: i64::try_from(tables.orders.len()).unwrap_or(i64::MAX),
        })
    }
}

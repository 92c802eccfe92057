//! Helpers shared by unit tests: a storage wrapper that fails chosen
//! operations, and a subscriber that captures log output.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::subscriber::DefaultGuard;

use shelf_core::{CategoryId, Email, OrderId, OrderStatus, ProductId, SubcategoryId, UserId};

use crate::db::{MemoryStorage, RepositoryError, Storage, StoreStats};
use crate::models::{
    Category, CategoryUpdate, Download, ExternalProvider, Lead, NewCategory, NewDownload,
    NewLead, NewOrder, NewProduct, NewSubcategory, NewUser, Order, Product, ProductUpdate,
    Subcategory, SubcategoryUpdate, User,
};

fn injected(op: &str) -> RepositoryError {
    RepositoryError::DataCorruption(format!("injected {op} failure"))
}

/// [`MemoryStorage`] with switchable failures.
#[derive(Default)]
pub struct FlakyStorage {
    pub inner: MemoryStorage,
    pub fail_record_download: AtomicBool,
    pub fail_mark_lead_converted: AtomicBool,
    /// Reference lookups that report "no order" before reading for real,
    /// as seen by a request racing a concurrent insert.
    pub stale_reference_reads: AtomicUsize,
}

impl FlakyStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for FlakyStorage {
    async fn ping(&self) -> Result<(), RepositoryError> {
        self.inner.ping().await
    }

    async fn find_user_by_id(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        self.inner.find_user_by_id(id).await
    }

    async fn find_user_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        self.inner.find_user_by_email(email).await
    }

    async fn create_user(&self, new: NewUser) -> Result<User, RepositoryError> {
        self.inner.create_user(new).await
    }

    async fn mark_user_paid(&self, id: UserId) -> Result<Option<User>, RepositoryError> {
        self.inner.mark_user_paid(id).await
    }

    async fn set_user_admin(
        &self,
        email: &Email,
        is_admin: bool,
    ) -> Result<Option<User>, RepositoryError> {
        self.inner.set_user_admin(email, is_admin).await
    }

    async fn find_user_by_external_identity(
        &self,
        provider: ExternalProvider,
        external_id: &str,
    ) -> Result<Option<User>, RepositoryError> {
        self.inner
            .find_user_by_external_identity(provider, external_id)
            .await
    }

    async fn link_external_identity(
        &self,
        id: UserId,
        provider: ExternalProvider,
        external_id: &str,
    ) -> Result<Option<User>, RepositoryError> {
        self.inner
            .link_external_identity(id, provider, external_id)
            .await
    }

    async fn list_categories(&self, active_only: bool) -> Result<Vec<Category>, RepositoryError> {
        self.inner.list_categories(active_only).await
    }

    async fn find_category(&self, id: CategoryId) -> Result<Option<Category>, RepositoryError> {
        self.inner.find_category(id).await
    }

    async fn create_category(&self, new: NewCategory) -> Result<Category, RepositoryError> {
        self.inner.create_category(new).await
    }

    async fn update_category(
        &self,
        id: CategoryId,
        update: CategoryUpdate,
    ) -> Result<Option<Category>, RepositoryError> {
        self.inner.update_category(id, update).await
    }

    async fn list_subcategories(
        &self,
        category: Option<CategoryId>,
        active_only: bool,
    ) -> Result<Vec<Subcategory>, RepositoryError> {
        self.inner.list_subcategories(category, active_only).await
    }

    async fn find_subcategory(
        &self,
        id: SubcategoryId,
    ) -> Result<Option<Subcategory>, RepositoryError> {
        self.inner.find_subcategory(id).await
    }

    async fn create_subcategory(
        &self,
        new: NewSubcategory,
    ) -> Result<Subcategory, RepositoryError> {
        self.inner.create_subcategory(new).await
    }

    async fn update_subcategory(
        &self,
        id: SubcategoryId,
        update: SubcategoryUpdate,
    ) -> Result<Option<Subcategory>, RepositoryError> {
        self.inner.update_subcategory(id, update).await
    }

    async fn list_products(&self, active_only: bool) -> Result<Vec<Product>, RepositoryError> {
        self.inner.list_products(active_only).await
    }

    async fn find_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        self.inner.find_product(id).await
    }

    async fn create_product(&self, new: NewProduct) -> Result<Product, RepositoryError> {
        self.inner.create_product(new).await
    }

    async fn update_product(
        &self,
        id: ProductId,
        update: ProductUpdate,
    ) -> Result<Option<Product>, RepositoryError> {
        self.inner.update_product(id, update).await
    }

    async fn create_order(&self, new: NewOrder) -> Result<Order, RepositoryError> {
        self.inner.create_order(new).await
    }

    async fn find_order(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        self.inner.find_order(id).await
    }

    async fn find_order_by_external_ref(
        &self,
        external_ref: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        let stale = self
            .stale_reference_reads
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if stale {
            return Ok(None);
        }
        self.inner.find_order_by_external_ref(external_ref).await
    }

    async fn update_order_status(
        &self,
        id: OrderId,
        status: OrderStatus,
    ) -> Result<Option<Order>, RepositoryError> {
        self.inner.update_order_status(id, status).await
    }

    async fn latest_settled_order(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<Option<Order>, RepositoryError> {
        self.inner.latest_settled_order(user_id, product_id).await
    }

    async fn orders_for_user(&self, user_id: UserId) -> Result<Vec<Order>, RepositoryError> {
        self.inner.orders_for_user(user_id).await
    }

    async fn list_orders(&self) -> Result<Vec<Order>, RepositoryError> {
        self.inner.list_orders().await
    }

    async fn create_lead(&self, new: NewLead) -> Result<Lead, RepositoryError> {
        self.inner.create_lead(new).await
    }

    async fn find_lead_by_email(&self, email: &Email) -> Result<Option<Lead>, RepositoryError> {
        self.inner.find_lead_by_email(email).await
    }

    async fn mark_lead_converted(&self, email: &Email) -> Result<bool, RepositoryError> {
        if self.fail_mark_lead_converted.load(Ordering::SeqCst) {
            return Err(injected("mark_lead_converted"));
        }
        self.inner.mark_lead_converted(email).await
    }

    async fn list_leads(&self) -> Result<Vec<Lead>, RepositoryError> {
        self.inner.list_leads().await
    }

    async fn record_download(&self, new: NewDownload) -> Result<Download, RepositoryError> {
        if self.fail_record_download.load(Ordering::SeqCst) {
            return Err(injected("record_download"));
        }
        self.inner.record_download(new).await
    }

    async fn downloads_for_user(&self, user_id: UserId) -> Result<Vec<Download>, RepositoryError> {
        self.inner.downloads_for_user(user_id).await
    }

    async fn stats(&self) -> Result<StoreStats, RepositoryError> {
        self.inner.stats().await
    }
}

/// Log lines written while a [`capture_logs`] guard is alive.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    #[must_use]
    pub fn contents(&self) -> String {
        let buf = self.0.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.0
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Route this thread's `tracing` output into a buffer until the guard drops.
///
/// Tasks spawned on a current-thread runtime share the thread, so their
/// events are captured too.
#[must_use]
pub fn capture_logs() -> (CapturedLogs, DefaultGuard) {
    let logs = CapturedLogs::default();
    let writer = logs.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    (logs, tracing::subscriber::set_default(subscriber))
}

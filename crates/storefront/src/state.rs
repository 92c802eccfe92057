//! Application state shared across handlers.

use std::sync::Arc;

use crate::config::StorefrontConfig;
use crate::db::{SharedStorage, Storage};
use crate::files::FileStore;

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// the configured storage, the archive directory and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    storage: SharedStorage,
    files: FileStore,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Arguments
    ///
    /// * `config` - Storefront configuration
    /// * `storage` - Storage backend chosen by `config.storage`
    #[must_use]
    pub fn new(config: StorefrontConfig, storage: SharedStorage) -> Self {
        let files = FileStore::new(config.upload_dir.clone());

        Self {
            inner: Arc::new(AppStateInner {
                config,
                storage,
                files,
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    /// Get a reference to the storage backend.
    #[must_use]
    pub fn storage(&self) -> &dyn Storage {
        self.inner.storage.as_ref()
    }

    /// Get an owned handle to the storage backend, for spawned tasks.
    #[must_use]
    pub fn shared_storage(&self) -> SharedStorage {
        Arc::clone(&self.inner.storage)
    }

    /// Get a reference to the product archive store.
    #[must_use]
    pub fn files(&self) -> &FileStore {
        &self.inner.files
    }
}

//! Product archive delivery.
//!
//! Streams a stored archive to an entitled user in fixed-size chunks and
//! leaves a download audit row behind. The file is never read into memory
//! as a whole; dropping the body stops the reads and closes the file.

use std::io;

use async_stream::try_stream;
use axum::body::Bytes;
use futures::Stream;
use futures::stream::BoxStream;
use thiserror::Error;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tracing::instrument;

use shelf_core::{ProductId, UserId};

use super::entitlement::{EntitlementGrant, EntitlementResolver};
use crate::db::{RepositoryError, SharedStorage};
use crate::files::{FileStore, FileStoreError};
use crate::models::NewDownload;

/// Bytes read from disk per body frame.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Errors from opening a download.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// No grant for this user and product.
    #[error("product not purchased")]
    NotEntitled,

    /// The product has no archive, or the archive is gone from disk.
    #[error("product file not found")]
    FileUnavailable,

    #[error("database error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// An archive ready to be sent.
pub struct Delivery {
    /// Attachment name, already safe for a quoted header value.
    pub filename: String,
    pub content_length: u64,
    pub grant: EntitlementGrant,
    pub body: BoxStream<'static, io::Result<Bytes>>,
}

impl std::fmt::Debug for Delivery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delivery")
            .field("filename", &self.filename)
            .field("content_length", &self.content_length)
            .field("grant", &self.grant)
            .finish_non_exhaustive()
    }
}

/// Opens archives for entitled users.
pub struct DeliveryService<'a> {
    storage: SharedStorage,
    files: &'a FileStore,
}

impl<'a> DeliveryService<'a> {
    #[must_use]
    pub const fn new(storage: SharedStorage, files: &'a FileStore) -> Self {
        Self { storage, files }
    }

    /// Check entitlement, open the product's archive and start the audit write.
    ///
    /// # Errors
    ///
    /// - `DeliveryError::NotEntitled` when no grant applies (including unknown ids)
    /// - `DeliveryError::FileUnavailable` when there is no archive to send
    /// - `DeliveryError::Repository` / `DeliveryError::Io` on infrastructure failure
    #[instrument(skip(self))]
    pub async fn open_download(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<Delivery, DeliveryError> {
        let resolver = EntitlementResolver::new(self.storage.as_ref());
        let (Some(user), Some(product)) = (
            self.storage.find_user_by_id(user_id).await?,
            self.storage.find_product(product_id).await?,
        ) else {
            return Err(DeliveryError::NotEntitled);
        };
        let grant = resolver
            .grant_for(&user, &product)
            .await?
            .ok_or(DeliveryError::NotEntitled)?;

        let Some(stored) = product.file.as_ref() else {
            tracing::warn!(%product_id, "Product has no stored archive");
            return Err(DeliveryError::FileUnavailable);
        };

        let (file, content_length) = match self.files.open(&stored.name).await {
            Ok(opened) => opened,
            Err(FileStoreError::Missing(_) | FileStoreError::InvalidName(_)) => {
                tracing::warn!(
                    %product_id,
                    file_name = %stored.name,
                    "Product archive missing from file store"
                );
                return Err(DeliveryError::FileUnavailable);
            }
            Err(FileStoreError::Io(e)) => return Err(e.into()),
        };

        self.spawn_audit(user_id, product_id);
        tracing::info!(?grant, content_length, "Download started");

        Ok(Delivery {
            filename: format!("{}.zip", sanitize_filename(&product.name)),
            content_length,
            grant,
            body: Box::pin(chunked(file)),
        })
    }

    fn spawn_audit(&self, user_id: UserId, product_id: ProductId) {
        let storage = SharedStorage::clone(&self.storage);
        tokio::spawn(async move {
            let record = NewDownload {
                user_id,
                product_id,
                download_url: format!("/download/{product_id}"),
            };
            if let Err(e) = storage.record_download(record).await {
                let event_id = sentry::capture_error(&e);
                tracing::error!(
                    error = %e,
                    %user_id,
                    %product_id,
                    sentry_event_id = %event_id,
                    "Failed to record download"
                );
            }
        });
    }
}

/// Read `file` to the end in [`CHUNK_SIZE`] frames.
fn chunked(mut file: File) -> impl Stream<Item = io::Result<Bytes>> + Send + 'static {
    try_stream! {
        loop {
            let mut buf = vec![0u8; CHUNK_SIZE];
            let read = file.read(&mut buf).await?;
            if read == 0 {
                break;
            }
            buf.truncate(read);
            yield Bytes::from(buf);
        }
    }
}

/// Make a product name safe to place inside `filename="..."`.
///
/// Quotes, backslashes, path separators and control characters become `_`.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '"' | '\\' | '/' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();

    if cleaned.is_empty() {
        "download".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use futures::StreamExt;
    use shelf_core::{CategoryAssignment, Email, OrderStatus, Price, StoredFile};

    use std::sync::atomic::Ordering;

    use super::*;
    use crate::db::Storage;
    use crate::models::{NewOrder, NewProduct, NewUser, Product, User};
    use crate::test_support::{FlakyStorage, capture_logs};

    struct Fixture {
        storage: Arc<FlakyStorage>,
        files: FileStore,
        _dir: tempfile::TempDir,
        user: User,
        product: Product,
    }

    async fn fixture(file: Option<&str>) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let files = FileStore::new(dir.path());
        let storage = Arc::new(FlakyStorage::new());
        let user = storage
            .create_user(NewUser {
                email: Email::parse("buyer@x.com").unwrap(),
                password_hash: None,
                first_name: "Buyer".to_string(),
                last_name: None,
            })
            .await
            .unwrap();
        let product = storage
            .create_product(NewProduct {
                name: "Icon \"Pack\"".to_string(),
                description: None,
                price: Price::from_cents(4900).unwrap(),
                download_url: None,
                file: file.map(|name| StoredFile {
                    name: name.to_string(),
                    size: 0,
                }),
                category: CategoryAssignment::Unassigned,
                is_active: true,
            })
            .await
            .unwrap();
        Fixture {
            storage,
            files,
            _dir: dir,
            user,
            product,
        }
    }

    impl Fixture {
        fn service(&self) -> DeliveryService<'_> {
            DeliveryService::new(Arc::clone(&self.storage) as SharedStorage, &self.files)
        }

        async fn purchase(&self) {
            self.storage
                .create_order(NewOrder {
                    user_id: self.user.id,
                    product_id: self.product.id,
                    amount: self.product.price,
                    status: OrderStatus::Completed,
                    external_ref: None,
                })
                .await
                .unwrap();
        }
    }

    async fn wait_for_downloads(storage: &dyn Storage, user_id: UserId) -> usize {
        for _ in 0..50 {
            let count = storage.downloads_for_user(user_id).await.unwrap().len();
            if count > 0 {
                return count;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        0
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("Icon \"Pack\""), "Icon _Pack_");
        assert_eq!(sanitize_filename("a/b\\c"), "a_b_c");
        assert_eq!(sanitize_filename("line\nbreak"), "line_break");
        assert_eq!(sanitize_filename("   "), "download");
        assert_eq!(sanitize_filename("Résumé kit"), "Résumé kit");
    }

    #[tokio::test]
    async fn test_streams_whole_file_in_chunks() {
        let f = fixture(Some("p1.zip")).await;
        let contents: Vec<u8> = (0..CHUNK_SIZE * 2 + 10)
            .map(|i| u8::try_from(i % 251).unwrap())
            .collect();
        f.files.write("p1.zip", &contents).await.unwrap();
        f.purchase().await;

        let delivery = f
            .service()
            .open_download(f.user.id, f.product.id)
            .await
            .unwrap();
        assert_eq!(delivery.filename, "Icon _Pack_.zip");
        assert_eq!(delivery.content_length, contents.len() as u64);
        assert!(matches!(delivery.grant, EntitlementGrant::Purchase { .. }));

        let chunks: Vec<Bytes> = delivery
            .body
            .map(|chunk| chunk.unwrap())
            .collect()
            .await;
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.concat(), contents);

        assert_eq!(wait_for_downloads(f.storage.as_ref(), f.user.id).await, 1);
        let downloads = f.storage.downloads_for_user(f.user.id).await.unwrap();
        assert_eq!(
            downloads.first().unwrap().download_url,
            format!("/download/{}", f.product.id)
        );
    }

    #[tokio::test]
    async fn test_not_entitled() {
        let f = fixture(Some("p1.zip")).await;
        f.files.write("p1.zip", b"PK").await.unwrap();

        let result = f.service().open_download(f.user.id, f.product.id).await;
        assert!(matches!(result, Err(DeliveryError::NotEntitled)));
        assert!(
            f.storage
                .downloads_for_user(f.user.id)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_missing_file_is_unavailable() {
        let f = fixture(Some("gone.zip")).await;
        f.purchase().await;

        let (logs, _guard) = capture_logs();
        let result = f.service().open_download(f.user.id, f.product.id).await;
        assert!(matches!(result, Err(DeliveryError::FileUnavailable)));

        let output = logs.contents();
        assert!(output.contains("WARN"), "{output}");
        assert!(
            output.contains("Product archive missing from file store"),
            "{output}"
        );
        assert!(output.contains("gone.zip"), "{output}");
    }

    #[tokio::test]
    async fn test_failed_audit_does_not_block_download() {
        let f = fixture(Some("p1.zip")).await;
        f.files.write("p1.zip", b"archive").await.unwrap();
        f.purchase().await;
        f.storage.fail_record_download.store(true, Ordering::SeqCst);

        let (logs, _guard) = capture_logs();
        let delivery = f
            .service()
            .open_download(f.user.id, f.product.id)
            .await
            .unwrap();
        let chunks: Vec<Bytes> = delivery
            .body
            .map(|chunk| chunk.unwrap())
            .collect()
            .await;
        assert_eq!(chunks.concat(), b"archive");

        for _ in 0..50 {
            if logs.contents().contains("Failed to record download") {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let output = logs.contents();
        assert!(output.contains("ERROR"), "{output}");
        assert!(output.contains("Failed to record download"), "{output}");
        assert!(
            f.storage
                .downloads_for_user(f.user.id)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_no_stored_file_is_unavailable() {
        let f = fixture(None).await;
        f.purchase().await;

        let result = f.service().open_download(f.user.id, f.product.id).await;
        assert!(matches!(result, Err(DeliveryError::FileUnavailable)));
    }

    #[tokio::test]
    async fn test_traversal_name_is_unavailable() {
        let f = fixture(Some("../etc/passwd")).await;
        f.purchase().await;

        let result = f.service().open_download(f.user.id, f.product.id).await;
        assert!(matches!(result, Err(DeliveryError::FileUnavailable)));
    }
}

//! Integration tests for Shelf.
//!
//! Each test spawns the full storefront router on an ephemeral port, backed
//! by in-memory storage, an in-memory session store and a temporary upload
//! directory, then drives it over HTTP with a cookie-keeping client.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p shelf-integration-tests
//! ```
//!
//! No database or external service is needed.

#![allow(clippy::missing_panics_doc, clippy::unwrap_used)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use secrecy::SecretString;
use serde_json::{Value, json};
use tempfile::TempDir;
use tower_sessions::MemoryStore;

use shelf_core::{CategoryAssignment, Email, Price, ProductId, StoredFile, UserId};
use shelf_storefront::build_router;
use shelf_storefront::config::StorefrontConfig;
use shelf_storefront::db::{MemoryStorage, SharedStorage, Storage};
use shelf_storefront::files::{FileStore, generate_archive_name};
use shelf_storefront::models::{Download, NewProduct, Product};
use shelf_storefront::services::payments;
use shelf_storefront::state::AppState;

/// Webhook signing secret configured for every test app.
pub const WEBHOOK_SECRET: &str = "aB3$xY9!mK2@nL5#pQ7&rT0*uW4^zC6";

/// Default password used by [`TestApp::register`].
pub const PASSWORD: &str = "secret1";

/// A running storefront plus direct handles on its storage.
pub struct TestApp {
    pub address: String,
    pub storage: Arc<MemoryStorage>,
    pub files: FileStore,
    _upload_dir: TempDir,
}

impl TestApp {
    /// Spawn with the default test configuration.
    pub async fn spawn() -> Self {
        Self::spawn_with(&[]).await
    }

    /// Spawn with extra environment overrides. An empty value unsets a variable.
    pub async fn spawn_with(overrides: &[(&str, &str)]) -> Self {
        let upload_dir = tempfile::tempdir().expect("Failed to create upload dir");

        let mut vars: HashMap<String, String> = [
            ("STOREFRONT_STORAGE", "memory"),
            ("STOREFRONT_BASE_URL", "http://127.0.0.1"),
            ("STOREFRONT_PAYMENT_WEBHOOK_SECRET", WEBHOOK_SECRET),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_owned(), v.to_owned()))
        .collect();
        vars.insert(
            "STOREFRONT_UPLOAD_DIR".to_owned(),
            upload_dir.path().display().to_string(),
        );
        for (key, value) in overrides {
            vars.insert((*key).to_owned(), (*value).to_owned());
        }

        let config = StorefrontConfig::from_lookup(|key| vars.get(key).cloned())
            .expect("Invalid test configuration");

        let storage = Arc::new(MemoryStorage::new());
        let shared: SharedStorage = storage.clone();
        let state = AppState::new(config, shared);
        let files = state.files().clone();
        let app = build_router(state, MemoryStore::default());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let address = format!("http://{}", listener.local_addr().unwrap());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            address,
            storage,
            files,
            _upload_dir: upload_dir,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.address)
    }

    /// A fresh client with its own cookie jar (i.e. its own session).
    pub fn client() -> Client {
        Client::builder()
            .cookie_store(true)
            .build()
            .expect("Failed to create HTTP client")
    }

    /// Register `email` with [`PASSWORD`]; the client ends up signed in.
    pub async fn register(&self, client: &Client, email: &str) -> Value {
        let resp = client
            .post(self.url("/register"))
            .json(&json!({ "email": email, "password": PASSWORD, "firstName": "Test" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::CREATED, "register {email}");
        resp.json().await.unwrap()
    }

    pub async fn login(&self, client: &Client, email: &str, password: &str) -> StatusCode {
        client
            .post(self.url("/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .unwrap()
            .status()
    }

    /// Register a user and return its signed-in client and id.
    pub async fn user(&self, email: &str) -> (Client, UserId) {
        let client = Self::client();
        let body = self.register(&client, email).await;
        let id = serde_json::from_value(body["id"].clone()).unwrap();
        (client, id)
    }

    /// Register a user and grant admin rights directly in storage.
    pub async fn admin(&self, email: &str) -> Client {
        let (client, _) = self.user(email).await;
        self.storage
            .set_user_admin(&Email::parse(email).unwrap(), true)
            .await
            .unwrap();
        client
    }

    /// Create an active product, storing `contents` as its archive if given.
    pub async fn product(&self, name: &str, contents: Option<&[u8]>) -> Product {
        let file = match contents {
            Some(bytes) => {
                let file_name = generate_archive_name();
                self.files.ensure_root().await.unwrap();
                self.files.write(&file_name, bytes).await.unwrap();
                Some(StoredFile {
                    name: file_name,
                    size: i64::try_from(bytes.len()).unwrap(),
                })
            }
            None => None,
        };
        self.storage
            .create_product(NewProduct {
                name: name.to_owned(),
                description: None,
                price: Price::from_cents(4900).unwrap(),
                download_url: None,
                file,
                category: CategoryAssignment::Unassigned,
                is_active: true,
            })
            .await
            .unwrap()
    }

    pub async fn download(&self, client: &Client, product: ProductId) -> reqwest::Response {
        client
            .get(self.url(&format!("/download/{product}")))
            .send()
            .await
            .unwrap()
    }

    /// Download audit rows are written in the background; poll until `count` exist.
    pub async fn wait_for_downloads(&self, user: UserId, count: usize) -> Vec<Download> {
        for _ in 0..100 {
            let rows = self.storage.downloads_for_user(user).await.unwrap();
            if rows.len() >= count {
                return rows;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {count} download rows for user {user}");
    }

    /// POST a webhook body signed with [`WEBHOOK_SECRET`] at the current time.
    pub async fn send_webhook(&self, body: &Value) -> reqwest::Response {
        let body = serde_json::to_vec(body).unwrap();
        let now = chrono::Utc::now().timestamp();
        let signature = payments::sign(&SecretString::from(WEBHOOK_SECRET), now, &body);
        Self::client()
            .post(self.url("/webhooks/payment"))
            .header(payments::SIGNATURE_HEADER, signature)
            .header("content-type", "application/json")
            .body(body)
            .send()
            .await
            .unwrap()
    }
}

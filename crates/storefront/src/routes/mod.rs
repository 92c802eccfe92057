//! HTTP route handlers for storefront.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                         - Liveness
//! GET  /health/ready                   - Storage readiness
//!
//! # Auth
//! POST /register                       - Create account, start session
//! POST /login                          - Start session
//! POST /logout                         - End session
//! GET  /user                           - Current profile
//!
//! # Purchases and delivery
//! GET  /download/{product_id}          - Stream a purchased archive
//! POST /orders                         - Client-confirmed order (configurable)
//! POST /mark-paid                      - Client-confirmed global unlock (configurable)
//! POST /webhooks/payment               - Signed processor events
//!
//! # Catalog
//! GET  /products                       - Active products
//! GET  /products/{id}                  - One active product
//! GET  /categories                     - Active categories
//! GET  /subcategories                  - Active subcategories
//! GET  /subcategories/category/{id}    - Active subcategories of a category
//! POST /leads                          - Landing-page sign-up
//!
//! # Dashboard (requires auth)
//! GET  /my/orders | /my/downloads | /my/products
//!
//! # Admin (requires admin)
//! GET  /admin/stats | /admin/orders | /admin/leads
//! POST /admin/orders/{id}/status
//! GET|POST /admin/products, PATCH|DELETE /admin/products/{id}
//! GET|POST /admin/categories, PATCH /admin/categories/{id}
//! POST /admin/subcategories, PATCH /admin/subcategories/{id}
//! POST /admin/upload                   - Multipart archive upload
//! ```

pub mod account;
pub mod admin;
pub mod auth;
pub mod catalog;
pub mod downloads;
pub mod health;
pub mod leads;
pub mod orders;
pub mod webhooks;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, FromRequest, FromRequestParts, Path},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use serde::Serialize;

use crate::config::StorefrontConfig;
use crate::error::AppError;
use crate::state::AppState;

/// Room for multipart boundaries and part headers on top of the file itself.
const MULTIPART_OVERHEAD: usize = 64 * 1024;

/// JSON body extractor and response whose rejections are [`AppError`]s.
#[derive(FromRequest)]
#[from_request(via(Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

impl<T: Serialize> IntoResponse for ApiJson<T> {
    fn into_response(self) -> Response {
        Json(self.0).into_response()
    }
}

/// Path extractor whose rejections are [`AppError`]s.
#[derive(FromRequestParts)]
#[from_request(via(Path), rejection(AppError))]
pub struct ApiPath<T>(pub T);

/// Create the dashboard routes router.
pub fn account_routes() -> Router<AppState> {
    Router::new()
        .route("/orders", get(account::orders))
        .route("/downloads", get(account::downloads))
        .route("/products", get(account::products))
}

/// Create the admin routes router.
pub fn admin_routes(max_upload_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/stats", get(admin::stats))
        .route("/orders", get(admin::orders))
        .route("/orders/{id}/status", post(admin::update_order_status))
        .route("/leads", get(admin::leads))
        .route(
            "/products",
            get(admin::products).post(admin::create_product),
        )
        .route(
            "/products/{id}",
            patch(admin::update_product).delete(admin::deactivate_product),
        )
        .route(
            "/categories",
            get(admin::categories).post(admin::create_category),
        )
        .route("/categories/{id}", patch(admin::update_category))
        .route("/subcategories", post(admin::create_subcategory))
        .route("/subcategories/{id}", patch(admin::update_subcategory))
        .route(
            "/upload",
            post(admin::upload).layer(DefaultBodyLimit::max(
                max_upload_bytes.saturating_add(MULTIPART_OVERHEAD),
            )),
        )
}

/// Create all routes for the storefront.
pub fn routes(config: &StorefrontConfig) -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .route("/health/ready", get(health::readiness))
        // Auth
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout))
        .route("/user", get(auth::current_user))
        // Purchases and delivery
        .route("/download/{product_id}", get(downloads::download))
        .route("/orders", post(orders::create_order))
        .route("/mark-paid", post(orders::mark_paid))
        .route("/webhooks/payment", post(webhooks::payment))
        // Catalog
        .route("/products", get(catalog::products))
        .route("/products/{id}", get(catalog::product))
        .route("/categories", get(catalog::categories))
        .route("/subcategories", get(catalog::subcategories))
        .route(
            "/subcategories/category/{id}",
            get(catalog::subcategories_for_category),
        )
        .route("/leads", post(leads::capture))
        .nest("/my", account_routes())
        .nest("/admin", admin_routes(config.max_upload_bytes))
}

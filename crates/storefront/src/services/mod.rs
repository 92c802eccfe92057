//! Business logic services for storefront.
//!
//! Each service borrows the storage handle for the duration of a request.
//!
//! # Services
//!
//! - `auth` - Registration and password login (Argon2id)
//! - `session` - Issue, resolve and destroy login sessions
//! - `entitlement` - Who may download what, and why
//! - `delivery` - Stream product archives and record downloads
//! - `orders` - Record confirmed payments, global unlock, refunds
//! - `payments` - Signed processor webhooks
//! - `catalog` - Product and taxonomy reads and admin writes
//! - `leads` - Landing-page prospect capture

pub mod auth;
pub mod catalog;
pub mod delivery;
pub mod entitlement;
pub mod leads;
pub mod orders;
pub mod payments;
pub mod session;

pub use auth::{AuthError, AuthService, Registration};
pub use catalog::{CatalogError, CatalogProduct, CatalogService};
pub use delivery::{Delivery, DeliveryError, DeliveryService};
pub use entitlement::{EntitlementGrant, EntitlementResolver};
pub use leads::{LeadCapture, LeadError, LeadService};
pub use orders::{OrderError, OrderRecorder};
pub use payments::{PaymentWebhooks, WebhookError, WebhookOutcome};
pub use session::{SessionError, SessionManager, SessionToken};

//! Shelf storefront library.
//!
//! JSON API for selling downloadable archives: accounts and sessions,
//! catalog, orders and payment webhooks, entitlement-checked streaming
//! downloads, lead capture and an admin surface. Exposed as a library so
//! the binary, the CLI and the integration tests share one implementation.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod app;
pub mod config;
pub mod db;
pub mod error;
pub mod files;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod state;

#[cfg(test)]
mod test_support;

pub use app::build_router;

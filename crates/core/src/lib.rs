//! Shelf Core - Shared types library.
//!
//! This crate provides common types used across all Shelf components:
//! - `storefront` - Public JSON API, buyer dashboard, admin catalog surface
//! - `cli` - Command-line tools for migrations, admin promotion and seeding
//!
//! # Architecture
//!
//! The core crate contains only types and traits - no I/O, no database access,
//! no HTTP clients. This keeps it lightweight and allows it to be used anywhere.
//!
//! # Modules
//!
//! - [`types`] - Newtype wrappers for type-safe IDs, prices, emails, statuses
//!   and catalog references

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod types;

pub use types::*;

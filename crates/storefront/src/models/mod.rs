//! Domain models for the storefront.
//!
//! These are validated domain types; database row types live in `db::postgres`.

pub mod category;
pub mod download;
pub mod lead;
pub mod order;
pub mod product;
pub mod session;
pub mod user;

pub use category::{
    Category, CategoryUpdate, NewCategory, NewSubcategory, Subcategory, SubcategoryUpdate,
};
pub use download::{Download, NewDownload};
pub use lead::{DEFAULT_LEAD_SOURCE, Lead, NewLead};
pub use order::{NewOrder, Order};
pub use product::{NewProduct, Product, ProductUpdate};
pub use session::{CurrentUser, keys as session_keys};
pub use user::{ExternalProvider, NewUser, PublicUser, User};

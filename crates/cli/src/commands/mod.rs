//! CLI subcommands.

pub mod admin;
pub mod migrate;
pub mod seed;

use secrecy::SecretString;
use sqlx::PgPool;

/// Environment variable naming the storefront database.
const DATABASE_URL_VAR: &str = "STOREFRONT_DATABASE_URL";

/// Read the database URL, preferring `STOREFRONT_DATABASE_URL` over `DATABASE_URL`.
fn database_url() -> Option<SecretString> {
    dotenvy::dotenv().ok();
    std::env::var(DATABASE_URL_VAR)
        .or_else(|_| std::env::var("DATABASE_URL"))
        .ok()
        .map(SecretString::from)
}

/// Connect to the storefront database.
///
/// # Errors
///
/// Returns `ConnectError::MissingEnvVar` if no URL is configured, or the
/// sqlx error if the connection fails.
pub async fn connect() -> Result<PgPool, ConnectError> {
    let url = database_url().ok_or(ConnectError::MissingEnvVar(DATABASE_URL_VAR))?;
    tracing::info!("Connecting to storefront database...");
    Ok(shelf_storefront::db::create_pool(&url).await?)
}

/// Errors while connecting to the database.
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),
}

//! Subcommand implementations.

pub mod admin;
pub mod dev;
pub mod migrate;
pub mod seed;

use secrecy::SecretString;
use thiserror::Error;

/// Environment problems shared by the database commands.
#[derive(Debug, Error)]
pub enum EnvError {
    /// Required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),
}

/// `STOREFRONT_DATABASE_URL`, falling back to `DATABASE_URL`.
///
/// # Errors
///
/// Returns `EnvError::MissingEnvVar` if neither is set.
pub fn database_url() -> Result<SecretString, EnvError> {
    dotenvy::dotenv().ok();

    std::env::var("STOREFRONT_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .map(SecretString::from)
        .map_err(|_| EnvError::MissingEnvVar("STOREFRONT_DATABASE_URL"))
}

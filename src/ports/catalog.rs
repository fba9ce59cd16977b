//! Catalog lookup for display metadata.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Display metadata for a catalog item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookMetadata {
    pub title: String,
    pub authors: Vec<String>,
    pub size_bytes: Option<u64>,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("catalog unavailable: {0}")]
    Unavailable(String),
    #[error("malformed catalog entry for {id}: {reason}")]
    Malformed { id: String, reason: String },
}

/// Resolves an id to metadata. Used for records and notifications only.
#[async_trait]
pub trait Catalog: Send + Sync {
    async fn lookup(&self, id: &str) -> Result<Option<BookMetadata>, CatalogError>;
}

/// A catalog that knows nothing; titles fall back to the id.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCatalog;

#[async_trait]
impl Catalog for NullCatalog {
    async fn lookup(&self, _id: &str) -> Result<Option<BookMetadata>, CatalogError> {
        Ok(None)
    }
}

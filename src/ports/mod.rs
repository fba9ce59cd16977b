//! Collaborator seams the orchestrator consumes.
//!
//! Each trait is object-safe and carries a small provided implementation so
//! the binary and tests can run without remote services.

pub mod catalog;
pub mod clock;
pub mod files;
pub mod settings;
pub mod upload;

pub use catalog::{BookMetadata, Catalog, CatalogError, NullCatalog};
pub use clock::{Clock, SystemClock};
pub use files::{FileError, FileOps, INDEXER_CATEGORY_SUBDIR, LocalFileOps};
pub use settings::{Settings, SettingsProvider, StaticSettings};
pub use upload::{DisabledUploader, UploadError, Uploader};

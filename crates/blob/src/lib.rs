//! Binary image storage.
//!
//! Images live next to the object store's entries in the same SQLite
//! database, keyed by caller-chosen strings and tagged with a [`Category`]
//! for accounting and backups. Payloads are handed out through
//! [`AccessUrl`]s registered in a [`HandleRegistry`].

mod category;
pub mod error;
mod handle;
mod image_ref;
mod key;
mod media;
mod models;
mod staging;
mod store;

pub use crate::category::Category;
pub use crate::handle::{AccessUrl, HandleRegistry, HandleTarget};
pub use crate::image_ref::{ImageRef, ResolvedImage};
pub use crate::key::{STAGING_SUFFIX, is_staging_key, validate_key};
pub use crate::media::MediaType;
pub use crate::models::{BlobExport, BlobInfo, BlobStats, CategoryStats, ImportReport};
pub use crate::staging::StagedUpload;
pub use crate::store::BlobStore;

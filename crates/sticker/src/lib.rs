//! Sticker catalog.
//!
//! Stickers are images tagged with a short meaning. The catalog itself is a
//! single list under `STICKERS / "catalog"`; images uploaded by the user are
//! stored in the blob store, while bulk-imported ones only keep their remote
//! URL.

mod catalog;
pub mod error;
mod import;
mod models;

pub use crate::catalog::{CATALOG_KEY, StickerCatalog};
pub use crate::import::{is_well_formed_url, parse_line};
pub use crate::models::{BatchImportReport, Sticker, StickerSource};

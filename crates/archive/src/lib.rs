//! Backup and restore.
//!
//! A full backup is a ZIP container holding `data.json` (every collection,
//! wrapped with a format version and export timestamp) and one
//! `images/<category>/<key>.<ext>` entry per stored image. A structured-only
//! backup is the bare `data.json` document.
//!
//! Restores validate the whole input before writing anything. Image entries
//! and unknown document fields that can't be restored are reported, not
//! fatal.

mod archiver;
mod codec;
mod document;
mod entry;
pub mod error;
mod report;

pub use crate::archiver::{Archiver, BackupFormat};
pub use crate::codec::ZIP_MAGIC;
pub use crate::document::{CURRENT_VERSION, Document, LEGACY_VERSION};
pub use crate::entry::{DATA_ENTRY, IMAGES_DIR, ImageEntry, image_path, parse_image_path};
pub use crate::report::RestoreReport;

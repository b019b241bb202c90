use hearth_store::Collection;

use crate::document::Document;

/// What a restore did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RestoreReport {
    /// Version of the restored document (1 if it had none).
    pub version: u64,
    pub export_time: Option<String>,
    /// Collections whose contents were replaced.
    pub collections: Vec<Collection>,
    /// Entries written across those collections.
    pub entries: usize,
    pub images_imported: usize,
    /// `(entry or key, reason)` for every image that was not restored.
    pub skipped_images: Vec<(String, String)>,
    /// Top-level document fields that were ignored.
    pub unknown_fields: Vec<String>,
}

impl RestoreReport {
    pub(crate) fn from_document(document: &Document) -> Self {
        Self {
            version: document.version,
            export_time: document.export_time.clone(),
            collections: document.collections.keys().copied().collect(),
            entries: document.entry_count(),
            unknown_fields: document.unknown_fields.clone(),
            ..Self::default()
        }
    }

    /// Nothing was skipped or ignored.
    pub fn is_clean(&self) -> bool {
        self.skipped_images.is_empty() && self.unknown_fields.is_empty()
    }
}

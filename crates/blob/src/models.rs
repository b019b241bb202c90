use std::collections::BTreeMap;
use time::UtcDateTime;

use crate::category::Category;
use crate::media::MediaType;

/// Metadata about a stored blob, without its payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlobInfo {
    pub key: String,
    pub category: Category,
    /// Payload length in bytes.
    pub size: u64,
    pub media_type: MediaType,
    pub created_at: UtcDateTime,
}

/// Payload plus category, as carried through backups.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlobExport {
    pub payload: Vec<u8>,
    pub category: Category,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CategoryStats {
    pub count: u64,
    pub total_size: u64,
}

/// Per-category accounting. Categories without records are absent.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlobStats(pub BTreeMap<Category, CategoryStats>);

impl BlobStats {
    /// Grand total of every category, in bytes.
    pub fn total_size(&self) -> u64 {
        self.0.values().map(|stats| stats.total_size).sum()
    }

    pub fn total_count(&self) -> u64 {
        self.0.values().map(|stats| stats.count).sum()
    }

    pub fn get(&self, category: Category) -> CategoryStats {
        self.0.get(&category).copied().unwrap_or_default()
    }
}

/// Outcome of a best-effort bulk write.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImportReport {
    pub imported: usize,
    /// `(key, reason)` for every item that was not written.
    pub failed: Vec<(String, String)>,
}

impl ImportReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

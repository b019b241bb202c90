use hearth_blob::ImageRef;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Where a sticker's image lives.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StickerSource {
    /// Stored locally under this blob key.
    Blob { key: String },
    /// Hosted elsewhere; never fetched.
    External { url: String },
}

impl Display for StickerSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            StickerSource::Blob { key } => write!(f, "blob:{key}"),
            StickerSource::External { url } => f.write_str(url),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sticker {
    pub id: String,
    pub meaning: String,
    #[serde(flatten)]
    pub source: StickerSource,
    /// Unix time in milliseconds.
    pub created_at: i64,
}

impl Sticker {
    pub fn image(&self) -> ImageRef {
        match &self.source {
            StickerSource::Blob { key } => ImageRef::Referenced(key.clone()),
            StickerSource::External { url } => ImageRef::External(url.clone()),
        }
    }

    /// The blob key, for locally stored stickers.
    pub fn blob_key(&self) -> Option<&str> {
        match &self.source {
            StickerSource::Blob { key } => Some(key),
            StickerSource::External { .. } => None,
        }
    }
}

/// Outcome of a line-oriented bulk import.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchImportReport {
    pub success_count: usize,
    pub failed_count: usize,
    /// One human-readable message per failed line.
    pub errors: Vec<String>,
}

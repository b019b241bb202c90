use hearth_blob::{BlobStore, Category};
use hearth_store::{Collection, ObjectStore};
use std::sync::Arc;
use time::UtcDateTime;
use tokio::sync::Mutex;
use tracing::instrument;

use crate::error::{ErrorKind, Result};
use crate::import::parse_line;
use crate::models::{BatchImportReport, Sticker, StickerSource};

/// `STICKERS` key holding the catalog list.
pub const CATALOG_KEY: &str = "catalog";

fn now_millis() -> i64 {
    (UtcDateTime::now().unix_timestamp_nanos() / 1_000_000) as i64
}

fn new_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// The sticker catalog: one list in the object store, with locally stored
/// images in the blob store under `sticker-<id>`.
///
/// Clones share one write lock, so read-modify-write cycles on the list never
/// interleave.
#[derive(Debug, Clone)]
pub struct StickerCatalog {
    store: ObjectStore,
    blobs: BlobStore,
    writer: Arc<Mutex<()>>,
}

impl StickerCatalog {
    pub fn new(store: ObjectStore, blobs: BlobStore) -> Self {
        Self {
            store,
            blobs,
            writer: Arc::new(Mutex::new(())),
        }
    }

    /// Every sticker, in insertion order.
    pub async fn list(&self) -> Result<Vec<Sticker>> {
        let stickers = self
            .store
            .get_as::<Vec<Sticker>>(Collection::Stickers, CATALOG_KEY)
            .await
            .map_err(ErrorKind::store)?;
        Ok(stickers.unwrap_or_default())
    }

    async fn persist(&self, stickers: &[Sticker]) -> Result<()> {
        self.store
            .set_as(Collection::Stickers, CATALOG_KEY, &stickers)
            .await
            .map_err(ErrorKind::store)
    }

    pub async fn get(&self, id: &str) -> Result<Option<Sticker>> {
        Ok(self.list().await?.into_iter().find(|sticker| sticker.id == id))
    }

    /// Stickers whose meaning contains `text`, ignoring case.
    pub async fn find_by_meaning(&self, text: &str) -> Result<Vec<Sticker>> {
        let needle = text.trim().to_lowercase();
        let mut stickers = self.list().await?;
        stickers.retain(|sticker| sticker.meaning.to_lowercase().contains(&needle));
        Ok(stickers)
    }

    /// Store an image and add it to the catalog.
    ///
    /// Fails with [`ValidationError`](ErrorKind::ValidationError) before
    /// writing anything if the meaning is blank.
    #[instrument(skip(self, payload), fields(size = payload.len()))]
    pub async fn add_sticker(&self, payload: &[u8], meaning: &str) -> Result<Sticker> {
        let meaning = meaning.trim();
        if meaning.is_empty() {
            exn::bail!(ErrorKind::ValidationError("meaning must not be empty".to_string()));
        }
        let id = new_id();
        let key = format!("sticker-{id}");
        let url = self
            .blobs
            .save_image(&key, payload, Category::Sticker)
            .await
            .map_err(ErrorKind::blob)?;
        self.blobs.handles().release(&url);

        let sticker = Sticker {
            id,
            meaning: meaning.to_string(),
            source: StickerSource::Blob { key: key.clone() },
            created_at: now_millis(),
        };
        let _guard = self.writer.lock().await;
        let mut stickers = match self.list().await {
            Ok(stickers) => stickers,
            Err(err) => {
                _ = self.blobs.delete_image(&key).await;
                return Err(err);
            },
        };
        stickers.push(sticker.clone());
        if let Err(err) = self.persist(&stickers).await {
            // Don't leave an image nothing points at.
            _ = self.blobs.delete_image(&key).await;
            return Err(err);
        }
        Ok(sticker)
    }

    /// Remove a sticker, and its image if stored locally. `false` if the id
    /// is unknown.
    #[instrument(skip(self))]
    pub async fn delete_sticker(&self, id: &str) -> Result<bool> {
        let _guard = self.writer.lock().await;
        let mut stickers = self.list().await?;
        let Some(index) = stickers.iter().position(|sticker| sticker.id == id) else {
            return Ok(false);
        };
        let removed = stickers.remove(index);
        self.persist(&stickers).await?;
        if let Some(key) = removed.blob_key() {
            self.blobs.delete_image(key).await.map_err(ErrorKind::blob)?;
        }
        Ok(true)
    }

    /// Import `meaning-URL` lines as externally hosted stickers.
    ///
    /// Blank lines are ignored. A malformed line is recorded as
    /// `line N: <reason>: <line>` and the rest of the batch still goes in.
    /// The catalog is written once, after every line was looked at.
    #[instrument(skip_all, fields(lines = text.lines().count()))]
    pub async fn batch_import_stickers_from_url(&self, text: &str) -> Result<BatchImportReport> {
        let mut report = BatchImportReport::default();
        let mut added = Vec::new();
        for (index, line) in text.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match parse_line(line) {
                Ok((meaning, url)) => {
                    added.push(Sticker {
                        id: new_id(),
                        meaning: meaning.to_string(),
                        source: StickerSource::External { url: url.to_string() },
                        created_at: now_millis(),
                    });
                    report.success_count += 1;
                },
                Err(reason) => {
                    let message = format!("line {}: {reason}: {}", index + 1, line.trim());
                    tracing::warn!("{message}");
                    report.errors.push(message);
                    report.failed_count += 1;
                },
            }
        }
        if !added.is_empty() {
            let _guard = self.writer.lock().await;
            let mut stickers = self.list().await?;
            stickers.extend(added);
            self.persist(&stickers).await?;
        }
        tracing::info!(
            success = report.success_count,
            failed = report.failed_count,
            "imported stickers"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_blob::ImageRef;
    use hearth_store::Database;

    const GIF: &[u8] = b"GIF89a\x01\x00\x01\x00";

    async fn catalog() -> (StickerCatalog, ObjectStore, BlobStore) {
        let db = Database::connect_in_memory().await.unwrap();
        let store = ObjectStore::from(&db);
        let blobs = BlobStore::from(&db);
        (StickerCatalog::new(store.clone(), blobs.clone()), store, blobs)
    }

    #[tokio::test]
    async fn test_add_sticker() {
        let (catalog, _, blobs) = catalog().await;
        let sticker = catalog.add_sticker(GIF, "  happy  ").await.unwrap();
        assert_eq!(sticker.meaning, "happy");
        let key = sticker.blob_key().unwrap();
        assert_eq!(key, format!("sticker-{}", sticker.id));

        let info = blobs.stat(key).await.unwrap().unwrap();
        assert_eq!(info.category, Category::Sticker);
        assert_eq!(catalog.list().await.unwrap(), vec![sticker.clone()]);
        assert!(blobs.resolve(&sticker.image()).await.unwrap().is_some());
        // The save handle was not kept around.
        assert_eq!(blobs.handles().live_handles(), 1);
    }

    #[tokio::test]
    async fn test_blank_meaning_writes_nothing() {
        let (catalog, store, blobs) = catalog().await;
        let err = catalog.add_sticker(GIF, "   ").await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::ValidationError(_)));
        assert!(blobs.list_all_images().await.unwrap().is_empty());
        assert_eq!(store.get(Collection::Stickers, CATALOG_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_sticker() {
        let (catalog, _, blobs) = catalog().await;
        let local = catalog.add_sticker(GIF, "wave").await.unwrap();
        catalog
            .batch_import_stickers_from_url("nod-https://x/nod.png")
            .await
            .unwrap();
        let external = catalog.find_by_meaning("nod").await.unwrap().remove(0);

        assert!(catalog.delete_sticker(&local.id).await.unwrap());
        assert!(blobs.list_all_images().await.unwrap().is_empty());
        assert!(catalog.delete_sticker(&external.id).await.unwrap());
        assert!(catalog.list().await.unwrap().is_empty());
        assert!(!catalog.delete_sticker(&local.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_batch_import_partial_failure() {
        let (catalog, _, _) = catalog().await;
        let report = catalog
            .batch_import_stickers_from_url("happy-https://x/a.png\nBADLINE\nsad-https://x/b.png")
            .await
            .unwrap();
        assert_eq!(report.success_count, 2);
        assert_eq!(report.failed_count, 1);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("BADLINE"), "{:?}", report.errors);
        assert!(report.errors[0].starts_with("line 2:"));

        let stickers = catalog.list().await.unwrap();
        let meanings: Vec<_> = stickers.iter().map(|s| s.meaning.as_str()).collect();
        assert_eq!(meanings, vec!["happy", "sad"]);
        assert_eq!(stickers[0].image(), ImageRef::External("https://x/a.png".to_string()));
    }

    #[tokio::test]
    async fn test_batch_import_appends_to_existing() {
        let (catalog, _, _) = catalog().await;
        catalog.add_sticker(GIF, "first").await.unwrap();
        let report = catalog
            .batch_import_stickers_from_url("\n\n  \nsecond-https://x/2.png\n")
            .await
            .unwrap();
        assert_eq!(report, BatchImportReport {
            success_count: 1,
            failed_count: 0,
            errors: vec![],
        });
        assert_eq!(catalog.list().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_batch_import_all_bad_writes_nothing() {
        let (catalog, store, _) = catalog().await;
        let report = catalog.batch_import_stickers_from_url("nope\n-https://x").await.unwrap();
        assert_eq!(report.failed_count, 2);
        assert_eq!(store.get(Collection::Stickers, CATALOG_KEY).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_concurrent_adds_keep_every_sticker() {
        let (catalog, _, blobs) = catalog().await;
        let other = catalog.clone();
        let (one, two, batch) = tokio::join!(
            catalog.add_sticker(GIF, "one"),
            other.add_sticker(GIF, "two"),
            catalog.batch_import_stickers_from_url("three-https://x/3.png"),
        );
        one.unwrap();
        two.unwrap();
        assert_eq!(batch.unwrap().success_count, 1);

        let mut meanings: Vec<_> = catalog.list().await.unwrap().into_iter().map(|s| s.meaning).collect();
        meanings.sort_unstable();
        assert_eq!(meanings, vec!["one", "three", "two"]);
        // Every stored image is still referenced by the catalog.
        assert_eq!(blobs.list_all_images().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_find_by_meaning() {
        let (catalog, _, _) = catalog().await;
        catalog
            .batch_import_stickers_from_url("Happy-https://x/a.png\nunhappy-https://x/b.png\nsad-https://x/c.png")
            .await
            .unwrap();
        assert_eq!(catalog.find_by_meaning("HAPPY").await.unwrap().len(), 2);
        assert_eq!(catalog.find_by_meaning("sad").await.unwrap().len(), 1);
        assert!(catalog.find_by_meaning("angry").await.unwrap().is_empty());
    }
}

//! Binary image storage on the shared medium.

use exn::{OptionExt, ResultExt};
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use hearth_store::Database;
use sqlx::SqlitePool;
use std::collections::BTreeMap;
use std::sync::Arc;
use time::UtcDateTime;
use tracing::instrument;

use crate::category::Category;
use crate::error::{ErrorKind, Result};
use crate::handle::{AccessUrl, HandleRegistry};
use crate::image_ref::{ImageRef, ResolvedImage};
use crate::key::validate_key;
use crate::media::MediaType;
use crate::models::{BlobExport, BlobInfo, BlobStats, CategoryStats, ImportReport};

#[derive(sqlx::FromRow)]
pub(crate) struct InfoRow {
    key: String,
    category: String,
    media_type: String,
    size: i64,
    created_at: i64,
}

impl InfoRow {
    pub(crate) fn into_info(self) -> Result<BlobInfo> {
        Ok(BlobInfo {
            category: self.category.parse()?,
            media_type: MediaType::from_mime(&self.media_type),
            size: u64::try_from(self.size).or_raise(|| ErrorKind::InvalidData("negative blob size"))?,
            created_at: UtcDateTime::from_unix_timestamp(self.created_at)
                .or_raise(|| ErrorKind::InvalidData("blob timestamp"))?,
            key: self.key,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PayloadRow {
    media_type: String,
    payload: Vec<u8>,
}

/// Keyed image payloads, grouped into [`Category`]s for accounting.
///
/// Reads that hand a payload to the UI go through access handles: each call
/// to [`get_image`](Self::get_image) mints a new [`AccessUrl`] in the shared
/// [`HandleRegistry`], which the caller must release.
#[derive(Debug, Clone)]
pub struct BlobStore {
    db: Database,
    handles: HandleRegistry,
}

impl From<&Database> for BlobStore {
    fn from(db: &Database) -> Self {
        Self::new(db.clone())
    }
}

impl BlobStore {
    pub fn new(db: Database) -> Self {
        Self::with_handles(db, HandleRegistry::new())
    }

    pub fn with_handles(db: Database, handles: HandleRegistry) -> Self {
        Self { db, handles }
    }

    pub fn handles(&self) -> &HandleRegistry {
        &self.handles
    }

    pub(crate) fn pool(&self) -> Result<&SqlitePool> {
        self.db.pool().map_err(ErrorKind::store)
    }

    async fn write(&self, key: &str, payload: &[u8], category: Category) -> Result<MediaType> {
        let key = validate_key(key)?;
        let media_type = MediaType::from_magic_bytes(payload);
        sqlx::query(include_str!("../queries/upsert_blob.sql"))
            .bind(key)
            .bind(category.as_str())
            .bind(media_type.mime())
            .bind(payload.len() as i64)
            .bind(payload)
            .bind(UtcDateTime::now().unix_timestamp())
            .execute(self.pool()?)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(media_type)
    }

    // =========================================================================
    // Single records
    // =========================================================================

    /// Store (or overwrite) an image and mint a handle for it.
    #[instrument(skip(self, payload), fields(size = payload.len()))]
    pub async fn save_image(&self, key: &str, payload: &[u8], category: Category) -> Result<AccessUrl> {
        let media_type = self.write(key, payload, category).await?;
        Ok(self.handles.mint(Some(key), media_type, Arc::<[u8]>::from(payload)))
    }

    /// Mint a fresh handle for a stored image. `None` if absent.
    pub async fn get_image(&self, key: &str) -> Result<Option<AccessUrl>> {
        let row: Option<PayloadRow> = sqlx::query_as(include_str!("../queries/get_blob.sql"))
            .bind(key)
            .fetch_optional(self.pool()?)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(row.map(|row| {
            self.handles
                .mint(Some(key), MediaType::from_mime(&row.media_type), row.payload)
        }))
    }

    /// Raw payload of a stored image.
    pub async fn read_image(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let row: Option<PayloadRow> = sqlx::query_as(include_str!("../queries/get_blob.sql"))
            .bind(key)
            .fetch_optional(self.pool()?)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(row.map(|row| row.payload))
    }

    /// Metadata of a stored image.
    pub async fn stat(&self, key: &str) -> Result<Option<BlobInfo>> {
        let row: Option<InfoRow> = sqlx::query_as(include_str!("../queries/stat_blob.sql"))
            .bind(key)
            .fetch_optional(self.pool()?)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(InfoRow::into_info).transpose()
    }

    /// Duplicate `src` (payload and category) under `dest`, replacing
    /// whatever `dest` held. The source stays in place.
    #[instrument(skip(self))]
    pub async fn copy_image(&self, src: &str, dest: &str) -> Result<()> {
        let dest = validate_key(dest)?;
        if src == dest {
            return match self.stat(src).await? {
                Some(_) => Ok(()),
                None => exn::bail!(ErrorKind::NotFound(src.to_string())),
            };
        }
        let result = sqlx::query(include_str!("../queries/copy_blob.sql"))
            .bind(dest)
            .bind(UtcDateTime::now().unix_timestamp())
            .bind(src)
            .execute(self.pool()?)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if result.rows_affected() == 0 {
            exn::bail!(ErrorKind::NotFound(src.to_string()));
        }
        Ok(())
    }

    /// Remove an image. Absent keys are a no-op; returns whether anything
    /// was removed. Live handles keep their payload until released.
    #[instrument(skip(self))]
    pub async fn delete_image(&self, key: &str) -> Result<bool> {
        let result = sqlx::query(include_str!("../queries/delete_blob.sql"))
            .bind(key)
            .execute(self.pool()?)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected() > 0)
    }

    /// Turn a stored image reference into something displayable.
    ///
    /// A dangling key or malformed inline payload is "no image", never an
    /// error; only medium failures are raised.
    pub async fn resolve(&self, image: &ImageRef) -> Result<Option<ResolvedImage>> {
        match image {
            ImageRef::Inline { media_type, payload } => Ok(Some(ResolvedImage::Handle(self.handles.mint(
                None,
                *media_type,
                payload.as_slice(),
            )))),
            ImageRef::External(url) => Ok(Some(ResolvedImage::External(url.clone()))),
            ImageRef::Referenced(key) => {
                let url = self.get_image(key).await?;
                if url.is_none() {
                    tracing::debug!(key, "dangling image reference");
                }
                Ok(url.map(ResolvedImage::Handle))
            },
        }
    }

    // =========================================================================
    // Listing & accounting
    // =========================================================================

    /// Stream metadata of every stored image, ordered by key.
    pub fn list_stream(&self) -> BoxStream<'_, Result<BlobInfo>> {
        let pool = match self.pool() {
            Ok(pool) => pool,
            Err(err) => return futures::stream::once(async move { Err(err) }).boxed(),
        };
        sqlx::query_as::<_, InfoRow>(include_str!("../queries/list_blobs.sql"))
            .fetch(pool)
            .map(|row| row.or_raise(|| ErrorKind::Database).and_then(InfoRow::into_info))
            .boxed()
    }

    pub async fn list_all_images(&self) -> Result<Vec<BlobInfo>> {
        self.list_stream().try_collect().await
    }

    /// Count and byte total per category.
    pub async fn get_image_category_stats(&self) -> Result<BlobStats> {
        let rows: Vec<(String, i64, i64)> = sqlx::query_as(include_str!("../queries/category_stats.sql"))
            .fetch_all(self.pool()?)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let mut stats: BTreeMap<Category, CategoryStats> = BTreeMap::new();
        for (category, count, total_size) in rows {
            // Unsigned by construction: COUNT and a SUM of lengths.
            let entry = stats.entry(category.parse::<Category>()?).or_default();
            entry.count += count.max(0) as u64;
            entry.total_size += total_size.max(0) as u64;
        }
        Ok(BlobStats(stats))
    }

    /// Grand total of stored payload bytes.
    pub async fn total_size(&self) -> Result<u64> {
        Ok(self.get_image_category_stats().await?.total_size())
    }

    // =========================================================================
    // Bulk
    // =========================================================================

    /// Every payload with its category, keyed by blob key.
    #[instrument(skip(self))]
    pub async fn export_all_images_with_category(&self) -> Result<BTreeMap<String, BlobExport>> {
        let rows: Vec<(String, String, Vec<u8>)> = sqlx::query_as(include_str!("../queries/export_blobs.sql"))
            .fetch_all(self.pool()?)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter()
            .map(|(key, category, payload)| -> Result<(String, BlobExport)> {
                Ok((key, BlobExport { payload, category: category.parse()? }))
            })
            .collect()
    }

    /// Write every item independently.
    ///
    /// Item-level failures are collected in the report and the batch carries
    /// on; nothing already written is rolled back. Losing the medium itself
    /// aborts the batch since every remaining write would fail the same way.
    #[instrument(skip_all, fields(count = images.len()))]
    pub async fn import_all_images(&self, images: &BTreeMap<String, BlobExport>) -> Result<ImportReport> {
        let mut report = ImportReport::default();
        for (key, image) in images {
            match self.write(key, &image.payload, image.category).await {
                Ok(_) => report.imported += 1,
                Err(err) if err.is_unavailable() => return Err(err),
                Err(err) => {
                    tracing::warn!(key, error = ?err, "skipping image during import");
                    report.failed.push((key.clone(), err.to_string()));
                },
            }
        }
        tracing::info!(imported = report.imported, failed = report.failed.len(), "imported images");
        Ok(report)
    }

    #[instrument(skip(self))]
    pub async fn clear_all_images(&self) -> Result<()> {
        let result = sqlx::query(include_str!("../queries/clear_blobs.sql"))
            .execute(self.pool()?)
            .await
            .or_raise(|| ErrorKind::Database)?;
        tracing::info!(removed = result.rows_affected(), "cleared image store");
        self.db.reclaim_space().await;
        Ok(())
    }

    /// Like [`get_image`](Self::get_image), but a missing key is
    /// [`NotFound`](ErrorKind::NotFound).
    pub async fn require_image(&self, key: &str) -> Result<AccessUrl> {
        self.get_image(key)
            .await?
            .ok_or_raise(|| ErrorKind::NotFound(key.to_string()))
    }
}

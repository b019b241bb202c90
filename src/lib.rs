//! Local-first persistence core.
//!
//! [`Hearth`] wires the components together over one SQLite database:
//!
//! - [`ObjectStore`]: JSON documents partitioned into [`Collection`]s.
//! - [`BlobStore`]: image payloads, access handles and staged uploads.
//! - [`SharedCache`]: in-memory mirror with explicit invalidation.
//! - [`Archiver`]: full and structured-only backups.
//! - [`StickerCatalog`]: the sticker list and its images.

pub mod error;

use exn::ResultExt;
use hearth_config::Config;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::instrument;

pub use hearth_archive::{Archiver, BackupFormat, RestoreReport};
pub use hearth_blob::{AccessUrl, BlobStats, BlobStore, Category, ImageRef, ResolvedImage, StagedUpload};
pub use hearth_config as config;
pub use hearth_sticker::{BatchImportReport, Sticker, StickerCatalog};
pub use hearth_store::{Collection, Database, ObjectStore, Snapshot};
pub use hearth_volatile::{AvatarSlot, CacheEvent, SharedCache};

use crate::error::{ErrorKind, Result};

/// Storage accounting across both stores.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Stats {
    /// Serialized bytes per collection.
    pub collections: BTreeMap<Collection, u64>,
    pub images: BlobStats,
    /// Staged uploads not yet committed or discarded.
    pub staged: usize,
}

impl Stats {
    pub fn collections_size(&self) -> u64 {
        self.collections.values().sum()
    }
}

/// One open session over the durable medium.
#[derive(Debug, Clone)]
pub struct Hearth {
    db: Database,
    store: ObjectStore,
    blobs: BlobStore,
    cache: SharedCache,
    archiver: Archiver,
    stickers: StickerCatalog,
}

impl Hearth {
    /// Open the configured database, failing if it can't be opened.
    pub async fn open(config: &Config) -> Result<Self> {
        let path = config.database_path().map_err(ErrorKind::config)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .or_raise(|| ErrorKind::Io(parent.display().to_string()))?;
        }
        let db = Database::connect_with(&path, config.storage.max_connections)
            .await
            .map_err(ErrorKind::store)?;
        Ok(Self::start(db, config).await)
    }

    /// Open the configured database, or run degraded if it can't be opened.
    ///
    /// A degraded session reports the failure once (here) and then every
    /// operation fails fast with
    /// [`StorageUnavailable`](ErrorKind::StorageUnavailable).
    pub async fn open_or_degrade(config: &Config) -> Self {
        let db = match config.database_path() {
            Ok(path) => Database::connect_or_degrade(path, config.storage.max_connections).await,
            Err(err) => {
                tracing::error!(error = ?err, "Storage is unavailable for this session");
                Database::unavailable(err.to_string())
            },
        };
        Self::start(db, config).await
    }

    /// An ephemeral in-memory session.
    pub async fn in_memory(config: &Config) -> Result<Self> {
        let db = Database::connect_in_memory().await.map_err(ErrorKind::store)?;
        Ok(Self::start(db, config).await)
    }

    async fn start(db: Database, config: &Config) -> Self {
        let store = ObjectStore::from(&db);
        let blobs = BlobStore::from(&db);
        let hearth = Self {
            cache: SharedCache::with_freshness(store.clone(), blobs.clone(), config.cache.freshness()),
            archiver: Archiver::new(store.clone(), blobs.clone()),
            stickers: StickerCatalog::new(store.clone(), blobs.clone()),
            db,
            store,
            blobs,
        };
        if config.staging.sweep_on_open && hearth.db.is_available() {
            // A failed sweep only leaves orphans for next time.
            if let Err(err) = hearth.blobs.sweep_staged(config.staging.orphan_age()).await {
                tracing::warn!(error = ?err, "could not sweep staged uploads");
            }
        }
        hearth
    }

    pub fn is_available(&self) -> bool {
        self.db.is_available()
    }

    pub fn store(&self) -> &ObjectStore {
        &self.store
    }

    pub fn blobs(&self) -> &BlobStore {
        &self.blobs
    }

    pub fn cache(&self) -> &SharedCache {
        &self.cache
    }

    pub fn archiver(&self) -> &Archiver {
        &self.archiver
    }

    pub fn stickers(&self) -> &StickerCatalog {
        &self.stickers
    }

    // =========================================================================
    // Whole-state operations
    // =========================================================================

    /// Full ZIP backup, or the bare structured document.
    pub async fn export(&self, structured_only: bool) -> Result<Vec<u8>> {
        let exported = match structured_only {
            true => self.archiver.export_structured_only().await,
            false => self.archiver.export_archive().await,
        };
        exported.map_err(ErrorKind::archive)
    }

    /// Restore either kind of backup, then drop everything cached.
    pub async fn restore(&self, bytes: Vec<u8>) -> Result<RestoreReport> {
        let report = self.archiver.restore(bytes).await.map_err(ErrorKind::archive)?;
        self.cache.publish(CacheEvent::Reset);
        Ok(report)
    }

    /// Delete every collection entry and every image, drop everything cached
    /// and release every outstanding handle.
    #[instrument(skip(self))]
    pub async fn reset(&self) -> Result<()> {
        self.store.clear_all().await.map_err(ErrorKind::store)?;
        self.blobs.clear_all_images().await.map_err(ErrorKind::blob)?;
        self.cache.publish(CacheEvent::Reset);
        self.blobs.handles().release_all();
        tracing::info!("all local data was reset");
        Ok(())
    }

    pub async fn stats(&self) -> Result<Stats> {
        let mut collections = BTreeMap::new();
        for collection in Collection::ALL {
            let size = self
                .store
                .get_collection_byte_size(collection)
                .await
                .map_err(ErrorKind::store)?;
            collections.insert(collection, size);
        }
        Ok(Stats {
            collections,
            images: self.blobs.get_image_category_stats().await.map_err(ErrorKind::blob)?,
            staged: self.blobs.list_staged().await.map_err(ErrorKind::blob)?.len(),
        })
    }

    /// Delete staged uploads older than `older_than`.
    pub async fn sweep(&self, older_than: Duration) -> Result<usize> {
        self.blobs.sweep_staged(older_than).await.map_err(ErrorKind::blob)
    }

    /// Release every access handle and close the database.
    pub async fn close(&self) {
        self.blobs.handles().release_all();
        self.db.close().await;
    }
}

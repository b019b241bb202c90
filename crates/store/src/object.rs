//! Collection-partitioned key/value store.

use crate::collection::Collection;
use crate::error::{ErrorKind, Result};
use crate::{Database, Snapshot};
use exn::ResultExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use time::UtcDateTime;
use tracing::instrument;

#[derive(sqlx::FromRow)]
struct EntryRow {
    key: String,
    value: String,
}

fn decode(raw: &str) -> Result<Value> {
    serde_json::from_str(raw).or_raise(|| ErrorKind::InvalidData("entry value"))
}

fn encode(value: &Value) -> Result<String> {
    serde_json::to_string(value).or_raise(|| ErrorKind::InvalidData("entry value"))
}

/// Durable key/value storage partitioned into [`Collection`]s.
///
/// Values are arbitrary JSON documents; the store enforces no schema. Every
/// write returns only once SQLite has committed it, and each write is a
/// single statement, so a concurrent reader observes either the old or the
/// new value.
///
/// # Examples
///
/// ```
/// use hearth_store::{Collection, Database, ObjectStore};
/// use serde_json::json;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> hearth_store::error::Result<()> {
/// let db = Database::connect_in_memory().await?;
/// let store = ObjectStore::from(&db);
/// store.set(Collection::ApiSettings, "model", &json!("local-7b")).await?;
/// assert_eq!(store.get(Collection::ApiSettings, "model").await?, Some(json!("local-7b")));
/// assert_eq!(store.get(Collection::ApiSettings, "nonexistent").await?, None);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ObjectStore {
    db: Database,
}
impl From<&Database> for ObjectStore {
    fn from(db: &Database) -> Self {
        Self { db: db.clone() }
    }
}
impl ObjectStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    // =========================================================================
    // Get/Set
    // =========================================================================

    /// Read one entry. A missing key is `Ok(None)`, never an error.
    pub async fn get(&self, collection: Collection, key: &str) -> Result<Option<Value>> {
        let raw: Option<String> = sqlx::query_scalar(include_str!("../queries/get_entry.sql"))
            .bind(collection.as_str())
            .bind(key)
            .fetch_optional(self.db.pool()?)
            .await
            .or_raise(|| ErrorKind::Database)?;
        raw.as_deref().map(decode).transpose()
    }

    /// Read one entry and deserialize it into `T`.
    ///
    /// Returns [`InvalidData`](ErrorKind::InvalidData) if the stored document
    /// doesn't have the expected shape.
    pub async fn get_as<T: DeserializeOwned>(&self, collection: Collection, key: &str) -> Result<Option<T>> {
        self.get(collection, key)
            .await?
            .map(|value| serde_json::from_value(value).or_raise(|| ErrorKind::InvalidData("entry shape")))
            .transpose()
    }

    /// Create or overwrite one entry.
    pub async fn set(&self, collection: Collection, key: &str, value: &Value) -> Result<()> {
        sqlx::query(include_str!("../queries/upsert_entry.sql"))
            .bind(collection.as_str())
            .bind(key)
            .bind(encode(value)?)
            .bind(UtcDateTime::now().unix_timestamp())
            .execute(self.db.pool()?)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    /// Serialize `value` and store it under `key`.
    pub async fn set_as<T: Serialize>(&self, collection: Collection, key: &str, value: &T) -> Result<()> {
        let value = serde_json::to_value(value).or_raise(|| ErrorKind::InvalidData("entry shape"))?;
        self.set(collection, key, &value).await
    }

    /// Remove one entry. Returns `false` if there was nothing to remove.
    pub async fn delete(&self, collection: Collection, key: &str) -> Result<bool> {
        let result = sqlx::query(include_str!("../queries/delete_entry.sql"))
            .bind(collection.as_str())
            .bind(key)
            .execute(self.db.pool()?)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(result.rows_affected() > 0)
    }

    // =========================================================================
    // Listing
    // =========================================================================

    /// Sorted keys of a collection.
    pub async fn keys(&self, collection: Collection) -> Result<Vec<String>> {
        let keys: Vec<String> = sqlx::query_scalar(include_str!("../queries/list_keys.sql"))
            .bind(collection.as_str())
            .fetch_all(self.db.pool()?)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(keys)
    }

    /// Every entry of a collection.
    pub async fn get_collection(&self, collection: Collection) -> Result<BTreeMap<String, Value>> {
        let rows: Vec<EntryRow> = sqlx::query_as(include_str!("../queries/list_collection.sql"))
            .bind(collection.as_str())
            .fetch_all(self.db.pool()?)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(|row| Ok((row.key, decode(&row.value)?))).collect()
    }

    /// Estimated serialized size of a collection, in bytes.
    ///
    /// Sums the serialized length of every value. Only meant for user-facing
    /// storage accounting; nothing enforces a quota against it.
    pub async fn get_collection_byte_size(&self, collection: Collection) -> Result<u64> {
        let size: i64 = sqlx::query_scalar(include_str!("../queries/collection_size.sql"))
            .bind(collection.as_str())
            .fetch_one(self.db.pool()?)
            .await
            .or_raise(|| ErrorKind::Database)?;
        u64::try_from(size).or_raise(|| ErrorKind::InvalidData("collection size"))
    }

    // =========================================================================
    // Bulk
    // =========================================================================

    /// Snapshot every collection.
    ///
    /// Collections are read one after the other, not inside one transaction:
    /// a write landing mid-export may or may not be included.
    #[instrument(skip(self))]
    pub async fn export_all(&self) -> Result<Snapshot> {
        let mut snapshot = Snapshot::new();
        for collection in Collection::ALL {
            snapshot.insert(collection, self.get_collection(collection).await?);
        }
        Ok(snapshot)
    }

    /// Replace the contents of every collection present in `snapshot`.
    ///
    /// Each collection is swapped in its own transaction (delete everything,
    /// then insert the snapshot's entries), so a reader never observes a
    /// half-imported collection. Collections absent from the snapshot are
    /// left untouched.
    #[instrument(skip(self, snapshot), fields(collections = snapshot.len()))]
    pub async fn import_all(&self, snapshot: &Snapshot) -> Result<()> {
        let pool = self.db.pool()?;
        let now = UtcDateTime::now().unix_timestamp();
        for (collection, entries) in snapshot {
            let mut tx = pool.begin().await.or_raise(|| ErrorKind::Database)?;
            sqlx::query(include_str!("../queries/clear_collection.sql"))
                .bind(collection.as_str())
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Database)?;
            for (key, value) in entries {
                sqlx::query(include_str!("../queries/upsert_entry.sql"))
                    .bind(collection.as_str())
                    .bind(key.as_str())
                    .bind(encode(value)?)
                    .bind(now)
                    .execute(&mut *tx)
                    .await
                    .or_raise(|| ErrorKind::Database)?;
            }
            tx.commit().await.or_raise(|| ErrorKind::Database)?;
            tracing::debug!(%collection, entries = entries.len(), "Replaced collection contents");
        }
        self.db.reclaim_space().await;
        Ok(())
    }

    /// Empty a single collection.
    pub async fn clear_collection(&self, collection: Collection) -> Result<()> {
        sqlx::query(include_str!("../queries/clear_collection.sql"))
            .bind(collection.as_str())
            .execute(self.db.pool()?)
            .await
            .or_raise(|| ErrorKind::Database)?;
        Ok(())
    }

    /// Empty every collection. Only used by the destructive reset.
    #[instrument(skip(self))]
    pub async fn clear_all(&self) -> Result<()> {
        let result = sqlx::query(include_str!("../queries/clear_all.sql"))
            .execute(self.db.pool()?)
            .await
            .or_raise(|| ErrorKind::Database)?;
        tracing::info!(entries = result.rows_affected(), "Cleared every collection");
        self.db.reclaim_space().await;
        Ok(())
    }
}

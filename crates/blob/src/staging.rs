//! Two-phase image uploads.
//!
//! A payload is first written under a reserved staging key, then either
//! committed under its final key or discarded. A staged record that is never
//! resolved is an orphan and gets removed by [`BlobStore::sweep_staged`].

use exn::{OptionExt, ResultExt};
use std::time::Duration;
use time::UtcDateTime;
use tracing::instrument;

use crate::category::Category;
use crate::error::{ErrorKind, Result};
use crate::handle::AccessUrl;
use crate::key::{STAGING_SUFFIX, validate_key};
use crate::models::BlobInfo;
use crate::store::{BlobStore, InfoRow};

/// A payload waiting to be committed or discarded.
#[derive(Clone, Debug, PartialEq, Eq)]
#[must_use = "staged uploads must be committed or discarded"]
pub struct StagedUpload {
    pub key: String,
    pub category: Category,
    /// Handle for previewing the staged image.
    pub url: AccessUrl,
}

impl BlobStore {
    /// Write `payload` under a fresh staging key.
    pub async fn stage(&self, payload: &[u8], category: Category) -> Result<StagedUpload> {
        let key = format!("{}{STAGING_SUFFIX}", uuid::Uuid::new_v4());
        let url = self.save_image(&key, payload, category).await?;
        Ok(StagedUpload { key, category, url })
    }

    /// Promote a staged upload to `final_key`.
    ///
    /// The copy happens before the staging record is removed. If removing it
    /// fails, the record is left as an orphan for the next sweep and the
    /// commit still succeeds. If the copy fails, nothing changes.
    #[instrument(skip(self, staged), fields(staged = %staged.key))]
    pub async fn commit(&self, staged: StagedUpload, final_key: &str) -> Result<AccessUrl> {
        let final_key = validate_key(final_key)?;
        self.copy_image(&staged.key, final_key).await?;
        self.handles().release(&staged.url);
        if let Err(err) = self.delete_image(&staged.key).await {
            tracing::warn!(key = %staged.key, error = ?err, "staged upload left behind as an orphan");
        }
        self.get_image(final_key)
            .await?
            .ok_or_raise(|| ErrorKind::NotFound(final_key.to_string()))
    }

    /// Drop a staged upload without promoting it.
    pub async fn discard(&self, staged: StagedUpload) -> Result<()> {
        self.handles().release(&staged.url);
        self.delete_image(&staged.key).await?;
        Ok(())
    }

    /// Every staged record, oldest first.
    pub async fn list_staged(&self) -> Result<Vec<BlobInfo>> {
        let rows: Vec<InfoRow> = sqlx::query_as(include_str!("../queries/list_staged.sql"))
            .bind(STAGING_SUFFIX)
            .fetch_all(self.pool()?)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(InfoRow::into_info).collect()
    }

    /// Delete staged records created at least `older_than` ago.
    #[instrument(skip(self))]
    pub async fn sweep_staged(&self, older_than: Duration) -> Result<usize> {
        let age = i64::try_from(older_than.as_secs()).unwrap_or(i64::MAX);
        let cutoff = UtcDateTime::now().unix_timestamp().saturating_sub(age);
        let result = sqlx::query(include_str!("../queries/sweep_staged.sql"))
            .bind(STAGING_SUFFIX)
            .bind(cutoff)
            .execute(self.pool()?)
            .await
            .or_raise(|| ErrorKind::Database)?;
        let removed = result.rows_affected() as usize;
        if removed > 0 {
            tracing::info!(removed, "swept orphaned staged uploads");
        }
        Ok(removed)
    }
}

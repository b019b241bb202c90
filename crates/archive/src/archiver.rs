//! Export and restore of the full persisted state.

use exn::ResultExt;
use hearth_blob::BlobStore;
use hearth_store::ObjectStore;
use tracing::instrument;

use crate::codec::{self, ZIP_MAGIC};
use crate::document::Document;
use crate::error::{ErrorKind, Result};
use crate::report::RestoreReport;

const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Kind of backup file, told apart by its first bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackupFormat {
    /// ZIP container with `data.json` and `images/`.
    Archive,
    /// Bare structured-data document.
    Document,
}

impl BackupFormat {
    pub fn detect(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&ZIP_MAGIC) {
            return Some(BackupFormat::Archive);
        }
        let text = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
        match text.iter().find(|b| !b.is_ascii_whitespace()) {
            Some(b'{') => Some(BackupFormat::Document),
            _ => None,
        }
    }
}

/// Packs the object store and blob store into backups and restores them.
#[derive(Debug, Clone)]
pub struct Archiver {
    store: ObjectStore,
    blobs: BlobStore,
}

impl Archiver {
    pub fn new(store: ObjectStore, blobs: BlobStore) -> Self {
        Self { store, blobs }
    }

    // =========================================================================
    // Export
    // =========================================================================

    /// Full backup: every collection plus every image, as a ZIP.
    #[instrument(skip(self))]
    pub async fn export_archive(&self) -> Result<Vec<u8>> {
        let snapshot = self.store.export_all().await.map_err(ErrorKind::store)?;
        let images = self
            .blobs
            .export_all_images_with_category()
            .await
            .map_err(ErrorKind::blob)?;
        let data = Document::new(snapshot)?.to_json(false)?;
        let count = images.len();
        let bytes = tokio::task::spawn_blocking(move || codec::write_archive(&data, &images))
            .await
            .or_raise(|| ErrorKind::Encode)??;
        tracing::info!(images = count, size = bytes.len(), "exported archive");
        Ok(bytes)
    }

    /// Structured data only, as pretty-printed JSON.
    #[instrument(skip(self))]
    pub async fn export_structured_only(&self) -> Result<Vec<u8>> {
        let snapshot = self.store.export_all().await.map_err(ErrorKind::store)?;
        Document::new(snapshot)?.to_json(true)
    }

    // =========================================================================
    // Restore
    // =========================================================================

    /// Restore a full backup.
    ///
    /// The container, the data document and every collection field are
    /// validated before anything is written; a structural failure leaves the
    /// stores untouched. Image entries that can't be restored are skipped and
    /// listed in the report.
    #[instrument(skip_all, fields(size = bytes.len()))]
    pub async fn import_archive(&self, bytes: Vec<u8>) -> Result<RestoreReport> {
        let raw = tokio::task::spawn_blocking(move || codec::read_archive(bytes))
            .await
            .or_raise(|| ErrorKind::invalid("archive could not be read"))??;
        let document = Document::parse(&raw.data)?;

        let mut report = self.apply(&document).await?;
        let images = self
            .blobs
            .import_all_images(&raw.images)
            .await
            .map_err(ErrorKind::blob)?;
        report.images_imported = images.imported;
        report.skipped_images = raw.skipped;
        report.skipped_images.extend(images.failed);
        tracing::info!(
            version = report.version,
            entries = report.entries,
            images = report.images_imported,
            skipped = report.skipped_images.len(),
            "restored archive"
        );
        Ok(report)
    }

    /// Restore a bare data document; the blob store is left alone.
    #[instrument(skip_all, fields(size = bytes.len()))]
    pub async fn import_structured_only(&self, bytes: &[u8]) -> Result<RestoreReport> {
        let document = Document::parse(bytes)?;
        let report = self.apply(&document).await?;
        tracing::info!(version = report.version, entries = report.entries, "restored data document");
        Ok(report)
    }

    /// Restore either kind of backup, detected from its content.
    pub async fn restore(&self, bytes: Vec<u8>) -> Result<RestoreReport> {
        match BackupFormat::detect(&bytes) {
            Some(BackupFormat::Archive) => self.import_archive(bytes).await,
            Some(BackupFormat::Document) => self.import_structured_only(&bytes).await,
            None => exn::bail!(ErrorKind::invalid("unrecognised backup format")),
        }
    }

    async fn apply(&self, document: &Document) -> Result<RestoreReport> {
        self.store
            .import_all(&document.collections)
            .await
            .map_err(ErrorKind::store)?;
        Ok(RestoreReport::from_document(document))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_blob::{Category, ImageRef};
    use hearth_store::{Collection, Database};
    use rstest::rstest;
    use serde_json::{Value, json};
    use std::io::{Cursor, Write};
    use zip::ZipWriter;
    use zip::write::SimpleFileOptions;

    const PNG: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 0x42];

    struct Fixture {
        archiver: Archiver,
        store: ObjectStore,
        blobs: BlobStore,
    }

    async fn fixture() -> Fixture {
        let db = Database::connect_in_memory().await.unwrap();
        let store = ObjectStore::from(&db);
        let blobs = BlobStore::from(&db);
        Fixture {
            archiver: Archiver::new(store.clone(), blobs.clone()),
            store,
            blobs,
        }
    }

    fn zip_of(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in entries {
            zip.start_file(*name, SimpleFileOptions::default()).unwrap();
            zip.write_all(content).unwrap();
        }
        zip.finish().unwrap().into_inner()
    }

    #[rstest]
    #[case(&[0x50, 0x4B, 0x03, 0x04, 0x14], Some(BackupFormat::Archive))]
    #[case(b"{\"version\": 2}", Some(BackupFormat::Document))]
    #[case(b"\n  {}", Some(BackupFormat::Document))]
    #[case(b"\xEF\xBB\xBF{}", Some(BackupFormat::Document))]
    #[case(b"[]", None)]
    #[case(b"", None)]
    fn test_detect(#[case] bytes: &[u8], #[case] expected: Option<BackupFormat>) {
        assert_eq!(BackupFormat::detect(bytes), expected);
    }

    #[tokio::test]
    async fn test_archive_round_trip() {
        let source = fixture().await;
        source
            .store
            .set(Collection::Characters, "c1", &json!({"name": "Ash", "avatar": "char-c1"}))
            .await
            .unwrap();
        source
            .store
            .set(Collection::ChatMessages, "c1", &json!(["hi", "hello"]))
            .await
            .unwrap();
        source.blobs.save_image("char-c1", PNG, Category::Avatar).await.unwrap();
        source.blobs.save_image("sticker-1", b"GIF89a", Category::Sticker).await.unwrap();
        let bytes = source.archiver.export_archive().await.unwrap();

        let target = fixture().await;
        let report = target.archiver.import_archive(bytes).await.unwrap();
        assert!(report.is_clean());
        assert_eq!(report.version, 2);
        assert_eq!(report.collections.len(), Collection::ALL.len());
        assert_eq!(report.entries, 2);
        assert_eq!(report.images_imported, 2);

        assert_eq!(target.store.export_all().await.unwrap(), source.store.export_all().await.unwrap());
        assert_eq!(
            target.blobs.export_all_images_with_category().await.unwrap(),
            source.blobs.export_all_images_with_category().await.unwrap()
        );
    }

    #[tokio::test]
    async fn test_restore_replaces_collections() {
        let source = fixture().await;
        source.store.set(Collection::Misc, "a", &json!(1)).await.unwrap();
        let bytes = source.archiver.export_archive().await.unwrap();

        let target = fixture().await;
        target.store.set(Collection::Misc, "stale", &json!(true)).await.unwrap();
        target.archiver.restore(bytes).await.unwrap();
        assert_eq!(target.store.keys(Collection::Misc).await.unwrap(), vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_structured_only_export() {
        let source = fixture().await;
        source.store.set(Collection::ApiSettings, "model", &json!("local")).await.unwrap();
        source.blobs.save_image("user-avatar", PNG, Category::Avatar).await.unwrap();
        let bytes = source.archiver.export_structured_only().await.unwrap();

        let text = String::from_utf8(bytes.clone()).unwrap();
        assert!(text.contains('\n'), "structured export is pretty-printed");
        let value: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(value["version"], json!(2));
        assert!(value["exportTime"].is_string());
        assert_eq!(value["API_SETTINGS"], json!({"model": "local"}));
        assert_eq!(value["HEALTH"], json!({}));

        let target = fixture().await;
        let report = target.archiver.restore(bytes).await.unwrap();
        assert_eq!(report.images_imported, 0);
        assert_eq!(
            target.store.get(Collection::ApiSettings, "model").await.unwrap(),
            Some(json!("local"))
        );
        assert!(target.blobs.list_all_images().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_archive_changes_nothing() {
        let target = fixture().await;
        target.store.set(Collection::UserData, "me", &json!({"n": 1})).await.unwrap();

        let cases = [
            zip_of(&[("images/avatar/a.png", PNG)]),
            zip_of(&[("data.json", b"{not json")]),
            zip_of(&[("data.json", br#"{"USER_DATA": {}, "CHATS": 5}"#), ("images/avatar/a.png", PNG)]),
            b"garbage".to_vec(),
        ];
        for bytes in cases {
            let err = target.archiver.restore(bytes).await.unwrap_err();
            assert!(matches!(&*err, ErrorKind::InvalidArchive(_)), "unexpected error: {err:?}");
        }
        assert_eq!(
            target.store.get(Collection::UserData, "me").await.unwrap(),
            Some(json!({"n": 1}))
        );
        assert!(target.blobs.list_all_images().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bad_image_entries_are_skipped() {
        let target = fixture().await;
        let bytes = zip_of(&[
            ("data.json", br#"{"version": 2, "MISC": {"k": "v"}}"#),
            ("images/avatar/ok.png", PNG),
            ("images/../escape.png", PNG),
            ("images/chat/deep/nested.png", PNG),
            ("notes.txt", b"ignored"),
        ]);
        let report = target.archiver.import_archive(bytes).await.unwrap();
        assert_eq!(report.images_imported, 1);
        assert_eq!(report.skipped_images.len(), 2);
        assert!(!report.is_clean());

        let images = target.blobs.list_all_images().await.unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].key, "ok");
        assert_eq!(target.store.get(Collection::Misc, "k").await.unwrap(), Some(json!("v")));
    }

    #[tokio::test]
    async fn test_unknown_fields_are_reported() {
        let target = fixture().await;
        let report = target
            .archiver
            .import_structured_only(br#"{"version": 2, "THEMES": {}, "MISC": {}}"#)
            .await
            .unwrap();
        assert_eq!(report.unknown_fields, vec!["THEMES".to_string()]);
        assert_eq!(report.collections, vec![Collection::Misc]);
    }

    #[tokio::test]
    async fn test_dangling_avatar_restores_without_image() {
        let target = fixture().await;
        let document = br#"{"version": 2, "CHARACTERS": {"c1": {"name": "Ash", "avatar": "char-c1-avatar"}}}"#;
        let bytes = zip_of(&[("data.json", document)]);
        target.archiver.restore(bytes).await.unwrap();

        let character = target.store.get(Collection::Characters, "c1").await.unwrap().unwrap();
        assert_eq!(character["name"], json!("Ash"));
        let avatar = ImageRef::from_value(&character["avatar"]).unwrap();
        assert_eq!(target.blobs.resolve(&avatar).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_legacy_inline_images_need_no_migration() {
        let target = fixture().await;
        let report = target
            .archiver
            .import_structured_only(br#"{"CHARACTERS": {"c1": {"avatar": "data:image/png;base64,iVBORw0KGgo="}}}"#)
            .await
            .unwrap();
        assert_eq!(report.version, 1);

        let character = target.store.get(Collection::Characters, "c1").await.unwrap().unwrap();
        let avatar = ImageRef::from_value(&character["avatar"]).unwrap();
        assert!(target.blobs.resolve(&avatar).await.unwrap().is_some());
    }
}

//! ZIP container reading and writing.
//!
//! Everything here is synchronous and works on in-memory buffers; callers
//! run it on the blocking pool.

use exn::{OptionExt, ResultExt};
use hearth_blob::{BlobExport, MediaType};
use std::collections::BTreeMap;
use std::io::{Cursor, Read, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::entry::{DATA_ENTRY, image_path, parse_image_path};
use crate::error::{ErrorKind, Result};

/// Local file header signature; every non-empty ZIP starts with it.
pub const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];

/// Contents of an archive after the structural checks passed.
#[derive(Debug, Default)]
pub(crate) struct RawArchive {
    pub data: Vec<u8>,
    pub images: BTreeMap<String, BlobExport>,
    /// `(entry name, reason)` for image entries that can't be restored.
    pub skipped: Vec<(String, String)>,
}

pub(crate) fn write_archive(data: &[u8], images: &BTreeMap<String, BlobExport>) -> Result<Vec<u8>> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file(DATA_ENTRY, options).or_raise(|| ErrorKind::Encode)?;
    zip.write_all(data).or_raise(|| ErrorKind::Encode)?;
    for (key, image) in images {
        let media_type = MediaType::from_magic_bytes(&image.payload);
        zip.start_file(image_path(image.category, key, media_type), options)
            .or_raise(|| ErrorKind::Encode)?;
        zip.write_all(&image.payload).or_raise(|| ErrorKind::Encode)?;
    }
    let buffer = zip.finish().or_raise(|| ErrorKind::Encode)?;
    Ok(buffer.into_inner())
}

pub(crate) fn read_archive(bytes: Vec<u8>) -> Result<RawArchive> {
    let mut archive = ZipArchive::new(Cursor::new(bytes)).or_raise(|| ErrorKind::invalid("not a ZIP archive"))?;
    let mut raw = RawArchive::default();
    let mut data = None;

    for index in 0..archive.len() {
        let mut file = match archive.by_index(index) {
            Ok(file) => file,
            Err(err) => {
                tracing::warn!(index, error = %err, "skipping unreadable archive entry");
                raw.skipped.push((format!("#{index}"), err.to_string()));
                continue;
            },
        };
        if file.is_dir() {
            continue;
        }
        let name = file.name().to_string();

        if name == DATA_ENTRY {
            let mut buffer = Vec::new();
            file.read_to_end(&mut buffer)
                .or_raise(|| ErrorKind::invalid("data.json could not be read"))?;
            data = Some(buffer);
            continue;
        }

        let entry = match parse_image_path(&name) {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                tracing::debug!(entry = %name, "ignoring archive entry outside images/");
                continue;
            },
            Err(reason) => {
                tracing::warn!(entry = %name, %reason, "skipping image entry");
                raw.skipped.push((name, reason));
                continue;
            },
        };
        if raw.images.contains_key(&entry.key) {
            raw.skipped.push((name, "duplicate image key".to_string()));
            continue;
        }
        let mut payload = Vec::new();
        if let Err(err) = file.read_to_end(&mut payload) {
            tracing::warn!(entry = %name, error = %err, "skipping unreadable image entry");
            raw.skipped.push((name, err.to_string()));
            continue;
        }
        raw.images.insert(entry.key, BlobExport {
            payload,
            category: entry.category,
        });
    }

    raw.data = data.ok_or_raise(|| ErrorKind::invalid("data.json is missing"))?;
    Ok(raw)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_blob::Category;

    #[test]
    fn test_write_then_read() {
        let mut images = BTreeMap::new();
        images.insert("user-avatar".to_string(), BlobExport {
            payload: b"GIF89a-avatar".to_vec(),
            category: Category::Avatar,
        });
        images.insert("notes.txt".to_string(), BlobExport {
            payload: b"plain bytes".to_vec(),
            category: Category::Other,
        });
        let bytes = write_archive(br#"{"version":2}"#, &images).unwrap();
        assert!(bytes.starts_with(&ZIP_MAGIC));

        let raw = read_archive(bytes).unwrap();
        assert_eq!(raw.data, br#"{"version":2}"#);
        assert_eq!(raw.images, images);
        assert!(raw.skipped.is_empty());
    }

    #[test]
    fn test_entry_names() {
        let mut images = BTreeMap::new();
        images.insert("bg".to_string(), BlobExport {
            payload: vec![0xFF, 0xD8, 0xFF, 0xE0],
            category: Category::Background,
        });
        let bytes = write_archive(b"{}", &images).unwrap();
        let archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut names: Vec<_> = archive.file_names().collect();
        names.sort_unstable();
        assert_eq!(names, vec!["data.json", "images/background/bg.jpg"]);
    }

    #[test]
    fn test_not_a_zip() {
        let err = read_archive(b"definitely not a zip".to_vec()).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidArchive(_)));
    }

    #[test]
    fn test_missing_data_document() {
        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
        zip.start_file("images/avatar/a.png", SimpleFileOptions::default()).unwrap();
        zip.write_all(b"png").unwrap();
        let bytes = zip.finish().unwrap().into_inner();

        let err = read_archive(bytes).unwrap_err();
        assert_eq!(*err, ErrorKind::InvalidArchive("data.json is missing".to_string()));
    }
}

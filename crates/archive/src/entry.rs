//! Image entry paths inside an archive.
//!
//! Entries are laid out as `images/<category>/<key>.<ext>`. Names read back
//! from an archive are untrusted: anything that doesn't parse into exactly
//! that shape, or that tries to climb out of it, is rejected.

use hearth_blob::{Category, MediaType, validate_key};
use std::path::{Component, Path};

pub const DATA_ENTRY: &str = "data.json";
pub const IMAGES_DIR: &str = "images";

/// Where an image is written inside the archive.
pub fn image_path(category: Category, key: &str, media_type: MediaType) -> String {
    format!("{IMAGES_DIR}/{category}/{key}.{}", media_type.extension())
}

/// A validated image entry name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImageEntry {
    pub key: String,
    pub category: Category,
}

/// Parse an entry name into a blob key and category.
///
/// Returns `Ok(None)` for names outside the `images/` tree, and an error
/// message for names inside it that can't be restored.
pub fn parse_image_path(name: &str) -> Result<Option<ImageEntry>, String> {
    let mut parts = Vec::new();
    for component in Path::new(name).components() {
        match component {
            Component::Normal(part) => {
                // Null bytes pass through Path::components() on Unix.
                if part.as_encoded_bytes().contains(&0) {
                    return Err("entry name contains a null byte".to_string());
                }
                let part = part.to_str().ok_or_else(|| "entry name is not UTF-8".to_string())?;
                parts.push(part);
            },
            Component::CurDir => {},
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err("entry name escapes the archive".to_string());
            },
        }
    }
    match parts.as_slice() {
        [IMAGES_DIR, category, file] => {
            let key = strip_extension(file);
            validate_key(key).map_err(|err| err.to_string())?;
            Ok(Some(ImageEntry {
                key: key.to_string(),
                category: Category::from_dir_name(category),
            }))
        },
        [IMAGES_DIR, ..] => Err("unexpected nesting under images/".to_string()),
        _ => Ok(None),
    }
}

/// Drop a trailing extension if it is one we write; unknown suffixes are
/// kept as part of the key.
fn strip_extension(file: &str) -> &str {
    match file.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && MediaType::from_extension(ext).is_some() => stem,
        _ => file,
    }
}

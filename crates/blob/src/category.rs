use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use crate::error::{Error, ErrorKind};

/// Accounting and backup grouping for blob records.
///
/// Categories never change how a record is stored. The string form doubles
/// as the directory name inside backup archives.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Category {
    Avatar,
    Chat,
    Sticker,
    Background,
    #[default]
    Other,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::Avatar,
        Category::Chat,
        Category::Sticker,
        Category::Background,
        Category::Other,
    ];

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Avatar => "avatar",
            Category::Chat => "chat",
            Category::Sticker => "sticker",
            Category::Background => "background",
            Category::Other => "other",
        }
    }

    /// Lenient parse used for archive directories: anything unrecognised is
    /// [`Category::Other`].
    #[must_use]
    pub fn from_dir_name(name: &str) -> Self {
        name.parse().unwrap_or_default()
    }
}

impl Display for Category {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "avatar" => Ok(Category::Avatar),
            "chat" => Ok(Category::Chat),
            "sticker" => Ok(Category::Sticker),
            "background" => Ok(Category::Background),
            "other" => Ok(Category::Other),
            _ => exn::bail!(ErrorKind::InvalidData("unknown blob category")),
        }
    }
}

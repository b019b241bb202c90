use crate::error::{Error, ErrorKind};
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

/// A named partition of the object store.
///
/// The set is fixed; the store itself never interprets the values kept in a
/// collection. The string form is the wire name used in backup documents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Collection {
    UserData,
    Chats,
    Characters,
    ChatSettings,
    ChatMessages,
    WorldBooks,
    ApiSettings,
    Appearance,
    Misc,
    Stickers,
    BubblePresets,
    Health,
    Schedule,
    AiTasks,
}

impl Collection {
    /// Every collection, in a stable order.
    pub const ALL: [Collection; 14] = [
        Collection::UserData,
        Collection::Chats,
        Collection::Characters,
        Collection::ChatSettings,
        Collection::ChatMessages,
        Collection::WorldBooks,
        Collection::ApiSettings,
        Collection::Appearance,
        Collection::Misc,
        Collection::Stickers,
        Collection::BubblePresets,
        Collection::Health,
        Collection::Schedule,
        Collection::AiTasks,
    ];

    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::UserData => "USER_DATA",
            Collection::Chats => "CHATS",
            Collection::Characters => "CHARACTERS",
            Collection::ChatSettings => "CHAT_SETTINGS",
            Collection::ChatMessages => "CHAT_MESSAGES",
            Collection::WorldBooks => "WORLD_BOOKS",
            Collection::ApiSettings => "API_SETTINGS",
            Collection::Appearance => "APPEARANCE",
            Collection::Misc => "MISC",
            Collection::Stickers => "STICKERS",
            Collection::BubblePresets => "BUBBLE_PRESETS",
            Collection::Health => "HEALTH",
            Collection::Schedule => "SCHEDULE",
            Collection::AiTasks => "AI_TASKS",
        }
    }
}

impl Display for Collection {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for Collection {
    fn as_ref(&self) -> &'static str {
        self.as_str()
    }
}

impl FromStr for Collection {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Collection::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| Error::from(ErrorKind::UnknownCollection(s.to_string())))
    }
}

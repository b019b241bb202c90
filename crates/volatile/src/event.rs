//! Write events and the fields each one invalidates.

/// A committed write that makes part of the cache outdated.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum CacheEvent {
    SettingsSaved,
    CharactersChanged,
    /// Message list of one character.
    MessagesChanged(String),
    /// Display-name override of one character.
    DisplayNameChanged(String),
    AvatarChanged,
    /// Destructive reset or full restore.
    Reset,
}

/// One slot of [`VolatileCache`](crate::VolatileCache).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CacheField {
    Settings,
    Characters,
    Messages,
    DisplayNames,
    UserAvatar,
    LastRefreshed,
}

impl CacheEvent {
    /// The invalidation table.
    ///
    /// Per-character events only clear their own character's entry in
    /// [`CacheField::Messages`] / [`CacheField::DisplayNames`]. A settings
    /// save keeps messages and display names.
    #[must_use]
    pub fn clears(&self) -> &'static [CacheField] {
        use CacheField::*;
        match self {
            CacheEvent::SettingsSaved => &[Settings, UserAvatar],
            CacheEvent::CharactersChanged => &[Characters],
            CacheEvent::MessagesChanged(_) => &[Messages],
            CacheEvent::DisplayNameChanged(_) => &[DisplayNames],
            CacheEvent::AvatarChanged => &[UserAvatar],
            CacheEvent::Reset => &[Settings, Characters, Messages, DisplayNames, UserAvatar, LastRefreshed],
        }
    }

    /// The character a per-character event is scoped to.
    #[must_use]
    pub fn character(&self) -> Option<&str> {
        match self {
            CacheEvent::MessagesChanged(id) | CacheEvent::DisplayNameChanged(id) => Some(id),
            _ => None,
        }
    }
}

use hearth_blob::{AccessUrl, ResolvedImage};
use serde_json::Value;
use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::event::{CacheEvent, CacheField};

/// Whether the user avatar has been looked up yet.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum AvatarSlot {
    #[default]
    NotLoaded,
    /// Looked up; there is no avatar (or it dangles).
    Missing,
    Loaded(ResolvedImage),
}

/// Non-authoritative copy of recently read state.
///
/// Every field may be dropped at any time; absence only means the next read
/// goes to the object store.
#[derive(Clone, Debug, Default)]
pub struct VolatileCache {
    pub settings: Option<Value>,
    pub characters: Option<Vec<Value>>,
    /// Message list per character id.
    pub messages: HashMap<String, Vec<Value>>,
    /// Display-name override per character id.
    pub display_names: HashMap<String, String>,
    pub user_avatar: AvatarSlot,
    pub last_refreshed: Option<Instant>,
    generation: u64,
}

impl VolatileCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Never refreshed, or refreshed longer than `window` ago.
    pub fn is_stale(&self, window: Duration) -> bool {
        self.last_refreshed.is_none_or(|at| at.elapsed() > window)
    }

    /// Bumped by every [`apply`](Self::apply); lets a refill that raced an
    /// invalidation notice it.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Clear whatever `event` invalidates.
    ///
    /// Returns the access handles that were dropped from the cache so the
    /// caller can release them.
    pub fn apply(&mut self, event: &CacheEvent) -> Vec<AccessUrl> {
        let mut evicted = Vec::new();
        for field in event.clears() {
            match field {
                CacheField::Settings => self.settings = None,
                CacheField::Characters => self.characters = None,
                CacheField::Messages => match event.character() {
                    Some(id) => {
                        self.messages.remove(id);
                    },
                    None => self.messages.clear(),
                },
                CacheField::DisplayNames => match event.character() {
                    Some(id) => {
                        self.display_names.remove(id);
                    },
                    None => self.display_names.clear(),
                },
                CacheField::UserAvatar => {
                    if let AvatarSlot::Loaded(ResolvedImage::Handle(url)) = std::mem::take(&mut self.user_avatar) {
                        evicted.push(url);
                    }
                },
                CacheField::LastRefreshed => self.last_refreshed = None,
            }
        }
        self.generation = self.generation.wrapping_add(1);
        tracing::debug!(?event, fields = ?event.clears(), "cache invalidated");
        evicted
    }
}

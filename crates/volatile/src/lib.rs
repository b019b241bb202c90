//! Short-lived, in-memory mirror of recently read state.
//!
//! The object store is always authoritative. The cache only saves round
//! trips, and writes made through [`SharedCache`] commit to the store before
//! any cached field is invalidated. Which fields each write invalidates is
//! spelled out in one table, [`CacheEvent::clears`].

mod cache;
pub mod error;
mod event;
mod shared;

pub use crate::cache::{AvatarSlot, VolatileCache};
pub use crate::event::{CacheEvent, CacheField};
pub use crate::shared::{DEFAULT_FRESHNESS, DISPLAY_NAMES_KEY, SETTINGS_KEY, SharedCache, USER_AVATAR_FIELD};

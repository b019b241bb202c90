//! The process-wide cache handle.

use hearth_blob::{BlobStore, ImageRef, ResolvedImage};
use hearth_store::{Collection, ObjectStore};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

use crate::cache::{AvatarSlot, VolatileCache};
use crate::error::{ErrorKind, Result};
use crate::event::CacheEvent;

/// Default freshness window.
pub const DEFAULT_FRESHNESS: Duration = Duration::from_secs(5);
/// `CHAT_SETTINGS` key holding the settings document.
pub const SETTINGS_KEY: &str = "settings";
/// Field of the settings document that references the user avatar.
pub const USER_AVATAR_FIELD: &str = "userAvatar";
/// `MISC` key holding the `{character id: display name}` overrides.
pub const DISPLAY_NAMES_KEY: &str = "displayNames";

const CHANNEL_CAPACITY: usize = 64;

/// [`VolatileCache`] behind a lock, plus an invalidation broadcast.
///
/// Read helpers fall back to the object store on a miss and populate the
/// cache. Write helpers commit to the object store first and only then
/// publish the matching [`CacheEvent`]. The lock is never held across an
/// `.await`.
///
/// Cheap to clone; clones share the same cache and channel.
#[derive(Debug, Clone)]
pub struct SharedCache {
    state: Arc<Mutex<VolatileCache>>,
    events: broadcast::Sender<CacheEvent>,
    store: ObjectStore,
    blobs: BlobStore,
    freshness: Duration,
}

impl SharedCache {
    pub fn new(store: ObjectStore, blobs: BlobStore) -> Self {
        Self::with_freshness(store, blobs, DEFAULT_FRESHNESS)
    }

    pub fn with_freshness(store: ObjectStore, blobs: BlobStore, freshness: Duration) -> Self {
        let (events, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            state: Arc::new(Mutex::new(VolatileCache::new())),
            events,
            store,
            blobs,
            freshness,
        }
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Invalidate per the event's table entry, then notify subscribers.
    ///
    /// Returns how many subscribers received the event; having none is not
    /// an error.
    pub fn publish(&self, event: CacheEvent) -> usize {
        let evicted = self.state.lock().apply(&event);
        for url in &evicted {
            self.blobs.handles().release(url);
        }
        self.events.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
        self.events.subscribe()
    }

    // =========================================================================
    // State
    // =========================================================================

    /// A copy of the current contents.
    pub fn snapshot(&self) -> VolatileCache {
        self.state.lock().clone()
    }

    pub fn freshness(&self) -> Duration {
        self.freshness
    }

    pub fn is_stale(&self) -> bool {
        self.state.lock().is_stale(self.freshness)
    }

    fn generation(&self) -> u64 {
        self.state.lock().generation()
    }

    /// Run `fill` unless an invalidation happened since `generation` was read.
    fn populate(&self, generation: u64, fill: impl FnOnce(&mut VolatileCache)) -> bool {
        let mut state = self.state.lock();
        if state.generation() != generation {
            tracing::debug!("discarding cache refill that raced an invalidation");
            return false;
        }
        fill(&mut state);
        true
    }

    /// Reload settings and the character list and mark the cache fresh.
    pub async fn refresh(&self) -> Result<()> {
        let generation = self.generation();
        let settings = self.load_settings().await?;
        let characters = self.load_characters().await?;
        self.populate(generation, |state| {
            state.settings = Some(settings);
            state.characters = Some(characters);
            state.last_refreshed = Some(Instant::now());
        });
        Ok(())
    }

    /// [`refresh`](Self::refresh) if the freshness window has passed.
    pub async fn refresh_if_stale(&self) -> Result<bool> {
        if !self.is_stale() {
            return Ok(false);
        }
        self.refresh().await?;
        Ok(true)
    }

    // =========================================================================
    // Read-through
    // =========================================================================

    async fn load_settings(&self) -> Result<Value> {
        let settings = self
            .store
            .get(Collection::ChatSettings, SETTINGS_KEY)
            .await
            .map_err(ErrorKind::store)?;
        Ok(settings.unwrap_or_else(|| Value::Object(Map::new())))
    }

    async fn load_characters(&self) -> Result<Vec<Value>> {
        let characters = self
            .store
            .get_collection(Collection::Characters)
            .await
            .map_err(ErrorKind::store)?;
        Ok(characters.into_values().collect())
    }

    /// The settings document; an empty object if none was ever saved.
    pub async fn settings(&self) -> Result<Value> {
        let cached = self.state.lock().settings.clone();
        if let Some(settings) = cached {
            return Ok(settings);
        }
        let generation = self.generation();
        let settings = self.load_settings().await?;
        self.populate(generation, |state| state.settings = Some(settings.clone()));
        Ok(settings)
    }

    /// Every character document, ordered by key.
    pub async fn characters(&self) -> Result<Vec<Value>> {
        let cached = self.state.lock().characters.clone();
        if let Some(characters) = cached {
            return Ok(characters);
        }
        let generation = self.generation();
        let characters = self.load_characters().await?;
        self.populate(generation, |state| state.characters = Some(characters.clone()));
        Ok(characters)
    }

    /// Message list of one character; empty if there is none.
    pub async fn messages(&self, character: &str) -> Result<Vec<Value>> {
        let cached = self.state.lock().messages.get(character).cloned();
        if let Some(messages) = cached {
            return Ok(messages);
        }
        let generation = self.generation();
        let messages: Vec<Value> = self
            .store
            .get_as(Collection::ChatMessages, character)
            .await
            .map_err(ErrorKind::store)?
            .unwrap_or_default();
        self.populate(generation, |state| {
            state.messages.insert(character.to_string(), messages.clone());
        });
        Ok(messages)
    }

    /// Display-name override of one character, if any.
    pub async fn display_name(&self, character: &str) -> Result<Option<String>> {
        let cached = self.state.lock().display_names.get(character).cloned();
        if cached.is_some() {
            return Ok(cached);
        }
        let generation = self.generation();
        let name = self
            .load_display_names()
            .await?
            .get(character)
            .and_then(Value::as_str)
            .map(str::to_string);
        if let Some(name) = &name {
            self.populate(generation, |state| {
                state.display_names.insert(character.to_string(), name.clone());
            });
        }
        Ok(name)
    }

    /// The user avatar named by the settings document.
    ///
    /// A cached handle belongs to the cache and is released when the slot is
    /// invalidated. A dangling reference yields [`AvatarSlot::Missing`].
    pub async fn user_avatar(&self) -> Result<AvatarSlot> {
        let cached = self.state.lock().user_avatar.clone();
        if cached != AvatarSlot::NotLoaded {
            return Ok(cached);
        }
        let generation = self.generation();
        let settings = self.settings().await?;
        let image = settings.get(USER_AVATAR_FIELD).and_then(ImageRef::from_value);
        let resolved = match image {
            Some(image) => self.blobs.resolve(&image).await.map_err(ErrorKind::blob)?,
            None => None,
        };
        let slot = resolved.map_or(AvatarSlot::Missing, AvatarSlot::Loaded);
        // A concurrent refill may have filled the slot first; its value wins.
        let mut existing = None;
        let cached = self.populate(generation, |state| {
            if state.user_avatar == AvatarSlot::NotLoaded {
                state.user_avatar = slot.clone();
            } else {
                existing = Some(state.user_avatar.clone());
            }
        });
        if !cached {
            self.release_slot(&slot);
            return Ok(AvatarSlot::NotLoaded);
        }
        if let Some(existing) = existing {
            self.release_slot(&slot);
            return Ok(existing);
        }
        Ok(slot)
    }

    /// Release the handle of a slot the cache did not keep.
    fn release_slot(&self, slot: &AvatarSlot) {
        if let AvatarSlot::Loaded(ResolvedImage::Handle(url)) = slot {
            self.blobs.handles().release(url);
        }
    }

    // =========================================================================
    // Write-through
    // =========================================================================

    pub async fn save_settings(&self, settings: &Value) -> Result<()> {
        self.store
            .set(Collection::ChatSettings, SETTINGS_KEY, settings)
            .await
            .map_err(ErrorKind::store)?;
        self.publish(CacheEvent::SettingsSaved);
        Ok(())
    }

    pub async fn save_character(&self, character: &str, document: &Value) -> Result<()> {
        self.store
            .set(Collection::Characters, character, document)
            .await
            .map_err(ErrorKind::store)?;
        self.publish(CacheEvent::CharactersChanged);
        Ok(())
    }

    /// Remove a character together with its message list.
    pub async fn delete_character(&self, character: &str) -> Result<bool> {
        let removed = self
            .store
            .delete(Collection::Characters, character)
            .await
            .map_err(ErrorKind::store)?;
        self.store
            .delete(Collection::ChatMessages, character)
            .await
            .map_err(ErrorKind::store)?;
        self.publish(CacheEvent::CharactersChanged);
        self.publish(CacheEvent::MessagesChanged(character.to_string()));
        Ok(removed)
    }

    pub async fn save_messages(&self, character: &str, messages: &[Value]) -> Result<()> {
        self.store
            .set(Collection::ChatMessages, character, &Value::Array(messages.to_vec()))
            .await
            .map_err(ErrorKind::store)?;
        self.publish(CacheEvent::MessagesChanged(character.to_string()));
        Ok(())
    }

    /// Set (or with `None`, remove) a character's display-name override.
    pub async fn set_display_name(&self, character: &str, name: Option<&str>) -> Result<()> {
        let mut names = self.load_display_names().await?;
        match name {
            Some(name) => names.insert(character.to_string(), Value::String(name.to_string())),
            None => names.remove(character),
        };
        self.store
            .set(Collection::Misc, DISPLAY_NAMES_KEY, &Value::Object(names))
            .await
            .map_err(ErrorKind::store)?;
        self.publish(CacheEvent::DisplayNameChanged(character.to_string()));
        Ok(())
    }

    async fn load_display_names(&self) -> Result<Map<String, Value>> {
        let names = self
            .store
            .get(Collection::Misc, DISPLAY_NAMES_KEY)
            .await
            .map_err(ErrorKind::store)?;
        Ok(match names {
            Some(Value::Object(names)) => names,
            _ => Map::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_blob::Category;
    use hearth_store::Database;
    use serde_json::json;

    async fn cache() -> (SharedCache, ObjectStore, BlobStore) {
        let db = Database::connect_in_memory().await.unwrap();
        let store = ObjectStore::from(&db);
        let blobs = BlobStore::from(&db);
        (SharedCache::new(store.clone(), blobs.clone()), store, blobs)
    }

    #[tokio::test]
    async fn test_read_through_populates() {
        let (cache, store, _) = cache().await;
        store
            .set(Collection::ChatSettings, SETTINGS_KEY, &json!({"theme": "dark"}))
            .await
            .unwrap();
        assert!(cache.snapshot().settings.is_none());
        assert_eq!(cache.settings().await.unwrap(), json!({"theme": "dark"}));
        assert_eq!(cache.snapshot().settings, Some(json!({"theme": "dark"})));

        // A write behind the cache's back is not observed until invalidated.
        store
            .set(Collection::ChatSettings, SETTINGS_KEY, &json!({"theme": "light"}))
            .await
            .unwrap();
        assert_eq!(cache.settings().await.unwrap(), json!({"theme": "dark"}));
        cache.publish(CacheEvent::SettingsSaved);
        assert_eq!(cache.settings().await.unwrap(), json!({"theme": "light"}));
    }

    #[tokio::test]
    async fn test_concurrent_avatar_loads_share_one_handle() {
        let (cache, _, blobs) = cache().await;
        let url = blobs
            .save_image("me", b"\x89PNG\r\n\x1a\n", Category::Avatar)
            .await
            .unwrap();
        blobs.handles().release(&url);
        cache.save_settings(&json!({"userAvatar": "me"})).await.unwrap();

        let (first, second) = tokio::join!(cache.user_avatar(), cache.user_avatar());
        let (first, second) = (first.unwrap(), second.unwrap());
        assert!(matches!(first, AvatarSlot::Loaded(ResolvedImage::Handle(_))));
        assert_eq!(first, second);
        assert_eq!(blobs.handles().live_handles(), 1);

        cache.publish(CacheEvent::AvatarChanged);
        assert_eq!(blobs.handles().live_handles(), 0);
    }

    #[tokio::test]
    async fn test_missing_data_reads_as_empty() {
        let (cache, _, _) = cache().await;
        assert_eq!(cache.settings().await.unwrap(), json!({}));
        assert!(cache.characters().await.unwrap().is_empty());
        assert!(cache.messages("nobody").await.unwrap().is_empty());
        assert_eq!(cache.display_name("nobody").await.unwrap(), None);
        assert_eq!(cache.user_avatar().await.unwrap(), AvatarSlot::Missing);
    }

    #[tokio::test]
    async fn test_write_through_commits_before_publishing() {
        let (cache, store, _) = cache().await;
        let mut events = cache.subscribe();

        cache.messages("c1").await.unwrap();
        cache.save_messages("c1", &[json!("hello")]).await.unwrap();
        assert_eq!(events.recv().await.unwrap(), CacheEvent::MessagesChanged("c1".to_string()));
        assert!(!cache.snapshot().messages.contains_key("c1"));
        assert_eq!(
            store.get(Collection::ChatMessages, "c1").await.unwrap(),
            Some(json!(["hello"]))
        );
        assert_eq!(cache.messages("c1").await.unwrap(), vec![json!("hello")]);
    }

    #[tokio::test]
    async fn test_settings_save_keeps_messages_and_names() {
        let (cache, _, _) = cache().await;
        cache.save_messages("c1", &[json!("hi")]).await.unwrap();
        cache.set_display_name("c1", Some("Ash")).await.unwrap();
        cache.messages("c1").await.unwrap();
        assert_eq!(cache.display_name("c1").await.unwrap().as_deref(), Some("Ash"));

        cache.save_settings(&json!({"theme": "dark"})).await.unwrap();
        let snapshot = cache.snapshot();
        assert!(snapshot.settings.is_none());
        assert!(snapshot.messages.contains_key("c1"));
        assert!(snapshot.display_names.contains_key("c1"));

        cache.publish(CacheEvent::Reset);
        let snapshot = cache.snapshot();
        assert!(snapshot.messages.is_empty());
        assert!(snapshot.display_names.is_empty());
    }

    #[tokio::test]
    async fn test_display_name_removal() {
        let (cache, store, _) = cache().await;
        cache.set_display_name("c1", Some("Ash")).await.unwrap();
        cache.set_display_name("c2", Some("Birch")).await.unwrap();
        cache.set_display_name("c1", None).await.unwrap();
        assert_eq!(cache.display_name("c1").await.unwrap(), None);
        assert_eq!(
            store.get(Collection::Misc, DISPLAY_NAMES_KEY).await.unwrap(),
            Some(json!({"c2": "Birch"}))
        );
    }

    #[tokio::test]
    async fn test_characters() {
        let (cache, _, _) = cache().await;
        cache.save_character("c1", &json!({"name": "Ash"})).await.unwrap();
        cache.save_character("c2", &json!({"name": "Birch"})).await.unwrap();
        assert_eq!(cache.characters().await.unwrap().len(), 2);
        cache.save_messages("c2", &[json!("hi")]).await.unwrap();
        assert!(cache.delete_character("c2").await.unwrap());
        assert_eq!(cache.characters().await.unwrap(), vec![json!({"name": "Ash"})]);
        assert!(cache.messages("c2").await.unwrap().is_empty());
        assert!(!cache.delete_character("c2").await.unwrap());
    }

    #[tokio::test]
    async fn test_user_avatar_slot() {
        let (cache, _, blobs) = cache().await;
        blobs.save_image("user-avatar", b"GIF89a", Category::Avatar).await.unwrap();
        blobs.handles().release_all();
        cache.save_settings(&json!({"userAvatar": "user-avatar"})).await.unwrap();

        let AvatarSlot::Loaded(ResolvedImage::Handle(url)) = cache.user_avatar().await.unwrap() else {
            panic!("expected a loaded avatar");
        };
        // Cached: the same handle comes back.
        assert_eq!(cache.user_avatar().await.unwrap(), AvatarSlot::Loaded(ResolvedImage::Handle(url.clone())));
        assert_eq!(blobs.handles().live_handles(), 1);

        // Invalidating the slot releases the handle.
        cache.publish(CacheEvent::AvatarChanged);
        assert!(blobs.handles().resolve(&url).is_none());
        assert_eq!(blobs.handles().live_handles(), 0);
    }

    #[tokio::test]
    async fn test_dangling_avatar_is_missing() {
        let (cache, _, _) = cache().await;
        cache.save_settings(&json!({"userAvatar": "user-avatar"})).await.unwrap();
        assert_eq!(cache.user_avatar().await.unwrap(), AvatarSlot::Missing);
    }

    #[tokio::test]
    async fn test_refresh_and_staleness() {
        let (cache, _, _) = cache().await;
        assert!(cache.is_stale());
        assert!(cache.refresh_if_stale().await.unwrap());
        assert!(!cache.is_stale());
        assert!(!cache.refresh_if_stale().await.unwrap());
        cache.publish(CacheEvent::Reset);
        assert!(cache.is_stale());

        let db = Database::connect_in_memory().await.unwrap();
        let zero = SharedCache::with_freshness(ObjectStore::from(&db), BlobStore::from(&db), Duration::ZERO);
        zero.refresh().await.unwrap();
        std::thread::sleep(Duration::from_millis(2));
        assert!(zero.is_stale());
    }

    #[tokio::test]
    async fn test_publish_without_subscribers() {
        let (cache, _, _) = cache().await;
        assert_eq!(cache.publish(CacheEvent::CharactersChanged), 0);
        let _rx = cache.subscribe();
        assert_eq!(cache.publish(CacheEvent::CharactersChanged), 1);
    }

    #[tokio::test]
    async fn test_unavailable_store_surfaces_error() {
        let db = Database::unavailable("gone");
        let cache = SharedCache::new(ObjectStore::from(&db), BlobStore::from(&db));
        let err = cache.settings().await.unwrap_err();
        assert_eq!(*err, ErrorKind::StorageUnavailable("gone".to_string()));
        // Nothing was cached.
        assert!(cache.snapshot().settings.is_none());
    }
}

//! Process-local access handles for blob payloads.
//!
//! Every handle minted by the blob store keeps its payload alive in the
//! registry until it is released. Nothing is released automatically;
//! [`HandleRegistry::live_handles`] makes leaks observable.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt::{Debug, Display, Formatter, Result as FmtResult};
use std::sync::Arc;

use crate::media::MediaType;

const SCHEME: &str = "blob:hearth/";

/// Opaque, displayable reference to a payload held by a [`HandleRegistry`].
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AccessUrl(String);

impl AccessUrl {
    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Accepts only strings in the registry's own URL form.
    pub fn parse(url: &str) -> Option<Self> {
        url.strip_prefix(SCHEME)
            .and_then(|id| uuid::Uuid::parse_str(id).ok())
            .map(|_| Self(url.to_string()))
    }
}

impl Display for AccessUrl {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for AccessUrl {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Payload behind a live handle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandleTarget {
    /// Blob key the handle was minted for; `None` for inline images.
    pub key: Option<String>,
    pub media_type: MediaType,
    pub payload: Arc<[u8]>,
}

/// Shared table of live access handles. Cheap to clone.
#[derive(Clone, Default)]
pub struct HandleRegistry {
    live: Arc<Mutex<HashMap<AccessUrl, HandleTarget>>>,
}

impl Debug for HandleRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("HandleRegistry").field("live", &self.live_handles()).finish()
    }
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn mint(&self, key: Option<&str>, media_type: MediaType, payload: impl Into<Arc<[u8]>>) -> AccessUrl {
        let url = AccessUrl(format!("{SCHEME}{}", uuid::Uuid::new_v4()));
        let target = HandleTarget {
            key: key.map(str::to_string),
            media_type,
            payload: payload.into(),
        };
        self.live.lock().insert(url.clone(), target);
        url
    }

    /// Look up a live handle.
    pub fn resolve(&self, url: &AccessUrl) -> Option<HandleTarget> {
        self.live.lock().get(url).cloned()
    }

    /// Revoke a handle. Returns `false` if it was not live.
    pub fn release(&self, url: &AccessUrl) -> bool {
        self.live.lock().remove(url).is_some()
    }

    /// Revoke every handle minted for `key`, returning how many were live.
    pub fn release_key(&self, key: &str) -> usize {
        let mut live = self.live.lock();
        let before = live.len();
        live.retain(|_, target| target.key.as_deref() != Some(key));
        before - live.len()
    }

    /// Revoke everything, returning how many handles were live.
    pub fn release_all(&self) -> usize {
        let mut live = self.live.lock();
        let count = live.len();
        live.clear();
        count
    }

    pub fn live_handles(&self) -> usize {
        self.live.lock().len()
    }
}

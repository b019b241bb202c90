//! Durable medium and collection-partitioned object store.
//!
//! Everything the application persists lives in one SQLite database file:
//!
//! - **Entries**: `(collection, key) -> JSON value` pairs, managed by
//!   [`ObjectStore`]. The store enforces no schema; callers own the shape of
//!   their documents.
//! - **Blobs**: binary image payloads, managed by the `hearth-blob` crate on
//!   top of the same [`Database`] handle.
//!
//! If the medium can't be opened, the failure is surfaced once and the
//! returned handle fails fast from then on (see
//! [`Database::connect_or_degrade`]).

mod collection;
mod db;
pub mod error;
mod object;

pub use crate::collection::Collection;
pub use crate::db::{Database, MAX_CONNECTIONS};
pub use crate::object::ObjectStore;
use serde_json::Value;
use std::collections::BTreeMap;

/// Full contents of some (or all) collections, keyed by collection then key.
pub type Snapshot = BTreeMap<Collection, BTreeMap<String, Value>>;

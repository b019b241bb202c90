//! The structured-data document (`data.json`).

use exn::ResultExt;
use hearth_store::{Collection, Snapshot};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::error::{ErrorKind, Result};

/// Version written by this crate.
pub const CURRENT_VERSION: u64 = 2;
/// Version assumed for documents without one.
pub const LEGACY_VERSION: u64 = 1;

const VERSION_FIELD: &str = "version";
const EXPORT_TIME_FIELD: &str = "exportTime";

/// A parsed (or about to be written) backup document.
#[derive(Clone, Debug, PartialEq)]
pub struct Document {
    pub version: u64,
    /// RFC 3339 timestamp, kept verbatim when read.
    pub export_time: Option<String>,
    pub collections: Snapshot,
    /// Top-level fields that are neither metadata nor a known collection.
    pub unknown_fields: Vec<String>,
}

impl Document {
    /// Wrap a snapshot for export, stamped with the current time.
    pub fn new(collections: Snapshot) -> Result<Self> {
        let export_time = OffsetDateTime::now_utc().format(&Rfc3339).or_raise(|| ErrorKind::Encode)?;
        Ok(Self {
            version: CURRENT_VERSION,
            export_time: Some(export_time),
            collections,
            unknown_fields: Vec::new(),
        })
    }

    /// Parse and validate a document.
    ///
    /// Fails with [`InvalidArchive`](ErrorKind::InvalidArchive) if the bytes
    /// aren't a JSON object or a collection field isn't an object. Version
    /// skew and unknown fields are only logged.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let value: Value =
            serde_json::from_slice(bytes).or_raise(|| ErrorKind::invalid("data document is not valid JSON"))?;
        let Value::Object(mut fields) = value else {
            exn::bail!(ErrorKind::invalid("data document is not a JSON object"));
        };

        let version = match fields.remove(VERSION_FIELD) {
            None => LEGACY_VERSION,
            Some(value) => value.as_u64().unwrap_or_else(|| {
                tracing::warn!(%value, "unreadable document version, assuming the legacy format");
                LEGACY_VERSION
            }),
        };
        if version > CURRENT_VERSION {
            tracing::warn!(version, supported = CURRENT_VERSION, "document is newer than this build; restoring anyway");
        }
        let export_time = fields
            .remove(EXPORT_TIME_FIELD)
            .and_then(|value| value.as_str().map(str::to_string));

        let mut collections = Snapshot::new();
        let mut unknown_fields = Vec::new();
        for (name, value) in fields {
            let Ok(collection) = name.parse::<Collection>() else {
                tracing::warn!(field = %name, "skipping unknown field in data document");
                unknown_fields.push(name);
                continue;
            };
            let Value::Object(entries) = value else {
                exn::bail!(ErrorKind::invalid(format!("{name} is not an object")));
            };
            collections.insert(collection, entries.into_iter().collect::<BTreeMap<_, _>>());
        }

        Ok(Self {
            version,
            export_time,
            collections,
            unknown_fields,
        })
    }

    pub fn to_value(&self) -> Value {
        let mut fields = Map::new();
        fields.insert(VERSION_FIELD.to_string(), Value::from(self.version));
        if let Some(export_time) = &self.export_time {
            fields.insert(EXPORT_TIME_FIELD.to_string(), Value::String(export_time.clone()));
        }
        for (collection, entries) in &self.collections {
            let entries = entries.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
            fields.insert(collection.as_str().to_string(), Value::Object(entries));
        }
        Value::Object(fields)
    }

    pub fn to_json(&self, pretty: bool) -> Result<Vec<u8>> {
        let value = self.to_value();
        let bytes = match pretty {
            true => serde_json::to_vec_pretty(&value),
            false => serde_json::to_vec(&value),
        };
        bytes.or_raise(|| ErrorKind::Encode)
    }

    /// Number of entries across every collection.
    pub fn entry_count(&self) -> usize {
        self.collections.values().map(BTreeMap::len).sum()
    }
}

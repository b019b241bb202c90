//! Store Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction. Lower-level `sqlx`/`serde_json` errors are attached as
//! children of the kinds below.

use derive_more::{Display, Error};

/// A store error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The durable medium could not be opened. Fatal for the session: every
    /// subsequent operation fails with this same kind. Callers are expected
    /// to degrade (treat reads as "no data").
    #[display("storage unavailable: {_0}")]
    StorageUnavailable(#[error(not(source))] String),
    #[display("database error")]
    Database,
    #[display("database migration error")]
    Migration,
    /// A collection name outside the fixed enumeration.
    #[display("unknown collection: {_0}")]
    UnknownCollection(#[error(not(source))] String),
    /// Stored data could not be decoded into the requested shape.
    #[display("invalid stored data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // SQLITE_BUSY and friends surface as plain database errors.
        matches!(self, Self::Database)
    }

    /// Returns `true` if the medium itself is gone for this session.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_))
    }
}

//! Blob store error types.

use derive_more::{Display, Error};
use hearth_store::error::{Error as StoreError, ErrorKind as StoreErrorKind};

/// A blob store error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for blob store operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The shared medium is gone for this session.
    #[display("storage unavailable: {_0}")]
    StorageUnavailable(#[error(not(source))] String),
    #[display("image not found: {_0}")]
    NotFound(#[error(not(source))] String),
    #[display("invalid image key: {_0:?}")]
    InvalidKey(#[error(not(source))] String),
    #[display("database error")]
    Database,
    /// A stored record could not be decoded.
    #[display("invalid stored blob: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Re-raise a medium error under the matching blob kind, keeping the
    /// original as a child.
    #[track_caller]
    pub fn store(err: StoreError) -> Error {
        let kind = match &*err {
            StoreErrorKind::StorageUnavailable(reason) => ErrorKind::StorageUnavailable(reason.clone()),
            _ => ErrorKind::Database,
        };
        err.raise(kind)
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database)
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_))
    }
}

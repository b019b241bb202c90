use derive_more::{Display, Error};
use hearth_blob::error::{Error as BlobError, ErrorKind as BlobErrorKind};
use hearth_store::error::{Error as StoreError, ErrorKind as StoreErrorKind};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller input failed a precondition; nothing was written.
    #[display("invalid sticker: {_0}")]
    ValidationError(#[error(not(source))] String),
    #[display("storage unavailable: {_0}")]
    StorageUnavailable(#[error(not(source))] String),
    #[display("sticker storage error")]
    Storage,
}

impl ErrorKind {
    #[track_caller]
    pub fn store(err: StoreError) -> Error {
        let kind = match &*err {
            StoreErrorKind::StorageUnavailable(reason) => ErrorKind::StorageUnavailable(reason.clone()),
            _ => ErrorKind::Storage,
        };
        err.raise(kind)
    }

    #[track_caller]
    pub fn blob(err: BlobError) -> Error {
        let kind = match &*err {
            BlobErrorKind::StorageUnavailable(reason) => ErrorKind::StorageUnavailable(reason.clone()),
            _ => ErrorKind::Storage,
        };
        err.raise(kind)
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage)
    }
}

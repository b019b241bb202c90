//! Top-level error type.
//!
//! Every component error is re-raised under one of these kinds, with the
//! original kept as a child so the full tree is still reported.

use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[display("configuration error")]
    Config,
    #[display("storage unavailable: {_0}")]
    StorageUnavailable(#[error(not(source))] String),
    #[display("storage error")]
    Storage,
    #[display("image not found: {_0}")]
    NotFound(#[error(not(source))] String),
    #[display("invalid archive: {_0}")]
    InvalidArchive(#[error(not(source))] String),
    #[display("invalid input: {_0}")]
    Validation(#[error(not(source))] String),
    #[display("could not access {_0}")]
    Io(#[error(not(source))] String),
}

impl ErrorKind {
    #[track_caller]
    pub fn config(err: hearth_config::error::Error) -> Error {
        err.raise(ErrorKind::Config)
    }

    #[track_caller]
    pub fn store(err: hearth_store::error::Error) -> Error {
        use hearth_store::error::ErrorKind as Kind;
        let kind = match &*err {
            Kind::StorageUnavailable(reason) => ErrorKind::StorageUnavailable(reason.clone()),
            _ => ErrorKind::Storage,
        };
        err.raise(kind)
    }

    #[track_caller]
    pub fn blob(err: hearth_blob::error::Error) -> Error {
        use hearth_blob::error::ErrorKind as Kind;
        let kind = match &*err {
            Kind::StorageUnavailable(reason) => ErrorKind::StorageUnavailable(reason.clone()),
            Kind::NotFound(key) => ErrorKind::NotFound(key.clone()),
            Kind::InvalidKey(key) => ErrorKind::Validation(format!("invalid image key {key:?}")),
            _ => ErrorKind::Storage,
        };
        err.raise(kind)
    }

    #[track_caller]
    pub fn archive(err: hearth_archive::error::Error) -> Error {
        use hearth_archive::error::ErrorKind as Kind;
        let kind = match &*err {
            Kind::InvalidArchive(reason) => ErrorKind::InvalidArchive(reason.clone()),
            Kind::StorageUnavailable(reason) => ErrorKind::StorageUnavailable(reason.clone()),
            Kind::Storage | Kind::Encode => ErrorKind::Storage,
        };
        err.raise(kind)
    }

    #[track_caller]
    pub fn sticker(err: hearth_sticker::error::Error) -> Error {
        use hearth_sticker::error::ErrorKind as Kind;
        let kind = match &*err {
            Kind::ValidationError(reason) => ErrorKind::Validation(reason.clone()),
            Kind::StorageUnavailable(reason) => ErrorKind::StorageUnavailable(reason.clone()),
            Kind::Storage => ErrorKind::Storage,
        };
        err.raise(kind)
    }

    #[track_caller]
    pub fn volatile(err: hearth_volatile::error::Error) -> Error {
        use hearth_volatile::error::ErrorKind as Kind;
        let kind = match &*err {
            Kind::StorageUnavailable(reason) => ErrorKind::StorageUnavailable(reason.clone()),
            Kind::Storage => ErrorKind::Storage,
        };
        err.raise(kind)
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage)
    }
}

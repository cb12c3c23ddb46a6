//! Storage error types.

use std::{error::Error, fmt, io};

use snafu::{Backtrace, prelude::*};

/// Errors produced by a storage backend implementation.
///
/// Backend-specific failures are wrapped in this enum so higher layers can map
/// them into `StorageError` variants with additional context (the path or
/// object key involved).
#[derive(Debug)]
pub enum BackendError {
    /// A local filesystem I/O error.
    Local(io::Error),
    /// An object-store (bucket) error.
    Object(object_store::Error),
}

impl fmt::Display for BackendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendError::Local(e) => write!(f, "local I/O error: {e}"),
            BackendError::Object(e) => write!(f, "object store error: {e}"),
        }
    }
}

impl Error for BackendError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            BackendError::Local(e) => Some(e),
            BackendError::Object(e) => Some(e),
        }
    }
}

/// Errors that can occur during storage operations.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StorageError {
    /// The specified path was not found.
    #[snafu(display("Path not found: {path}"))]
    NotFound {
        /// The path that was not found.
        path: String,
        /// Underlying backend error that caused the failure.
        source: BackendError,
        /// The backtrace at the time the error occurred.
        backtrace: Backtrace,
    },

    /// The specified path already exists when creation was requested with
    /// create-new semantics.
    #[snafu(display("Path already exists: {path}"))]
    AlreadyExists {
        /// The path that was found to already exist.
        path: String,
        /// Underlying backend error that indicates the existing resource.
        source: BackendError,
        /// The backtrace captured when the error occurred.
        backtrace: Backtrace,
    },

    /// Any other I/O or connectivity failure against the backend.
    #[snafu(display("I/O error at {path}: {source}"))]
    OtherIo {
        /// The path where the I/O error occurred.
        path: String,
        /// Underlying backend error with platform-specific details.
        source: BackendError,
        /// The backtrace at the time the error occurred.
        backtrace: Backtrace,
    },

    /// A storage locator string could not be turned into a location.
    #[snafu(display("Invalid storage location {spec:?}: {reason}"))]
    InvalidLocation {
        /// The locator as supplied by the caller.
        spec: String,
        /// Why the locator was rejected.
        reason: String,
    },
}

impl StorageError {
    /// Path (or object key) the error refers to, when there is one.
    pub fn path(&self) -> Option<&str> {
        match self {
            StorageError::NotFound { path, .. }
            | StorageError::AlreadyExists { path, .. }
            | StorageError::OtherIo { path, .. } => Some(path),
            StorageError::InvalidLocation { .. } => None,
        }
    }
}

/// Classify an object-store error into the matching `StorageError` variant.
pub(crate) fn classify_object_error(path: String, err: object_store::Error) -> StorageError {
    match err {
        e @ object_store::Error::NotFound { .. } => StorageError::NotFound {
            path,
            source: BackendError::Object(e),
            backtrace: Backtrace::capture(),
        },
        e @ object_store::Error::AlreadyExists { .. } => StorageError::AlreadyExists {
            path,
            source: BackendError::Object(e),
            backtrace: Backtrace::capture(),
        },
        e => StorageError::OtherIo {
            path,
            source: BackendError::Object(e),
            backtrace: Backtrace::capture(),
        },
    }
}

/// Classify a local I/O error, splitting out `NotFound` and `AlreadyExists`.
pub(crate) fn classify_local_error(path: String, err: io::Error) -> StorageError {
    match err.kind() {
        io::ErrorKind::NotFound => StorageError::NotFound {
            path,
            source: BackendError::Local(err),
            backtrace: Backtrace::capture(),
        },
        io::ErrorKind::AlreadyExists => StorageError::AlreadyExists {
            path,
            source: BackendError::Local(err),
            backtrace: Backtrace::capture(),
        },
        _ => StorageError::OtherIo {
            path,
            source: BackendError::Local(err),
            backtrace: Backtrace::capture(),
        },
    }
}

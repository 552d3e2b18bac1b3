//! Defines [`Error`] --- the failure taxonomy shared by every filesystem operation.

use thiserror::Error;

/// Result of filesystem operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Filesystem errors.
///
/// Each variant is a distinct failure kind so callers can pattern-match
/// instead of parsing messages.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// The path does not resolve to an entry. Also returned when an
    /// intermediate path segment is a file rather than a directory
    /// during plain resolution.
    #[error("no such file or directory: {path}")]
    NotFound { path: String },

    /// The target of a create, rename or move already exists.
    #[error("entry already exists: {path}")]
    AlreadyExists { path: String },

    /// A file operation received a directory path.
    #[error("is a directory: {path}")]
    IsADirectory { path: String },

    /// A directory operation received a file path.
    #[error("not a directory: {path}")]
    NotADirectory { path: String },

    /// Malformed input: a path escaping the virtual root, an illegal
    /// open mode, an illegal seek, or an oversize export.
    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },

    /// A lock acquisition timed out, or failed fast on contention.
    #[error("operation would block: {reason}")]
    WouldBlock { reason: String },

    /// The write was rejected before any allocation because it would
    /// push the ledger past its byte budget.
    #[error("quota exceeded: requested {requested} bytes with {available} available")]
    QuotaExceeded { requested: u64, available: u64 },

    /// The node-count cap was reached. A sibling of [`Error::QuotaExceeded`]:
    /// both reject growth up front, this one counts nodes instead of bytes.
    #[error("node limit exceeded: at most {limit} nodes allowed")]
    NodeLimitExceeded { limit: u64 },

    /// Mode or capability mismatch: reading a write-only handle, a
    /// non-tail write on a sequential backend that cannot promote, or
    /// promotion above the configured hard limit.
    #[error("unsupported operation: {reason}")]
    Unsupported { reason: String },

    /// The handle was closed; every operation after close fails.
    #[error("file handle is closed")]
    HandleClosed,
}

impl Error {
    pub(crate) fn not_found(path: impl Into<String>) -> Self {
        Error::NotFound { path: path.into() }
    }

    pub(crate) fn already_exists(path: impl Into<String>) -> Self {
        Error::AlreadyExists { path: path.into() }
    }

    pub(crate) fn is_a_directory(path: impl Into<String>) -> Self {
        Error::IsADirectory { path: path.into() }
    }

    pub(crate) fn not_a_directory(path: impl Into<String>) -> Self {
        Error::NotADirectory { path: path.into() }
    }

    pub(crate) fn invalid_argument(reason: impl Into<String>) -> Self {
        Error::InvalidArgument { reason: reason.into() }
    }

    pub(crate) fn would_block(reason: impl Into<String>) -> Self {
        Error::WouldBlock { reason: reason.into() }
    }

    pub(crate) fn unsupported(reason: impl Into<String>) -> Self {
        Error::Unsupported { reason: reason.into() }
    }
}

impl From<Error> for std::io::Error {
    fn from(err: Error) -> Self {
        use std::io::ErrorKind;
        let kind = match &err {
            Error::NotFound { .. } => ErrorKind::NotFound,
            Error::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Error::IsADirectory { .. } => ErrorKind::IsADirectory,
            Error::NotADirectory { .. } => ErrorKind::NotADirectory,
            Error::InvalidArgument { .. } => ErrorKind::InvalidInput,
            Error::WouldBlock { .. } => ErrorKind::WouldBlock,
            Error::QuotaExceeded { .. } | Error::NodeLimitExceeded { .. } => {
                ErrorKind::StorageFull
            }
            Error::Unsupported { .. } => ErrorKind::Unsupported,
            Error::HandleClosed => ErrorKind::InvalidInput,
        };
        std::io::Error::new(kind, err)
    }
}

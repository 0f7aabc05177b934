//! Error types for the CaskDb storage engine.

use std::io;
use thiserror::Error;

/// The result type used throughout CaskDb.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for CaskDb operations.
#[derive(Debug, Error)]
pub enum Error {
    /// An I/O error occurred.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Data corruption was detected.
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// A checksum mismatch was detected.
    #[error("Checksum mismatch: expected {expected:#x}, got {actual:#x}")]
    ChecksumMismatch {
        /// The checksum stored on disk.
        expected: u32,
        /// The checksum computed over the bytes read.
        actual: u32,
    },

    /// The requested key was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// An invalid argument was provided.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A configured limit was exceeded.
    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// Another merge is already running.
    #[error("Merge is already in progress")]
    MergeInProgress,

    /// A composite operation hit a key holding another type.
    #[error("Wrong type: expected {expected}, found {actual}")]
    WrongType {
        /// The type the operation works on.
        expected: &'static str,
        /// The type stored under the key.
        actual: &'static str,
    },

    /// The database is in an invalid state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// A serialization or deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The database or file is already in use.
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Creates a new corruption error.
    pub fn corruption(msg: impl Into<String>) -> Self {
        Error::Corruption(msg.into())
    }

    /// Creates a new not found error.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    /// Creates a new invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Creates a new capacity error.
    pub fn capacity(msg: impl Into<String>) -> Self {
        Error::CapacityExceeded(msg.into())
    }

    /// Creates a new internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Error::Internal(msg.into())
    }

    /// Returns true for errors caused by damaged bytes on disk.
    pub fn is_integrity(&self) -> bool {
        matches!(self, Error::Corruption(_) | Error::ChecksumMismatch { .. })
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

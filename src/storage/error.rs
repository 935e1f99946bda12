//! Failures of the override store

use std::fmt;

pub type StorageResult<T> = Result<T, StorageError>;

/// Why manual links or merge exclusions could not be read or written
#[derive(Debug)]
pub enum StorageError {
    /// The backend cannot be reached, or has been closed
    Unavailable(String),

    /// Reading or writing override rows failed
    Query(String),

    /// The override schema could not be brought up to date
    Migration(String),

    InvalidConfig(String),

    /// A stored override side does not decode, or a side cannot be encoded
    CorruptSide(String),

    Io(std::io::Error),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Unavailable(msg) => write!(f, "override store unavailable: {msg}"),
            StorageError::Query(msg) => write!(f, "override query failed: {msg}"),
            StorageError::Migration(msg) => write!(f, "override schema migration failed: {msg}"),
            StorageError::InvalidConfig(msg) => write!(f, "invalid override store configuration: {msg}"),
            StorageError::CorruptSide(msg) => write!(f, "corrupt override side: {msg}"),
            StorageError::Io(err) => write!(f, "override store I/O error: {err}"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::CorruptSide(err.to_string())
    }
}

impl From<std::io::Error> for StorageError {
    fn from(err: std::io::Error) -> Self {
        StorageError::Io(err)
    }
}

#[cfg(feature = "storage-sqlite")]
impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Io(io_err) => StorageError::Io(io_err),
            sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut => {
                StorageError::Unavailable(err.to_string())
            }
            _ => StorageError::Query(err.to_string()),
        }
    }
}

#[cfg(feature = "storage-sqlite")]
impl From<sqlx::migrate::MigrateError> for StorageError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StorageError::Migration(err.to_string())
    }
}

//! Error types for registry operations

use std::fmt;

use crate::storage::StorageError;

use super::types::DataSource;

/// Result type alias for registry operations
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Errors surfaced by the registry façade
#[derive(Debug)]
pub enum RegistryError {
    /// No resource with this ID exists in the tenant's merged view
    NotFound(String),

    /// The override request is semantically invalid
    InvalidOverride(String),

    /// A supplemental pull source failed or timed out
    SourceUnavailable { source: DataSource, reason: String },

    /// Data owned by one tenant showed up under another
    TenantIsolationViolation { expected: String, found: String },

    /// The tenant identifier was rejected
    InvalidTenant(String),

    /// Override persistence failed
    Storage(StorageError),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryError::NotFound(id) => write!(f, "resource not found: {}", id),
            RegistryError::InvalidOverride(msg) => write!(f, "invalid override: {}", msg),
            RegistryError::SourceUnavailable { source, reason } => {
                write!(f, "source {} unavailable: {}", source, reason)
            }
            RegistryError::TenantIsolationViolation { expected, found } => write!(
                f,
                "tenant isolation violation: expected tenant {}, found {}",
                expected, found
            ),
            RegistryError::InvalidTenant(tenant) => write!(f, "invalid tenant id: {}", tenant),
            RegistryError::Storage(err) => write!(f, "override storage failed: {}", err),
        }
    }
}

impl std::error::Error for RegistryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RegistryError::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StorageError> for RegistryError {
    fn from(err: StorageError) -> Self {
        RegistryError::Storage(err)
    }
}

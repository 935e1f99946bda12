//! Storage backend trait definition
//!
//! This module defines the `OverrideBackend` trait that every override store
//! implements.

use std::collections::HashMap;

use async_trait::async_trait;

use super::error::StorageResult;
use super::schema::{ManualLink, MergeExclusion};

/// Health status of the storage backend
#[derive(Debug, Clone)]
pub struct HealthStatus {
    /// Is the backend operational?
    pub healthy: bool,

    /// Human-readable status message
    pub message: String,

    /// Additional backend-specific metadata
    pub metadata: HashMap<String, String>,
}

/// Durable home of manual links and merge exclusions
///
/// The registry writes here before it touches its in-memory view, so a
/// failed write leaves the registry exactly as it was. Reads return rows in
/// insertion order.
///
/// Implementations must be `Send + Sync` as they are shared by every tenant.
#[async_trait]
pub trait OverrideBackend: Send + Sync {
    /// Persist one manual link
    async fn insert_link(&self, link: ManualLink) -> StorageResult<()>;

    /// Persist a batch of exclusions produced by one report-merge
    ///
    /// Either every exclusion is stored or none is.
    async fn insert_exclusions(&self, exclusions: Vec<MergeExclusion>) -> StorageResult<()>;

    /// All manual links of a tenant, oldest first
    async fn links(&self, tenant: &str) -> StorageResult<Vec<ManualLink>>;

    /// All merge exclusions of a tenant, oldest first
    async fn exclusions(&self, tenant: &str) -> StorageResult<Vec<MergeExclusion>>;

    /// Cheap check that the backend is operational
    async fn health_check(&self) -> StorageResult<HealthStatus>;

    /// Human-readable stats (e.g., "SQLite: 3 links, 5 exclusions")
    async fn get_stats(&self) -> StorageResult<String>;

    /// Close the backend and release resources
    async fn close(&self) -> StorageResult<()>;
}

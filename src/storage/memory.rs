//! In-memory override backend (no persistence)
//!
//! This backend keeps overrides in process memory.
//! It's useful for:
//! - Testing without database dependencies
//! - Deployments that do not configure storage
//!
//! ## Limitations
//!
//! - **No persistence**: All overrides are lost on restart

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use super::backend::{HealthStatus, OverrideBackend};
use super::error::{StorageError, StorageResult};
use super::schema::{ManualLink, MergeExclusion};

#[derive(Default)]
struct TenantOverrides {
    links: Vec<ManualLink>,
    exclusions: Vec<MergeExclusion>,
}

/// In-memory override backend
#[derive(Default)]
pub struct MemoryBackend {
    tenants: RwLock<HashMap<String, TenantOverrides>>,
    closed: AtomicBool,
}

impl MemoryBackend {
    /// Create a new in-memory backend
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StorageError::Unavailable(
                "in-memory backend is closed".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl OverrideBackend for MemoryBackend {
    async fn insert_link(&self, link: ManualLink) -> StorageResult<()> {
        self.ensure_open()?;
        debug!(tenant = %link.tenant, "storing manual link in memory");

        let mut tenants = self.tenants.write().await;
        tenants
            .entry(link.tenant.clone())
            .or_default()
            .links
            .push(link);
        Ok(())
    }

    async fn insert_exclusions(&self, exclusions: Vec<MergeExclusion>) -> StorageResult<()> {
        self.ensure_open()?;
        debug!(count = exclusions.len(), "storing merge exclusions in memory");

        let mut tenants = self.tenants.write().await;
        for exclusion in exclusions {
            tenants
                .entry(exclusion.tenant.clone())
                .or_default()
                .exclusions
                .push(exclusion);
        }
        Ok(())
    }

    async fn links(&self, tenant: &str) -> StorageResult<Vec<ManualLink>> {
        self.ensure_open()?;
        let tenants = self.tenants.read().await;
        Ok(tenants
            .get(tenant)
            .map(|t| t.links.clone())
            .unwrap_or_default())
    }

    async fn exclusions(&self, tenant: &str) -> StorageResult<Vec<MergeExclusion>> {
        self.ensure_open()?;
        let tenants = self.tenants.read().await;
        Ok(tenants
            .get(tenant)
            .map(|t| t.exclusions.clone())
            .unwrap_or_default())
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        let closed = self.closed.load(Ordering::Acquire);
        let tenants = self.tenants.read().await.len();
        Ok(HealthStatus {
            healthy: !closed,
            message: if closed {
                "In-memory storage closed".to_string()
            } else {
                "In-memory storage operational".to_string()
            },
            metadata: HashMap::from([
                ("backend".to_string(), "memory".to_string()),
                ("tenants".to_string(), tenants.to_string()),
            ]),
        })
    }

    async fn get_stats(&self) -> StorageResult<String> {
        let tenants = self.tenants.read().await;
        let links: usize = tenants.values().map(|t| t.links.len()).sum();
        let exclusions: usize = tenants.values().map(|t| t.exclusions.len()).sum();
        Ok(format!(
            "In-Memory: {} links, {} exclusions across {} tenants",
            links,
            exclusions,
            tenants.len()
        ))
    }

    async fn close(&self) -> StorageResult<()> {
        debug!("closing in-memory backend");
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

//! Failure scenario tests
//!
//! These tests verify that:
//! - A failed override write leaves the merged view untouched
//! - Foreign rows from the backend are reported as isolation violations
//! - A closed backend surfaces storage errors

use std::sync::Arc;

use assert_matches::assert_matches;
use async_trait::async_trait;
use chrono::Utc;
use unified_resources::registry::{DataSource, RegistryError, ResourceFilter};
use unified_resources::storage::{
    HealthStatus, ManualLink, MemoryBackend, MergeExclusion, OverrideBackend, OverrideSide,
    StorageError, StorageResult,
};

use crate::helpers::*;

/// Backend that reads fine but refuses every write
struct ReadOnlyBackend;

#[async_trait]
impl OverrideBackend for ReadOnlyBackend {
    async fn insert_link(&self, _link: ManualLink) -> StorageResult<()> {
        Err(StorageError::Query("database is locked".to_string()))
    }

    async fn insert_exclusions(&self, _exclusions: Vec<MergeExclusion>) -> StorageResult<()> {
        Err(StorageError::Query("database is locked".to_string()))
    }

    async fn links(&self, _tenant: &str) -> StorageResult<Vec<ManualLink>> {
        Ok(Vec::new())
    }

    async fn exclusions(&self, _tenant: &str) -> StorageResult<Vec<MergeExclusion>> {
        Ok(Vec::new())
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        Ok(HealthStatus {
            healthy: false,
            message: "read-only".to_string(),
            metadata: Default::default(),
        })
    }

    async fn get_stats(&self) -> StorageResult<String> {
        Ok("read-only".to_string())
    }

    async fn close(&self) -> StorageResult<()> {
        Ok(())
    }
}

/// Backend that hands out a link belonging to another tenant
struct LeakyBackend;

#[async_trait]
impl OverrideBackend for LeakyBackend {
    async fn insert_link(&self, _link: ManualLink) -> StorageResult<()> {
        Ok(())
    }

    async fn insert_exclusions(&self, _exclusions: Vec<MergeExclusion>) -> StorageResult<()> {
        Ok(())
    }

    async fn links(&self, _tenant: &str) -> StorageResult<Vec<ManualLink>> {
        Ok(vec![ManualLink {
            tenant: "someone-else".to_string(),
            primary: OverrideSide::default(),
            secondary: OverrideSide::default(),
            reason: String::new(),
            created_at: Utc::now(),
        }])
    }

    async fn exclusions(&self, _tenant: &str) -> StorageResult<Vec<MergeExclusion>> {
        Ok(Vec::new())
    }

    async fn health_check(&self) -> StorageResult<HealthStatus> {
        Ok(HealthStatus {
            healthy: true,
            message: "leaky".to_string(),
            metadata: Default::default(),
        })
    }

    async fn get_stats(&self) -> StorageResult<String> {
        Ok("leaky".to_string())
    }

    async fn close(&self) -> StorageResult<()> {
        Ok(())
    }
}

#[tokio::test]
async fn test_failed_link_changes_nothing() {
    let registry = create_registry_with(Arc::new(ReadOnlyBackend));
    registry
        .ingest("acme", DataSource::Agent, vec![agent_host("a1", "alpha")])
        .await
        .unwrap();
    registry
        .ingest("acme", DataSource::Docker, vec![docker_host("d1", "beta")])
        .await
        .unwrap();

    let before = registry.list("acme", &ResourceFilter::new()).await.unwrap();
    assert_eq!(before.len(), 2);

    let result = registry.link("acme", &before[0].id, &before[1].id, "").await;
    assert_matches!(result, Err(RegistryError::Storage(_)));

    let after = registry.list("acme", &ResourceFilter::new()).await.unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_failed_report_merge_changes_nothing() {
    let registry = create_registry_with(Arc::new(ReadOnlyBackend));
    registry
        .ingest("acme", DataSource::Agent, vec![agent_host("a1", "pve1")])
        .await
        .unwrap();
    registry
        .ingest("acme", DataSource::Proxmox, vec![proxmox_node("pve1")])
        .await
        .unwrap();

    let before = registry.list("acme", &ResourceFilter::new()).await.unwrap();
    assert_eq!(before.len(), 1);

    let result = registry
        .report_merge("acme", &before[0].id, &[], "wrong")
        .await;
    assert_matches!(result, Err(RegistryError::Storage(_)));

    let after = registry.list("acme", &ResourceFilter::new()).await.unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
async fn test_foreign_rows_are_an_isolation_violation() {
    let registry = create_registry_with(Arc::new(LeakyBackend));

    let result = registry.list("acme", &ResourceFilter::new()).await;
    assert_matches!(
        result,
        Err(RegistryError::TenantIsolationViolation { expected, found })
            if expected == "acme" && found == "someone-else"
    );
    assert_eq!(registry.tenant_count().await, 0);
}

#[tokio::test]
async fn test_closed_backend_surfaces_storage_errors() {
    let backend = Arc::new(MemoryBackend::new());
    let registry = create_registry_with(backend.clone());
    registry
        .ingest("acme", DataSource::Agent, vec![agent_host("a1", "alpha")])
        .await
        .unwrap();
    registry
        .ingest("acme", DataSource::Docker, vec![docker_host("d1", "beta")])
        .await
        .unwrap();
    let all = registry.list("acme", &ResourceFilter::new()).await.unwrap();

    backend.close().await.unwrap();

    assert_matches!(
        registry.link("acme", &all[0].id, &all[1].id, "").await,
        Err(RegistryError::Storage(_))
    );
    assert!(!registry.health().await.unwrap().healthy);

    // tenants that were never loaded cannot read their overrides either
    assert_matches!(
        registry.list("other", &ResourceFilter::new()).await,
        Err(RegistryError::Storage(_))
    );
}

//! Override persistence tests
//!
//! These tests verify that manual links and merge exclusions written through
//! the registry survive a restart with the SQLite backend.

use std::sync::Arc;

use tempfile::tempdir;
use unified_resources::registry::{DataSource, ResourceFilter};
use unified_resources::storage::{OverrideBackend, sqlite::SqliteBackend};

use crate::helpers::*;

#[tokio::test]
async fn test_manual_link_survives_restart() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("overrides.db");

    let linked_id = {
        let backend = Arc::new(SqliteBackend::new(&db_path).await.unwrap());
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
        let primary = all.iter().find(|r| r.has_source(DataSource::Agent)).unwrap();
        let secondary = all.iter().find(|r| r.has_source(DataSource::Docker)).unwrap();
        registry
            .link("acme", &primary.id, &secondary.id, "same box")
            .await
            .unwrap();
        backend.close().await.unwrap();
        primary.id.clone()
    };

    let backend = Arc::new(SqliteBackend::new(&db_path).await.unwrap());
    let registry = create_registry_with(backend);
    registry
        .ingest("acme", DataSource::Agent, vec![agent_host("a1", "alpha")])
        .await
        .unwrap();
    registry
        .ingest("acme", DataSource::Docker, vec![docker_host("d1", "beta")])
        .await
        .unwrap();

    let all = registry.list("acme", &ResourceFilter::new()).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].sources.len(), 2);
    // without a ledger the ID is derived again from the smallest hostname
    assert_eq!(all[0].id, linked_id);
}

#[tokio::test]
async fn test_reported_merge_survives_restart() {
    let dir = tempdir().unwrap();
    let db_path = dir.path().join("overrides.db");

    {
        let backend = Arc::new(SqliteBackend::new(&db_path).await.unwrap());
        let registry = create_registry_with(backend.clone());
        registry
            .ingest("acme", DataSource::Agent, vec![agent_host("a1", "pve1")])
            .await
            .unwrap();
        registry
            .ingest("acme", DataSource::Proxmox, vec![proxmox_node("pve1")])
            .await
            .unwrap();

        let merged = registry.list("acme", &ResourceFilter::new()).await.unwrap();
        assert_eq!(merged.len(), 1);
        registry
            .report_merge("acme", &merged[0].id, &[], "two machines")
            .await
            .unwrap();
        backend.close().await.unwrap();
    }

    let backend = Arc::new(SqliteBackend::new(&db_path).await.unwrap());
    assert_eq!(backend.exclusions("acme").await.unwrap().len(), 1);
    assert_eq!(backend.exclusions("acme").await.unwrap()[0].note, "two machines");

    let registry = create_registry_with(backend);
    registry
        .ingest("acme", DataSource::Agent, vec![agent_host("a1", "pve1")])
        .await
        .unwrap();
    registry
        .ingest("acme", DataSource::Proxmox, vec![proxmox_node("pve1")])
        .await
        .unwrap();

    let all = registry.list("acme", &ResourceFilter::new()).await.unwrap();
    assert_eq!(all.len(), 2);

    // the other tenant is unaffected
    registry
        .ingest("other", DataSource::Agent, vec![agent_host("a1", "pve1")])
        .await
        .unwrap();
    registry
        .ingest("other", DataSource::Proxmox, vec![proxmox_node("pve1")])
        .await
        .unwrap();
    assert_eq!(
        registry.list("other", &ResourceFilter::new()).await.unwrap().len(),
        1
    );
}

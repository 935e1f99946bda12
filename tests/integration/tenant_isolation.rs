//! Tenant isolation tests
//!
//! Records and overrides of one tenant must never show up in another.

use assert_matches::assert_matches;
use unified_resources::registry::{DataSource, RegistryError, ResourceFilter};
use unified_resources::storage::OverrideBackend;

use crate::helpers::*;

#[tokio::test]
async fn test_records_stay_in_their_tenant() {
    let (registry, _) = create_test_registry();

    registry
        .ingest("tenant-a", DataSource::Agent, vec![agent_host("a1", "web-01")])
        .await
        .unwrap();
    registry
        .ingest("tenant-b", DataSource::Agent, vec![agent_host("b1", "db-01")])
        .await
        .unwrap();

    let a = registry.list("tenant-a", &ResourceFilter::new()).await.unwrap();
    let b = registry.list("tenant-b", &ResourceFilter::new()).await.unwrap();
    assert_eq!(a.len(), 1);
    assert_eq!(b.len(), 1);
    assert_eq!(a[0].name, "web-01");
    assert_eq!(b[0].name, "db-01");

    assert!(registry.get("tenant-b", &a[0].id).await.unwrap().is_none());
    assert!(
        registry
            .list("tenant-c", &ResourceFilter::new())
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_overrides_stay_in_their_tenant() {
    let (registry, backend) = create_test_registry();

    for tenant in ["tenant-a", "tenant-b"] {
        registry
            .ingest(tenant, DataSource::Agent, vec![agent_host("a1", "alpha")])
            .await
            .unwrap();
        registry
            .ingest(tenant, DataSource::Docker, vec![docker_host("d1", "beta")])
            .await
            .unwrap();
    }

    let a = registry.list("tenant-a", &ResourceFilter::new()).await.unwrap();
    registry
        .link("tenant-a", &a[0].id, &a[1].id, "")
        .await
        .unwrap();

    let a = registry.list("tenant-a", &ResourceFilter::new()).await.unwrap();
    let b = registry.list("tenant-b", &ResourceFilter::new()).await.unwrap();
    assert_eq!(a.len(), 1);
    assert_eq!(b.len(), 2);

    assert_eq!(backend.links("tenant-a").await.unwrap().len(), 1);
    assert!(backend.links("tenant-b").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_tenant_ids_are_normalized() {
    let (registry, _) = create_test_registry();

    registry
        .ingest("  ", DataSource::Agent, vec![agent_host("a1", "web-01")])
        .await
        .unwrap();
    let listed = registry
        .list("default", &ResourceFilter::new())
        .await
        .unwrap();
    assert_eq!(listed.len(), 1);

    registry
        .ingest(" acme ", DataSource::Agent, vec![agent_host("a2", "web-02")])
        .await
        .unwrap();
    let listed = registry.list("acme", &ResourceFilter::new()).await.unwrap();
    assert_eq!(listed[0].name, "web-02");
    assert_eq!(registry.tenant_count().await, 2);
}

#[tokio::test]
async fn test_invalid_tenant_ids_are_rejected() {
    let (registry, _) = create_test_registry();

    for tenant in ["..", "a/b", "tenant with spaces"] {
        assert_matches!(
            registry.list(tenant, &ResourceFilter::new()).await,
            Err(RegistryError::InvalidTenant(_))
        );
        assert_matches!(
            registry.ingest(tenant, DataSource::Agent, vec![]).await,
            Err(RegistryError::InvalidTenant(_))
        );
    }
    assert_eq!(registry.tenant_count().await, 0);
}

//! End-to-end behaviour of the registry façade
//!
//! These tests verify that:
//! - Records describing one machine merge into a single resource
//! - Explicit links only merge when both sides agree
//! - Manual links and reported merges take effect and stick
//! - Resource IDs survive reads and unchanged re-ingestion
//! - Sources that stop reporting are flagged stale

use assert_matches::assert_matches;
use chrono::{TimeDelta, Utc};
use pretty_assertions::assert_eq;
use unified_resources::registry::{
    DataSource, IngestRecord, RegistryError, ResourceFilter, ResourceIdentity, ResourceStatus,
    ResourceType, SourceFreshness,
};
use unified_resources::storage::OverrideBackend;

use crate::helpers::*;

#[tokio::test]
async fn test_agent_and_node_merge_with_guest_attached() {
    let (registry, _) = create_test_registry();

    registry
        .ingest("acme", DataSource::Agent, vec![agent_host("a1", "pve1")])
        .await
        .unwrap();
    registry
        .ingest(
            "acme",
            DataSource::Proxmox,
            vec![proxmox_node("pve1"), proxmox_vm(101, "app", "pve1")],
        )
        .await
        .unwrap();

    let hosts = registry
        .list("acme", &ResourceFilter::new().with_type(ResourceType::Host))
        .await
        .unwrap();
    assert_eq!(hosts.len(), 1);
    let host = &hosts[0];
    assert!(host.has_source(DataSource::Agent));
    assert!(host.has_source(DataSource::Proxmox));
    assert_eq!(host.child_count, 1);
    assert_eq!(host.discovery_target.as_ref().unwrap().host_id, "a1");

    let children = registry.children("acme", &host.id).await.unwrap();
    assert_eq!(children.len(), 1);
    assert_eq!(children[0].name, "app");
    assert_eq!(children[0].parent_id.as_deref(), Some(host.id.as_str()));

    let targets = registry.source_targets("acme", &host.id).await.unwrap();
    assert_eq!(targets.len(), 2);

    let stats = registry.stats("acme").await.unwrap();
    assert_eq!(stats.total, 2);
}

#[tokio::test]
async fn test_reciprocal_link_merges() {
    let (registry, _) = create_test_registry();

    let agent = agent_host("a1", "alpha")
        .with_identity(ResourceIdentity::new().with_hostname("alpha").with_link("docker:d1"));
    let docker = docker_host("d1", "beta")
        .with_identity(ResourceIdentity::new().with_hostname("beta").with_link("agent:a1"));

    registry.ingest("acme", DataSource::Agent, vec![agent]).await.unwrap();
    registry.ingest("acme", DataSource::Docker, vec![docker]).await.unwrap();

    let all = registry.list("acme", &ResourceFilter::new()).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].sources.len(), 2);
}

#[tokio::test]
async fn test_one_sided_link_keeps_resources_apart() {
    let (registry, _) = create_test_registry();

    let agent = agent_host("a1", "alpha")
        .with_identity(ResourceIdentity::new().with_hostname("alpha").with_link("docker:d1"));
    let docker = docker_host("d1", "beta");

    registry.ingest("acme", DataSource::Agent, vec![agent]).await.unwrap();
    registry.ingest("acme", DataSource::Docker, vec![docker]).await.unwrap();

    let all = registry.list("acme", &ResourceFilter::new()).await.unwrap();
    assert_eq!(all.len(), 2);

    let mut host_ids: Vec<_> = all
        .iter()
        .map(|r| r.discovery_target.as_ref().unwrap().host_id.clone())
        .collect();
    host_ids.sort();
    assert_eq!(host_ids, vec!["a1".to_string(), "beta".to_string()]);
}

#[tokio::test]
async fn test_manual_link_forces_merge_and_keeps_primary_id() {
    let (registry, _) = create_test_registry();

    registry
        .ingest("acme", DataSource::Agent, vec![agent_host("a1", "alpha")])
        .await
        .unwrap();
    registry
        .ingest("acme", DataSource::Docker, vec![docker_host("d1", "beta")])
        .await
        .unwrap();

    let all = registry.list("acme", &ResourceFilter::new()).await.unwrap();
    assert_eq!(all.len(), 2);
    let primary = all.iter().find(|r| r.has_source(DataSource::Agent)).unwrap();
    let secondary = all.iter().find(|r| r.has_source(DataSource::Docker)).unwrap();

    let link = registry
        .link("acme", &primary.id, &secondary.id, "same box")
        .await
        .unwrap();
    assert_eq!(link.reason, "same box");

    let merged = registry.list("acme", &ResourceFilter::new()).await.unwrap();
    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].id, primary.id);
    assert!(merged[0].has_source(DataSource::Docker));
}

#[tokio::test]
async fn test_report_merge_splits_and_sticks() {
    let (registry, _) = create_test_registry();

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
    let merged_id = merged[0].id.clone();

    let exclusions = registry
        .report_merge("acme", &merged_id, &[DataSource::Proxmox], "")
        .await
        .unwrap();
    assert_eq!(exclusions.len(), 1);
    assert_eq!(exclusions[0].note, "reported_incorrect_merge");

    let split = registry.list("acme", &ResourceFilter::new()).await.unwrap();
    assert_eq!(split.len(), 2);
    assert!(split.iter().any(|r| r.id == merged_id));

    // the next polling cycle reports the same records again
    registry
        .ingest("acme", DataSource::Agent, vec![agent_host("a1", "pve1")])
        .await
        .unwrap();
    registry
        .ingest("acme", DataSource::Proxmox, vec![proxmox_node("pve1")])
        .await
        .unwrap();

    let after = registry.list("acme", &ResourceFilter::new()).await.unwrap();
    assert_eq!(after.len(), 2);
    for resource in &after {
        assert_eq!(resource.sources.len(), 1);
    }
}

#[tokio::test]
async fn test_report_merge_splits_mac_matched_agent_and_docker() {
    let (registry, _) = create_test_registry();
    let mac = "aa:bb:cc:dd:ee:01";

    let agent = || {
        agent_host("a1", "build-01")
            .with_identity(ResourceIdentity::new().with_hostname("build-01").with_mac(mac))
    };
    let docker = || {
        docker_host("d1", "runner")
            .with_identity(ResourceIdentity::new().with_hostname("runner").with_mac(mac))
    };

    registry.ingest("acme", DataSource::Agent, vec![agent()]).await.unwrap();
    registry.ingest("acme", DataSource::Docker, vec![docker()]).await.unwrap();

    let merged = registry.list("acme", &ResourceFilter::new()).await.unwrap();
    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].sources.len(), 2);

    let exclusions = registry
        .report_merge(
            "acme",
            &merged[0].id,
            &[DataSource::Agent, DataSource::Docker],
            "",
        )
        .await
        .unwrap();
    assert_eq!(exclusions.len(), 1);

    registry.ingest("acme", DataSource::Agent, vec![agent()]).await.unwrap();
    registry.ingest("acme", DataSource::Docker, vec![docker()]).await.unwrap();

    let after = registry.list("acme", &ResourceFilter::new()).await.unwrap();
    assert_eq!(after.len(), 2);
    assert!(after.iter().all(|r| r.sources.len() == 1));
}

#[tokio::test]
async fn test_report_merge_refuses_link_held_resource() {
    let (registry, backend) = create_test_registry();

    registry
        .ingest("acme", DataSource::Agent, vec![agent_host("a1", "alpha")])
        .await
        .unwrap();
    registry
        .ingest("acme", DataSource::Docker, vec![docker_host("d1", "beta")])
        .await
        .unwrap();

    let all = registry.list("acme", &ResourceFilter::new()).await.unwrap();
    let agent = all.iter().find(|r| r.has_source(DataSource::Agent)).unwrap();
    let docker = all.iter().find(|r| r.has_source(DataSource::Docker)).unwrap();
    registry.link("acme", &agent.id, &docker.id, "").await.unwrap();

    assert_matches!(
        registry.report_merge("acme", &agent.id, &[], "").await,
        Err(RegistryError::InvalidOverride(_))
    );

    let merged = registry.list("acme", &ResourceFilter::new()).await.unwrap();
    assert_eq!(merged.len(), 1);
    assert!(backend.exclusions("acme").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unlink_keeps_resources_apart() {
    let (registry, backend) = create_test_registry();

    registry
        .ingest("acme", DataSource::Agent, vec![agent_host("a1", "alpha")])
        .await
        .unwrap();
    registry
        .ingest("acme", DataSource::Docker, vec![docker_host("d1", "beta")])
        .await
        .unwrap();

    let all = registry.list("acme", &ResourceFilter::new()).await.unwrap();
    assert_eq!(all.len(), 2);
    let agent = all.iter().find(|r| r.has_source(DataSource::Agent)).unwrap();
    let docker = all.iter().find(|r| r.has_source(DataSource::Docker)).unwrap();

    let exclusion = registry
        .unlink("acme", &agent.id, &docker.id, "different boxes")
        .await
        .unwrap();
    assert_eq!(exclusion.note, "different boxes");
    assert_eq!(backend.exclusions("acme").await.unwrap().len(), 1);

    // the docker host is renamed to the agent's hostname
    registry
        .ingest("acme", DataSource::Docker, vec![docker_host("d1", "alpha")])
        .await
        .unwrap();
    let after = registry.list("acme", &ResourceFilter::new()).await.unwrap();
    assert_eq!(after.len(), 2);

    assert_matches!(
        registry.unlink("acme", &agent.id, &agent.id, "").await,
        Err(RegistryError::InvalidOverride(_))
    );
    assert_matches!(
        registry.unlink("acme", &agent.id, "host-0000000000000000", "").await,
        Err(RegistryError::NotFound(_))
    );
}

#[tokio::test]
async fn test_unparented_storage_stays_separate() {
    let (registry, _) = create_test_registry();

    let storage = |id: &str| {
        IngestRecord::new(DataSource::Proxmox, id, ResourceType::Storage, "local")
            .with_status(ResourceStatus::Online)
    };
    registry
        .ingest(
            "acme",
            DataSource::Proxmox,
            vec![storage("storage/pve1/local"), storage("storage/pve2/local")],
        )
        .await
        .unwrap();

    let pools = registry
        .list("acme", &ResourceFilter::new().with_type(ResourceType::Storage))
        .await
        .unwrap();
    assert_eq!(pools.len(), 2);
    assert_ne!(pools[0].id, pools[1].id);
    assert!(pools.iter().all(|p| p.source_targets.len() == 1));
}

#[tokio::test]
async fn test_silent_source_turns_resource_to_warning() {
    let (registry, _) = create_test_registry();
    let long_ago = Utc::now() - TimeDelta::minutes(10);

    registry
        .ingest(
            "acme",
            DataSource::Agent,
            vec![agent_host("a1", "pve1").with_last_seen(long_ago)],
        )
        .await
        .unwrap();
    registry
        .ingest("acme", DataSource::Proxmox, vec![proxmox_node("pve1")])
        .await
        .unwrap();

    let hosts = registry.list("acme", &ResourceFilter::new()).await.unwrap();
    assert_eq!(hosts.len(), 1);
    let host = &hosts[0];
    assert_eq!(host.status, ResourceStatus::Warning);
    assert_eq!(host.source_status[&DataSource::Agent].status, SourceFreshness::Stale);
    assert_eq!(host.source_status[&DataSource::Agent].last_seen, long_ago);
    assert_eq!(host.source_status[&DataSource::Proxmox].status, SourceFreshness::Online);

    let warnings = registry
        .list("acme", &ResourceFilter::new().with_status(ResourceStatus::Warning))
        .await
        .unwrap();
    assert_eq!(warnings.len(), 1);
    let stats = registry.stats("acme").await.unwrap();
    assert_eq!(stats.by_status.get(&ResourceStatus::Warning), Some(&1));

    // a fresh report from the agent clears the warning
    registry
        .ingest("acme", DataSource::Agent, vec![agent_host("a1", "pve1")])
        .await
        .unwrap();
    let host = registry.get("acme", &host.id).await.unwrap().unwrap();
    assert_eq!(host.status, ResourceStatus::Online);
}

#[tokio::test]
async fn test_ids_are_stable_across_reads_and_reingestion() {
    let (registry, _) = create_test_registry();
    let records = vec![proxmox_node("pve1"), proxmox_vm(101, "app", "pve1")];

    registry
        .ingest("acme", DataSource::Proxmox, records.clone())
        .await
        .unwrap();
    let first = registry.list("acme", &ResourceFilter::new()).await.unwrap();

    for resource in &first {
        let fetched = registry.get("acme", &resource.id).await.unwrap();
        assert_eq!(fetched.as_ref(), Some(resource));
    }

    registry
        .ingest("acme", DataSource::Proxmox, records)
        .await
        .unwrap();
    let second = registry.list("acme", &ResourceFilter::new()).await.unwrap();

    let ids = |resources: &[unified_resources::Resource]| {
        resources.iter().map(|r| r.id.clone()).collect::<Vec<_>>()
    };
    assert_eq!(ids(&first), ids(&second));
}

#[tokio::test]
async fn test_invalid_overrides_are_rejected() {
    let (registry, _) = create_test_registry();

    registry
        .ingest("acme", DataSource::Agent, vec![agent_host("a1", "alpha")])
        .await
        .unwrap();
    registry
        .ingest("acme", DataSource::Proxmox, vec![proxmox_vm(101, "app", "pve1")])
        .await
        .unwrap();

    let all = registry.list("acme", &ResourceFilter::new()).await.unwrap();
    let host = all.iter().find(|r| r.resource_type == ResourceType::Host).unwrap();
    let vm = all.iter().find(|r| r.resource_type == ResourceType::Vm).unwrap();

    assert_matches!(
        registry.link("acme", &host.id, &host.id, "").await,
        Err(RegistryError::InvalidOverride(_))
    );
    assert_matches!(
        registry.link("acme", &host.id, "host-0000000000000000", "").await,
        Err(RegistryError::NotFound(_))
    );
    assert_matches!(
        registry.link("acme", &host.id, &vm.id, "").await,
        Err(RegistryError::InvalidOverride(_))
    );

    // a single-source host has nothing to split
    assert_matches!(
        registry.report_merge("acme", &host.id, &[], "").await,
        Err(RegistryError::InvalidOverride(_))
    );
    assert_matches!(
        registry
            .report_merge("acme", &host.id, &[DataSource::Docker], "")
            .await,
        Err(RegistryError::InvalidOverride(_))
    );
    assert_matches!(
        registry.report_merge("acme", "host-0000000000000000", &[], "").await,
        Err(RegistryError::NotFound(_))
    );

    assert_matches!(
        registry.children("acme", "host-0000000000000000").await,
        Err(RegistryError::NotFound(_))
    );
}

#[tokio::test]
async fn test_feeds_of_one_kind_do_not_overwrite_each_other() {
    use unified_resources::registry::SourceFeed;

    let (registry, _) = create_test_registry();

    registry
        .ingest(
            "acme",
            SourceFeed::instance(DataSource::Proxmox, "cluster-a"),
            vec![proxmox_node("pve1")],
        )
        .await
        .unwrap();
    registry
        .ingest(
            "acme",
            SourceFeed::instance(DataSource::Proxmox, "cluster-b"),
            vec![proxmox_node("pve2")],
        )
        .await
        .unwrap();

    let all = registry.list("acme", &ResourceFilter::new()).await.unwrap();
    assert_eq!(all.len(), 2);

    // an empty snapshot clears only its own feed
    registry
        .ingest(
            "acme",
            SourceFeed::instance(DataSource::Proxmox, "cluster-a"),
            vec![],
        )
        .await
        .unwrap();
    let all = registry.list("acme", &ResourceFilter::new()).await.unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(all[0].name, "pve2");
}

//! Concurrency and race condition tests
//!
//! These tests verify thread-safety and concurrent operation:
//! - Ingests from different feeds commute
//! - Many tenants ingest and read in parallel
//! - Reads after an override always observe it

use std::sync::Arc;

use unified_resources::registry::{DataSource, ResourceFilter, ResourceRegistry, SourceFeed};

use crate::helpers::*;

fn names(resources: &[unified_resources::Resource]) -> Vec<String> {
    resources.iter().map(|r| r.name.clone()).collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_feed_ingests_commute() {
    let (registry, _) = create_test_registry();
    let registry = Arc::new(registry);

    let mut tasks = vec![];
    for i in 0..8 {
        let registry = registry.clone();
        tasks.push(tokio::spawn(async move {
            let feed = SourceFeed::instance(DataSource::Proxmox, format!("cluster-{i}"));
            registry
                .ingest("acme", feed, vec![proxmox_node(&format!("pve{i}"))])
                .await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    let concurrent = registry.list("acme", &ResourceFilter::new()).await.unwrap();
    assert_eq!(concurrent.len(), 8);

    // the same ingests in reverse order produce the same view
    let (sequential, _) = create_test_registry();
    for i in (0..8).rev() {
        let feed = SourceFeed::instance(DataSource::Proxmox, format!("cluster-{i}"));
        sequential
            .ingest("acme", feed, vec![proxmox_node(&format!("pve{i}"))])
            .await
            .unwrap();
    }
    let reversed = sequential.list("acme", &ResourceFilter::new()).await.unwrap();

    assert_eq!(names(&concurrent), names(&reversed));
    let ids = |r: &[unified_resources::Resource]| r.iter().map(|r| r.id.clone()).collect::<Vec<_>>();
    assert_eq!(ids(&concurrent), ids(&reversed));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_many_tenants_in_parallel() {
    let (registry, _) = create_test_registry();
    let registry = Arc::new(registry);

    let mut tasks = vec![];
    for i in 0..16 {
        let registry = registry.clone();
        tasks.push(tokio::spawn(async move {
            let tenant = format!("tenant-{i}");
            for round in 0..5 {
                registry
                    .ingest(
                        &tenant,
                        DataSource::Agent,
                        vec![agent_host(&format!("a{round}"), &format!("host-{i}"))],
                    )
                    .await
                    .unwrap();
                let listed = registry
                    .list(&tenant, &ResourceFilter::new())
                    .await
                    .unwrap();
                assert_eq!(listed.len(), 1);
                assert_eq!(listed[0].name, format!("host-{i}"));
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(registry.tenant_count().await, 16);
}

async fn link_then_read(registry: Arc<ResourceRegistry>) -> usize {
    let all = registry.list("acme", &ResourceFilter::new()).await.unwrap();
    if all.len() == 2 {
        // a concurrent caller may have linked them already
        let _ = registry.link("acme", &all[0].id, &all[1].id, "race").await;
    }
    registry
        .list("acme", &ResourceFilter::new())
        .await
        .unwrap()
        .len()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_reads_observe_completed_links() {
    let (registry, _) = create_test_registry();
    let registry = Arc::new(registry);
    registry
        .ingest("acme", DataSource::Agent, vec![agent_host("a1", "alpha")])
        .await
        .unwrap();
    registry
        .ingest("acme", DataSource::Docker, vec![docker_host("d1", "beta")])
        .await
        .unwrap();

    let mut tasks = vec![];
    for _ in 0..8 {
        tasks.push(tokio::spawn(link_then_read(registry.clone())));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap(), 1);
    }
}

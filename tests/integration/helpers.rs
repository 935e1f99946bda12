//! Helper functions for integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use unified_resources::registry::{
    AgentMeta, DataSource, GuestMeta, HostMeta, IngestRecord, NodeMeta, RegistryOptions,
    ResourceIdentity, ResourcePayload, ResourceRegistry, ResourceStatus, ResourceType,
};
use unified_resources::storage::{MemoryBackend, OverrideBackend};

pub fn create_test_registry() -> (ResourceRegistry, Arc<MemoryBackend>) {
    let backend = Arc::new(MemoryBackend::new());
    let registry = ResourceRegistry::new(backend.clone(), test_options());
    (registry, backend)
}

pub fn create_registry_with(backend: Arc<dyn OverrideBackend>) -> ResourceRegistry {
    ResourceRegistry::new(backend, test_options())
}

pub fn test_options() -> RegistryOptions {
    RegistryOptions {
        pull_timeout: Duration::from_millis(200),
        ..RegistryOptions::default()
    }
}

/// Host record as a host agent reports it
pub fn agent_host(agent_id: &str, hostname: &str) -> IngestRecord {
    IngestRecord::new(DataSource::Agent, agent_id, ResourceType::Host, hostname)
        .with_status(ResourceStatus::Online)
        .with_identity(ResourceIdentity::new().with_hostname(hostname))
        .with_payload(ResourcePayload::Host(HostMeta {
            agent: Some(AgentMeta {
                agent_id: agent_id.to_string(),
                hostname: hostname.to_string(),
                ..AgentMeta::default()
            }),
            ..HostMeta::default()
        }))
}

/// Hypervisor node record
pub fn proxmox_node(node_name: &str) -> IngestRecord {
    IngestRecord::new(
        DataSource::Proxmox,
        format!("node/{node_name}"),
        ResourceType::Node,
        node_name,
    )
    .with_status(ResourceStatus::Online)
    .with_identity(ResourceIdentity::new().with_hostname(node_name))
    .with_payload(ResourcePayload::Host(HostMeta {
        node: Some(NodeMeta {
            node_name: node_name.to_string(),
            instance: Some("lab".to_string()),
            ..NodeMeta::default()
        }),
        ..HostMeta::default()
    }))
}

/// Docker host record
pub fn docker_host(id: &str, hostname: &str) -> IngestRecord {
    IngestRecord::new(DataSource::Docker, id, ResourceType::DockerHost, hostname)
        .with_status(ResourceStatus::Online)
        .with_identity(ResourceIdentity::new().with_hostname(hostname))
}

/// VM record living on `node_name`
pub fn proxmox_vm(vmid: u32, name: &str, node_name: &str) -> IngestRecord {
    IngestRecord::new(
        DataSource::Proxmox,
        format!("qemu/{vmid}"),
        ResourceType::Vm,
        name,
    )
    .with_status(ResourceStatus::Online)
    .with_payload(ResourcePayload::Vm(GuestMeta {
        vmid,
        node_name: node_name.to_string(),
        instance: Some("lab".to_string()),
        ..GuestMeta::default()
    }))
}

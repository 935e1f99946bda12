//! Coordinates used to dispatch discovery actions at a resource

use super::types::{
    DataSource, DiscoveryTarget, HostMeta, KubernetesMeta, Resource, ResourcePayload,
    ResourceType,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KubernetesKind {
    Cluster,
    Node,
    Pod,
    Deployment,
}

/// Derives the discovery target of a merged resource
///
/// Storage pools and docker containers have none.
pub fn discovery_target(resource: &Resource) -> Option<DiscoveryTarget> {
    match resource.resource_type {
        ResourceType::Host | ResourceType::Node | ResourceType::DockerHost => {
            host_target(resource)
        }
        ResourceType::Pbs | ResourceType::Pmg => host_target(resource),
        ResourceType::Vm => guest_target(resource, "vm"),
        ResourceType::Container => guest_target(resource, "lxc"),
        ResourceType::K8sCluster => kubernetes_target(resource, KubernetesKind::Cluster),
        ResourceType::K8sNode => kubernetes_target(resource, KubernetesKind::Node),
        ResourceType::Pod => kubernetes_target(resource, KubernetesKind::Pod),
        ResourceType::K8sDeployment => kubernetes_target(resource, KubernetesKind::Deployment),
        ResourceType::PhysicalDisk => disk_target(resource),
        ResourceType::Ceph => ceph_target(resource),
        ResourceType::Storage | ResourceType::DockerContainer => None,
    }
}

fn first_non_empty<'a>(candidates: impl IntoIterator<Item = Option<&'a str>>) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

fn first_hostname(resource: &Resource) -> Option<&str> {
    resource.identity.hostnames.iter().next().map(String::as_str)
}

fn host_target(resource: &Resource) -> Option<DiscoveryTarget> {
    let empty = HostMeta::default();
    let meta = resource.payload.host().unwrap_or(&empty);

    let agent_id = meta.agent.as_ref().map(|a| a.agent_id.as_str());
    let agent_hostname = meta.agent.as_ref().map(|a| a.hostname.as_str());
    let node_name = meta.node.as_ref().map(|n| n.node_name.as_str());
    let docker_hostname = meta.docker.as_ref().map(|d| d.hostname.as_str());
    let nas_hostname = meta.nas.as_ref().map(|n| n.hostname.as_str());
    let (pbs_hostname, pmg_hostname) = match &resource.payload {
        ResourcePayload::Pbs(pbs) => (Some(pbs.hostname.as_str()), None),
        ResourcePayload::Pmg(pmg) => (None, Some(pmg.hostname.as_str())),
        _ => (None, None),
    };

    // a node only speaks for an agent when one is actually reporting
    let linked_agent_id = if resource.has_source(DataSource::Agent) || meta.agent.is_some() {
        meta.node
            .as_ref()
            .and_then(|n| n.linked_agent_id.as_deref())
    } else {
        None
    };

    let host_id = first_non_empty([
        agent_id,
        linked_agent_id,
        node_name,
        agent_hostname,
        docker_hostname,
        nas_hostname,
        pbs_hostname,
        pmg_hostname,
        first_hostname(resource),
        Some(resource.name.as_str()),
        Some(resource.id.as_str()),
    ])?;

    let hostname = first_non_empty([
        agent_hostname,
        node_name,
        docker_hostname,
        nas_hostname,
        pbs_hostname,
        pmg_hostname,
        first_hostname(resource),
        Some(resource.name.as_str()),
        Some(host_id.as_str()),
    ]);

    Some(DiscoveryTarget {
        resource_type: "host".to_string(),
        host_id: host_id.clone(),
        resource_id: host_id,
        hostname,
    })
}

fn guest_target(resource: &Resource, kind: &str) -> Option<DiscoveryTarget> {
    let guest = match &resource.payload {
        ResourcePayload::Vm(guest) | ResourcePayload::Container(guest) => guest,
        _ => return None,
    };
    let host_id = guest.node_name.trim();
    if host_id.is_empty() || guest.vmid == 0 {
        return None;
    }
    let resource_id = guest.vmid.to_string();

    Some(DiscoveryTarget {
        resource_type: kind.to_string(),
        host_id: host_id.to_string(),
        hostname: first_non_empty([
            first_hostname(resource),
            Some(resource.name.as_str()),
            Some(resource_id.as_str()),
        ]),
        resource_id,
    })
}

fn namespaced_name(meta: &KubernetesMeta, name: &str) -> Option<String> {
    let name = name.trim();
    match meta.namespace.as_deref().map(str::trim) {
        Some(namespace) if !namespace.is_empty() && !name.is_empty() => {
            Some(format!("{namespace}/{name}"))
        }
        _ => None,
    }
}

fn kubernetes_target(resource: &Resource, kind: KubernetesKind) -> Option<DiscoveryTarget> {
    let ResourcePayload::Kubernetes(meta) = &resource.payload else {
        return None;
    };

    let host_id = first_non_empty([
        meta.agent_id.as_deref(),
        Some(meta.cluster_id.as_str()),
        Some(meta.cluster_name.as_str()),
    ])?;

    let namespaced = namespaced_name(meta, &resource.name);
    let resource_id = match kind {
        KubernetesKind::Cluster => first_non_empty([
            Some(meta.cluster_id.as_str()),
            Some(meta.cluster_name.as_str()),
            Some(resource.name.as_str()),
        ]),
        KubernetesKind::Node => first_non_empty([
            meta.node_uid.as_deref(),
            meta.node_name.as_deref(),
            Some(resource.name.as_str()),
        ]),
        KubernetesKind::Pod => first_non_empty([
            meta.pod_uid.as_deref(),
            namespaced.as_deref(),
            Some(resource.name.as_str()),
        ]),
        KubernetesKind::Deployment => first_non_empty([
            meta.deployment_uid.as_deref(),
            namespaced.as_deref(),
            Some(resource.name.as_str()),
        ]),
    }?;

    Some(DiscoveryTarget {
        resource_type: "k8s".to_string(),
        host_id,
        resource_id,
        hostname: first_non_empty([
            Some(meta.cluster_name.as_str()),
            Some(resource.name.as_str()),
        ]),
    })
}

fn ceph_target(resource: &Resource) -> Option<DiscoveryTarget> {
    let fsid = match &resource.payload {
        ResourcePayload::Ceph(meta) => Some(meta.fsid.as_str()),
        _ => None,
    };
    let host_id = first_non_empty([
        fsid,
        Some(resource.name.as_str()),
        Some(resource.id.as_str()),
    ])?;

    Some(DiscoveryTarget {
        resource_type: "ceph".to_string(),
        host_id,
        resource_id: resource.id.clone(),
        hostname: first_non_empty([Some(resource.name.as_str())]),
    })
}

fn disk_target(resource: &Resource) -> Option<DiscoveryTarget> {
    if !matches!(resource.payload, ResourcePayload::PhysicalDisk(_)) {
        return None;
    }
    let host_id = first_non_empty([
        resource.parent_name.as_deref(),
        first_hostname(resource),
        Some(resource.name.as_str()),
    ])?;

    Some(DiscoveryTarget {
        resource_type: "disk".to_string(),
        host_id: host_id.clone(),
        resource_id: resource.id.clone(),
        hostname: Some(host_id),
    })
}

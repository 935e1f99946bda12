//! Resource, source and payload types shared by the registry
//!
//! A [`Resource`] is the merged, user-facing view of one real-world entity.
//! Type-specific data lives in [`ResourcePayload`], a tagged union selected by
//! the resource type, so nothing in the registry has to inspect fields
//! dynamically.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::identity::ResourceIdentity;

/// Kind of resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResourceType {
    Host,
    Node,
    DockerHost,
    Vm,
    Container,
    DockerContainer,
    Storage,
    PhysicalDisk,
    Pod,
    K8sCluster,
    K8sNode,
    K8sDeployment,
    Pbs,
    Pmg,
    Ceph,
}

/// How a resource type takes part in cross-source merging
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceFamily {
    /// Machines: merged across sources by identity
    HostLike,

    /// Storage pools and disks: scoped to a parent host, never merged across hosts
    NodeScoped,

    /// Everything else: keyed by its own source-scoped ID
    SourceScoped,
}

impl ResourceType {
    pub const ALL: [ResourceType; 15] = [
        ResourceType::Host,
        ResourceType::Node,
        ResourceType::DockerHost,
        ResourceType::Vm,
        ResourceType::Container,
        ResourceType::DockerContainer,
        ResourceType::Storage,
        ResourceType::PhysicalDisk,
        ResourceType::Pod,
        ResourceType::K8sCluster,
        ResourceType::K8sNode,
        ResourceType::K8sDeployment,
        ResourceType::Pbs,
        ResourceType::Pmg,
        ResourceType::Ceph,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Host => "host",
            ResourceType::Node => "node",
            ResourceType::DockerHost => "docker-host",
            ResourceType::Vm => "vm",
            ResourceType::Container => "container",
            ResourceType::DockerContainer => "docker-container",
            ResourceType::Storage => "storage",
            ResourceType::PhysicalDisk => "physical-disk",
            ResourceType::Pod => "pod",
            ResourceType::K8sCluster => "k8s-cluster",
            ResourceType::K8sNode => "k8s-node",
            ResourceType::K8sDeployment => "k8s-deployment",
            ResourceType::Pbs => "pbs",
            ResourceType::Pmg => "pmg",
            ResourceType::Ceph => "ceph",
        }
    }

    pub fn family(&self) -> ResourceFamily {
        match self {
            ResourceType::Host | ResourceType::Node | ResourceType::DockerHost => {
                ResourceFamily::HostLike
            }
            ResourceType::Storage | ResourceType::PhysicalDisk => ResourceFamily::NodeScoped,
            _ => ResourceFamily::SourceScoped,
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        ResourceType::ALL
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| format!("unknown resource type: {s}"))
    }
}

/// High-level status of a resource
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ResourceStatus {
    Online,
    Offline,
    Warning,
    #[default]
    Unknown,
}

impl ResourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceStatus::Online => "online",
            ResourceStatus::Offline => "offline",
            ResourceStatus::Warning => "warning",
            ResourceStatus::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "online" => Ok(ResourceStatus::Online),
            "offline" => Ok(ResourceStatus::Offline),
            "warning" => Ok(ResourceStatus::Warning),
            "unknown" => Ok(ResourceStatus::Unknown),
            _ => Err(format!("unknown resource status: {s}")),
        }
    }
}

/// A contributing data source kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Proxmox,
    Agent,
    Docker,
    Kubernetes,
    TrueNas,
    Pbs,
    Pmg,
}

impl DataSource {
    pub const ALL: [DataSource; 7] = [
        DataSource::Proxmox,
        DataSource::Agent,
        DataSource::Docker,
        DataSource::Kubernetes,
        DataSource::TrueNas,
        DataSource::Pbs,
        DataSource::Pmg,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DataSource::Proxmox => "proxmox",
            DataSource::Agent => "agent",
            DataSource::Docker => "docker",
            DataSource::Kubernetes => "kubernetes",
            DataSource::TrueNas => "truenas",
            DataSource::Pbs => "pbs",
            DataSource::Pmg => "pmg",
        }
    }
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DataSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        // "k8s" is what the kubernetes agent calls itself
        if wanted == "k8s" {
            return Ok(DataSource::Kubernetes);
        }
        DataSource::ALL
            .into_iter()
            .find(|source| source.as_str() == wanted)
            .ok_or_else(|| format!("unknown data source: {s}"))
    }
}

/// Freshness of one source's view of a resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFreshness {
    Online,
    Stale,
}

/// When a source last reported a resource, and whether that is recent enough
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceStatus {
    pub status: SourceFreshness,
    pub last_seen: DateTime<Utc>,
}

/// A single metric reading, optionally with used/total figures
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricValue {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub used: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub percent: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,

    /// Which source the value was taken from (set by the merge)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<DataSource>,
}

impl MetricValue {
    pub fn percent(percent: f64) -> Self {
        Self {
            percent: Some(percent),
            ..Self::default()
        }
    }

    pub fn usage(used: u64, total: u64) -> Self {
        let percent = if total > 0 {
            Some(used as f64 / total as f64 * 100.0)
        } else {
            None
        };
        Self {
            used: Some(used),
            total: Some(total),
            percent,
            unit: Some("bytes".to_string()),
            ..Self::default()
        }
    }

    pub fn rate(value: f64) -> Self {
        Self {
            value: Some(value),
            unit: Some("bytes/s".to_string()),
            ..Self::default()
        }
    }
}

/// Metrics derived from the contributing sources
///
/// Every field is resolved independently by source precedence; values from
/// different sources are never blended.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<MetricValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<MetricValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk: Option<MetricValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net_in: Option<MetricValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub net_out: Option<MetricValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_read: Option<MetricValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk_write: Option<MetricValue>,
}

impl ResourceMetrics {
    pub fn is_empty(&self) -> bool {
        *self == ResourceMetrics::default()
    }
}

/// Host agent facet of a machine
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentMeta {
    pub agent_id: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kernel_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

/// Hypervisor node facet of a machine
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMeta {
    pub node_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pve_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpus: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uptime_seconds: Option<u64>,
    /// Host agent ID this node declares it is linked to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_agent_id: Option<String>,
}

/// Docker engine facet of a machine
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DockerHostMeta {
    #[serde(default)]
    pub agent_id: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub os: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swarm_cluster: Option<String>,
}

/// NAS appliance facet of a machine
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NasMeta {
    #[serde(default)]
    pub hostname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool_count: Option<u32>,
}

/// Machine payload: one optional facet per kind of source that reports hosts
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<AgentMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node: Option<NodeMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docker: Option<DockerHostMeta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nas: Option<NasMeta>,
}

/// Virtual machine or system container on a hypervisor node
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuestMeta {
    pub vmid: u32,
    pub node_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    #[serde(default)]
    pub template: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpus: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DockerContainerMeta {
    pub container_id: String,
    #[serde(default)]
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageMeta {
    #[serde(default)]
    pub storage_type: String,
    #[serde(default)]
    pub content: Vec<String>,
    #[serde(default)]
    pub shared: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhysicalDiskMeta {
    pub dev_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KubernetesMeta {
    #[serde(default)]
    pub cluster_id: String,
    #[serde(default)]
    pub cluster_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(default)]
    pub restarts: u32,
}

/// Backup server instance
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PbsMeta {
    pub instance_id: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub datastore_count: u32,
}

/// Mail gateway instance
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PmgMeta {
    pub instance_id: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub queue_total: u32,
}

/// Ceph cluster as seen by a hypervisor cluster
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CephMeta {
    #[serde(default)]
    pub fsid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health: Option<String>,
    #[serde(default)]
    pub osd_count: u32,
    #[serde(default)]
    pub monitor_count: u32,
}

/// Type-specific payload of a resource
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "camelCase")]
pub enum ResourcePayload {
    Host(HostMeta),
    Vm(GuestMeta),
    Container(GuestMeta),
    DockerContainer(DockerContainerMeta),
    Storage(StorageMeta),
    PhysicalDisk(PhysicalDiskMeta),
    Kubernetes(KubernetesMeta),
    Pbs(PbsMeta),
    Pmg(PmgMeta),
    Ceph(CephMeta),
    #[default]
    None,
}

impl ResourcePayload {
    pub fn host(&self) -> Option<&HostMeta> {
        match self {
            ResourcePayload::Host(meta) => Some(meta),
            _ => None,
        }
    }
}

/// Coordinates used to dispatch actions at a resource
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryTarget {
    pub resource_type: String,
    pub host_id: String,
    pub resource_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

/// A source-specific record backing a merged resource
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceTarget {
    pub source: DataSource,
    pub source_id: String,
}

/// A merged resource, as presented to operators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub id: String,

    #[serde(rename = "type")]
    pub resource_type: ResourceType,

    pub name: String,

    pub status: ResourceStatus,

    pub last_seen: DateTime<Utc>,

    /// Source kinds that contributed to the current merge (never empty)
    pub sources: BTreeSet<DataSource>,

    /// Latest report from each contributing source
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub source_status: BTreeMap<DataSource, SourceStatus>,

    pub identity: ResourceIdentity,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<ResourceMetrics>,

    pub payload: ResourcePayload,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovery_target: Option<DiscoveryTarget>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_name: Option<String>,

    #[serde(default)]
    pub child_count: usize,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,

    pub source_targets: Vec<SourceTarget>,
}

impl Resource {
    pub fn family(&self) -> ResourceFamily {
        self.resource_type.family()
    }

    pub fn has_source(&self, source: DataSource) -> bool {
        self.sources.contains(&source)
    }
}

/// Aggregated counts over a resource set
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceStats {
    pub total: usize,
    pub by_type: BTreeMap<ResourceType, usize>,
    pub by_status: BTreeMap<ResourceStatus, usize>,
    pub by_source: BTreeMap<DataSource, usize>,
}

impl ResourceStats {
    pub fn from_resources<'a>(resources: impl IntoIterator<Item = &'a Resource>) -> Self {
        let mut stats = ResourceStats::default();
        for resource in resources {
            stats.total += 1;
            *stats.by_type.entry(resource.resource_type).or_default() += 1;
            *stats.by_status.entry(resource.status).or_default() += 1;
            for source in &resource.sources {
                *stats.by_source.entry(*source).or_default() += 1;
            }
        }
        stats
    }
}

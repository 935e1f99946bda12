//! The merge engine
//!
//! [`merge`] is a pure function from a tenant's records, overrides and
//! previous ID ledger to the merged resource set and the next ledger. It
//! never reads the clock or any global state, so identical inputs always
//! produce identical output.
//!
//! ## Pipeline
//!
//! 1. Host-like records are grouped with a union-find: manual links first
//!    (ignoring exclusions), then automatic match edges strongest first,
//!    skipping any union that would put an excluded pair together.
//! 2. Each group's fields are resolved by source precedence.
//! 3. Groups claim IDs from the previous ledger, or mint new ones.
//! 4. Node-scoped children are attached to merged hosts and grouped per
//!    parent; everything else maps one record to one resource.
//! 5. Child counts and discovery targets are filled in and the output is
//!    sorted by (type, lower-case name, id).

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};

use sha2::{Digest, Sha256};
use tracing::{debug, trace};

use crate::storage::{ManualLink, MergeExclusion};

use super::discovery::discovery_target;
use super::identity::{MatchStrength, ResourceIdentity, matches, normalize_hostname};
use super::ingest::IngestRecord;
use super::overrides::{OverrideStore, covers};
use super::priority::SourcePriority;
use super::types::{
    DataSource, HostMeta, MetricValue, Resource, ResourceFamily, ResourceMetrics,
    ResourcePayload, ResourceStatus, ResourceType, SourceFreshness, SourceStatus, SourceTarget,
};

/// What the ledger remembers about an ID handed out by an earlier merge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub resource_type: ResourceType,
    pub keys: BTreeSet<String>,
    pub identity: ResourceIdentity,

    /// Cycle in which a merge last handed this ID out
    pub claimed_in: u64,
}

/// IDs handed out by previous merges of one tenant
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdLedger {
    entries: BTreeMap<String, LedgerEntry>,
}

impl IdLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&LedgerEntry> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Everything a merge depends on
#[derive(Debug, Clone, Copy)]
pub struct MergeInput<'a> {
    pub tenant: &'a str,

    /// Records sorted and deduplicated by key
    pub records: &'a [IngestRecord],

    pub overrides: &'a OverrideStore,

    pub ledger: &'a IdLedger,

    pub priority: &'a SourcePriority,

    /// Generation of the records and overrides being merged
    ///
    /// Bumped by every ingest and override write. Merges within one cycle
    /// never age the ledger, however often reads repeat them.
    pub cycle: u64,

    /// How many cycles an unclaimed ledger entry survives
    pub ledger_retention: u32,
}

/// Result of one merge
#[derive(Debug, Clone, Default)]
pub struct MergeOutput {
    pub tenant: String,

    /// Sorted by (type, lower-case name, id)
    pub resources: Vec<Resource>,

    /// Ledger to feed into the next merge
    pub ledger: IdLedger,

    index: BTreeMap<String, usize>,
    members: BTreeMap<String, Vec<IngestRecord>>,
}

impl MergeOutput {
    pub fn get(&self, id: &str) -> Option<&Resource> {
        self.index.get(id).map(|i| &self.resources[*i])
    }

    /// Records that make up the resource, most trusted first
    pub fn members(&self, id: &str) -> Option<&[IngestRecord]> {
        self.members.get(id).map(Vec::as_slice)
    }
}

/// Merges a tenant's records into resources
pub fn merge(input: MergeInput<'_>) -> MergeOutput {
    let mut hosts = Vec::new();
    let mut children = Vec::new();
    let mut others = Vec::new();
    for record in input.records {
        match record.resource.resource_type.family() {
            ResourceFamily::HostLike => hosts.push(record),
            ResourceFamily::NodeScoped => children.push(record),
            ResourceFamily::SourceScoped => others.push(record),
        }
    }

    let mut ids = IdAllocator {
        ledger: input.ledger,
        links: input.overrides.links(),
        used: BTreeSet::new(),
    };

    // hosts first: children need their IDs to resolve parents
    let mut host_groups: Vec<Pending<'_>> = group_hosts(
        &hosts,
        input.overrides.links(),
        input.overrides.exclusions(),
    )
    .into_iter()
    .map(|members| {
        let members = rank(members, input.priority);
        let primary_key = members[0].key();
        let resource = resolve(&members, ResourceFamily::HostLike);
        let seed = resource.identity.fingerprint(&primary_key);
        Pending {
            resource,
            members,
            seed,
            primary_key,
        }
    })
    .collect();
    ids.assign(&mut host_groups);

    let parents = ParentIndex::new(&host_groups);

    let mut child_groups: BTreeMap<(ResourceType, String, String), Vec<&IngestRecord>> =
        BTreeMap::new();
    for record in children {
        let parent = parents.resolve(record);
        let scope = match &parent {
            Some((id, _)) => id.clone(),
            None => parent_name_of(record)
                .and_then(|name| normalize_hostname(&name))
                .map(|name| format!("name:{name}"))
                .unwrap_or_else(|| format!("key:{}", record.key())),
        };
        child_groups
            .entry((record.resource.resource_type, scope, child_key(record)))
            .or_default()
            .push(record);
    }

    let mut scoped: Vec<Pending<'_>> = child_groups
        .into_iter()
        .map(|((resource_type, scope, key), members)| {
            let members = rank(members, input.priority);
            let primary_key = members[0].key();
            let mut resource = resolve(&members, ResourceFamily::NodeScoped);
            attach_parent(&mut resource, &members, &parents);
            Pending {
                resource,
                members,
                seed: format!("{resource_type}/{scope}/{key}"),
                primary_key,
            }
        })
        .collect();

    scoped.extend(others.into_iter().map(|record| {
        let members = vec![record];
        let primary_key = record.key();
        let mut resource = resolve(&members, ResourceFamily::SourceScoped);
        attach_parent(&mut resource, &members, &parents);
        Pending {
            resource,
            members,
            seed: primary_key.clone(),
            primary_key,
        }
    }));
    ids.assign(&mut scoped);

    let mut pending = host_groups;
    pending.extend(scoped);

    let mut child_counts: BTreeMap<String, usize> = BTreeMap::new();
    for group in &pending {
        if let Some(parent_id) = &group.resource.parent_id {
            *child_counts.entry(parent_id.clone()).or_default() += 1;
        }
    }

    let mut resources = Vec::with_capacity(pending.len());
    let mut members = BTreeMap::new();
    for group in pending {
        let mut resource = group.resource;
        resource.child_count = child_counts.get(&resource.id).copied().unwrap_or(0);
        resource.discovery_target = discovery_target(&resource);
        members.insert(
            resource.id.clone(),
            group.members.into_iter().cloned().collect::<Vec<_>>(),
        );
        resources.push(resource);
    }

    resources.sort_by(|a, b| {
        (a.resource_type, a.name.to_lowercase(), &a.id).cmp(&(
            b.resource_type,
            b.name.to_lowercase(),
            &b.id,
        ))
    });

    let index: BTreeMap<String, usize> = resources
        .iter()
        .enumerate()
        .map(|(i, r)| (r.id.clone(), i))
        .collect();

    let ledger = next_ledger(
        input.ledger,
        &resources,
        input.cycle,
        input.ledger_retention,
    );

    debug!(
        tenant = input.tenant,
        records = input.records.len(),
        resources = resources.len(),
        ledger = ledger.len(),
        "merge complete"
    );

    MergeOutput {
        tenant: input.tenant.to_string(),
        resources,
        ledger,
        index,
        members,
    }
}

/// A resolved group still waiting for its ID
struct Pending<'a> {
    resource: Resource,
    members: Vec<&'a IngestRecord>,

    /// Input to the derived ID
    seed: String,

    /// Key of the most trusted member
    primary_key: String,
}

fn rank<'a>(mut members: Vec<&'a IngestRecord>, priority: &SourcePriority) -> Vec<&'a IngestRecord> {
    members.sort_by_cached_key(|r| (priority.rank(r.source), r.key()));
    members
}

// ----------------------------------------------------------------------------
// Host grouping
// ----------------------------------------------------------------------------

/// Union-find over host-like records that tracks, per component, which
/// exclusion sides it already contains
struct DisjointSet {
    parent: Vec<usize>,
    side_a: Vec<BTreeSet<usize>>,
    side_b: Vec<BTreeSet<usize>>,
}

impl DisjointSet {
    fn new(side_a: Vec<BTreeSet<usize>>, side_b: Vec<BTreeSet<usize>>) -> Self {
        Self {
            parent: (0..side_a.len()).collect(),
            side_a,
            side_b,
        }
    }

    fn find(&mut self, mut i: usize) -> usize {
        let mut root = i;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        while self.parent[i] != root {
            let next = self.parent[i];
            self.parent[i] = root;
            i = next;
        }
        root
    }

    fn conflicts(&self, a: usize, b: usize) -> bool {
        !self.side_a[a].is_disjoint(&self.side_b[b]) || !self.side_b[a].is_disjoint(&self.side_a[b])
    }

    /// Joins the components of `a` and `b`; with `respect_exclusions` the
    /// join is refused when it would put an excluded pair together
    fn union(&mut self, a: usize, b: usize, respect_exclusions: bool) -> bool {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra == rb {
            return true;
        }
        if respect_exclusions && self.conflicts(ra, rb) {
            return false;
        }
        // the smaller index stays root so grouping is order independent
        let (root, child) = if ra < rb { (ra, rb) } else { (rb, ra) };
        self.parent[child] = root;
        let moved_a = std::mem::take(&mut self.side_a[child]);
        let moved_b = std::mem::take(&mut self.side_b[child]);
        self.side_a[root].extend(moved_a);
        self.side_b[root].extend(moved_b);
        true
    }
}

fn group_hosts<'a>(
    hosts: &[&'a IngestRecord],
    links: &[ManualLink],
    exclusions: &[MergeExclusion],
) -> Vec<Vec<&'a IngestRecord>> {
    let mut side_a = vec![BTreeSet::new(); hosts.len()];
    let mut side_b = vec![BTreeSet::new(); hosts.len()];
    for (x, exclusion) in exclusions.iter().enumerate() {
        for (i, record) in hosts.iter().enumerate() {
            let in_a = covers(&exclusion.side_a, record);
            let in_b = covers(&exclusion.side_b, record);
            // a record on both sides says nothing about the split
            match (in_a, in_b) {
                (true, false) => {
                    side_a[i].insert(x);
                }
                (false, true) => {
                    side_b[i].insert(x);
                }
                _ => {}
            }
        }
    }
    let mut sets = DisjointSet::new(side_a, side_b);

    for link in links {
        let primary: Vec<usize> = (0..hosts.len())
            .filter(|i| covers(&link.primary, hosts[*i]))
            .collect();
        let secondary: Vec<usize> = (0..hosts.len())
            .filter(|i| covers(&link.secondary, hosts[*i]))
            .collect();
        if primary.is_empty() || secondary.is_empty() {
            continue;
        }
        let anchor = primary[0];
        for i in primary.iter().chain(secondary.iter()) {
            sets.union(anchor, *i, false);
        }
    }

    let mut edges = Vec::new();
    for i in 0..hosts.len() {
        for j in (i + 1)..hosts.len() {
            let strength = matches(&hosts[i].identity, &hosts[j].identity);
            if strength >= MatchStrength::Weak {
                edges.push((Reverse(strength), i, j));
            }
        }
    }
    edges.sort();

    for (Reverse(strength), i, j) in edges {
        if !sets.union(i, j, true) {
            trace!(
                a = %hosts[i].key(),
                b = %hosts[j].key(),
                ?strength,
                "match suppressed by exclusion"
            );
        }
    }

    let mut groups: BTreeMap<usize, Vec<&IngestRecord>> = BTreeMap::new();
    for (i, record) in hosts.iter().enumerate() {
        let root = sets.find(i);
        groups.entry(root).or_default().push(*record);
    }
    groups.into_values().collect()
}

// ----------------------------------------------------------------------------
// Field resolution
// ----------------------------------------------------------------------------

fn pick_metric(
    members: &[&IngestRecord],
    field: fn(&ResourceMetrics) -> &Option<MetricValue>,
) -> Option<MetricValue> {
    members.iter().find_map(|record| {
        let metrics = record.resource.metrics.as_ref()?;
        field(metrics).clone().map(|mut value| {
            value.source = Some(record.source);
            value
        })
    })
}

fn resolve_metrics(members: &[&IngestRecord]) -> Option<ResourceMetrics> {
    let metrics = ResourceMetrics {
        cpu: pick_metric(members, |m| &m.cpu),
        memory: pick_metric(members, |m| &m.memory),
        disk: pick_metric(members, |m| &m.disk),
        net_in: pick_metric(members, |m| &m.net_in),
        net_out: pick_metric(members, |m| &m.net_out),
        disk_read: pick_metric(members, |m| &m.disk_read),
        disk_write: pick_metric(members, |m| &m.disk_write),
    };
    (!metrics.is_empty()).then_some(metrics)
}

fn resolve_host_payload(members: &[&IngestRecord]) -> ResourcePayload {
    let mut meta = HostMeta::default();
    for record in members {
        if let ResourcePayload::Host(host) = &record.resource.payload {
            if meta.agent.is_none() {
                meta.agent = host.agent.clone();
            }
            if meta.node.is_none() {
                meta.node = host.node.clone();
            }
            if meta.docker.is_none() {
                meta.docker = host.docker.clone();
            }
            if meta.nas.is_none() {
                meta.nas = host.nas.clone();
            }
        }
    }
    ResourcePayload::Host(meta)
}

/// Resolves the fields of a group whose members are ranked most trusted first
fn resolve(members: &[&IngestRecord], family: ResourceFamily) -> Resource {
    let top = members[0];

    let name = members
        .iter()
        .map(|r| r.resource.name.trim())
        .find(|n| !n.is_empty())
        .unwrap_or(top.source_id.as_str())
        .to_string();

    let status = members
        .iter()
        .map(|r| r.resource.status)
        .find(|s| *s != ResourceStatus::Unknown)
        .unwrap_or(ResourceStatus::Unknown);

    let payload = match family {
        ResourceFamily::HostLike => resolve_host_payload(members),
        _ => members
            .iter()
            .map(|r| &r.resource.payload)
            .find(|p| **p != ResourcePayload::None)
            .cloned()
            .unwrap_or_default(),
    };

    let mut identity = ResourceIdentity::new();
    let mut sources = BTreeSet::new();
    let mut tags = BTreeSet::new();
    let mut source_targets = Vec::with_capacity(members.len());
    let mut source_status: BTreeMap<DataSource, SourceStatus> = BTreeMap::new();
    for record in members {
        if let Some(seen) = record.resource.last_seen {
            let status = source_status.entry(record.source).or_insert(SourceStatus {
                status: SourceFreshness::Online,
                last_seen: seen,
            });
            status.last_seen = status.last_seen.max(seen);
        }
        identity.union(&record.identity);
        identity.add_key(&record.key());
        sources.insert(record.source);
        tags.extend(record.resource.tags.iter().cloned());
        source_targets.push(SourceTarget {
            source: record.source,
            source_id: record.source_id.clone(),
        });
    }
    source_targets.sort();

    let last_seen = members
        .iter()
        .filter_map(|r| r.resource.last_seen)
        .max()
        .unwrap_or_default();

    Resource {
        id: String::new(),
        resource_type: top.resource.resource_type,
        name,
        status,
        last_seen,
        sources,
        source_status,
        identity,
        metrics: resolve_metrics(members),
        payload,
        discovery_target: None,
        parent_id: None,
        parent_name: None,
        child_count: 0,
        tags,
        source_targets,
    }
}

// ----------------------------------------------------------------------------
// Parents and children
// ----------------------------------------------------------------------------

/// Name of the host a record says it lives on
fn parent_name_of(record: &IngestRecord) -> Option<String> {
    let declared = record.resource.parent_name.as_deref();
    let from_payload = match &record.resource.payload {
        ResourcePayload::Vm(guest) | ResourcePayload::Container(guest) => {
            Some(guest.node_name.as_str())
        }
        ResourcePayload::Storage(storage) => storage.node_name.as_deref(),
        _ => None,
    };
    declared
        .into_iter()
        .chain(from_payload)
        .map(str::trim)
        .find(|s| !s.is_empty())
        .map(str::to_string)
}

fn child_key(record: &IngestRecord) -> String {
    if let Some(machine_id) = &record.identity.machine_id {
        return format!("machine:{machine_id}");
    }
    if let ResourcePayload::PhysicalDisk(disk) = &record.resource.payload {
        if let Some(serial) = disk.serial.as_deref().map(str::trim) {
            if !serial.is_empty() {
                return format!("serial:{}", serial.to_ascii_lowercase());
            }
        }
    }
    format!("name:{}", record.resource.name.trim().to_lowercase())
}

/// Looks merged hosts up by any of their names
struct ParentIndex {
    by_name: BTreeMap<String, (String, String)>,
}

impl ParentIndex {
    fn new(hosts: &[Pending<'_>]) -> Self {
        let mut by_name: BTreeMap<String, (String, String)> = BTreeMap::new();
        for group in hosts {
            let resource = &group.resource;
            let mut names: BTreeSet<String> = resource.identity.hostnames.clone();
            names.extend(normalize_hostname(&resource.name));
            if let Some(meta) = resource.payload.host() {
                if let Some(node) = &meta.node {
                    names.extend(normalize_hostname(&node.node_name));
                }
                if let Some(agent) = &meta.agent {
                    names.extend(normalize_hostname(&agent.hostname));
                }
            }
            for name in names {
                let candidate = (resource.id.clone(), resource.name.clone());
                // ambiguous names go to the smallest ID
                match by_name.get(&name) {
                    Some(existing) if existing.0 <= candidate.0 => {}
                    _ => {
                        by_name.insert(name, candidate);
                    }
                }
            }
        }
        Self { by_name }
    }

    /// Parent `(id, name)` of a record, if its host is known
    fn resolve(&self, record: &IngestRecord) -> Option<(String, String)> {
        let name = normalize_hostname(&parent_name_of(record)?)?;
        self.by_name.get(&name).cloned()
    }
}

fn attach_parent(resource: &mut Resource, members: &[&IngestRecord], parents: &ParentIndex) {
    for record in members {
        let Some(declared) = parent_name_of(record) else {
            continue;
        };
        match parents.resolve(record) {
            Some((id, _)) => {
                resource.parent_id = Some(id);
                resource.parent_name = Some(declared);
                return;
            }
            None if resource.parent_name.is_none() => {
                resource.parent_name = Some(declared);
            }
            None => {}
        }
    }
}

// ----------------------------------------------------------------------------
// IDs
// ----------------------------------------------------------------------------

fn short_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    digest[..8].iter().map(|b| format!("{b:02x}")).collect()
}

fn id_prefix(resource_type: ResourceType) -> &'static str {
    match resource_type.family() {
        ResourceFamily::HostLike => "host",
        _ => resource_type.as_str(),
    }
}

struct IdAllocator<'a> {
    ledger: &'a IdLedger,
    links: &'a [ManualLink],
    used: BTreeSet<String>,
}

impl IdAllocator<'_> {
    /// Score of `group` claiming `entry`, or `None` when it cannot
    fn claim_score(&self, group: &Pending<'_>, entry: &LedgerEntry) -> Option<(bool, usize, bool)> {
        let family = group.resource.resource_type.family();
        if entry.resource_type.family() != family {
            return None;
        }
        if family != ResourceFamily::HostLike && entry.resource_type != group.resource.resource_type
        {
            return None;
        }

        let shared = group
            .members
            .iter()
            .filter(|r| entry.keys.contains(&r.key()))
            .count();
        let overlap =
            family == ResourceFamily::HostLike && entry.identity.overlaps(&group.resource.identity);
        if shared == 0 && !overlap {
            return None;
        }

        // the entry backs the primary side of a link that joined this group
        let preferred = self.links.iter().any(|link| {
            let primary = group
                .members
                .iter()
                .any(|r| entry.keys.contains(&r.key()) && covers(&link.primary, r));
            primary && group.members.iter().any(|r| covers(&link.secondary, r))
        });

        Some((preferred, shared, overlap))
    }

    fn assign(&mut self, groups: &mut [Pending<'_>]) {
        let ledger = self.ledger;
        let mut candidates = Vec::new();
        for (gi, group) in groups.iter().enumerate() {
            for (id, entry) in &ledger.entries {
                if self.used.contains(id) {
                    continue;
                }
                if let Some(score) = self.claim_score(group, entry) {
                    candidates.push((Reverse(score), gi, id.as_str()));
                }
            }
        }
        candidates.sort();

        let mut assigned = vec![false; groups.len()];
        for (_, gi, id) in candidates {
            if assigned[gi] || self.used.contains(id) {
                continue;
            }
            assigned[gi] = true;
            self.used.insert(id.to_string());
            groups[gi].resource.id = id.to_string();
        }

        for (gi, group) in groups.iter_mut().enumerate() {
            if assigned[gi] {
                continue;
            }
            let prefix = id_prefix(group.resource.resource_type);
            let mut id = format!("{prefix}-{}", short_hash(&group.seed));
            let mut attempt = 1;
            while self.used.contains(&id) {
                let salted = if attempt == 1 {
                    format!("{}#{}", group.seed, group.primary_key)
                } else {
                    format!("{}#{}#{}", group.seed, group.primary_key, attempt)
                };
                id = format!("{prefix}-{}", short_hash(&salted));
                attempt += 1;
            }
            self.used.insert(id.clone());
            group.resource.id = id;
        }
    }
}

fn next_ledger(
    previous: &IdLedger,
    resources: &[Resource],
    cycle: u64,
    retention: u32,
) -> IdLedger {
    let mut entries: BTreeMap<String, LedgerEntry> = previous
        .entries
        .iter()
        .filter(|(_, entry)| cycle.saturating_sub(entry.claimed_in) <= u64::from(retention))
        .map(|(id, entry)| (id.clone(), entry.clone()))
        .collect();
    for resource in resources {
        entries.insert(
            resource.id.clone(),
            LedgerEntry {
                resource_type: resource.resource_type,
                keys: resource.identity.keys.clone(),
                identity: resource.identity.clone(),
                claimed_in: cycle,
            },
        );
    }
    IdLedger { entries }
}

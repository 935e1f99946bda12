//! The registry façade
//!
//! [`ResourceRegistry`] owns one set of stores per tenant: the ingest store,
//! the override view, the ID ledger, the cached merge and the pull sources.
//! Each tenant sits behind its own `RwLock`, so tenants never contend with
//! each other; the tenant map itself is locked only to look up or create an
//! entry.
//!
//! Reads merge lazily and cache the result until the next mutation. Reads
//! that consult pull sources merge their records into the same pass but do
//! not cache it, since pulled data is only valid for that read.
//!
//! Source freshness depends on the clock, so it is applied to copies of the
//! merged resources on every read and never cached.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info, instrument};

use crate::storage::{HealthStatus, ManualLink, MergeExclusion, OverrideBackend, StorageResult};
use crate::util::normalize_tenant_id;

use super::error::{RegistryError, RegistryResult};
use super::filter::ResourceFilter;
use super::freshness::{StaleThresholds, mark_stale};
use super::ingest::{IngestOutcome, IngestRecord, IngestStore, SourceFeed};
use super::merge::{IdLedger, MergeInput, MergeOutput, merge};
use super::overrides::{DEFAULT_EXCLUSION_NOTE, OverrideStore, link_joins, side_for};
use super::priority::SourcePriority;
use super::pull::{PullRegistry, PullSource, fetch_all};
use super::types::{DataSource, Resource, ResourceFamily, ResourceStats, SourceTarget};

/// Tunables of the registry
#[derive(Debug, Clone)]
pub struct RegistryOptions {
    pub priority: SourcePriority,

    /// Upper bound for a single pull source call
    pub pull_timeout: Duration,

    /// Ingest or override cycles an unclaimed ID survives in the ledger
    pub ledger_retention: u32,

    pub stale_thresholds: StaleThresholds,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            priority: SourcePriority::default(),
            pull_timeout: Duration::from_secs(5),
            ledger_retention: 10,
            stale_thresholds: StaleThresholds::default(),
        }
    }
}

struct TenantState {
    ingest: IngestStore,
    overrides: OverrideStore,
    ledger: IdLedger,
    cache: Option<Arc<MergeOutput>>,
    pulls: PullRegistry,
}

impl TenantState {
    fn invalidate(&mut self) {
        self.cache = None;
    }

    /// Advances once per ingest and once per stored override; reads never
    /// move it
    fn cycle(&self) -> u64 {
        let overrides = self.overrides.links().len() + self.overrides.exclusions().len();
        self.ingest.version() + overrides as u64
    }
}

struct TenantRegistry {
    state: RwLock<TenantState>,
}

/// Multi-tenant resource registry
pub struct ResourceRegistry {
    tenants: RwLock<HashMap<String, Arc<TenantRegistry>>>,
    backend: Arc<dyn OverrideBackend>,
    options: RegistryOptions,
}

impl ResourceRegistry {
    pub fn new(backend: Arc<dyn OverrideBackend>, options: RegistryOptions) -> Self {
        Self {
            tenants: RwLock::new(HashMap::new()),
            backend,
            options,
        }
    }

    pub fn options(&self) -> &RegistryOptions {
        &self.options
    }

    pub async fn health(&self) -> StorageResult<HealthStatus> {
        self.backend.health_check().await
    }

    pub async fn tenant_count(&self) -> usize {
        self.tenants.read().await.len()
    }

    /// Looks a tenant up, loading its overrides on first use
    async fn tenant(&self, raw: &str) -> RegistryResult<(String, Arc<TenantRegistry>)> {
        let tenant =
            normalize_tenant_id(raw).ok_or_else(|| RegistryError::InvalidTenant(raw.to_string()))?;

        if let Some(registry) = self.tenants.read().await.get(&tenant) {
            return Ok((tenant, registry.clone()));
        }

        // load outside the map lock so other tenants are not held up
        let overrides = OverrideStore::load(&tenant, self.backend.as_ref()).await?;

        let mut tenants = self.tenants.write().await;
        let registry = tenants
            .entry(tenant.clone())
            .or_insert_with(|| {
                debug!(tenant = %tenant, "tenant registry created");
                Arc::new(TenantRegistry {
                    state: RwLock::new(TenantState {
                        ingest: IngestStore::new(),
                        overrides,
                        ledger: IdLedger::new(),
                        cache: None,
                        pulls: PullRegistry::new(),
                    }),
                })
            })
            .clone();
        Ok((tenant, registry))
    }

    fn run_merge(&self, tenant: &str, state: &mut TenantState, records: &[IngestRecord]) -> MergeOutput {
        let output = merge(MergeInput {
            tenant,
            records,
            overrides: &state.overrides,
            ledger: &state.ledger,
            priority: &self.options.priority,
            cycle: state.cycle(),
            ledger_retention: self.options.ledger_retention,
        });
        state.ledger = output.ledger.clone();
        output
    }

    /// Merged view under an exclusive lock, including `pulled` records
    fn view_locked(
        &self,
        tenant: &str,
        state: &mut TenantState,
        pulled: Vec<IngestRecord>,
    ) -> Arc<MergeOutput> {
        if pulled.is_empty() {
            if let Some(cached) = &state.cache {
                return cached.clone();
            }
            let records = state.ingest.records();
            let output = Arc::new(self.run_merge(tenant, state, &records));
            state.cache = Some(output.clone());
            return output;
        }

        // ingested records win over pulled ones with the same key
        let mut by_key: BTreeMap<String, IngestRecord> = state
            .ingest
            .records()
            .into_iter()
            .map(|r| (r.key(), r))
            .collect();
        for record in pulled {
            by_key.entry(record.key()).or_insert(record);
        }
        let records: Vec<IngestRecord> = by_key.into_values().collect();
        Arc::new(self.run_merge(tenant, state, &records))
    }

    /// Calls the pull sources a read selects, outside any tenant lock
    async fn pull(
        &self,
        tenant: &str,
        registry: &TenantRegistry,
        wanted: &[DataSource],
    ) -> Vec<IngestRecord> {
        let providers = registry.state.read().await.pulls.selected(wanted);
        if providers.is_empty() {
            return Vec::new();
        }
        fetch_all(tenant, providers, self.options.pull_timeout, Utc::now())
            .await
            .records
    }

    async fn view(&self, raw_tenant: &str, wanted: &[DataSource]) -> RegistryResult<Arc<MergeOutput>> {
        let (tenant, registry) = self.tenant(raw_tenant).await?;
        let pulled = self.pull(&tenant, &registry, wanted).await;

        if pulled.is_empty() {
            if let Some(cached) = &registry.state.read().await.cache {
                return Ok(cached.clone());
            }
        }

        let mut state = registry.state.write().await;
        Ok(self.view_locked(&tenant, &mut state, pulled))
    }

    /// Replaces the snapshot of `feed` for `tenant`
    pub async fn ingest(
        &self,
        tenant: &str,
        feed: impl Into<SourceFeed>,
        records: Vec<IngestRecord>,
    ) -> RegistryResult<IngestOutcome> {
        let feed = feed.into();
        let (tenant, registry) = self.tenant(tenant).await?;

        let feed_name = feed.to_string();
        let mut state = registry.state.write().await;
        let outcome = state.ingest.replace(feed, records, Utc::now());
        state.invalidate();

        debug!(
            tenant = %tenant,
            feed = %feed_name,
            accepted = outcome.accepted,
            dropped = outcome.dropped,
            "ingest applied"
        );
        Ok(outcome)
    }

    /// Copy of `resource` with source freshness evaluated at `now`
    fn fresh(&self, resource: &Resource, now: DateTime<Utc>) -> Resource {
        let mut resource = resource.clone();
        mark_stale(&mut resource, now, &self.options.stale_thresholds);
        resource
    }

    /// Resources matching `filter`, sorted as the filter asks
    pub async fn list(&self, tenant: &str, filter: &ResourceFilter) -> RegistryResult<Vec<Resource>> {
        let view = self.view(tenant, &filter.sources).await?;
        let now = Utc::now();
        Ok(filter.apply(view.resources.iter().map(|r| self.fresh(r, now))))
    }

    pub async fn get(&self, tenant: &str, id: &str) -> RegistryResult<Option<Resource>> {
        let view = self.view(tenant, &[]).await?;
        Ok(view.get(id).map(|r| self.fresh(r, Utc::now())))
    }

    pub async fn stats(&self, tenant: &str) -> RegistryResult<ResourceStats> {
        let view = self.view(tenant, &[]).await?;
        let now = Utc::now();
        let resources: Vec<Resource> = view.resources.iter().map(|r| self.fresh(r, now)).collect();
        Ok(ResourceStats::from_resources(&resources))
    }

    /// Resources whose parent is `parent_id`
    pub async fn children(&self, tenant: &str, parent_id: &str) -> RegistryResult<Vec<Resource>> {
        let view = self.view(tenant, &[]).await?;
        if view.get(parent_id).is_none() {
            return Err(RegistryError::NotFound(parent_id.to_string()));
        }
        let now = Utc::now();
        Ok(view
            .resources
            .iter()
            .filter(|r| r.parent_id.as_deref() == Some(parent_id))
            .map(|r| self.fresh(r, now))
            .collect())
    }

    /// The per-source records backing a resource
    pub async fn source_targets(&self, tenant: &str, id: &str) -> RegistryResult<Vec<SourceTarget>> {
        let view = self.view(tenant, &[]).await?;
        view.get(id)
            .map(|r| r.source_targets.clone())
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))
    }

    /// Forces two resources into one
    ///
    /// The primary resource keeps its ID. The link is stored before the
    /// in-memory view changes, so a failed write changes nothing.
    #[instrument(skip(self, reason))]
    pub async fn link(
        &self,
        tenant: &str,
        primary_id: &str,
        secondary_id: &str,
        reason: &str,
    ) -> RegistryResult<ManualLink> {
        if primary_id == secondary_id {
            return Err(RegistryError::InvalidOverride(
                "cannot link a resource to itself".to_string(),
            ));
        }

        let (tenant, registry) = self.tenant(tenant).await?;
        let pulled = self.pull(&tenant, &registry, &[]).await;

        let mut state = registry.state.write().await;
        let view = self.view_locked(&tenant, &mut state, pulled);

        let primary = view
            .get(primary_id)
            .ok_or_else(|| RegistryError::NotFound(primary_id.to_string()))?;
        let secondary = view
            .get(secondary_id)
            .ok_or_else(|| RegistryError::NotFound(secondary_id.to_string()))?;
        for resource in [primary, secondary] {
            if resource.family() != ResourceFamily::HostLike {
                return Err(RegistryError::InvalidOverride(format!(
                    "{} is a {}; only hosts, nodes and docker hosts can be linked",
                    resource.id, resource.resource_type
                )));
            }
        }

        let link = ManualLink {
            tenant: tenant.clone(),
            primary: side_for(view.members(primary_id).unwrap_or_default()),
            secondary: side_for(view.members(secondary_id).unwrap_or_default()),
            reason: reason.trim().to_string(),
            created_at: Utc::now(),
        };

        self.backend.insert_link(link.clone()).await?;
        state.overrides.push_link(link.clone())?;
        state.invalidate();

        info!(
            tenant = %tenant,
            primary = primary_id,
            secondary = secondary_id,
            "manual link created"
        );
        Ok(link)
    }

    /// Splits a wrongly merged resource apart
    ///
    /// Members are partitioned into one subset per named source kind plus a
    /// remainder; an empty `kinds` list separates every kind. One exclusion
    /// is stored per pair of non-empty subsets.
    #[instrument(skip(self, note))]
    pub async fn report_merge(
        &self,
        tenant: &str,
        id: &str,
        kinds: &[DataSource],
        note: &str,
    ) -> RegistryResult<Vec<MergeExclusion>> {
        let (tenant, registry) = self.tenant(tenant).await?;
        let pulled = self.pull(&tenant, &registry, &[]).await;

        let mut state = registry.state.write().await;
        let view = self.view_locked(&tenant, &mut state, pulled);

        let resource = view
            .get(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        if resource.family() != ResourceFamily::HostLike {
            return Err(RegistryError::InvalidOverride(format!(
                "{} is a {}; only merged hosts can be split",
                resource.id, resource.resource_type
            )));
        }
        if let Some(missing) = kinds.iter().find(|k| !resource.has_source(**k)) {
            return Err(RegistryError::InvalidOverride(format!(
                "{} has no {} source",
                resource.id, missing
            )));
        }

        let members = view.members(id).unwrap_or_default();
        let mut subsets: Vec<Vec<&IngestRecord>> = Vec::new();
        if kinds.is_empty() {
            for kind in &resource.sources {
                subsets.push(members.iter().filter(|r| r.source == *kind).collect());
            }
        } else {
            let mut named: Vec<DataSource> = Vec::new();
            for kind in kinds {
                if !named.contains(kind) {
                    named.push(*kind);
                }
            }
            for kind in &named {
                subsets.push(members.iter().filter(|r| r.source == *kind).collect());
            }
            subsets.push(members.iter().filter(|r| !named.contains(&r.source)).collect());
        }
        subsets.retain(|s| !s.is_empty());

        if subsets.len() < 2 {
            return Err(RegistryError::InvalidOverride(format!(
                "{} is not merged across the given sources",
                id
            )));
        }

        // links win over exclusions, so an exclusion here would be inert
        for (i, a) in subsets.iter().enumerate() {
            for b in &subsets[i + 1..] {
                if state.overrides.links().iter().any(|l| link_joins(l, a, b)) {
                    return Err(RegistryError::InvalidOverride(format!(
                        "{} is held together by a manual link; remove the link instead",
                        id
                    )));
                }
            }
        }

        let note = match note.trim() {
            "" => DEFAULT_EXCLUSION_NOTE.to_string(),
            note => note.to_string(),
        };
        let created_at = Utc::now();
        let mut exclusions = Vec::new();
        for (i, a) in subsets.iter().enumerate() {
            for b in &subsets[i + 1..] {
                exclusions.push(MergeExclusion {
                    tenant: tenant.clone(),
                    side_a: side_for(a.iter().copied()),
                    side_b: side_for(b.iter().copied()),
                    note: note.clone(),
                    created_at,
                });
            }
        }

        self.backend.insert_exclusions(exclusions.clone()).await?;
        state.overrides.push_exclusions(exclusions.clone())?;
        state.invalidate();

        info!(
            tenant = %tenant,
            resource = id,
            members = members.len(),
            exclusions = exclusions.len(),
            "merge reported as incorrect"
        );
        Ok(exclusions)
    }

    /// Keeps two separate resources from being merged in the future
    ///
    /// Stores one exclusion between the records behind `id` and those behind
    /// `target_id`.
    #[instrument(skip(self, reason))]
    pub async fn unlink(
        &self,
        tenant: &str,
        id: &str,
        target_id: &str,
        reason: &str,
    ) -> RegistryResult<MergeExclusion> {
        if id == target_id {
            return Err(RegistryError::InvalidOverride(
                "cannot unlink a resource from itself".to_string(),
            ));
        }

        let (tenant, registry) = self.tenant(tenant).await?;
        let pulled = self.pull(&tenant, &registry, &[]).await;

        let mut state = registry.state.write().await;
        let view = self.view_locked(&tenant, &mut state, pulled);

        let resource = view
            .get(id)
            .ok_or_else(|| RegistryError::NotFound(id.to_string()))?;
        let target = view
            .get(target_id)
            .ok_or_else(|| RegistryError::NotFound(target_id.to_string()))?;
        for resource in [resource, target] {
            if resource.family() != ResourceFamily::HostLike {
                return Err(RegistryError::InvalidOverride(format!(
                    "{} is a {}; only hosts, nodes and docker hosts can be unlinked",
                    resource.id, resource.resource_type
                )));
            }
        }

        let members: Vec<&IngestRecord> = view.members(id).unwrap_or_default().iter().collect();
        let targets: Vec<&IngestRecord> =
            view.members(target_id).unwrap_or_default().iter().collect();
        if state
            .overrides
            .links()
            .iter()
            .any(|l| link_joins(l, &members, &targets))
        {
            return Err(RegistryError::InvalidOverride(format!(
                "{id} and {target_id} are joined by a manual link; remove the link instead"
            )));
        }

        let note = match reason.trim() {
            "" => DEFAULT_EXCLUSION_NOTE.to_string(),
            reason => reason.to_string(),
        };
        let exclusion = MergeExclusion {
            tenant: tenant.clone(),
            side_a: side_for(members.iter().copied()),
            side_b: side_for(targets.iter().copied()),
            note,
            created_at: Utc::now(),
        };

        self.backend.insert_exclusions(vec![exclusion.clone()]).await?;
        state.overrides.push_exclusions(vec![exclusion.clone()])?;
        state.invalidate();

        info!(
            tenant = %tenant,
            resource = id,
            target = target_id,
            "resources unlinked"
        );
        Ok(exclusion)
    }

    /// Registers a pull source for `kind`, replacing any earlier one
    pub async fn register_pull_source(
        &self,
        tenant: &str,
        kind: DataSource,
        provider: Arc<dyn PullSource>,
    ) -> RegistryResult<()> {
        let (tenant, registry) = self.tenant(tenant).await?;
        let mut state = registry.state.write().await;
        state.pulls.register(kind, provider);
        state.invalidate();
        debug!(tenant = %tenant, source = %kind, "pull source registered");
        Ok(())
    }

    /// Removes the pull source for `kind`; `false` when none was registered
    pub async fn unregister_pull_source(&self, tenant: &str, kind: DataSource) -> RegistryResult<bool> {
        let (tenant, registry) = self.tenant(tenant).await?;
        let mut state = registry.state.write().await;
        let removed = state.pulls.unregister(kind);
        if removed {
            state.invalidate();
            debug!(tenant = %tenant, source = %kind, "pull source unregistered");
        }
        Ok(removed)
    }
}

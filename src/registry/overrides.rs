//! In-memory view of a tenant's manual links and merge exclusions

use std::collections::BTreeSet;

use tracing::{debug, error};

use crate::storage::{ManualLink, MergeExclusion, OverrideBackend, OverrideSide};

use super::error::{RegistryError, RegistryResult};
use super::identity::ResourceIdentity;
use super::ingest::IngestRecord;

/// Default note recorded by a report-merge without one
pub const DEFAULT_EXCLUSION_NOTE: &str = "reported_incorrect_merge";

/// Overrides of one tenant, in the order they were made
#[derive(Debug, Clone, Default)]
pub struct OverrideStore {
    tenant: String,
    links: Vec<ManualLink>,
    exclusions: Vec<MergeExclusion>,
}

impl OverrideStore {
    pub fn new(tenant: impl Into<String>) -> Self {
        Self {
            tenant: tenant.into(),
            links: Vec::new(),
            exclusions: Vec::new(),
        }
    }

    /// Loads the tenant's overrides from `backend`
    ///
    /// Rows tagged with any other tenant abort the load.
    pub async fn load(tenant: &str, backend: &dyn OverrideBackend) -> RegistryResult<Self> {
        let links = backend.links(tenant).await?;
        let exclusions = backend.exclusions(tenant).await?;

        let foreign = links
            .iter()
            .map(|l| &l.tenant)
            .chain(exclusions.iter().map(|e| &e.tenant))
            .find(|t| t.as_str() != tenant);
        if let Some(found) = foreign {
            error!(tenant, found = %found, "override backend returned foreign rows");
            return Err(RegistryError::TenantIsolationViolation {
                expected: tenant.to_string(),
                found: found.clone(),
            });
        }

        debug!(
            tenant,
            links = links.len(),
            exclusions = exclusions.len(),
            "loaded overrides"
        );
        Ok(Self {
            tenant: tenant.to_string(),
            links,
            exclusions,
        })
    }

    pub fn links(&self) -> &[ManualLink] {
        &self.links
    }

    pub fn exclusions(&self) -> &[MergeExclusion] {
        &self.exclusions
    }

    pub fn push_link(&mut self, link: ManualLink) -> RegistryResult<()> {
        self.check_tenant(&link.tenant)?;
        self.links.push(link);
        Ok(())
    }

    pub fn push_exclusions(&mut self, exclusions: Vec<MergeExclusion>) -> RegistryResult<()> {
        for exclusion in &exclusions {
            self.check_tenant(&exclusion.tenant)?;
        }
        self.exclusions.extend(exclusions);
        Ok(())
    }

    fn check_tenant(&self, found: &str) -> RegistryResult<()> {
        if found != self.tenant {
            error!(tenant = %self.tenant, found, "override for foreign tenant rejected");
            return Err(RegistryError::TenantIsolationViolation {
                expected: self.tenant.clone(),
                found: found.to_string(),
            });
        }
        Ok(())
    }
}

/// Builds the override side standing for `records`
pub fn side_for<'a>(records: impl IntoIterator<Item = &'a IngestRecord>) -> OverrideSide {
    let mut identity = ResourceIdentity::new();
    let mut sources = BTreeSet::new();
    for record in records {
        identity.union(&record.identity);
        identity.add_key(&record.key());
        sources.insert(record.source);
    }
    OverrideSide { identity, sources }
}

/// A record is covered when its kind is on the side and its identity
/// overlaps the side's identity
pub fn covers(side: &OverrideSide, record: &IngestRecord) -> bool {
    side.sources.contains(&record.source) && side.identity.overlaps(&record.identity)
}

/// Whether `link` holds records of `a` and records of `b` in one group
///
/// The link only acts when both of its sides cover a record, and it then
/// pulls in every record either side covers.
pub fn link_joins(link: &ManualLink, a: &[&IngestRecord], b: &[&IngestRecord]) -> bool {
    let both = || a.iter().chain(b.iter()).copied();
    let active =
        both().any(|r| covers(&link.primary, r)) && both().any(|r| covers(&link.secondary, r));
    let pulled = |r: &&IngestRecord| covers(&link.primary, r) || covers(&link.secondary, r);
    active && a.iter().any(pulled) && b.iter().any(pulled)
}

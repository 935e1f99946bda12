//! Staleness of the sources behind a merged resource
//!
//! A merged resource remembers when each contributing source last reported
//! it. At read time [`mark_stale`] compares those instants against a
//! per-source threshold; a source that has gone quiet is flagged and an
//! otherwise online resource is downgraded to a warning.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};

use super::types::{DataSource, Resource, ResourceStatus, SourceFreshness};

/// How long each source may stay silent before its view counts as stale
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleThresholds {
    by_source: BTreeMap<DataSource, TimeDelta>,
    fallback: TimeDelta,
}

impl StaleThresholds {
    pub fn new(fallback: TimeDelta) -> Self {
        Self {
            by_source: BTreeMap::new(),
            fallback,
        }
    }

    pub fn with(mut self, source: DataSource, threshold: TimeDelta) -> Self {
        self.set(source, threshold);
        self
    }

    pub fn set(&mut self, source: DataSource, threshold: TimeDelta) {
        self.by_source.insert(source, threshold);
    }

    pub fn get(&self, source: DataSource) -> TimeDelta {
        self.by_source.get(&source).copied().unwrap_or(self.fallback)
    }
}

impl Default for StaleThresholds {
    fn default() -> Self {
        StaleThresholds::new(TimeDelta::seconds(120))
            .with(DataSource::Proxmox, TimeDelta::seconds(60))
            .with(DataSource::Agent, TimeDelta::seconds(60))
            .with(DataSource::Docker, TimeDelta::seconds(120))
            .with(DataSource::Kubernetes, TimeDelta::seconds(120))
            .with(DataSource::TrueNas, TimeDelta::seconds(120))
            .with(DataSource::Pbs, TimeDelta::seconds(120))
            .with(DataSource::Pmg, TimeDelta::seconds(120))
    }
}

/// Flags the sources of `resource` that have been silent for longer than
/// their threshold at `now`
///
/// Returns whether any source is stale. Statuses other than online are left
/// alone; a resource a source already reports as offline stays offline.
pub fn mark_stale(
    resource: &mut Resource,
    now: DateTime<Utc>,
    thresholds: &StaleThresholds,
) -> bool {
    let mut any_stale = false;
    for (source, status) in resource.source_status.iter_mut() {
        let stale = now.signed_duration_since(status.last_seen) > thresholds.get(*source);
        status.status = if stale {
            SourceFreshness::Stale
        } else {
            SourceFreshness::Online
        };
        any_stale |= stale;
    }
    if any_stale && resource.status == ResourceStatus::Online {
        resource.status = ResourceStatus::Warning;
    }
    any_stale
}

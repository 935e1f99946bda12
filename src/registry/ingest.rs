//! Per-feed record snapshots for one tenant
//!
//! Each producer owns one [`SourceFeed`]. Ingesting a batch replaces that
//! feed's snapshot wholesale; other feeds are untouched, so ingests from
//! different feeds commute.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::identity::ResourceIdentity;
use super::types::{
    DataSource, ResourceMetrics, ResourcePayload, ResourceStatus, ResourceType,
};

/// The unit of replacement in the ingest store
///
/// Two pollers of the same kind (say, two hypervisor clusters) use distinct
/// instance names so they do not overwrite each other.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceFeed {
    pub kind: DataSource,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
}

impl SourceFeed {
    pub fn new(kind: DataSource) -> Self {
        Self {
            kind,
            instance: None,
        }
    }

    pub fn instance(kind: DataSource, instance: impl Into<String>) -> Self {
        let instance = instance.into().trim().to_string();
        Self {
            kind,
            instance: (!instance.is_empty()).then_some(instance),
        }
    }
}

impl From<DataSource> for SourceFeed {
    fn from(kind: DataSource) -> Self {
        SourceFeed::new(kind)
    }
}

impl fmt::Display for SourceFeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.instance {
            Some(instance) => write!(f, "{}/{}", self.kind, instance),
            None => write!(f, "{}", self.kind),
        }
    }
}

/// What a source reports about one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceResource {
    #[serde(rename = "type")]
    pub resource_type: ResourceType,

    pub name: String,

    #[serde(default)]
    pub status: ResourceStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<ResourceMetrics>,

    #[serde(default)]
    pub payload: ResourcePayload,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub tags: BTreeSet<String>,

    /// Name of the host this entity lives on (storage, disks, guests)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_name: Option<String>,
}

/// One record as handed over by a producer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestRecord {
    pub source_id: String,

    pub source: DataSource,

    pub resource: SourceResource,

    #[serde(default)]
    pub identity: ResourceIdentity,
}

impl IngestRecord {
    pub fn new(
        source: DataSource,
        source_id: impl Into<String>,
        resource_type: ResourceType,
        name: impl Into<String>,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            source,
            resource: SourceResource {
                resource_type,
                name: name.into(),
                status: ResourceStatus::Unknown,
                last_seen: None,
                metrics: None,
                payload: ResourcePayload::None,
                tags: BTreeSet::new(),
                parent_name: None,
            },
            identity: ResourceIdentity::default(),
        }
    }

    pub fn with_identity(mut self, identity: ResourceIdentity) -> Self {
        self.identity = identity;
        self
    }

    pub fn with_status(mut self, status: ResourceStatus) -> Self {
        self.resource.status = status;
        self
    }

    pub fn with_payload(mut self, payload: ResourcePayload) -> Self {
        self.resource.payload = payload;
        self
    }

    pub fn with_metrics(mut self, metrics: ResourceMetrics) -> Self {
        self.resource.metrics = Some(metrics);
        self
    }

    pub fn with_parent(mut self, parent_name: impl Into<String>) -> Self {
        self.resource.parent_name = Some(parent_name.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.resource.tags.insert(tag.into());
        self
    }

    pub fn with_last_seen(mut self, last_seen: DateTime<Utc>) -> Self {
        self.resource.last_seen = Some(last_seen);
        self
    }

    /// Stable key of this record, `<source>:<source_id>`
    pub fn key(&self) -> String {
        record_key(self.source, &self.source_id)
    }
}

pub fn record_key(source: DataSource, source_id: &str) -> String {
    format!("{}:{}", source, source_id.trim())
}

/// Fills in last-seen and normalizes the identity, adding the record's own key
pub(crate) fn stamp(record: &mut IngestRecord, received_at: DateTime<Utc>) {
    if record.resource.last_seen.is_none() {
        record.resource.last_seen = Some(received_at);
    }
    let key = record.key();
    record.identity = std::mem::take(&mut record.identity).normalized();
    record.identity.add_key(&key);
}

/// Result of replacing one feed's snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestOutcome {
    pub accepted: usize,
    pub dropped: usize,
    pub version: u64,
}

/// Snapshot store of one tenant
#[derive(Debug, Clone, Default)]
pub struct IngestStore {
    snapshots: BTreeMap<SourceFeed, Vec<IngestRecord>>,
    version: u64,
}

impl IngestStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the snapshot of `feed` with `records`
    ///
    /// The replacement is fully built before it is swapped in. Records with a
    /// blank ID or a kind other than the feed's are dropped.
    pub fn replace(
        &mut self,
        feed: SourceFeed,
        records: Vec<IngestRecord>,
        received_at: DateTime<Utc>,
    ) -> IngestOutcome {
        let total = records.len();
        let mut accepted = Vec::with_capacity(total);

        for mut record in records {
            record.source_id = record.source_id.trim().to_string();
            if record.source_id.is_empty() {
                warn!(feed = %feed, "dropping record without source id");
                continue;
            }
            if record.source != feed.kind {
                warn!(
                    feed = %feed,
                    source = %record.source,
                    source_id = %record.source_id,
                    "dropping record reported under a foreign feed"
                );
                continue;
            }

            stamp(&mut record, received_at);
            accepted.push(record);
        }

        let outcome = IngestOutcome {
            accepted: accepted.len(),
            dropped: total - accepted.len(),
            version: self.version + 1,
        };

        self.snapshots.insert(feed.clone(), accepted);
        self.version = outcome.version;

        debug!(
            feed = %feed,
            accepted = outcome.accepted,
            dropped = outcome.dropped,
            version = outcome.version,
            "replaced feed snapshot"
        );
        outcome
    }

    /// All current records, sorted and deduplicated by key
    ///
    /// When two feeds report the same key, the feed that sorts first wins.
    pub fn records(&self) -> Vec<IngestRecord> {
        let mut by_key: BTreeMap<String, IngestRecord> = BTreeMap::new();
        for snapshot in self.snapshots.values() {
            for record in snapshot {
                by_key.entry(record.key()).or_insert_with(|| record.clone());
            }
        }
        by_key.into_values().collect()
    }

    /// Number of replacements applied so far
    pub fn version(&self) -> u64 {
        self.version
    }
}

//! Supplemental pull sources
//!
//! Some sources are cheaper to ask on demand than to push every cycle. A
//! [`PullSource`] registered for a tenant is called during reads and its
//! records join the same merge pass as the ingested ones.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use tracing::{debug, warn};

use super::error::RegistryError;
use super::ingest::{IngestRecord, stamp};
use super::types::DataSource;

/// Provider of a source's current records
#[async_trait]
pub trait PullSource: Send + Sync {
    async fn current_records(&self) -> anyhow::Result<Vec<IngestRecord>>;
}

/// Pull sources of one tenant, keyed by kind
#[derive(Clone, Default)]
pub struct PullRegistry {
    sources: BTreeMap<DataSource, Arc<dyn PullSource>>,
}

impl PullRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `provider` for `kind`, replacing any earlier one
    pub fn register(&mut self, kind: DataSource, provider: Arc<dyn PullSource>) {
        self.sources.insert(kind, provider);
    }

    pub fn unregister(&mut self, kind: DataSource) -> bool {
        self.sources.remove(&kind).is_some()
    }

    /// Providers a read should consult
    ///
    /// An empty `wanted` set means every registered kind.
    pub fn selected(&self, wanted: &[DataSource]) -> Vec<(DataSource, Arc<dyn PullSource>)> {
        self.sources
            .iter()
            .filter(|(kind, _)| wanted.is_empty() || wanted.contains(kind))
            .map(|(kind, provider)| (*kind, provider.clone()))
            .collect()
    }
}

/// Records gathered from pull sources for one read
#[derive(Debug, Default)]
pub struct PullOutcome {
    pub records: Vec<IngestRecord>,

    /// Sources that failed or timed out; they contributed nothing
    pub failures: Vec<RegistryError>,
}

/// Calls every provider concurrently, each under `timeout`
///
/// Records of a kind other than the provider's, or without an ID, are
/// discarded. Records are normalized the way ingestion does it, stamping
/// `now` as last-seen when absent.
pub async fn fetch_all(
    tenant: &str,
    providers: Vec<(DataSource, Arc<dyn PullSource>)>,
    timeout: Duration,
    now: DateTime<Utc>,
) -> PullOutcome {
    let calls = providers.into_iter().map(|(kind, provider)| async move {
        let result = tokio::time::timeout(timeout, provider.current_records()).await;
        (kind, result)
    });

    let mut outcome = PullOutcome::default();
    for (kind, result) in join_all(calls).await {
        let reason = match result {
            Ok(Ok(records)) => {
                let before = outcome.records.len();
                outcome
                    .records
                    .extend(records.into_iter().filter_map(|r| prepare(kind, r, now)));
                debug!(
                    tenant,
                    source = %kind,
                    count = outcome.records.len() - before,
                    "pulled supplemental records"
                );
                continue;
            }
            Ok(Err(err)) => format!("{err:#}"),
            Err(_) => format!("timed out after {}ms", timeout.as_millis()),
        };

        warn!(tenant, source = %kind, %reason, "pull source unavailable");
        outcome.failures.push(RegistryError::SourceUnavailable {
            source: kind,
            reason,
        });
    }
    outcome
}

fn prepare(kind: DataSource, mut record: IngestRecord, now: DateTime<Utc>) -> Option<IngestRecord> {
    record.source_id = record.source_id.trim().to_string();
    if record.source != kind || record.source_id.is_empty() {
        return None;
    }
    stamp(&mut record, now);
    Some(record)
}

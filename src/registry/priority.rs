//! Source precedence used when merged records disagree

use serde::{Deserialize, Serialize};

use super::types::DataSource;

/// Ordered list of source kinds, most trusted first
///
/// Kinds missing from the list rank after every listed kind, ordered among
/// themselves by their natural order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SourcePriority(Vec<DataSource>);

impl SourcePriority {
    pub fn new(order: Vec<DataSource>) -> Self {
        let mut deduped = Vec::with_capacity(order.len());
        for source in order {
            if !deduped.contains(&source) {
                deduped.push(source);
            }
        }
        Self(deduped)
    }

    /// Sort key: lower means more trusted
    pub fn rank(&self, source: DataSource) -> (usize, DataSource) {
        let position = self
            .0
            .iter()
            .position(|s| *s == source)
            .unwrap_or(self.0.len());
        (position, source)
    }

    pub fn order(&self) -> &[DataSource] {
        &self.0
    }
}

impl Default for SourcePriority {
    fn default() -> Self {
        Self(vec![
            DataSource::Agent,
            DataSource::Proxmox,
            DataSource::Docker,
            DataSource::TrueNas,
            DataSource::Kubernetes,
            DataSource::Pbs,
            DataSource::Pmg,
        ])
    }
}

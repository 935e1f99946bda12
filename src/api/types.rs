//! Request and response bodies of the HTTP adapter

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::registry::{
    DataSource, IngestOutcome, ResourceFilter, ResourceStatus, ResourceType, SortField, SortOrder,
};

use super::error::{ApiError, ApiResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub storage: String,
}

/// Query string of the list endpoint
///
/// List-valued parameters are comma separated, e.g. `?type=vm,container`.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    #[serde(rename = "type")]
    pub types: Option<String>,
    pub source: Option<String>,
    pub status: Option<String>,
    pub parent: Option<String>,
    pub q: Option<String>,
    pub tag: Option<String>,
    pub sort: Option<SortField>,
    pub order: Option<SortOrder>,
    #[serde(default)]
    pub offset: usize,
    #[serde(default)]
    pub limit: usize,
}

fn split_list<T>(raw: Option<&str>) -> ApiResult<Vec<T>>
where
    T: FromStr<Err = String>,
{
    raw.unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse::<T>().map_err(ApiError::InvalidRequest))
        .collect()
}

impl ListQuery {
    pub fn filter(&self) -> ApiResult<ResourceFilter> {
        let types: Vec<ResourceType> = split_list(self.types.as_deref())?;
        let sources: Vec<DataSource> = split_list(self.source.as_deref())?;
        let statuses: Vec<ResourceStatus> = split_list(self.status.as_deref())?;
        let tags = self
            .tag
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();

        Ok(ResourceFilter {
            types,
            sources,
            statuses,
            parent_id: self.parent.clone().filter(|p| !p.is_empty()),
            query: self.q.clone(),
            tags,
            sort: self.sort.unwrap_or_default(),
            order: self.order.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkRequest {
    pub primary_id: String,
    pub secondary_id: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlinkRequest {
    pub target_id: String,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReportMergeRequest {
    /// Source kinds to split off; empty separates every kind
    pub sources: Vec<DataSource>,
    pub note: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct IngestQuery {
    pub instance: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestResponse {
    pub accepted: usize,
    pub dropped: usize,
    pub version: u64,
}

impl From<IngestOutcome> for IngestResponse {
    fn from(outcome: IngestOutcome) -> Self {
        Self {
            accepted: outcome.accepted,
            dropped: outcome.dropped,
            version: outcome.version,
        }
    }
}

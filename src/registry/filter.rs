//! List filtering, sorting and pagination

use serde::{Deserialize, Serialize};

use super::types::{DataSource, Resource, ResourceStatus, ResourceType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortField {
    #[default]
    Name,
    Type,
    Status,
    LastSeen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Criteria for `list`; empty criteria match everything
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ResourceFilter {
    pub types: Vec<ResourceType>,

    /// Resources with at least one of these sources. Also selects which
    /// pull sources are consulted.
    pub sources: Vec<DataSource>,

    pub statuses: Vec<ResourceStatus>,

    pub parent_id: Option<String>,

    /// Case-insensitive substring of the name, ID or a hostname
    pub query: Option<String>,

    /// Resources carrying every one of these tags
    pub tags: Vec<String>,

    pub sort: SortField,

    pub order: SortOrder,
}

impl ResourceFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type(mut self, resource_type: ResourceType) -> Self {
        self.types.push(resource_type);
        self
    }

    pub fn with_source(mut self, source: DataSource) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_status(mut self, status: ResourceStatus) -> Self {
        self.statuses.push(status);
        self
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn sorted_by(mut self, sort: SortField, order: SortOrder) -> Self {
        self.sort = sort;
        self.order = order;
        self
    }

    pub fn matches(&self, resource: &Resource) -> bool {
        if !self.types.is_empty() && !self.types.contains(&resource.resource_type) {
            return false;
        }
        if !self.sources.is_empty() && !self.sources.iter().any(|s| resource.has_source(*s)) {
            return false;
        }
        if !self.statuses.is_empty() && !self.statuses.contains(&resource.status) {
            return false;
        }
        if let Some(parent_id) = &self.parent_id {
            if resource.parent_id.as_ref() != Some(parent_id) {
                return false;
            }
        }
        if !self.tags.iter().all(|t| resource.tags.contains(t)) {
            return false;
        }
        if let Some(query) = self.query.as_deref().map(str::trim) {
            if !query.is_empty() {
                let query = query.to_lowercase();
                let hit = resource.name.to_lowercase().contains(&query)
                    || resource.id.contains(&query)
                    || resource.identity.hostnames.iter().any(|h| h.contains(&query));
                if !hit {
                    return false;
                }
            }
        }
        true
    }

    /// Keeps matching resources and sorts them
    pub fn apply(&self, resources: impl IntoIterator<Item = Resource>) -> Vec<Resource> {
        let mut out: Vec<Resource> = resources.into_iter().filter(|r| self.matches(r)).collect();
        sort_resources(&mut out, self.sort, self.order);
        out
    }
}

pub fn sort_resources(resources: &mut [Resource], field: SortField, order: SortOrder) {
    resources.sort_by(|a, b| {
        let ordering = match field {
            SortField::Name => (a.name.to_lowercase(), &a.id).cmp(&(b.name.to_lowercase(), &b.id)),
            SortField::Type => (a.resource_type, a.name.to_lowercase(), &a.id).cmp(&(
                b.resource_type,
                b.name.to_lowercase(),
                &b.id,
            )),
            SortField::Status => (a.status, a.name.to_lowercase(), &a.id).cmp(&(
                b.status,
                b.name.to_lowercase(),
                &b.id,
            )),
            SortField::LastSeen => (a.last_seen, &a.id).cmp(&(b.last_seen, &b.id)),
        };
        match order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    });
}

/// One page of a sorted listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
    pub offset: usize,
    pub limit: usize,
}

/// Cuts `items` down to `[offset, offset + limit)`; a zero limit means all
pub fn paginate<T>(items: Vec<T>, offset: usize, limit: usize) -> Page<T> {
    let total = items.len();
    let limit = if limit == 0 { total } else { limit };
    let items = items.into_iter().skip(offset).take(limit).collect();
    Page {
        items,
        total,
        offset,
        limit,
    }
}

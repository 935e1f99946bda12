//! Persisted override records
//!
//! Overrides key on identity, never on resource IDs: a resource ID is derived
//! from the current merge and can change when sources come and go, while the
//! identity signals of the records behind it do not.
//!
//! ## Storage layout
//!
//! Each row keeps the tenant and timestamp as columns and stores both
//! override sides as JSON text, so new identity signals do not need a
//! migration.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::registry::identity::ResourceIdentity;
use crate::registry::types::DataSource;

/// One side of an override: the records it stands for
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverrideSide {
    pub identity: ResourceIdentity,
    pub sources: BTreeSet<DataSource>,
}

/// Forces two sides into one resource, regardless of any exclusion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManualLink {
    pub tenant: String,

    /// The side whose resource ID survives the link
    pub primary: OverrideSide,

    pub secondary: OverrideSide,

    pub reason: String,

    pub created_at: DateTime<Utc>,
}

/// Keeps automatic matching from putting the two sides back together
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeExclusion {
    pub tenant: String,
    pub side_a: OverrideSide,
    pub side_b: OverrideSide,
    pub note: String,
    pub created_at: DateTime<Utc>,
}

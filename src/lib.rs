//! Unified resource registry
//!
//! Merges per-source infrastructure records (hypervisor nodes, host agents,
//! container runtimes, storage appliances, Kubernetes, backup and mail
//! gateways) into one canonical, deduplicated set of resources per tenant.

#[cfg(feature = "api")]
pub mod api;
pub mod config;
pub mod registry;
pub mod storage;
pub mod util;

pub use registry::{
    DataSource, IngestRecord, RegistryError, RegistryOptions, RegistryResult, Resource,
    ResourceFilter, ResourceIdentity, ResourceRegistry, ResourceType,
};

//! Unified resource registry
//!
//! Producers hand over per-source records with [`ResourceRegistry::ingest`];
//! the registry merges records describing the same entity into one
//! [`Resource`] with a stable ID. Operators correct the automatic merge with
//! manual links and merge exclusions, which are persisted through an
//! [`OverrideBackend`](crate::storage::OverrideBackend).
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use unified_resources::registry::{
//!     DataSource, IngestRecord, RegistryOptions, ResourceFilter, ResourceIdentity,
//!     ResourceRegistry, ResourceType,
//! };
//! use unified_resources::storage::MemoryBackend;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let registry = ResourceRegistry::new(Arc::new(MemoryBackend::new()), RegistryOptions::default());
//!
//! let record = IngestRecord::new(DataSource::Agent, "a1", ResourceType::Host, "web-01")
//!     .with_identity(ResourceIdentity::new().with_hostname("web-01"));
//! registry.ingest("acme", DataSource::Agent, vec![record]).await?;
//!
//! let hosts = registry.list("acme", &ResourceFilter::new()).await?;
//! assert_eq!(hosts.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod discovery;
pub mod error;
pub mod facade;
pub mod filter;
pub mod freshness;
pub mod identity;
pub mod ingest;
pub mod merge;
pub mod overrides;
pub mod priority;
pub mod pull;
pub mod types;

pub use error::{RegistryError, RegistryResult};
pub use facade::{RegistryOptions, ResourceRegistry};
pub use filter::{Page, ResourceFilter, SortField, SortOrder, paginate};
pub use freshness::{StaleThresholds, mark_stale};
pub use identity::{MatchStrength, ResourceIdentity, matches};
pub use ingest::{IngestOutcome, IngestRecord, SourceFeed, SourceResource};
pub use merge::{IdLedger, MergeInput, MergeOutput, merge};
pub use overrides::OverrideStore;
pub use priority::SourcePriority;
pub use pull::{PullRegistry, PullSource};
pub use types::*;

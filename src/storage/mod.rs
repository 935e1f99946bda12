//! Storage backends for override persistence
//!
//! Manual links and merge exclusions must survive restarts; everything else
//! the registry holds is rebuilt from the next ingestion cycle.
//!
//! ## Backends
//!
//! - **SQLite** (feature `storage-sqlite`): Embedded database
//! - **In-Memory** (fallback): No persistence, for testing or ephemeral hubs
//!
//! ## Usage
//!
//! ```no_run
//! use unified_resources::storage::{OverrideBackend, sqlite::SqliteBackend};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let backend = SqliteBackend::new("./overrides.db").await?;
//!     println!("{}", backend.get_stats().await?);
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod error;
pub mod memory;
pub mod schema;
#[cfg(feature = "storage-sqlite")]
pub mod sqlite;

pub use backend::{HealthStatus, OverrideBackend};
pub use error::{StorageError, StorageResult};
pub use memory::MemoryBackend;
pub use schema::{ManualLink, MergeExclusion, OverrideSide};

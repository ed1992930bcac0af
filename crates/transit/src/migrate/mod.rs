//! Migration orchestration.
//!
//! This module provides the two-phase engine that moves a parent resource
//! and a dependent child resource from the source into the sink:
//!
//! 1. **Parents**: fetch, normalize and upsert each parent concurrently,
//!    then build the [`IdentifierMap`] from the joined results.
//! 2. **Children**: fetch each child, resolve its parent through the map,
//!    attach its asset and upsert it.
//!
//! # Example
//!
//! ```ignore
//! use transit::migrate::Migrator;
//!
//! let mut migrator = Migrator::from_config(&config, None)?;
//! let summary = migrator.run().await?;
//! println!("{} migrated, {} skipped, {} failed",
//!     summary.migrated(), summary.skipped(), summary.failed());
//! ```

mod engine;
mod error;
mod id_map;
mod plan;
mod progress;
mod state;
mod types;

pub use engine::Migrator;
pub use error::MigrationError;
pub use id_map::IdentifierMap;
pub use plan::{ChildPlan, FieldMapping, ParentPlan, build_fields, natural_key};
pub use progress::{MigrationProgress, ProgressCallback, SharedProgressCallback, emit};
pub use state::MigrationState;
pub use types::{
    DEFAULT_ASSET_CONCURRENCY, DEFAULT_SINK_CONCURRENCY, DEFAULT_SOURCE_CONCURRENCY,
    INITIAL_BACKOFF_MS, MAX_BACKOFF_MS, MAX_RATE_LIMIT_RETRIES, Preflight, ResourceCount,
    ResourceSummary, RunSummary, SkipReason, SourceMode, WriteMode,
};

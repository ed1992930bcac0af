//! Transit - hierarchical record migration.
//!
//! This library copies a parent resource and a dependent child resource from
//! a numbered collection API into a JSON-RPC record store, attaching a
//! per-child image fetched from a separate asset service.
//!
//! Writes are idempotent (find-or-create by natural key) and children only
//! ever reference parents created or found in the same run.
//!
//! # Example
//!
//! ```ignore
//! use transit::{MigrationConfig, MigrationSettings, run};
//!
//! let config = MigrationConfig::from_systems(&systems, MigrationSettings::default())?;
//! let summary = run(&config).await?;
//! println!("{} migrated", summary.migrated());
//! ```

pub mod asset;
pub mod config;
pub mod http;
pub mod limit;
pub mod migrate;
pub mod retry;
pub mod sink;
pub mod source;

pub use asset::{AssetClient, AssetPayload, AssetSource};
pub use config::{ConfigError, MigrationConfig, MigrationSettings, SystemConfig, SystemKind};
pub use limit::RequestLimiter;
pub use migrate::{
    IdentifierMap, MigrationError, MigrationProgress, MigrationState, Migrator, ProgressCallback,
    ResourceSummary, RunSummary, SkipReason,
};
pub use sink::{RecordSink, SinkClient, SinkError, SinkId, UpsertOutcome};
pub use source::{RecordSource, RemoteRecord, SourceClient, SourceError};

/// Run a complete migration over HTTP with the systems in `config`.
pub async fn run(config: &MigrationConfig) -> Result<RunSummary, MigrationError> {
    let mut migrator = Migrator::from_config(config, None)?;
    migrator.run().await
}

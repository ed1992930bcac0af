//! Run-level errors.
//!
//! Only these abort a run. Per-record problems end up in the
//! [`ResourceSummary`](super::ResourceSummary) instead.

use thiserror::Error;

use super::state::MigrationState;
use crate::config::ConfigError;
use crate::sink::SinkError;
use crate::source::SourceError;

#[derive(Debug, Error)]
pub enum MigrationError {
    /// The sink refused the login.
    #[error("Sink authentication failed: {0}")]
    Authentication(#[source] SinkError),

    /// The source could not say how many parents there are.
    #[error("Source unavailable for '{resource}': {source}")]
    SourceUnavailable {
        resource: String,
        source: SourceError,
    },

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A client could not be constructed.
    #[error("Failed to set up {system} client: {message}")]
    Setup { system: &'static str, message: String },

    /// `run` was called on a migrator that already finished.
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition {
        from: MigrationState,
        to: MigrationState,
    },
}

impl MigrationError {
    pub fn is_authentication(&self) -> bool {
        matches!(self, MigrationError::Authentication(_))
    }
}

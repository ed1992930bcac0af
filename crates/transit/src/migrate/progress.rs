//! Progress reporting types for migration runs.
//!
//! Events are informational only: the engine never waits on a callback and
//! nothing a callback does can change the outcome of a run.

use std::sync::Arc;

use super::state::MigrationState;
use super::types::SkipReason;
use crate::sink::SinkId;

/// Progress events emitted during a migration run.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum MigrationProgress {
    /// The run moved to a new state.
    StateChanged {
        from: MigrationState,
        to: MigrationState,
    },

    /// Asking the source for a resource's size.
    Counting {
        resource: String,
    },

    /// A phase is about to fan out.
    PhaseStarted {
        resource: String,
        /// Items that will be processed.
        total: usize,
    },

    /// A record is present in the sink.
    Migrated {
        resource: String,
        source_id: u64,
        sink_id: SinkId,
        /// False when the natural key already existed.
        created: bool,
    },

    /// A record was skipped without counting as a failure.
    Skipped {
        resource: String,
        source_id: u64,
        reason: SkipReason,
    },

    /// The sink rejected a record.
    Failed {
        resource: String,
        source_id: u64,
        error: String,
    },

    /// An asset lookup finished.
    AssetFetched {
        id: u64,
        valid: bool,
    },

    /// A phase finished; every task has been joined.
    PhaseComplete {
        resource: String,
        migrated: usize,
        skipped: usize,
        failed: usize,
    },

    /// Rate limited, backing off before retry.
    RateLimitBackoff {
        /// The URL or RPC being retried.
        target: String,
        /// Time to wait before retry (ms).
        retry_after_ms: u64,
        /// Current attempt number.
        attempt: u32,
    },

    /// Warning message (non-fatal).
    Warning {
        message: String,
    },
}

/// Callback for progress updates during a migration run.
pub type ProgressCallback = Box<dyn Fn(MigrationProgress) + Send + Sync>;

/// A callback shared between spawned tasks and clients.
pub type SharedProgressCallback = Arc<ProgressCallback>;

/// Emit a progress event if a callback is provided.
#[inline]
pub fn emit(on_progress: Option<&ProgressCallback>, event: MigrationProgress) {
    if let Some(cb) = on_progress {
        cb(event);
    }
}

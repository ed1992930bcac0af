//! Shared migration types and constants.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Default in-flight requests against the source collection.
pub const DEFAULT_SOURCE_CONCURRENCY: usize = 50;

/// Default in-flight requests against the asset service.
pub const DEFAULT_ASSET_CONCURRENCY: usize = 50;

/// Default in-flight calls against the sink.
/// Tighter than the fetch limits: sink writes are the expensive side.
pub const DEFAULT_SINK_CONCURRENCY: usize = 20;

/// Maximum backoff delay in milliseconds when rate limited.
pub const MAX_BACKOFF_MS: u64 = 60_000;

/// Initial backoff delay in milliseconds.
pub const INITIAL_BACKOFF_MS: u64 = 1_000;

/// Maximum retries for a rate-limited (HTTP 429) request.
pub const MAX_RATE_LIMIT_RETRIES: u32 = 5;

/// How records are written to the sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    /// Look up the natural key first and only create when absent.
    #[default]
    Upsert,
    /// Create unconditionally. Not idempotent; re-runs duplicate records.
    BlindCreate,
}

/// How the source collection is enumerated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceMode {
    /// Read the declared count, then fetch ids `1..=count` individually.
    #[default]
    Numbered,
    /// Walk `?page=N` following `next` links.
    Paginated,
}

/// Why a record was not migrated, without counting as a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// The source reported the record as not found.
    NotFound,
    /// The fetch failed transiently; the next run picks it up.
    FetchFailed { error: String },
    /// The record has no usable natural key.
    MissingNaturalKey,
    /// A child references a parent that is absent from the identifier map.
    DependencyUnresolved { parent_id: Option<u64> },
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NotFound => write!(f, "not found at source"),
            SkipReason::FetchFailed { error } => write!(f, "fetch failed: {}", error),
            SkipReason::MissingNaturalKey => write!(f, "missing natural key"),
            SkipReason::DependencyUnresolved { parent_id: Some(id) } => {
                write!(f, "parent {} was not migrated", id)
            }
            SkipReason::DependencyUnresolved { parent_id: None } => {
                write!(f, "no parent reference")
            }
        }
    }
}

/// Per-resource counts for a migration run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResourceSummary {
    /// Source resource name (e.g. "planets").
    pub resource: String,
    /// Sink model name (e.g. "res.planet").
    pub model: String,
    /// Items the source declared (or returned, in paginated mode).
    pub total: usize,
    /// Records newly created in the sink.
    pub created: usize,
    /// Records whose natural key already existed in the sink.
    pub existing: usize,
    /// Records skipped (not found, fetch failure, unresolved parent).
    pub skipped: usize,
    /// Records the sink rejected.
    pub failed: usize,
    /// Children created without their asset.
    pub missing_assets: usize,
    /// Non-fatal error messages, one per failed or skipped item.
    pub errors: Vec<String>,
}

impl ResourceSummary {
    pub fn new(resource: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            model: model.into(),
            ..Self::default()
        }
    }

    /// Records present in the sink after this run (created or found).
    pub fn migrated(&self) -> usize {
        self.created + self.existing
    }

    /// Items accounted for so far.
    pub fn processed(&self) -> usize {
        self.migrated() + self.skipped + self.failed
    }
}

/// Result of a complete migration run.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub parents: ResourceSummary,
    pub children: ResourceSummary,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunSummary {
    pub fn migrated(&self) -> usize {
        self.parents.migrated() + self.children.migrated()
    }

    pub fn skipped(&self) -> usize {
        self.parents.skipped + self.children.skipped
    }

    pub fn failed(&self) -> usize {
        self.parents.failed + self.children.failed
    }

    /// Wall-clock duration of the run.
    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// Size of one source resource, or why it could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResourceCount {
    pub resource: String,
    pub count: Option<u64>,
    pub error: Option<String>,
}

/// Connectivity report produced before any record is written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Preflight {
    /// User id the sink assigned at login.
    pub uid: i64,
    pub counts: Vec<ResourceCount>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_summary_default() {
        let summary = ResourceSummary::new("planets", "res.planet");

        assert_eq!(summary.resource, "planets");
        assert_eq!(summary.model, "res.planet");
        assert_eq!(summary.migrated(), 0);
        assert_eq!(summary.processed(), 0);
        assert!(summary.errors.is_empty());
    }

    #[test]
    fn test_migrated_counts_created_and_existing() {
        let summary = ResourceSummary {
            created: 3,
            existing: 2,
            skipped: 1,
            failed: 1,
            ..ResourceSummary::default()
        };
        assert_eq!(summary.migrated(), 5);
        assert_eq!(summary.processed(), 7);
    }

    #[test]
    fn test_run_summary_totals() {
        let now = Utc::now();
        let run = RunSummary {
            parents: ResourceSummary {
                created: 2,
                skipped: 1,
                ..ResourceSummary::default()
            },
            children: ResourceSummary {
                created: 4,
                existing: 1,
                skipped: 1,
                failed: 2,
                ..ResourceSummary::default()
            },
            started_at: now,
            finished_at: now,
        };
        assert_eq!(run.migrated(), 7);
        assert_eq!(run.skipped(), 2);
        assert_eq!(run.failed(), 2);
        assert_eq!(run.elapsed(), chrono::Duration::zero());
    }

    #[test]
    fn test_skip_reason_display() {
        assert_eq!(SkipReason::NotFound.to_string(), "not found at source");
        assert_eq!(
            SkipReason::DependencyUnresolved { parent_id: Some(4) }.to_string(),
            "parent 4 was not migrated"
        );
        assert_eq!(
            SkipReason::FetchFailed {
                error: "HTTP 500".to_string()
            }
            .to_string(),
            "fetch failed: HTTP 500"
        );
    }

    #[test]
    fn test_modes_deserialize_snake_case() {
        let mode: WriteMode = serde_json::from_str("\"blind_create\"").unwrap();
        assert_eq!(mode, WriteMode::BlindCreate);
        let mode: SourceMode = serde_json::from_str("\"paginated\"").unwrap();
        assert_eq!(mode, SourceMode::Paginated);
        assert_eq!(WriteMode::default(), WriteMode::Upsert);
        assert_eq!(SourceMode::default(), SourceMode::Numbered);
    }
}

//! Source collection error types.

use thiserror::Error;

/// Errors that can occur when reading from the source collection.
///
/// Every variant is transient from the migration's point of view: the item
/// is skipped for this run and picked up by the next one.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The request never produced a response.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The body was not the JSON we expected.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The source answered with a non-success status.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The collection endpoint did not report a count.
    #[error("No count reported for resource '{0}'")]
    MissingCount(String),

    /// The declared count is larger than any collection we are willing to walk.
    #[error("Resource '{resource}' declares {count} items, more than the limit of {limit}")]
    ImplausibleCount {
        resource: String,
        count: u64,
        limit: u64,
    },

    /// The limiter was closed underneath a waiting request.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Largest collection size accepted from a count endpoint.
pub const MAX_SOURCE_COUNT: u64 = 100_000;

/// Reject counts above [`MAX_SOURCE_COUNT`] before anything is allocated for them.
pub fn check_count(resource: &str, count: u64) -> Result<u64, SourceError> {
    if count > MAX_SOURCE_COUNT {
        return Err(SourceError::ImplausibleCount {
            resource: resource.to_string(),
            count,
            limit: MAX_SOURCE_COUNT,
        });
    }
    Ok(count)
}

impl SourceError {
    /// HTTP 429 from the source.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, SourceError::Api { status: 429, .. })
    }
}

/// Get a short error message suitable for progress output.
pub fn short_error_message(err: &SourceError) -> String {
    match err {
        SourceError::Http(_) => "Network error".to_string(),
        SourceError::Json(_) => "JSON parse error".to_string(),
        SourceError::Api { status, message } => {
            if message.len() > 50 {
                let truncated: String = message.chars().take(47).collect();
                format!("HTTP {}: {}...", status, truncated)
            } else if message.is_empty() {
                format!("HTTP {}", status)
            } else {
                format!("HTTP {}: {}", status, message)
            }
        }
        SourceError::MissingCount(resource) => format!("No count for {}", resource),
        SourceError::ImplausibleCount { resource, count, .. } => {
            format!("Implausible count {} for {}", count, resource)
        }
        SourceError::Internal(msg) => msg.clone(),
    }
}

//! Source collection access.
//!
//! The source exposes each resource as a numbered collection:
//! `GET {base}/{resource}/` reports a `count`, `GET {base}/{resource}/{id}/`
//! returns one item and `?page=N` walks the listing.

mod client;
mod error;
mod types;

use async_trait::async_trait;

pub use client::SourceClient;
pub use error::{MAX_SOURCE_COUNT, SourceError, check_count, short_error_message};
pub use types::{CollectionPage, FetchedCollection, RemoteRecord, parse_trailing_id};

/// Read access to a source collection.
#[async_trait]
pub trait RecordSource: Send + Sync {
    /// Number of items the source declares for `resource`.
    async fn count(&self, resource: &str) -> Result<u64, SourceError>;

    /// Fetch one item. `Ok(None)` when the source reports it as not found.
    async fn fetch_one(&self, resource: &str, id: u64) -> Result<Option<RemoteRecord>, SourceError>;

    /// Walk every page of the listing.
    async fn fetch_pages(&self, resource: &str) -> Result<Vec<RemoteRecord>, SourceError>;
}

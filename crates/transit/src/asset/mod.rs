//! Per-record image assets.
//!
//! An asset is optional: a missing or undecodable image degrades to "no
//! asset" and never blocks the record that owns it.

mod client;

use async_trait::async_trait;
use thiserror::Error;

pub use client::{AssetClient, validate};

/// Raw asset bytes and whether they decoded as an image.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetPayload {
    pub bytes: Vec<u8>,
    pub valid: bool,
}

impl AssetPayload {
    /// An empty, invalid payload.
    pub fn unavailable() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Failures while fetching an asset. Never escapes [`AssetClient`].
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("HTTP {0}")]
    Status(u16),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AssetError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, AssetError::Status(429))
    }
}

/// Lookup of per-record assets by source id.
#[async_trait]
pub trait AssetSource: Send + Sync {
    /// Fetch and validate the asset for `id`. `None` when unavailable or invalid.
    async fn fetch_and_validate(&self, id: u64) -> (u64, Option<AssetPayload>);
}

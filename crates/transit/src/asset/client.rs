//! HTTP client for the image service.

use std::collections::BTreeMap;
use std::io::Cursor;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::task::JoinSet;

use super::{AssetError, AssetPayload, AssetSource};
use crate::http::reqwest_transport::{DEFAULT_TIMEOUT, ReqwestTransport};
use crate::http::{HttpRequest, HttpTransport};
use crate::limit::RequestLimiter;
use crate::migrate::{MigrationProgress, ProgressCallback, SharedProgressCallback, emit};
use crate::retry::with_retry;

/// Whether `bytes` decode as an image of a recognised format.
///
/// The format is guessed from the magic bytes and the image is fully decoded;
/// any failure yields `false`.
pub fn validate(bytes: &[u8]) -> bool {
    if bytes.is_empty() {
        return false;
    }
    match image::ImageReader::new(Cursor::new(bytes)).with_guessed_format() {
        Ok(reader) => reader.decode().is_ok(),
        Err(_) => false,
    }
}

/// Fetches `{base}/{id}.jpg` under its own limiter.
#[derive(Clone)]
pub struct AssetClient {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    limiter: RequestLimiter,
    on_progress: Option<SharedProgressCallback>,
}

impl AssetClient {
    pub fn new(base_url: &str, limiter: RequestLimiter) -> Result<Self, AssetError> {
        let transport = ReqwestTransport::with_timeout(DEFAULT_TIMEOUT)
            .map_err(|e| AssetError::Internal(e.to_string()))?;
        Ok(Self::new_with_transport(base_url, limiter, Arc::new(transport)))
    }

    pub fn new_with_transport(
        base_url: &str,
        limiter: RequestLimiter,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            transport,
            base_url: base_url.trim_end_matches('/').to_string(),
            limiter,
            on_progress: None,
        }
    }

    #[must_use]
    pub fn with_progress(mut self, callback: SharedProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    pub fn limiter(&self) -> &RequestLimiter {
        &self.limiter
    }

    fn asset_url(&self, id: u64) -> String {
        format!("{}/{}.jpg", self.base_url, id)
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, AssetError> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|e| AssetError::Internal(e.to_string()))?;

        let response = self
            .transport
            .send(HttpRequest::get(url, "image/*"))
            .await
            .map_err(|e| AssetError::Http(e.to_string()))?;

        if !response.is_success() {
            return Err(AssetError::Status(response.status));
        }
        Ok(response.body)
    }

    /// Download the asset for `id`.
    ///
    /// Never fails: any error is logged and yields an empty, invalid payload.
    pub async fn fetch(&self, id: u64) -> AssetPayload {
        let url = self.asset_url(id);
        let target = url.as_str();
        let result = with_retry(
            move || self.download(target),
            |e: &AssetError| e.is_rate_limited(),
            |e: &AssetError| e.to_string(),
            &url,
            self.on_progress.as_deref(),
        )
        .await;

        match result {
            Ok(bytes) => {
                tracing::debug!(id, bytes = bytes.len(), "Fetched asset");
                AssetPayload { bytes, valid: false }
            }
            Err(e) => {
                tracing::error!(id, url = %url, error = %e, "Failed to fetch asset");
                AssetPayload::unavailable()
            }
        }
    }

    /// Fetch `ids` concurrently, emitting [`MigrationProgress::AssetFetched`]
    /// as each one completes.
    pub async fn fetch_many(
        &self,
        ids: &[u64],
        on_progress: Option<&ProgressCallback>,
    ) -> BTreeMap<u64, Option<AssetPayload>> {
        let mut tasks = JoinSet::new();
        for &id in ids {
            let client = self.clone();
            tasks.spawn(async move { client.fetch_and_validate(id).await });
        }

        let mut assets = BTreeMap::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((id, payload)) => {
                    emit(
                        on_progress,
                        MigrationProgress::AssetFetched {
                            id,
                            valid: payload.is_some(),
                        },
                    );
                    assets.insert(id, payload);
                }
                Err(e) => tracing::error!(error = %e, "Asset task failed"),
            }
        }

        // Ids whose task died still get an entry.
        for &id in ids {
            assets.entry(id).or_insert(None);
        }
        assets
    }
}

/// Run `check` on the blocking pool so a slow decode never stalls a runtime
/// worker. A panicking check counts as a failed one.
async fn off_runtime(bytes: Vec<u8>, check: fn(&[u8]) -> bool) -> (Vec<u8>, bool) {
    let len = bytes.len();
    match tokio::task::spawn_blocking(move || {
        let ok = check(&bytes);
        (bytes, ok)
    })
    .await
    {
        Ok(result) => result,
        Err(e) => {
            tracing::error!(bytes = len, error = %e, "Asset validation task failed");
            (Vec::new(), false)
        }
    }
}

#[async_trait]
impl AssetSource for AssetClient {
    async fn fetch_and_validate(&self, id: u64) -> (u64, Option<AssetPayload>) {
        let mut payload = self.fetch(id).await;
        if payload.is_empty() {
            return (id, None);
        }

        let (bytes, valid) = off_runtime(payload.bytes, validate).await;
        payload.bytes = bytes;
        payload.valid = valid;
        if payload.valid {
            (id, Some(payload))
        } else {
            tracing::warn!(id, bytes = payload.bytes.len(), "Asset is not a decodable image");
            (id, None)
        }
    }
}

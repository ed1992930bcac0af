//! HTTP client for the source collection.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::RecordSource;
use super::error::{SourceError, check_count, short_error_message};
use super::types::{CollectionPage, FetchedCollection, RemoteRecord};
use crate::http::reqwest_transport::{DEFAULT_TIMEOUT, ReqwestTransport};
use crate::http::{HttpRequest, HttpResponse, HttpTransport};
use crate::limit::RequestLimiter;
use crate::migrate::SharedProgressCallback;
use crate::retry::with_retry;

/// Read-only client for a numbered, paginated collection API.
///
/// Cloning is cheap and clones share the transport and the limiter.
#[derive(Clone)]
pub struct SourceClient {
    transport: Arc<dyn HttpTransport>,
    base_url: String,
    limiter: RequestLimiter,
    on_progress: Option<SharedProgressCallback>,
}

impl SourceClient {
    /// Create a client talking to `base_url` over reqwest.
    ///
    /// ```ignore
    /// let client = SourceClient::new("https://swapi.dev/api", RequestLimiter::new(50))?;
    /// let planets = client.fetch_all("planets").await?;
    /// ```
    pub fn new(base_url: &str, limiter: RequestLimiter) -> Result<Self, SourceError> {
        let transport = ReqwestTransport::with_timeout(DEFAULT_TIMEOUT)
            .map_err(|e| SourceError::Internal(e.to_string()))?;
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

    /// Report rate-limit back-off through `callback`.
    #[must_use]
    pub fn with_progress(mut self, callback: SharedProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn limiter(&self) -> &RequestLimiter {
        &self.limiter
    }

    fn collection_url(&self, resource: &str) -> String {
        format!("{}/{}/", self.base_url, resource.trim_matches('/'))
    }

    fn item_url(&self, resource: &str, id: u64) -> String {
        format!("{}/{}/{}/", self.base_url, resource.trim_matches('/'), id)
    }

    /// One GET under the limiter. 429 is an error so the caller can back off.
    async fn send_once(&self, url: &str) -> Result<HttpResponse, SourceError> {
        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|e| SourceError::Internal(e.to_string()))?;

        let response = self
            .transport
            .send(HttpRequest::get(url, "application/json"))
            .await
            .map_err(|e| SourceError::Http(e.to_string()))?;

        if response.status == 429 {
            return Err(SourceError::Api {
                status: 429,
                message: response.body_text(),
            });
        }

        Ok(response)
    }

    /// GET with rate-limit back-off. Non-429 statuses are returned as-is.
    async fn get(&self, url: &str) -> Result<HttpResponse, SourceError> {
        with_retry(
            move || self.send_once(url),
            |e: &SourceError| e.is_rate_limited(),
            short_error_message,
            url,
            self.on_progress.as_deref(),
        )
        .await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, SourceError> {
        let response = self.get(url).await?;
        if !response.is_success() {
            return Err(SourceError::Api {
                status: response.status,
                message: response.body_text(),
            });
        }
        serde_json::from_slice(&response.body).map_err(SourceError::Json)
    }

    /// Fetch ids `1..=count` of `resource` concurrently.
    ///
    /// Only a failing count aborts; single items land in `missing` or
    /// `failed` instead. Results are keyed by source id.
    #[tracing::instrument(skip(self), fields(base_url = %self.base_url))]
    pub async fn fetch_all(&self, resource: &str) -> Result<FetchedCollection, SourceError> {
        let declared = self.count(resource).await?;
        tracing::debug!(resource, declared, "Fetching collection");

        let mut handles = Vec::with_capacity(declared as usize);
        for id in 1..=declared {
            let client = self.clone();
            let resource = resource.to_string();
            let handle = tokio::spawn(async move { client.fetch_one(&resource, id).await });
            handles.push((id, handle));
        }

        let mut collection = FetchedCollection {
            declared,
            ..FetchedCollection::default()
        };

        for (id, handle) in handles {
            match handle.await {
                Ok(Ok(Some(record))) => {
                    collection.records.insert(id, record);
                }
                Ok(Ok(None)) => collection.missing.push(id),
                Ok(Err(e)) => {
                    tracing::warn!(resource, id, error = %e, "Failed to fetch record");
                    collection.failed.insert(id, e.to_string());
                }
                Err(e) => {
                    tracing::error!(resource, id, error = %e, "Fetch task failed");
                    collection.failed.insert(id, format!("task failed: {}", e));
                }
            }
        }

        Ok(collection)
    }
}

#[async_trait]
impl RecordSource for SourceClient {
    async fn count(&self, resource: &str) -> Result<u64, SourceError> {
        let url = self.collection_url(resource);
        let page: CollectionPage = self.get_json(&url).await?;
        let count = page
            .count
            .ok_or_else(|| SourceError::MissingCount(resource.to_string()))?;
        check_count(resource, count)
    }

    async fn fetch_one(&self, resource: &str, id: u64) -> Result<Option<RemoteRecord>, SourceError> {
        let url = self.item_url(resource, id);
        let response = self.get(&url).await?;

        if response.status == 404 {
            tracing::warn!(resource, id, "Record not found at source");
            return Ok(None);
        }
        if !response.is_success() {
            return Err(SourceError::Api {
                status: response.status,
                message: response.body_text(),
            });
        }

        let value: Value = serde_json::from_slice(&response.body)?;
        RemoteRecord::from_value(Some(id), value)
            .map(Some)
            .ok_or_else(|| SourceError::Internal(format!("{} did not return an object", url)))
    }

    async fn fetch_pages(&self, resource: &str) -> Result<Vec<RemoteRecord>, SourceError> {
        let base = self.collection_url(resource);
        let mut records = Vec::new();
        let mut page = 1u32;

        loop {
            let url = format!("{}?page={}", base, page);
            let listing: CollectionPage = self.get_json(&url).await?;
            tracing::debug!(resource, page, results = listing.results.len(), "Fetched page");

            for value in listing.results {
                match RemoteRecord::from_value(None, value) {
                    Some(record) => records.push(record),
                    None => tracing::warn!(resource, page, "Skipping page entry without an id"),
                }
            }

            if listing.next.is_none() {
                break;
            }
            page += 1;
        }

        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpError, HttpMethod, MockTransport, mock_response};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    const BASE: &str = "https://swapi.test/api";

    fn client(transport: MockTransport, limit: usize) -> SourceClient {
        SourceClient::new_with_transport(BASE, RequestLimiter::new(limit), Arc::new(transport))
    }

    fn planet(id: u64, name: &str) -> String {
        json!({
            "name": name,
            "diameter": "10465",
            "url": format!("{BASE}/planets/{id}/"),
        })
        .to_string()
    }

    #[tokio::test]
    async fn count_reads_collection_count() {
        let transport = MockTransport::new();
        transport.push_response(
            HttpMethod::Get,
            format!("{BASE}/planets/"),
            mock_response(200, json!({"count": 60, "next": null, "results": []}).to_string()),
        );

        let count = client(transport, 4).count("planets").await.expect("count");
        assert_eq!(count, 60);
    }

    #[tokio::test]
    async fn count_without_count_field_is_an_error() {
        let transport = MockTransport::new();
        transport.push_response(
            HttpMethod::Get,
            format!("{BASE}/planets/"),
            mock_response(200, json!({"results": []}).to_string()),
        );

        let err = client(transport, 4).count("planets").await.expect_err("missing count");
        assert!(matches!(err, SourceError::MissingCount(ref r) if r == "planets"));
    }

    #[tokio::test]
    async fn count_above_limit_is_rejected_before_fetching() {
        let transport = MockTransport::new();
        transport.push_response(
            HttpMethod::Get,
            format!("{BASE}/planets/"),
            mock_response(
                200,
                json!({"count": 1_000_000_000_000u64, "next": null, "results": []}).to_string(),
            ),
        );

        let err = client(transport, 4).fetch_all("planets").await.expect_err("implausible count");
        assert!(matches!(
            err,
            SourceError::ImplausibleCount { ref resource, count, .. }
                if resource == "planets" && count == 1_000_000_000_000
        ));
    }

    #[tokio::test]
    async fn fetch_one_maps_404_to_none() {
        let transport = MockTransport::new();
        transport.push_response(
            HttpMethod::Get,
            format!("{BASE}/people/17/"),
            mock_response(404, r#"{"detail":"Not found"}"#),
        );

        let record = client(transport, 4)
            .fetch_one("people", 17)
            .await
            .expect("404 is not an error");
        assert!(record.is_none());
    }

    #[tokio::test]
    async fn fetch_one_surfaces_server_errors() {
        let transport = MockTransport::new();
        transport.push_response(
            HttpMethod::Get,
            format!("{BASE}/planets/2/"),
            mock_response(500, "boom"),
        );

        let err = client(transport, 4)
            .fetch_one("planets", 2)
            .await
            .expect_err("500 is an error");
        assert!(matches!(err, SourceError::Api { status: 500, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_one_backs_off_on_429() {
        let transport = MockTransport::new();
        let url = format!("{BASE}/planets/1/");
        transport.push_response(HttpMethod::Get, url.clone(), mock_response(429, "slow down"));
        transport.push_response(HttpMethod::Get, url.clone(), mock_response(200, planet(1, "Tatooine")));

        let record = client(transport.clone(), 4)
            .fetch_one("planets", 1)
            .await
            .expect("retried")
            .expect("record");
        assert_eq!(record.str_field("name"), Some("Tatooine"));
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn fetch_all_keys_results_by_id_and_isolates_failures() {
        let transport = MockTransport::new();
        transport.push_response(
            HttpMethod::Get,
            format!("{BASE}/planets/"),
            mock_response(200, json!({"count": 4}).to_string()),
        );
        transport.push_response(HttpMethod::Get, format!("{BASE}/planets/1/"), mock_response(200, planet(1, "Tatooine")));
        transport.push_response(HttpMethod::Get, format!("{BASE}/planets/2/"), mock_response(503, "unavailable"));
        transport.push_response(HttpMethod::Get, format!("{BASE}/planets/3/"), mock_response(404, ""));
        transport.push_response(HttpMethod::Get, format!("{BASE}/planets/4/"), mock_response(200, planet(4, "Hoth")));

        let collection = client(transport, 2).fetch_all("planets").await.expect("collection");

        assert_eq!(collection.declared, 4);
        assert_eq!(collection.records.keys().copied().collect::<Vec<_>>(), vec![1, 4]);
        assert_eq!(collection.missing, vec![3]);
        assert!(collection.failed.contains_key(&2));
        assert_eq!(collection.accounted(), 4);
    }

    #[tokio::test]
    async fn fetch_pages_follows_next_links() {
        let transport = MockTransport::new();
        transport.push_response(
            HttpMethod::Get,
            format!("{BASE}/planets/?page=1"),
            mock_response(
                200,
                json!({
                    "count": 3,
                    "next": format!("{BASE}/planets/?page=2"),
                    "results": [
                        {"name": "Tatooine", "url": format!("{BASE}/planets/1/")},
                        {"name": "Alderaan", "url": format!("{BASE}/planets/2/")}
                    ]
                })
                .to_string(),
            ),
        );
        transport.push_response(
            HttpMethod::Get,
            format!("{BASE}/planets/?page=2"),
            mock_response(
                200,
                json!({
                    "count": 3,
                    "next": null,
                    "results": [
                        {"name": "Yavin IV", "url": format!("{BASE}/planets/3/")},
                        {"name": "no url"}
                    ]
                })
                .to_string(),
            ),
        );

        let records = client(transport, 4).fetch_pages("planets").await.expect("pages");
        let ids: Vec<u64> = records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    /// Transport that tracks how many requests are in flight at once.
    struct CountingTransport {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl HttpTransport for CountingTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let body = if request.url.ends_with("/planets/") {
                json!({"count": 30}).to_string()
            } else {
                json!({"name": "Somewhere"}).to_string()
            };
            Ok(mock_response(200, body))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn fetch_all_never_exceeds_the_limiter() {
        let transport = Arc::new(CountingTransport {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let client =
            SourceClient::new_with_transport(BASE, RequestLimiter::new(3), transport.clone());

        let collection = client.fetch_all("planets").await.expect("collection");

        assert_eq!(collection.records.len(), 30);
        let peak = transport.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak in-flight was {peak}");
        assert!(peak >= 2, "requests should overlap, peak was {peak}");
    }
}

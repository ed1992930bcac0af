//! JSON-RPC client for the record sink.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};

use super::error::{SinkError, short_error_message};
use super::jsonrpc::{RpcRequest, RpcResponse};
use super::{FieldMap, RecordSink, SinkId, SinkSession};
use crate::http::reqwest_transport::{DEFAULT_TIMEOUT, ReqwestTransport};
use crate::http::{HttpRequest, HttpTransport};
use crate::limit::RequestLimiter;
use crate::migrate::SharedProgressCallback;
use crate::retry::with_retry;

/// Database and login used for every call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkCredentials {
    pub db: String,
    pub username: String,
    pub password: String,
}

/// Client for an Odoo-style `/jsonrpc` endpoint.
///
/// Every RPC holds a permit from the sink limiter for the whole HTTP
/// exchange. Cloning shares the transport and the limiter.
#[derive(Clone)]
pub struct SinkClient {
    transport: Arc<dyn HttpTransport>,
    endpoint: String,
    credentials: SinkCredentials,
    limiter: RequestLimiter,
    on_progress: Option<SharedProgressCallback>,
}

impl SinkClient {
    /// Create a client for the server at `url`; calls go to `{url}/jsonrpc`.
    pub fn new(
        url: &str,
        credentials: SinkCredentials,
        limiter: RequestLimiter,
    ) -> Result<Self, SinkError> {
        let transport = ReqwestTransport::with_timeout(DEFAULT_TIMEOUT)
            .map_err(|e| SinkError::Internal(e.to_string()))?;
        Ok(Self::new_with_transport(
            url,
            credentials,
            limiter,
            Arc::new(transport),
        ))
    }

    pub fn new_with_transport(
        url: &str,
        credentials: SinkCredentials,
        limiter: RequestLimiter,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            transport,
            endpoint: format!("{}/jsonrpc", url.trim_end_matches('/')),
            credentials,
            limiter,
            on_progress: None,
        }
    }

    #[must_use]
    pub fn with_progress(mut self, callback: SharedProgressCallback) -> Self {
        self.on_progress = Some(callback);
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn limiter(&self) -> &RequestLimiter {
        &self.limiter
    }

    async fn call_once(
        &self,
        service: &str,
        method: &str,
        args: &[Value],
    ) -> Result<Value, SinkError> {
        let body = serde_json::to_vec(&RpcRequest::call(service, method, args))?;

        let _permit = self
            .limiter
            .acquire()
            .await
            .map_err(|e| SinkError::Internal(e.to_string()))?;

        let response = self
            .transport
            .send(HttpRequest::post_json(&self.endpoint, body))
            .await
            .map_err(|e| SinkError::Http(e.to_string()))?;

        if !response.is_success() {
            return Err(SinkError::Status {
                status: response.status,
                message: response.body_text(),
            });
        }

        let envelope: RpcResponse = serde_json::from_slice(&response.body)?;
        envelope.into_result()
    }

    /// Invoke `service.method(*args)`, backing off on HTTP 429.
    pub async fn call(
        &self,
        service: &str,
        method: &str,
        args: &[Value],
    ) -> Result<Value, SinkError> {
        let target = format!("{}.{}", service, method);
        with_retry(
            move || self.call_once(service, method, args),
            |e: &SinkError| e.is_rate_limited(),
            short_error_message,
            &target,
            self.on_progress.as_deref(),
        )
        .await
    }

    /// `object.execute(db, uid, password, model, method, *args)`.
    async fn execute(
        &self,
        session: &SinkSession,
        model: &str,
        method: &str,
        extra: Vec<Value>,
    ) -> Result<Value, SinkError> {
        let mut args = vec![
            json!(self.credentials.db),
            json!(session.uid),
            json!(self.credentials.password),
            json!(model),
            json!(method),
        ];
        args.extend(extra);
        self.call("object", "execute", &args).await
    }
}

/// First id of a list result, or a bare integer.
fn first_id(result: &Value) -> Option<SinkId> {
    match result {
        Value::Array(items) => items.first().and_then(Value::as_i64),
        Value::Number(n) => n.as_i64(),
        _ => None,
    }
}

#[async_trait]
impl RecordSink for SinkClient {
    async fn authenticate(&self) -> Result<SinkSession, SinkError> {
        let args = [
            json!(self.credentials.db),
            json!(self.credentials.username),
            json!(self.credentials.password),
        ];
        let result = self
            .call("common", "login", &args)
            .await
            .map_err(|e| SinkError::Authentication(e.to_string()))?;

        match result.as_i64() {
            Some(uid) if uid > 0 => {
                tracing::info!(uid, db = %self.credentials.db, "Authenticated with sink");
                Ok(SinkSession { uid })
            }
            _ => Err(SinkError::Authentication(format!(
                "login refused for user '{}' on database '{}'",
                self.credentials.username, self.credentials.db
            ))),
        }
    }

    async fn find_by_natural_key(
        &self,
        session: &SinkSession,
        model: &str,
        key_field: &str,
        key: &str,
    ) -> Result<Option<SinkId>, SinkError> {
        let domain = json!([[key_field, "=", key]]);
        let result = self.execute(session, model, "search", vec![domain]).await?;
        match result {
            Value::Array(_) => Ok(first_id(&result)),
            other => Err(SinkError::UnexpectedResult {
                method: "search".to_string(),
                result: other.to_string(),
            }),
        }
    }

    async fn create(
        &self,
        session: &SinkSession,
        model: &str,
        fields: &FieldMap,
    ) -> Result<SinkId, SinkError> {
        let payload = Value::Array(vec![Value::Object(fields.clone())]);
        let result = self.execute(session, model, "create", vec![payload]).await?;
        first_id(&result).ok_or_else(|| SinkError::UnexpectedResult {
            method: "create".to_string(),
            result: result.to_string(),
        })
    }

    /// Concurrent creates under the sink limiter; results keep input order.
    async fn create_batch(
        &self,
        session: &SinkSession,
        model: &str,
        fields_list: &[FieldMap],
    ) -> Vec<Result<SinkId, SinkError>> {
        let mut handles = Vec::with_capacity(fields_list.len());
        for fields in fields_list {
            let client = self.clone();
            let session = *session;
            let model = model.to_string();
            let fields = fields.clone();
            handles.push(tokio::spawn(async move {
                client.create(&session, &model, &fields).await
            }));
        }

        let mut results = Vec::with_capacity(handles.len());
        for handle in handles {
            results.push(match handle.await {
                Ok(result) => result,
                Err(e) => Err(SinkError::Internal(format!("create task failed: {}", e))),
            });
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpMethod, HttpRequest, MockTransport, mock_response};
    use crate::sink::UpsertOutcome;
    use std::collections::HashMap;
    use std::sync::Mutex;

    const URL: &str = "https://odoo.test";

    #[derive(Default)]
    struct FakeStore {
        next_id: i64,
        records: HashMap<String, Vec<(i64, FieldMap)>>,
        creates: usize,
        reject_names: Vec<String>,
    }

    /// Answer JSON-RPC calls from an in-memory store.
    fn fake_odoo(transport: &MockTransport) -> Arc<Mutex<FakeStore>> {
        let store = Arc::new(Mutex::new(FakeStore::default()));
        let shared = Arc::clone(&store);
        transport.set_handler(move |req: &HttpRequest| {
            let body: Value = serde_json::from_slice(&req.body).ok()?;
            let params = &body["params"];
            let args = params["args"].as_array()?;
            let mut store = shared.lock().expect("store lock");

            let reply = match (params["service"].as_str()?, params["method"].as_str()?) {
                ("common", "login") => {
                    if args[2] == "secret" {
                        json!({"result": 2})
                    } else {
                        json!({"result": false})
                    }
                }
                ("object", "execute") => {
                    let model = args[3].as_str()?.to_string();
                    match args[4].as_str()? {
                        "search" => {
                            let clause = &args[5][0];
                            let field = clause[0].as_str()?;
                            let ids: Vec<i64> = store
                                .records
                                .get(&model)
                                .map(|rows| {
                                    rows.iter()
                                        .filter(|(_, f)| f.get(field) == Some(&clause[2]))
                                        .map(|(id, _)| *id)
                                        .collect()
                                })
                                .unwrap_or_default();
                            json!({"result": ids})
                        }
                        "create" => {
                            let fields = args[5][0].as_object()?.clone();
                            let name = fields.get("name").and_then(Value::as_str).unwrap_or("");
                            if store.reject_names.iter().any(|n| n == name) {
                                json!({"error": {"code": 200, "message": "Odoo Server Error",
                                    "data": {"message": format!("cannot create {name}")}}})
                            } else {
                                store.next_id += 1;
                                store.creates += 1;
                                let id = store.next_id;
                                store.records.entry(model).or_default().push((id, fields));
                                json!({"result": [id]})
                            }
                        }
                        _ => return None,
                    }
                }
                _ => return None,
            };
            Some(mock_response(200, reply.to_string()))
        });
        store
    }

    fn credentials(password: &str) -> SinkCredentials {
        SinkCredentials {
            db: "swdb".to_string(),
            username: "admin".to_string(),
            password: password.to_string(),
        }
    }

    fn client(transport: &MockTransport, password: &str) -> SinkClient {
        SinkClient::new_with_transport(
            URL,
            credentials(password),
            RequestLimiter::new(4),
            Arc::new(transport.clone()),
        )
    }

    fn fields(name: &str) -> FieldMap {
        let mut map = FieldMap::new();
        map.insert("name".to_string(), json!(name));
        map
    }

    #[tokio::test]
    async fn authenticate_posts_login_envelope() {
        let transport = MockTransport::new();
        fake_odoo(&transport);

        let session = client(&transport, "secret").authenticate().await.expect("login");
        assert_eq!(session.uid, 2);

        let requests = transport.requests();
        assert_eq!(requests[0].method, HttpMethod::Post);
        assert_eq!(requests[0].url, "https://odoo.test/jsonrpc");
        let body: Value = serde_json::from_slice(&requests[0].body).expect("json body");
        assert_eq!(body["params"]["args"], json!(["swdb", "admin", "secret"]));
    }

    #[tokio::test]
    async fn authenticate_rejects_false_uid() {
        let transport = MockTransport::new();
        fake_odoo(&transport);

        let err = client(&transport, "wrong").authenticate().await.expect_err("refused");
        assert!(err.is_authentication());
    }

    #[tokio::test]
    async fn authenticate_maps_transport_errors() {
        let transport = MockTransport::new();
        transport.push_response(HttpMethod::Post, format!("{URL}/jsonrpc"), mock_response(502, "bad gateway"));

        let err = client(&transport, "secret").authenticate().await.expect_err("502");
        assert!(err.is_authentication());
    }

    #[tokio::test]
    async fn upsert_is_idempotent() {
        let transport = MockTransport::new();
        let store = fake_odoo(&transport);
        let client = client(&transport, "secret");
        let session = client.authenticate().await.expect("login");

        let first = client
            .upsert(&session, "res.planet", "name", "Tatooine", &fields("Tatooine"))
            .await
            .expect("first upsert");
        let second = client
            .upsert(&session, "res.planet", "name", "Tatooine", &fields("Tatooine"))
            .await
            .expect("second upsert");

        assert!(first.is_created());
        assert_eq!(second, UpsertOutcome::Existing(first.id()));
        assert_eq!(store.lock().expect("lock").creates, 1);
    }

    #[tokio::test]
    async fn create_surfaces_error_envelope() {
        let transport = MockTransport::new();
        let store = fake_odoo(&transport);
        store.lock().expect("lock").reject_names.push("Bad".to_string());
        let client = client(&transport, "secret");
        let session = client.authenticate().await.expect("login");

        let err = client
            .create(&session, "res.partner", &fields("Bad"))
            .await
            .expect_err("rejected");
        match err {
            SinkError::Rpc { code, message } => {
                assert_eq!(code, Some(200));
                assert_eq!(message, "cannot create Bad");
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[tokio::test]
    async fn create_batch_keeps_input_order() {
        let transport = MockTransport::new();
        let store = fake_odoo(&transport);
        store.lock().expect("lock").reject_names.push("Two".to_string());
        let client = client(&transport, "secret");
        let session = client.authenticate().await.expect("login");

        let batch = vec![fields("One"), fields("Two"), fields("Three")];
        let results = client.create_batch(&session, "res.planet", &batch).await;

        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(SinkError::Rpc { .. })));
        assert!(results[2].is_ok());

        let store = store.lock().expect("lock");
        let rows = &store.records["res.planet"];
        let id_of = |name: &str| {
            rows.iter()
                .find(|(_, f)| f["name"] == name)
                .map(|(id, _)| *id)
        };
        assert_eq!(results[0].as_ref().ok().copied(), id_of("One"));
        assert_eq!(results[2].as_ref().ok().copied(), id_of("Three"));
    }

    #[test]
    fn first_id_accepts_list_or_integer() {
        assert_eq!(first_id(&json!([5, 6])), Some(5));
        assert_eq!(first_id(&json!(8)), Some(8));
        assert_eq!(first_id(&json!([])), None);
        assert_eq!(first_id(&json!(false)), None);
    }
}

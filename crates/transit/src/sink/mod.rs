//! JSON-RPC record sink.
//!
//! Records are written through `object.execute` calls after a
//! `common.login`. Writes are idempotent by default: [`RecordSink::upsert`]
//! looks the natural key up before creating anything.

mod client;
mod error;
mod jsonrpc;
pub mod normalize;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};

pub use client::{SinkClient, SinkCredentials};
pub use error::{SinkError, short_error_message};
pub use jsonrpc::{RpcErrorBody, RpcRequest, RpcResponse};

/// Primary key of a sink record.
pub type SinkId = i64;

/// Field values of one outgoing record.
pub type FieldMap = Map<String, Value>;

/// An authenticated sink session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SinkSession {
    pub uid: i64,
}

/// Result of an upsert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "id", rename_all = "snake_case")]
pub enum UpsertOutcome {
    Created(SinkId),
    Existing(SinkId),
}

impl UpsertOutcome {
    pub fn id(self) -> SinkId {
        match self {
            UpsertOutcome::Created(id) | UpsertOutcome::Existing(id) => id,
        }
    }

    pub fn is_created(self) -> bool {
        matches!(self, UpsertOutcome::Created(_))
    }
}

/// Write access to the record store.
#[async_trait]
pub trait RecordSink: Send + Sync {
    async fn authenticate(&self) -> Result<SinkSession, SinkError>;

    /// First record of `model` whose `key_field` equals `key`.
    async fn find_by_natural_key(
        &self,
        session: &SinkSession,
        model: &str,
        key_field: &str,
        key: &str,
    ) -> Result<Option<SinkId>, SinkError>;

    async fn create(
        &self,
        session: &SinkSession,
        model: &str,
        fields: &FieldMap,
    ) -> Result<SinkId, SinkError>;

    /// Find by natural key, creating only when nothing matches.
    async fn upsert(
        &self,
        session: &SinkSession,
        model: &str,
        key_field: &str,
        key: &str,
        fields: &FieldMap,
    ) -> Result<UpsertOutcome, SinkError> {
        if let Some(id) = self.find_by_natural_key(session, model, key_field, key).await? {
            return Ok(UpsertOutcome::Existing(id));
        }
        let id = self.create(session, model, fields).await?;
        Ok(UpsertOutcome::Created(id))
    }

    /// Create every entry of `fields_list`; results are in input order.
    async fn create_batch(
        &self,
        session: &SinkSession,
        model: &str,
        fields_list: &[FieldMap],
    ) -> Vec<Result<SinkId, SinkError>> {
        let mut results = Vec::with_capacity(fields_list.len());
        for fields in fields_list {
            results.push(self.create(session, model, fields).await);
        }
        results
    }
}
